pub mod decision;
pub mod market;
pub mod portfolio;
pub mod round;
pub mod state;
pub mod trade;

pub use decision::*;
pub use market::*;
pub use portfolio::*;
pub use round::*;
pub use state::*;
pub use trade::*;
