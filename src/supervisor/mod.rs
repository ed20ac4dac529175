//! Supervision: alerting on round outcomes

pub mod alert_manager;

pub use alert_manager::{alerts_for_round, Alert, AlertLevel, AlertManager};
