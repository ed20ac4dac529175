use thiserror::Error;

/// Main error type for the round orchestrator
#[derive(Error, Debug)]
pub enum ArenaError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Agent errors
    #[error("Agent {agent_id} decision failed: {reason}")]
    AgentDecision { agent_id: String, reason: String },

    #[error("Agent {agent_id} decision timed out after {timeout_secs}s")]
    DecisionTimeout { agent_id: String, timeout_secs: u64 },

    // Execution errors
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Insufficient holdings: {symbol} requested {requested}, held {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: rust_decimal::Decimal,
        held: rust_decimal::Decimal,
    },

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Safety errors
    #[error("Safety gate error: {0}")]
    SafetyGate(String),

    #[error("Kill switch active: {0}")]
    KillSwitch(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ArenaError
pub type Result<T> = std::result::Result<T, ArenaError>;

impl ArenaError {
    /// Wrap an agent-side failure with the agent id attached
    pub fn agent(agent_id: &str, reason: impl Into<String>) -> Self {
        ArenaError::AgentDecision {
            agent_id: agent_id.to_string(),
            reason: reason.into(),
        }
    }
}
