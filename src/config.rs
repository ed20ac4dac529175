use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub round: RoundConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub grok: GrokSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Registered agents, processed in this order every round
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Jupiter API base URL
    pub price_api_url: String,
    /// Jupiter API key (x-api-key header)
    pub api_key: Option<String>,
    /// Snapshot cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Upstream fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Hide symbols below this 24h USD volume from agents (None = no filter)
    pub min_volume_usd: Option<Decimal>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_api_url: "https://api.jup.ag".to_string(),
            api_key: None,
            cache_ttl_secs: 30,
            fetch_timeout_ms: 5_000,
            min_volume_usd: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Lower bound of the inter-agent delay (ms)
    pub min_jitter_ms: u64,
    /// Upper bound of the inter-agent delay (ms)
    pub max_jitter_ms: u64,
    /// Per-agent decision timeout (seconds)
    pub decision_timeout_secs: u64,
    /// Total budget for the pre-round gate (ms)
    pub gate_timeout_ms: u64,
    /// Interval for `arena schedule` (seconds)
    pub schedule_interval_secs: u64,
    /// Rounds kept in the in-memory cache
    pub recent_round_capacity: usize,
    /// Ask the enricher for headlines before agents run
    pub enrich_context: bool,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            min_jitter_ms: 1_000,
            max_jitter_ms: 5_000,
            decision_timeout_secs: 90,
            gate_timeout_ms: 10_000,
            schedule_interval_secs: 1_800,
            recent_round_capacity: 50,
            enrich_context: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum USDC notional for a single buy
    pub max_trade_usd: Decimal,
    /// Maximum share of total portfolio value in one symbol (0.25 = 25%)
    pub max_position_pct: Decimal,
    /// Minimum seconds between executed trades for one agent
    pub cooldown_secs: u64,
    /// Maximum executed trades per agent within `trade_window_secs`
    pub max_trades_per_window: u32,
    pub trade_window_secs: u64,
    /// Decisions below this confidence (percent) are held
    pub min_confidence: f64,
    /// Block new buys once total P&L falls below -max_drawdown_pct percent
    pub max_drawdown_pct: Decimal,
    /// Consecutive execution failures that open an agent's circuit
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before half-open
    pub recovery_timeout_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_trade_usd: dec!(25),
            max_position_pct: dec!(0.25),
            cooldown_secs: 600,
            max_trades_per_window: 6,
            trade_window_secs: 86_400,
            min_confidence: 30.0,
            max_drawdown_pct: dec!(20),
            failure_threshold: 3,
            recovery_timeout_secs: 1_800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Starting USDC per agent
    pub initial_capital: Decimal,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(100),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Start with the kill switch engaged
    pub kill_switch: bool,
    /// Minimum cash each agent must hold to pass the funding check
    pub min_funding_usd: Decimal,
    /// Per-check timeout inside the gate (ms)
    pub check_timeout_ms: u64,
    /// Execution mode label reported by the gate ("paper" or "live")
    pub mode: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            kill_switch: false,
            min_funding_usd: dec!(1),
            check_timeout_ms: 3_000,
            mode: "paper".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrokSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GrokSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.ai/v1".to_string(),
            api_key: None,
            model: "grok-3-mini-fast".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; None keeps everything in memory
    pub url: Option<String>,
    /// Maximum connections in pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Optional webhook receiving warning+ alerts as JSON
    pub webhook_url: Option<String>,
    /// Minimum interval between duplicate alerts (seconds)
    pub rate_limit_secs: u64,
    pub max_alerts_per_minute: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            rate_limit_secs: 60,
            max_alerts_per_minute: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which decider backs an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Grok,
    Momentum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    pub id: String,
    pub name: String,
    pub kind: AgentKind,
    /// Model override for LLM agents
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Free-text persona appended to the system prompt
    #[serde(default)]
    pub persona: Option<String>,
}

fn default_agents() -> Vec<AgentSettings> {
    vec![
        AgentSettings {
            id: "momentum-1".to_string(),
            name: "Momentum".to_string(),
            kind: AgentKind::Momentum,
            model: None,
            temperature: None,
            persona: None,
        },
        AgentSettings {
            id: "grok-1".to_string(),
            name: "Grok".to_string(),
            kind: AgentKind::Grok,
            model: None,
            temperature: Some(0.7),
            persona: None,
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            round: RoundConfig::default(),
            risk: RiskConfig::default(),
            portfolio: PortfolioConfig::default(),
            safety: SafetyConfig::default(),
            grok: GrokSettings::default(),
            database: DatabaseConfig::default(),
            alerts: AlertConfig::default(),
            logging: LoggingConfig::default(),
            agents: default_agents(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ARENA_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ARENA_MARKET__API_KEY, etc.)
            .add_source(
                Environment::with_prefix("ARENA")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.agents.is_empty() {
            errors.push("at least one agent must be registered".to_string());
        }

        let mut ids: Vec<&str> = self.agents.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            errors.push("agent ids must be unique".to_string());
        }

        if self.round.min_jitter_ms > self.round.max_jitter_ms {
            errors.push("min_jitter_ms must not exceed max_jitter_ms".to_string());
        }

        if self.round.decision_timeout_secs == 0 {
            errors.push("decision_timeout_secs must be positive".to_string());
        }

        if self.round.schedule_interval_secs == 0 {
            errors.push("schedule_interval_secs must be positive".to_string());
        }

        if self.portfolio.initial_capital <= Decimal::ZERO {
            errors.push("initial_capital must be positive".to_string());
        }

        if self.risk.max_trade_usd <= Decimal::ZERO {
            errors.push("max_trade_usd must be positive".to_string());
        }

        if self.risk.max_position_pct <= Decimal::ZERO || self.risk.max_position_pct > Decimal::ONE
        {
            errors.push("max_position_pct must be in (0, 1]".to_string());
        }

        if !(0.0..=100.0).contains(&self.risk.min_confidence) {
            errors.push("min_confidence must be between 0 and 100".to_string());
        }

        if self.risk.failure_threshold == 0 {
            errors.push("failure_threshold must be positive".to_string());
        }

        if !matches!(self.safety.mode.as_str(), "paper" | "live") {
            errors.push(format!("unknown safety.mode '{}'", self.safety.mode));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
