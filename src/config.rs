use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::order::TradingMode;
use crate::signals::StrategyKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: TradingMode,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub ops: OpsConfig,
    pub exchanges: Vec<ExchangeConfig>,
    pub paper: PaperConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    pub entry: EntryConfig,
    pub exit: ExitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    pub rsi_low: f64, // Buy below this RSI (e.g. 30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    pub rsi_high: f64, // Sell above this RSI (e.g. 70)
}

/// Risk limits, in percent of capital.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub global_exposure_cap_pct: f64, // e.g. 20 = 20%
    pub daily_loss_cap_pct: f64,      // e.g. 5 = block trading below -5%
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub kill_switch_enabled: bool,
    pub ntp_required: bool,
    /// Consecutive failed cycles tolerated before the kill switch trips.
    pub error_threshold: u32,
    pub cycle_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub stage_timeout_ms: u64,
    pub max_clock_offset_ms: i64,
    pub time_sync_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    pub symbols: Vec<String>,
    /// Health endpoint probed at startup; `None` means a simulated venue.
    #[serde(default)]
    pub ping_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub starting_capital: f64,
    pub order_notional: f64, // Notional per full-strength signal
    pub slippage_bps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub summary_interval_secs: u64,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_error: bool,
    pub alert_on_kill_switch: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::MeanReversion,
            entry: EntryConfig { rsi_low: 30.0 },
            exit: ExitConfig { rsi_high: 70.0 },
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            global_exposure_cap_pct: 20.0,
            daily_loss_cap_pct: 5.0,
        }
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            kill_switch_enabled: true,
            ntp_required: false,
            error_threshold: 5,
            cycle_interval_ms: 1_000,
            error_backoff_ms: 5_000,
            stage_timeout_ms: 10_000,
            max_clock_offset_ms: 2_000,
            time_sync_url: None,
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_capital: 10_000.0,
            order_notional: 100.0,
            slippage_bps: 5.0,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            summary_interval_secs: 30,
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_error: false,
            alert_on_kill_switch: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            ops: OpsConfig::default(),
            exchanges: vec![ExchangeConfig {
                name: "paper".into(),
                symbols: vec!["BTC/USDT".into(), "ETH/USDT".into()],
                ping_url: None,
            }],
            paper: PaperConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the JSON file at `CONFIG_PATH` if
    /// set, then environment overrides (a `.env` file is read first).
    ///
    /// Environment overrides:
    ///   TRADING_MODE: paper | live
    ///   STRATEGY_TYPE: mean_reversion
    ///   RSI_LOW, RSI_HIGH
    ///   GLOBAL_EXPOSURE_CAP_PCT, DAILY_LOSS_CAP_PCT
    ///   KILL_SWITCH_ENABLED, NTP_REQUIRED, ERROR_THRESHOLD
    ///   CYCLE_INTERVAL_MS, ERROR_BACKOFF_MS, STAGE_TIMEOUT_MS
    ///   SYMBOLS: comma list, replaces the first exchange's symbols
    ///   TIME_SYNC_URL: HTTP endpoint whose Date header is the clock reference
    ///   STARTING_CAPITAL
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL
    ///   RUST_LOG
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();

        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) if !path.is_empty() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TRADING_MODE") {
            self.mode = v
                .parse()
                .map_err(|e: String| ConfigError::invalid("TRADING_MODE", e))?;
        }
        if let Some(v) = get("STRATEGY_TYPE") {
            self.strategy.kind = v.parse()?;
        }
        if let Some(v) = get("RSI_LOW") {
            self.strategy.entry.rsi_low = parse_env("RSI_LOW", &v)?;
        }
        if let Some(v) = get("RSI_HIGH") {
            self.strategy.exit.rsi_high = parse_env("RSI_HIGH", &v)?;
        }
        if let Some(v) = get("GLOBAL_EXPOSURE_CAP_PCT") {
            self.risk.global_exposure_cap_pct = parse_env("GLOBAL_EXPOSURE_CAP_PCT", &v)?;
        }
        if let Some(v) = get("DAILY_LOSS_CAP_PCT") {
            self.risk.daily_loss_cap_pct = parse_env("DAILY_LOSS_CAP_PCT", &v)?;
        }
        if let Some(v) = get("KILL_SWITCH_ENABLED") {
            self.ops.kill_switch_enabled = parse_bool("KILL_SWITCH_ENABLED", &v)?;
        }
        if let Some(v) = get("NTP_REQUIRED") {
            self.ops.ntp_required = parse_bool("NTP_REQUIRED", &v)?;
        }
        if let Some(v) = get("ERROR_THRESHOLD") {
            self.ops.error_threshold = parse_env("ERROR_THRESHOLD", &v)?;
        }
        if let Some(v) = get("CYCLE_INTERVAL_MS") {
            self.ops.cycle_interval_ms = parse_env("CYCLE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("ERROR_BACKOFF_MS") {
            self.ops.error_backoff_ms = parse_env("ERROR_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("STAGE_TIMEOUT_MS") {
            self.ops.stage_timeout_ms = parse_env("STAGE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("SYMBOLS") {
            let symbols: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            match self.exchanges.first_mut() {
                Some(exchange) => exchange.symbols = symbols,
                None => self.exchanges.push(ExchangeConfig {
                    name: "paper".into(),
                    symbols,
                    ping_url: None,
                }),
            }
        }
        if let Some(url) = get("TIME_SYNC_URL") {
            self.ops.time_sync_url = Some(url);
        }
        if let Some(v) = get("STARTING_CAPITAL") {
            self.paper.starting_capital = parse_env("STARTING_CAPITAL", &v)?;
        }

        // Alerting
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telemetry.telegram_bot_token = Some(token);
        }
        if let Some(chat) = get("TELEGRAM_CHAT_ID") {
            self.telemetry.telegram_chat_id = Some(chat);
        }
        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            self.telemetry.discord_webhook_url = Some(url);
        }

        if let Some(level) = get("RUST_LOG") {
            self.telemetry.log_level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rsi_low = self.strategy.entry.rsi_low;
        let rsi_high = self.strategy.exit.rsi_high;
        if !(rsi_low > 0.0 && rsi_low < 100.0) {
            return Err(ConfigError::invalid("strategy.entry.rsi_low", "must be in (0, 100)"));
        }
        if !(rsi_high > 0.0 && rsi_high < 100.0) {
            return Err(ConfigError::invalid("strategy.exit.rsi_high", "must be in (0, 100)"));
        }
        if rsi_low >= rsi_high {
            return Err(ConfigError::invalid(
                "strategy.entry.rsi_low",
                format!("must be below exit.rsi_high ({rsi_low} >= {rsi_high})"),
            ));
        }
        if !(self.risk.global_exposure_cap_pct > 0.0) {
            return Err(ConfigError::invalid("risk.global_exposure_cap_pct", "must be positive"));
        }
        if !(self.risk.daily_loss_cap_pct > 0.0) {
            return Err(ConfigError::invalid("risk.daily_loss_cap_pct", "must be positive"));
        }
        if self.ops.error_threshold == 0 {
            return Err(ConfigError::invalid("ops.error_threshold", "must be at least 1"));
        }
        if self.ops.cycle_interval_ms == 0 || self.ops.error_backoff_ms == 0 {
            return Err(ConfigError::invalid("ops", "cycle intervals must be non-zero"));
        }
        if self.ops.stage_timeout_ms == 0 {
            return Err(ConfigError::invalid("ops.stage_timeout_ms", "must be non-zero"));
        }
        if self.symbols().is_empty() {
            return Err(ConfigError::invalid("exchanges[].symbols", "no symbols configured"));
        }
        if !(0.0..10_000.0).contains(&self.paper.slippage_bps) {
            return Err(ConfigError::invalid("paper.slippage_bps", "must be in [0, 10000)"));
        }
        if self.mode == TradingMode::Paper {
            if !(self.paper.starting_capital > 0.0) {
                return Err(ConfigError::invalid("paper.starting_capital", "must be positive"));
            }
            if !(self.paper.order_notional > 0.0) {
                return Err(ConfigError::invalid("paper.order_notional", "must be positive"));
            }
        }
        Ok(())
    }

    /// Ordered, de-duplicated union of every exchange's symbols.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for symbol in self.exchanges.iter().flat_map(|e| e.symbols.iter()) {
            if !out.contains(symbol) {
                out.push(symbol.clone());
            }
        }
        out
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.ops.cycle_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.ops.error_backoff_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.ops.stage_timeout_ms)
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{raw}': {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("'{other}' is not a boolean"))),
    }
}
