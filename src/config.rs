//! `Config` — env-driven startup configuration, loaded once at process
//! start via `dotenvy`. Kept as the teacher's `Config::from_env()` shape:
//! every field has a sane default so the process can start in Mock mode
//! with no environment at all.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            other => anyhow::bail!("Invalid MODE: {other}. Only 'mock' is shipped in this core."),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub database_url: String,
    pub account_currency: String,
    pub symbols: Vec<String>,
    pub scanner_cadence_secs: u64,
    pub scanner_worker_pool_cap: usize,
    pub provider_timeout_secs: u64,
    pub position_manager_cadence_secs: u64,
    pub coherence_sweep_cadence_secs: u64,
    pub max_positions_per_symbol: usize,
    pub initial_account_equity: Decimal,
    pub fast_sma_period: usize,
    pub slow_sma_period: usize,
    pub atr_multiplier: Decimal,
    pub flatten_on_exit: bool,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode_str = env::var("MODE").unwrap_or_else(|_| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://aethelgard.db".to_string());

        let account_currency = env::var("ACCOUNT_CURRENCY").unwrap_or_else(|_| "USD".to_string());

        let symbols_str = env::var("SYMBOLS").unwrap_or_else(|_| "EURUSD".to_string());
        let symbols: Vec<String> = symbols_str
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let scanner_cadence_secs = parse_env_or("SCANNER_CADENCE_SECS", 10)?;
        let scanner_worker_pool_cap = parse_env_or("SCANNER_WORKER_POOL_CAP", 8)?;
        let provider_timeout_secs = parse_env_or("PROVIDER_TIMEOUT_SECS", 5)?;
        let position_manager_cadence_secs = parse_env_or("POSITION_MANAGER_CADENCE_SECS", 10)?;
        let coherence_sweep_cadence_secs = parse_env_or("COHERENCE_SWEEP_CADENCE_SECS", 300)?;
        let max_positions_per_symbol = parse_env_or("MAX_POSITIONS_PER_SYMBOL", 1)?;
        let fast_sma_period = parse_env_or("FAST_SMA_PERIOD", 10)?;
        let slow_sma_period = parse_env_or("SLOW_SMA_PERIOD", 30)?;
        let metrics_port = parse_env_or("METRICS_PORT", 9898)?;

        let initial_account_equity = env::var("INITIAL_ACCOUNT_EQUITY")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or_else(|| Decimal::from(10_000));

        let atr_multiplier = env::var("ATR_MULTIPLIER")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or_else(|| Decimal::from(2));

        let flatten_on_exit = env::var("FLATTEN_ON_EXIT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            mode,
            database_url,
            account_currency,
            symbols,
            scanner_cadence_secs,
            scanner_worker_pool_cap,
            provider_timeout_secs,
            position_manager_cadence_secs,
            coherence_sweep_cadence_secs,
            max_positions_per_symbol,
            initial_account_equity,
            fast_sma_period,
            slow_sma_period,
            atr_multiplier,
            flatten_on_exit,
            metrics_port,
        })
    }
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}"))
            .context(format!("parsing env var {key}")),
        Err(_) => Ok(default),
    }
}
