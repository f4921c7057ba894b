//! Gate configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `GREENARB_*`
//! environment variables. CLI flags are applied last by the binary.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Local-time hour range (inclusive at both ends) in which carbon tax applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for PeakWindow {
    fn default() -> Self {
        Self {
            start_hour: 18,
            end_hour: 21,
        }
    }
}

impl PeakWindow {
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }
}

/// Rate constants for the cost/benefit model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Converts gCO2/kWh into a per-watt energy price
    pub unit_scale: f64,
    /// Carbon tax per gCO2/kWh inside the peak window
    pub tax_rate: f64,
    /// Power cap (TDP) against which saved watts are measured
    pub power_cap_watts: f64,
    /// Credit earned per watt kept under the cap
    pub credit_rate: f64,
    /// Lower bound of the stochastic grid surge
    pub surge_min: f64,
    /// Upper bound of the stochastic grid surge
    pub surge_max: f64,
    pub peak_window: PeakWindow,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            unit_scale: 0.001,
            tax_rate: 0.15,
            power_cap_watts: 500.0,
            credit_rate: 0.05,
            surge_min: 2.0,
            surge_max: 5.0,
            peak_window: PeakWindow::default(),
        }
    }
}

/// Symbols picked out of the market feed's `prices` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteSymbols {
    pub primary: String,
    pub adr: String,
    pub fx: String,
}

impl Default for QuoteSymbols {
    fn default() -> Self {
        Self {
            primary: "INFY_NSE".to_string(),
            adr: "INFY_ADR".to_string(),
            fx: "USD_INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub telemetry_path: PathBuf,
    pub market_feed_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Decision cycle period
    pub tick_ms: u64,
    /// How often the stats task logs a snapshot
    pub stats_interval_secs: u64,
    /// Fixed seed for the surge generator; entropy when unset
    pub surge_seed: Option<u64>,
    /// Reject telemetry older than this (disabled when unset)
    pub max_telemetry_age_ms: Option<u64>,
    pub symbols: QuoteSymbols,
    pub model: ModelParams,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            telemetry_path: PathBuf::from("telemetry_output.json"),
            market_feed_path: PathBuf::from("market_feed.json"),
            ledger_path: PathBuf::from("decision_logic/eaa_logs.csv"),
            tick_ms: 500,
            stats_interval_secs: 30,
            surge_seed: None,
            max_telemetry_age_ms: None,
            symbols: QuoteSymbols::default(),
            model: ModelParams::default(),
        }
    }
}

impl GateConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Defaults or the given file, then environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `GREENARB_*` overrides from an arbitrary lookup. Unparseable values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GREENARB_TELEMETRY_PATH") {
            self.telemetry_path = PathBuf::from(v);
        }
        if let Some(v) = get("GREENARB_MARKET_FEED_PATH") {
            self.market_feed_path = PathBuf::from(v);
        }
        if let Some(v) = get("GREENARB_LEDGER_PATH") {
            self.ledger_path = PathBuf::from(v);
        }

        self.tick_ms = get("GREENARB_TICK_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(self.tick_ms);

        self.stats_interval_secs = get("GREENARB_STATS_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(self.stats_interval_secs);

        if let Some(seed) = get("GREENARB_SURGE_SEED").and_then(|v| v.parse::<u64>().ok()) {
            self.surge_seed = Some(seed);
        }
        if let Some(ms) = get("GREENARB_MAX_TELEMETRY_AGE_MS").and_then(|v| v.parse::<u64>().ok())
        {
            self.max_telemetry_age_ms = Some(ms);
        }

        self.model.tax_rate = get("GREENARB_TAX_RATE")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(self.model.tax_rate);

        self.model.power_cap_watts = get("GREENARB_POWER_CAP_W")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(self.model.power_cap_watts);

        self.model.credit_rate = get("GREENARB_CREDIT_RATE")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(self.model.credit_rate);
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            bail!("tick_ms must be positive");
        }
        if self.stats_interval_secs == 0 {
            bail!("stats_interval_secs must be positive");
        }

        let m = &self.model;
        for (name, value) in [
            ("unit_scale", m.unit_scale),
            ("tax_rate", m.tax_rate),
            ("power_cap_watts", m.power_cap_watts),
            ("credit_rate", m.credit_rate),
            ("surge_min", m.surge_min),
            ("surge_max", m.surge_max),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a finite non-negative number, got {}", name, value);
            }
        }
        if m.surge_min > m.surge_max {
            bail!(
                "surge_min ({}) must not exceed surge_max ({})",
                m.surge_min,
                m.surge_max
            );
        }

        let w = m.peak_window;
        if w.start_hour > 23 || w.end_hour > 23 || w.start_hour > w.end_hour {
            bail!(
                "peak window {}..={} must be ordered hours within 0..=23",
                w.start_hour,
                w.end_hour
            );
        }

        if self.symbols.primary.is_empty() || self.symbols.adr.is_empty() || self.symbols.fx.is_empty()
        {
            bail!("quote symbols must not be empty");
        }

        Ok(())
    }
}
