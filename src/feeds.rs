//! Feed Readers
//! Mission: turn the two external JSON drops into typed snapshots or a clean "unavailable"
//!
//! Readers never raise past the gate: absent files, half-written JSON, missing
//! fields and zero quotes all come back as a `GateError` input gap, and the
//! gate loop skips the cycle. Retry cadence belongs to the loop.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::QuoteSymbols;
use crate::error::{FeedKind, GateError};
use crate::models::{HardwareSnapshot, MarketSnapshot};

#[async_trait]
pub trait HardwareFeed: Send + Sync {
    async fn read_hardware(&self) -> Result<HardwareSnapshot, GateError>;
}

#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn read_market(&self) -> Result<MarketSnapshot, GateError>;
}

async fn read_source(feed: FeedKind, path: &Path) -> Result<Vec<u8>, GateError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| GateError::unavailable(feed, format!("{}: {}", path.display(), e)))
}

/// Reject readings the cost model cannot use.
pub fn validate_hardware(hw: &HardwareSnapshot) -> Result<(), GateError> {
    let non_negative = [
        ("gpu_power_w", hw.power_watts),
        ("vram_bandwidth_gbs", hw.vram_bandwidth_gbs),
        ("carbon_intensity_gCO2_kWh", hw.grid_carbon_intensity),
    ];
    for (name, value) in non_negative {
        if !value.is_finite() || value < 0.0 {
            return Err(GateError::unavailable(
                FeedKind::Hardware,
                format!("{} out of range: {}", name, value),
            ));
        }
    }
    if !hw.temperature_c.is_finite() {
        return Err(GateError::unavailable(
            FeedKind::Hardware,
            "gpu_temp_c is not finite",
        ));
    }
    if !(0.0..=100.0).contains(&hw.vram_efficiency_pct) {
        return Err(GateError::unavailable(
            FeedKind::Hardware,
            format!("vram_efficiency_pct out of range: {}", hw.vram_efficiency_pct),
        ));
    }
    Ok(())
}

/// Polls the telemetry producer's JSON file.
pub struct JsonTelemetryFeed {
    path: PathBuf,
    max_age_ms: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl JsonTelemetryFeed {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            max_age_ms: None,
            clock,
        }
    }

    /// Treat readings older than `max_age_ms` as unavailable.
    pub fn with_max_age(mut self, max_age_ms: Option<u64>) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    pub fn parse(&self, raw: &[u8]) -> Result<HardwareSnapshot, GateError> {
        let hw: HardwareSnapshot = serde_json::from_slice(raw)
            .map_err(|e| GateError::unavailable(FeedKind::Hardware, format!("malformed record: {}", e)))?;
        validate_hardware(&hw)?;

        if let Some(max_age) = self.max_age_ms {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            let age_ms = self
                .clock
                .now_millis()
                .checked_sub(hw.timestamp)
                .ok_or_else(|| {
                    GateError::unavailable(
                        FeedKind::Hardware,
                        format!("timestamp out of range: {}", hw.timestamp),
                    )
                })?;
            // Future-dated readings are held to the same bound.
            if age_ms.checked_abs().map_or(true, |age| age > max_age) {
                return Err(GateError::unavailable(
                    FeedKind::Hardware,
                    format!("stale reading: {}ms old (max {}ms)", age_ms, max_age),
                ));
            }
        }

        Ok(hw)
    }
}

#[async_trait]
impl HardwareFeed for JsonTelemetryFeed {
    async fn read_hardware(&self) -> Result<HardwareSnapshot, GateError> {
        let raw = read_source(FeedKind::Hardware, &self.path).await?;
        self.parse(&raw)
    }
}

#[derive(Debug, Deserialize)]
struct MarketFeedRecord {
    prices: HashMap<String, Option<f64>>,
}

/// Polls the market injector's JSON file and picks out one primary/ADR/FX triple.
pub struct JsonMarketFeed {
    path: PathBuf,
    symbols: QuoteSymbols,
}

impl JsonMarketFeed {
    pub fn new(path: impl Into<PathBuf>, symbols: QuoteSymbols) -> Self {
        Self {
            path: path.into(),
            symbols,
        }
    }

    pub fn parse(&self, raw: &[u8]) -> Result<MarketSnapshot, GateError> {
        let record: MarketFeedRecord = serde_json::from_slice(raw)
            .map_err(|e| GateError::unavailable(FeedKind::Market, format!("malformed record: {}", e)))?;
        snapshot_from_prices(&record.prices, &self.symbols)
    }
}

#[async_trait]
impl MarketFeed for JsonMarketFeed {
    async fn read_market(&self) -> Result<MarketSnapshot, GateError> {
        let raw = read_source(FeedKind::Market, &self.path).await?;
        self.parse(&raw)
    }
}

/// Build a snapshot from a `prices` map.
///
/// Primary price and FX rate must be present, finite and non-zero. The ADR
/// price must be present and finite; a zero ADR is accepted and simply
/// widens the spread to the full primary price.
pub fn snapshot_from_prices(
    prices: &HashMap<String, Option<f64>>,
    symbols: &QuoteSymbols,
) -> Result<MarketSnapshot, GateError> {
    let quote = |symbol: &str, allow_zero: bool| -> Result<f64, GateError> {
        let value = prices.get(symbol).copied().flatten();
        match value {
            Some(v) if v.is_finite() && (allow_zero || v != 0.0) => Ok(v),
            other => Err(GateError::InvalidQuote {
                symbol: symbol.to_string(),
                value: other,
            }),
        }
    };

    Ok(MarketSnapshot {
        primary_price: quote(&symbols.primary, false)?,
        adr_price: quote(&symbols.adr, true)?,
        fx_rate: quote(&symbols.fx, false)?,
    })
}
