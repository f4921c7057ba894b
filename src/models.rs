//! Core data types shared across the gate
//! Snapshots come in from the feeds, valuations are derived per cycle,
//! decision records go out to the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One point-in-time reading from the hardware telemetry producer.
///
/// Field names on the wire follow the producer's JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    /// Producer timestamp, epoch milliseconds
    pub timestamp: i64,
    #[serde(rename = "gpu_power_w")]
    pub power_watts: f64,
    #[serde(rename = "gpu_temp_c")]
    pub temperature_c: f64,
    pub vram_bandwidth_gbs: f64,
    pub vram_efficiency_pct: f64,
    #[serde(rename = "carbon_intensity_gCO2_kWh")]
    pub grid_carbon_intensity: f64,
}

/// One cross-listed instrument quoted in two venues plus the FX rate between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Home-venue price (e.g. INFY on NSE, in INR)
    pub primary_price: f64,
    /// Depositary receipt price (e.g. INFY ADR, in USD)
    pub adr_price: f64,
    /// Conversion rate from ADR currency to primary currency
    pub fx_rate: f64,
}

impl MarketSnapshot {
    /// ADR price expressed in the primary venue's currency.
    pub fn converted_adr(&self) -> f64 {
        self.adr_price * self.fx_rate
    }
}

/// Revenue/liability breakdown for one cycle.
///
/// Always computed in full, whatever the decision ends up being.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub net_spread: f64,
    pub energy_cost: f64,
    pub surge_cost: f64,
    pub carbon_tax: f64,
    pub saved_watts_potential: f64,
    pub carbon_credit: f64,
    pub green_alpha_score: f64,
}

impl Valuation {
    pub fn total_revenue(&self) -> f64 {
        self.net_spread + self.carbon_credit
    }

    pub fn total_liability(&self) -> f64 {
        self.energy_cost + self.carbon_tax
    }

    /// Revenue minus liability; its sign decides the action.
    pub fn margin(&self) -> f64 {
        self.total_revenue() - self.total_liability()
    }
}

/// The two mutually exclusive admission outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Execute,
    Throttle,
}

impl Action {
    /// Symbolic trigger tag written to the ledger.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Execute => "EXECUTE_TRADE",
            Self::Throttle => "THROTTLE_GPU",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "EXECUTE_TRADE" | "EXECUTE" => Ok(Self::Execute),
            "THROTTLE_GPU" | "THROTTLE" => Ok(Self::Throttle),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// What the decision engine did with a valuation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Non-zero only on THROTTLE
    pub saved_watts: f64,
    /// Non-zero only on EXECUTE
    pub realized_profit: f64,
}

/// One immutable audit row. Column order is fixed by [`crate::ledger::LEDGER_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: i64,
    pub time_str: String,
    pub power_watts: f64,
    pub temperature_c: f64,
    pub vram_bandwidth_gbs: f64,
    pub vram_efficiency_pct: f64,
    pub carbon_intensity: f64,
    pub net_spread: f64,
    pub energy_cost: f64,
    pub action: Action,
    pub saved_watts: f64,
    pub green_alpha_score: f64,
    pub primary_price: f64,
    pub adr_price: f64,
    pub fx_rate: f64,
    pub carbon_credit: f64,
    pub carbon_tax: f64,
    pub realized_profit: f64,
}

impl DecisionRecord {
    pub fn new(
        hardware: &HardwareSnapshot,
        market: &MarketSnapshot,
        valuation: &Valuation,
        decision: &Decision,
        time_str: String,
    ) -> Self {
        Self {
            timestamp: hardware.timestamp,
            time_str,
            power_watts: hardware.power_watts,
            temperature_c: hardware.temperature_c,
            vram_bandwidth_gbs: hardware.vram_bandwidth_gbs,
            vram_efficiency_pct: hardware.vram_efficiency_pct,
            carbon_intensity: hardware.grid_carbon_intensity,
            net_spread: valuation.net_spread,
            energy_cost: valuation.energy_cost,
            action: decision.action,
            saved_watts: decision.saved_watts,
            green_alpha_score: valuation.green_alpha_score,
            primary_price: market.primary_price,
            adr_price: market.adr_price,
            fx_rate: market.fx_rate,
            carbon_credit: valuation.carbon_credit,
            carbon_tax: valuation.carbon_tax,
            realized_profit: decision.realized_profit,
        }
    }
}
