//! Cost/Benefit Model
//! Mission: price one cycle of trading against the energy it burns
//!
//! Revenue = cross-venue spread + carbon credit for watts kept under the cap.
//! Liability = carbon-weighted energy cost (+ grid surge) + peak-hour carbon tax.
//!
//! Deterministic given its inputs; the only random term, the grid surge, is
//! drawn from an injected [`SurgeSource`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::ModelParams;
use crate::models::{HardwareSnapshot, MarketSnapshot, Valuation};

/// Source of the transient grid-price surge added to energy cost each cycle.
pub trait SurgeSource: Send {
    /// Draw one surge value in `[min, max]`.
    fn draw(&mut self, min: f64, max: f64) -> f64;
}

/// Uniform surge from a seeded ChaCha8 stream. Same seed, same sequence.
#[derive(Debug, Clone)]
pub struct SeededSurge {
    rng: ChaCha8Rng,
}

impl SeededSurge {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Seeded when a seed is given, entropy otherwise.
    pub fn from_seed_opt(seed: Option<u64>) -> Self {
        seed.map(Self::new).unwrap_or_else(Self::from_entropy)
    }
}

impl SurgeSource for SeededSurge {
    fn draw(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

/// Always returns the same surge, ignoring the bounds.
#[derive(Debug, Clone, Copy)]
pub struct FixedSurge(pub f64);

impl SurgeSource for FixedSurge {
    fn draw(&mut self, _min: f64, _max: f64) -> f64 {
        self.0
    }
}

/// Cost/benefit calculator
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    params: ModelParams,
}

impl CostModel {
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }

    /// Draw a surge from `source` within the configured bounds, then value the cycle.
    pub fn evaluate_with(
        &self,
        hardware: &HardwareSnapshot,
        market: &MarketSnapshot,
        local_hour: u32,
        source: &mut dyn SurgeSource,
    ) -> Valuation {
        let surge = source.draw(self.params.surge_min, self.params.surge_max);
        self.evaluate(hardware, market, local_hour, surge)
    }

    /// Value one cycle with an explicit surge term.
    pub fn evaluate(
        &self,
        hardware: &HardwareSnapshot,
        market: &MarketSnapshot,
        local_hour: u32,
        surge_cost: f64,
    ) -> Valuation {
        let p = &self.params;
        let intensity = hardware.grid_carbon_intensity;

        let net_spread = (market.converted_adr() - market.primary_price).abs();

        let grid_carbon_factor = intensity * p.unit_scale;
        let energy_cost = hardware.power_watts * grid_carbon_factor + surge_cost;

        let carbon_tax = if p.peak_window.contains(local_hour) {
            intensity * p.tax_rate
        } else {
            0.0
        };

        let saved_watts_potential = (p.power_cap_watts - hardware.power_watts).max(0.0);
        let carbon_credit = saved_watts_potential * p.credit_rate;

        Valuation {
            net_spread,
            energy_cost,
            surge_cost,
            carbon_tax,
            saved_watts_potential,
            carbon_credit,
            green_alpha_score: green_alpha_score(intensity),
        }
    }
}

/// 100 on a clean grid, falling 1 point per 10 gCO2/kWh, floored at 0.
pub fn green_alpha_score(carbon_intensity: f64) -> f64 {
    (100.0 - carbon_intensity / 10.0).clamp(0.0, 100.0)
}
