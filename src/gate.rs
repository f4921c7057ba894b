//! Gate Loop
//! Mission: read, value, decide and record once per tick
//!
//! Missing or unusable input skips the cycle with no decision and no record.
//! A failed actuation is not recorded either; the ledger only lists actions
//! that were dispatched. A ledger failure stops the loop.

use anyhow::Context;
use chrono::Timelike;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::actuator::Actuator;
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::engine::DecisionEngine;
use crate::error::GateError;
use crate::feeds::{HardwareFeed, JsonMarketFeed, JsonTelemetryFeed, MarketFeed};
use crate::ledger::{AuditLedger, SharedLedger};
use crate::model::{CostModel, SeededSurge, SurgeSource};
use crate::models::{Action, DecisionRecord};
use crate::stats::{GateStats, GateStatsSnapshot};

/// Ledger `time_str` format
pub const TIME_STR_FORMAT: &str = "%H:%M:%S%.3f";

/// Default decision cycle period
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A decision was made, dispatched and written to the ledger.
    Recorded(DecisionRecord),
    /// An input feed was unavailable or unusable.
    Skipped(GateError),
    /// The trigger failed; nothing was recorded or accumulated.
    ActuationFailed(GateError),
}

pub struct Gate {
    hardware: Box<dyn HardwareFeed>,
    market: Box<dyn MarketFeed>,
    model: CostModel,
    engine: DecisionEngine,
    ledger: SharedLedger,
    clock: Arc<dyn Clock>,
    surge: Box<dyn SurgeSource>,
    stats: Arc<GateStats>,
    tick: Duration,
}

impl Gate {
    /// Gate with default model, system clock, entropy-seeded surge and a 500ms tick.
    pub fn new(
        hardware: Box<dyn HardwareFeed>,
        market: Box<dyn MarketFeed>,
        ledger: SharedLedger,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        Self {
            hardware,
            market,
            model: CostModel::default(),
            engine: DecisionEngine::new(actuator),
            ledger,
            clock: Arc::new(SystemClock),
            surge: Box::new(SeededSurge::from_entropy()),
            stats: Arc::new(GateStats::default()),
            tick: DEFAULT_TICK,
        }
    }

    /// Wire a gate from configuration: JSON file feeds and a freshly initialized ledger.
    ///
    /// The configuration is validated first; a rejected config leaves any
    /// existing ledger untouched.
    pub fn from_config(config: &GateConfig, actuator: Arc<dyn Actuator>) -> anyhow::Result<Self> {
        config.validate().context("Invalid gate configuration")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let hardware = JsonTelemetryFeed::new(&config.telemetry_path, clock.clone())
            .with_max_age(config.max_telemetry_age_ms);
        let market = JsonMarketFeed::new(&config.market_feed_path, config.symbols.clone());
        let ledger = AuditLedger::init(&config.ledger_path)?.into_shared();

        Ok(Self::new(Box::new(hardware), Box::new(market), ledger, actuator)
            .with_model(CostModel::new(config.model.clone()))
            .with_clock(clock)
            .with_surge(Box::new(SeededSurge::from_seed_opt(config.surge_seed)))
            .with_tick(Duration::from_millis(config.tick_ms)))
    }

    pub fn with_model(mut self, model: CostModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_surge(mut self, surge: Box<dyn SurgeSource>) -> Self {
        self.surge = surge;
        self
    }

    /// A zero tick falls back to `DEFAULT_TICK`.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = if tick.is_zero() { DEFAULT_TICK } else { tick };
        self
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn stats(&self) -> Arc<GateStats> {
        self.stats.clone()
    }

    pub fn stats_snapshot(&self) -> GateStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn total_saved_watts(&self) -> f64 {
        self.engine.total_saved_watts()
    }

    /// One decision cycle. Only a ledger failure is returned as `Err`.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, GateError> {
        GateStats::bump(&self.stats.cycles);

        let (hardware, market) =
            tokio::join!(self.hardware.read_hardware(), self.market.read_market());

        let hardware = match hardware {
            Ok(hw) => hw,
            Err(e) => {
                GateStats::bump(&self.stats.skipped_hardware);
                debug!(reason = %e, "Skipping cycle: hardware feed");
                return Ok(CycleOutcome::Skipped(e));
            }
        };
        let market = match market {
            Ok(m) => m,
            Err(e) => {
                GateStats::bump(&self.stats.skipped_market);
                debug!(reason = %e, "Skipping cycle: market feed");
                return Ok(CycleOutcome::Skipped(e));
            }
        };

        // One clock reading for both the peak-window hour and `time_str`.
        let now = self.clock.now();
        let valuation =
            self.model
                .evaluate_with(&hardware, &market, now.hour(), self.surge.as_mut());

        let decision = match self.engine.apply(&valuation).await {
            Ok(d) => d,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                GateStats::bump(&self.stats.actuation_failures);
                warn!(error = %e, "Actuation failed; cycle not recorded");
                return Ok(CycleOutcome::ActuationFailed(e));
            }
        };

        let record = DecisionRecord::new(
            &hardware,
            &market,
            &valuation,
            &decision,
            now.format(TIME_STR_FORMAT).to_string(),
        );
        self.ledger.lock().append(&record)?;

        GateStats::bump(&self.stats.decided);
        match decision.action {
            Action::Execute => GateStats::bump(&self.stats.executed),
            Action::Throttle => GateStats::bump(&self.stats.throttled),
        }

        Ok(CycleOutcome::Recorded(record))
    }

    /// Drive cycles at the configured tick until the ledger fails.
    pub async fn run(mut self) -> Result<(), GateError> {
        info!(
            tick_ms = self.tick.as_millis() as u64,
            "⚡ Starting dual-revenue admission gate"
        );

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "🛑 Audit ledger unavailable; stopping gate");
                return Err(e);
            }
        }
    }
}
