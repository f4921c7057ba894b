//! End-to-end gate cycle tests
//!
//! Feeds are in-memory stubs (or real JSON drops for the file test), the
//! clock and surge are pinned, and every assertion reads the ledger back
//! from disk the way the dashboard would.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::actuator::{Actuator, LoggingActuator};
use crate::clock::{Clock, FixedClock};
use crate::config::GateConfig;
use crate::error::{FeedKind, GateError};
use crate::feeds::{HardwareFeed, MarketFeed};
use crate::gate::{CycleOutcome, Gate, DEFAULT_TICK};
use crate::ledger::{read_tail, AuditLedger};
use crate::model::FixedSurge;
use crate::models::{Action, HardwareSnapshot, MarketSnapshot};

// =============================================================================
// HELPERS
// =============================================================================

struct StubHardware(Arc<Mutex<Result<HardwareSnapshot, GateError>>>);

#[async_trait]
impl HardwareFeed for StubHardware {
    async fn read_hardware(&self) -> Result<HardwareSnapshot, GateError> {
        self.0.lock().clone()
    }
}

struct StubMarket(Arc<Mutex<Result<MarketSnapshot, GateError>>>);

#[async_trait]
impl MarketFeed for StubMarket {
    async fn read_market(&self) -> Result<MarketSnapshot, GateError> {
        self.0.lock().clone()
    }
}

struct BrokenActuator;

#[async_trait]
impl Actuator for BrokenActuator {
    async fn throttle(&self) -> Result<&'static str, GateError> {
        Err(GateError::Actuation {
            action: Action::Throttle.tag(),
            reason: "actuator unreachable".into(),
        })
    }

    async fn execute_burst(&self) -> Result<&'static str, GateError> {
        Err(GateError::Actuation {
            action: Action::Execute.tag(),
            reason: "actuator unreachable".into(),
        })
    }
}

fn hardware(ts: i64, power: f64, intensity: f64) -> HardwareSnapshot {
    HardwareSnapshot {
        timestamp: ts,
        power_watts: power,
        temperature_c: 65.0,
        vram_bandwidth_gbs: 1500.0,
        vram_efficiency_pct: 98.7,
        grid_carbon_intensity: intensity,
    }
}

fn market(primary: f64, adr: f64, fx: f64) -> MarketSnapshot {
    MarketSnapshot {
        primary_price: primary,
        adr_price: adr,
        fx_rate: fx,
    }
}

struct Harness {
    gate: Gate,
    hw: Arc<Mutex<Result<HardwareSnapshot, GateError>>>,
    mkt: Arc<Mutex<Result<MarketSnapshot, GateError>>>,
    clock: Arc<FixedClock>,
    ledger_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(hour: u32, actuator: Arc<dyn Actuator>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("decision_logic").join("eaa_logs.csv");
        let ledger = AuditLedger::init(&ledger_path).unwrap().into_shared();

        let hw = Arc::new(Mutex::new(Ok(hardware(1_000, 300.0, 420.0))));
        let mkt = Arc::new(Mutex::new(Ok(market(1500.0, 18.0, 83.0))));
        let clock = Arc::new(FixedClock::at_local(2026, 3, 2, hour, 0, 0).unwrap());

        let gate = Gate::new(
            Box::new(StubHardware(hw.clone())),
            Box::new(StubMarket(mkt.clone())),
            ledger,
            actuator,
        )
        .with_clock(clock.clone())
        .with_surge(Box::new(FixedSurge(3.0)));

        Self {
            gate,
            hw,
            mkt,
            clock,
            ledger_path,
            _dir: dir,
        }
    }

    fn set_hardware(&self, hw: HardwareSnapshot) {
        *self.hw.lock() = Ok(hw);
    }

    fn set_market(&self, mkt: MarketSnapshot) {
        *self.mkt.lock() = Ok(mkt);
    }

    fn rows(&self) -> usize {
        read_tail(&self.ledger_path, usize::MAX).len()
    }
}

fn logging() -> Arc<dyn Actuator> {
    Arc::new(LoggingActuator::new("gpu0"))
}

fn expect_recorded(outcome: CycleOutcome) -> crate::models::DecisionRecord {
    match outcome {
        CycleOutcome::Recorded(r) => r,
        other => panic!("expected a recorded decision, got {:?}", other),
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_over_cap_rig_throttles_with_zero_saved_watts() {
    let mut h = Harness::new(10, logging());
    h.set_hardware(hardware(1_000, 600.0, 300.0));
    h.set_market(market(1500.0, 18.0, 83.0));

    let r = expect_recorded(h.gate.run_cycle().await.unwrap());

    assert_eq!(r.action, Action::Throttle);
    assert!((r.net_spread - 6.0).abs() < 1e-9);
    assert!((r.energy_cost - 183.0).abs() < 1e-9);
    assert_eq!(r.carbon_credit, 0.0);
    assert_eq!(r.saved_watts, 0.0);
    assert_eq!(r.realized_profit, 0.0);
    assert_eq!(h.gate.total_saved_watts(), 0.0);
    assert_eq!(h.rows(), 1);
}

#[tokio::test]
async fn test_clean_grid_off_peak_executes_with_exact_profit() {
    let mut h = Harness::new(10, logging());
    h.set_hardware(hardware(1_000, 200.0, 50.0));
    h.set_market(market(1500.0, 18.2, 82.7));

    let r = expect_recorded(h.gate.run_cycle().await.unwrap());

    assert_eq!(r.action, Action::Execute);
    assert_eq!(r.carbon_tax, 0.0);
    assert!((r.carbon_credit - 15.0).abs() < 1e-9);
    // revenue 5.14 + 15 = 20.14, liability 10 + 3 = 13
    assert!((r.realized_profit - 7.14).abs() < 1e-9);
    assert_eq!(r.saved_watts, 0.0);
    assert_eq!(r.time_str, "10:00:00.000");

    let on_disk = read_tail(&h.ledger_path, 1);
    assert_eq!(on_disk, vec![r]);
}

#[tokio::test]
async fn test_peak_hour_tax_flips_decision_to_throttle() {
    let mut h = Harness::new(19, logging());
    h.set_hardware(hardware(1_000, 200.0, 50.0));
    h.set_market(market(1500.0, 18.2, 82.7));

    let r = expect_recorded(h.gate.run_cycle().await.unwrap());

    // Same inputs as the off-peak case plus 50 * 0.15 = 7.5 tax: 20.14 < 20.5
    assert!((r.carbon_tax - 7.5).abs() < 1e-9);
    assert_eq!(r.action, Action::Throttle);
    assert_eq!(r.saved_watts, 300.0);
    assert_eq!(h.gate.total_saved_watts(), 300.0);
}

#[tokio::test]
async fn test_unusable_market_skips_without_record() {
    let mut h = Harness::new(10, logging());
    *h.mkt.lock() = Err(GateError::InvalidQuote {
        symbol: "INFY_NSE".into(),
        value: Some(0.0),
    });

    let outcome = h.gate.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Skipped(GateError::InvalidQuote { .. })));
    assert_eq!(h.rows(), 0);

    let stats = h.gate.stats_snapshot();
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.skipped_market, 1);
    assert_eq!(stats.decided, 0);
}

#[tokio::test]
async fn test_missing_hardware_skips_without_record() {
    let mut h = Harness::new(10, logging());
    *h.hw.lock() = Err(GateError::unavailable(FeedKind::Hardware, "no file"));

    let outcome = h.gate.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Skipped(_)));
    assert_eq!(h.rows(), 0);
    assert_eq!(h.gate.stats_snapshot().skipped_hardware, 1);

    // Feed recovers on the next tick.
    h.set_hardware(hardware(2_000, 300.0, 420.0));
    expect_recorded(h.gate.run_cycle().await.unwrap());
    assert_eq!(h.rows(), 1);
}

#[tokio::test]
async fn test_failed_actuation_is_not_recorded() {
    let mut h = Harness::new(10, Arc::new(BrokenActuator));
    h.set_hardware(hardware(1_000, 200.0, 420.0));

    let outcome = h.gate.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::ActuationFailed(_)));
    assert_eq!(h.rows(), 0);
    assert_eq!(h.gate.total_saved_watts(), 0.0);
    assert_eq!(h.gate.stats_snapshot().actuation_failures, 1);
}

// =============================================================================
// PROPERTIES OVER A SEQUENCE
// =============================================================================

#[tokio::test]
async fn test_sequence_keeps_order_and_accumulator_invariants() {
    let mut h = Harness::new(16, logging());

    // Power sweeps over and under the cap; the hour walks through the peak window.
    let powers = [
        180.0, 250.0, 320.0, 410.0, 520.0, 450.0, 260.0, 150.0, 90.0, 330.0,
    ];
    let mut expected_saved = 0.0;
    let mut last_total = 0.0;

    for (i, power) in powers.iter().enumerate() {
        h.set_hardware(hardware(10_000 + i as i64 * 500, *power, 120.0 + i as f64 * 40.0));
        h.set_market(market(1500.0, 18.0 + i as f64 * 0.05, 83.0));

        let r = expect_recorded(h.gate.run_cycle().await.unwrap());

        match r.action {
            Action::Execute => {
                assert!(r.realized_profit > 0.0);
                assert_eq!(r.saved_watts, 0.0);
            }
            Action::Throttle => {
                assert_eq!(r.realized_profit, 0.0);
                assert!(r.saved_watts >= 0.0);
                expected_saved += r.saved_watts;
            }
        }

        let total = h.gate.total_saved_watts();
        assert!(total >= last_total);
        last_total = total;

        h.clock.advance(chrono::Duration::minutes(45));
    }

    assert_eq!(h.gate.total_saved_watts(), expected_saved);

    let rows = read_tail(&h.ledger_path, usize::MAX);
    assert_eq!(rows.len(), powers.len());
    assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let stats = h.gate.stats_snapshot();
    assert_eq!(stats.decided, powers.len() as u64);
    assert_eq!(stats.executed + stats.throttled, stats.decided);
}

// =============================================================================
// FILE FEEDS
// =============================================================================

#[tokio::test]
async fn test_from_config_reads_json_drops() {
    let dir = tempfile::tempdir().unwrap();
    let config = GateConfig {
        telemetry_path: dir.path().join("telemetry_output.json"),
        market_feed_path: dir.path().join("market_feed.json"),
        ledger_path: dir.path().join("decision_logic").join("eaa_logs.csv"),
        surge_seed: Some(11),
        ..GateConfig::default()
    };

    let mut gate = Gate::from_config(&config, logging()).unwrap();

    // Nothing published yet.
    assert!(matches!(gate.run_cycle().await.unwrap(), CycleOutcome::Skipped(_)));

    let now = crate::clock::SystemClock.now_millis();
    std::fs::write(
        &config.telemetry_path,
        format!(
            r#"{{"timestamp": {}, "gpu_power_w": 600, "gpu_temp_c": 70,
                "vram_bandwidth_gbs": 1600, "vram_efficiency_pct": 99.0,
                "carbon_intensity_gCO2_kWh": 300.0}}"#,
            now
        ),
    )
    .unwrap();
    std::fs::write(
        &config.market_feed_path,
        r#"{"timestamp": "2026-03-02T10:00:00", "prices": {"INFY_NSE": 1500.0, "INFY_ADR": 18.0, "USD_INR": 83.0}}"#,
    )
    .unwrap();

    let r = expect_recorded(gate.run_cycle().await.unwrap());
    assert_eq!(r.action, Action::Throttle);
    assert_eq!(r.timestamp, now);
    assert!((2.0..=5.0).contains(&(r.energy_cost - 180.0)));

    // Injector reports a zero quote: skipped, ledger unchanged.
    std::fs::write(
        &config.market_feed_path,
        r#"{"prices": {"INFY_NSE": 0.0, "INFY_ADR": 18.0, "USD_INR": 83.0}}"#,
    )
    .unwrap();
    assert!(matches!(gate.run_cycle().await.unwrap(), CycleOutcome::Skipped(_)));

    assert_eq!(read_tail(&config.ledger_path, usize::MAX).len(), 1);
}

#[tokio::test]
async fn test_from_config_rejects_zero_tick_before_touching_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = GateConfig {
        ledger_path: dir.path().join("eaa_logs.csv"),
        tick_ms: 0,
        ..GateConfig::default()
    };

    assert!(Gate::from_config(&config, logging()).is_err());
    assert!(!config.ledger_path.exists());

    let h = Harness::new(10, logging());
    assert_eq!(h.gate.with_tick(Duration::ZERO).tick(), DEFAULT_TICK);
}

// =============================================================================
// CLOCK READS
// =============================================================================

/// Moves forward one millisecond every time it is read.
struct TickingClock(Mutex<DateTime<Local>>);

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Local> {
        let mut current = self.0.lock();
        let at = *current;
        *current += chrono::Duration::milliseconds(1);
        at
    }
}

#[tokio::test]
async fn test_peak_hour_and_time_str_come_from_one_clock_reading() {
    let start = FixedClock::at_local(2026, 3, 2, 17, 59, 59).unwrap().now()
        + chrono::Duration::milliseconds(999);
    let mut h = Harness::new(10, logging());
    h.gate = h.gate.with_clock(Arc::new(TickingClock(Mutex::new(start))));
    h.set_hardware(hardware(1_000, 200.0, 50.0));
    h.set_market(market(1500.0, 18.2, 82.7));

    let r = expect_recorded(h.gate.run_cycle().await.unwrap());

    assert_eq!(r.time_str, "17:59:59.999");
    assert_eq!(r.carbon_tax, 0.0);
    assert_eq!(r.action, Action::Execute);
}

// =============================================================================
// LEDGER FAILURE
// =============================================================================

fn break_ledger(ledger: &crate::ledger::SharedLedger, path: &std::path::Path) {
    // Read-only handle: every subsequent write fails.
    let read_only = std::fs::File::open(path).unwrap();
    ledger.lock().replace_sink(read_only);
}

#[tokio::test]
async fn test_ledger_append_failure_is_fatal() {
    let mut h = Harness::new(10, logging());
    expect_recorded(h.gate.run_cycle().await.unwrap());

    break_ledger(&h.gate.ledger(), &h.ledger_path);

    let err = h.gate.run_cycle().await.unwrap_err();
    assert!(matches!(err, GateError::LedgerWrite(_)));
    assert!(err.is_fatal());

    let stats = h.gate.stats_snapshot();
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.decided, 1);
    assert_eq!(h.rows(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_ticks_through_skips_and_stops_on_ledger_failure() {
    let Harness {
        gate,
        hw,
        ledger_path,
        _dir,
        ..
    } = Harness::new(10, logging());
    let stats = gate.stats();
    let ledger = gate.ledger();

    *hw.lock() = Err(GateError::unavailable(FeedKind::Hardware, "no file"));
    let handle = tokio::spawn(gate.run());

    // Tick at t=0 is skipped.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(stats.snapshot().skipped_hardware, 1);
    assert_eq!(stats.snapshot().decided, 0);

    // Ticks at t=500 and t=1000 are recorded.
    *hw.lock() = Ok(hardware(2_000, 300.0, 420.0));
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(stats.snapshot().cycles, 3);
    assert_eq!(stats.snapshot().decided, 2);
    assert_eq!(read_tail(&ledger_path, usize::MAX).len(), 2);

    // Tick at t=1500 cannot be written and ends the loop.
    break_ledger(&ledger, &ledger_path);
    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(stats.snapshot().cycles, 4);
    assert_eq!(read_tail(&ledger_path, usize::MAX).len(), 2);
}
