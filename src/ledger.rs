//! Audit Ledger
//! Mission: one immutable, durable row per decision, in decision order
//!
//! # Invariants
//!
//! 1. **Append-only**: rows are never rewritten, reordered or coalesced.
//! 2. **Durable**: `append` returns only after the row is flushed and synced.
//! 3. **Single writer**: one [`AuditLedger`] owns the file; several gates
//!    sharing a file go through a [`SharedLedger`] lock.
//!
//! Readers (dashboard, `greenarb summary`) must tolerate the file being
//! missing, empty, or ending in a half-written row.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::GateError;
use crate::models::{Action, DecisionRecord};

/// Fixed column order of the ledger.
pub const LEDGER_COLUMNS: [&str; 18] = [
    "timestamp",
    "time_str",
    "gpu_power_w",
    "gpu_temp_c",
    "vram_bandwidth_gbs",
    "vram_efficiency_pct",
    "carbon_intensity",
    "net_spread_profit",
    "total_cost",
    "action",
    "saved_watts",
    "green_alpha_score",
    "infy_nse",
    "infy_adr",
    "usd_inr",
    "carbon_credit_value",
    "carbon_tax",
    "final_profit",
];

/// kg CO2 avoided per kW of throttled draw, as shown on the dashboard.
pub const CO2_KG_PER_KW_SAVED: f64 = 0.42;

pub type SharedLedger = Arc<Mutex<AuditLedger>>;

pub fn header_line() -> String {
    LEDGER_COLUMNS.join(",")
}

pub fn format_row(r: &DecisionRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        r.timestamp,
        r.time_str,
        r.power_watts,
        r.temperature_c,
        r.vram_bandwidth_gbs,
        r.vram_efficiency_pct,
        r.carbon_intensity,
        r.net_spread,
        r.energy_cost,
        r.action.tag(),
        r.saved_watts,
        r.green_alpha_score,
        r.primary_price,
        r.adr_price,
        r.fx_rate,
        r.carbon_credit,
        r.carbon_tax,
        r.realized_profit,
    )
}

/// Parse one data row. Returns `None` for anything that is not a complete row.
pub fn parse_row(line: &str) -> Option<DecisionRecord> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() != LEDGER_COLUMNS.len() {
        return None;
    }
    let num = |i: usize| fields[i].trim().parse::<f64>().ok();

    Some(DecisionRecord {
        timestamp: fields[0].trim().parse::<i64>().ok()?,
        time_str: fields[1].to_string(),
        power_watts: num(2)?,
        temperature_c: num(3)?,
        vram_bandwidth_gbs: num(4)?,
        vram_efficiency_pct: num(5)?,
        carbon_intensity: num(6)?,
        net_spread: num(7)?,
        energy_cost: num(8)?,
        action: fields[9].parse::<Action>().ok()?,
        saved_watts: num(10)?,
        green_alpha_score: num(11)?,
        primary_price: num(12)?,
        adr_price: num(13)?,
        fx_rate: num(14)?,
        carbon_credit: num(15)?,
        carbon_tax: num(16)?,
        realized_profit: num(17)?,
    })
}

/// Append-only CSV ledger writer.
pub struct AuditLedger {
    path: PathBuf,
    writer: BufWriter<File>,
    rows_written: u64,
    last_timestamp: Option<i64>,
}

impl AuditLedger {
    /// Create (or truncate) the ledger and write the header. Call once at startup.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| GateError::ledger("create ledger directory", e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| GateError::ledger("open ledger", e))?;

        let mut ledger = Self {
            path,
            writer: BufWriter::new(file),
            rows_written: 0,
            last_timestamp: None,
        };
        ledger.write_line(&header_line())?;

        info!(path = %ledger.path.display(), columns = LEDGER_COLUMNS.len(), "📒 Audit ledger initialized");
        Ok(ledger)
    }

    /// Append one record and sync it to storage before returning.
    pub fn append(&mut self, record: &DecisionRecord) -> Result<(), GateError> {
        if let Some(last) = self.last_timestamp {
            if record.timestamp < last {
                // Still written: the ledger records what was decided, in order.
                warn!(
                    previous = last,
                    current = record.timestamp,
                    "Ledger timestamp went backwards; upstream clock is not monotonic"
                );
            }
        }

        self.write_line(&format_row(record))?;
        self.rows_written += 1;
        self.last_timestamp = Some(record.timestamp);
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), GateError> {
        writeln!(self.writer, "{}", line).map_err(|e| GateError::ledger("write row", e))?;
        self.writer
            .flush()
            .map_err(|e| GateError::ledger("flush", e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| GateError::ledger("fsync", e))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows appended by this writer (header excluded).
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// Swap the underlying file handle so tests can make appends fail.
    #[cfg(test)]
    pub(crate) fn replace_sink(&mut self, file: File) {
        self.writer = BufWriter::new(file);
    }
}

/// Last `n` complete rows of the ledger, oldest first.
///
/// Missing or unreadable files yield an empty list; malformed rows are skipped.
pub fn read_tail(path: impl AsRef<Path>, n: usize) -> Vec<DecisionRecord> {
    let Ok(contents) = std::fs::read_to_string(path.as_ref()) else {
        return Vec::new();
    };

    let mut rows: Vec<DecisionRecord> = contents
        .lines()
        .filter(|line| !line.starts_with(LEDGER_COLUMNS[0]))
        .filter_map(parse_row)
        .collect();

    if rows.len() > n {
        rows.drain(..rows.len() - n);
    }
    rows
}

/// Session roll-up over a slice of ledger rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSummary {
    pub rows: usize,
    pub executed: usize,
    pub throttled: usize,
    pub total_saved_watts: f64,
    pub co2_avoided_kg: f64,
    pub total_realized_profit: f64,
    pub total_carbon_tax: f64,
    pub total_carbon_credit: f64,
    pub mean_green_alpha: f64,
    pub latest: Option<DecisionRecord>,
}

impl LedgerSummary {
    pub fn from_records(records: &[DecisionRecord]) -> Self {
        let mut summary = Self {
            rows: records.len(),
            latest: records.last().cloned(),
            ..Default::default()
        };

        for r in records {
            match r.action {
                Action::Execute => summary.executed += 1,
                Action::Throttle => summary.throttled += 1,
            }
            summary.total_saved_watts += r.saved_watts;
            summary.total_realized_profit += r.realized_profit;
            summary.total_carbon_tax += r.carbon_tax;
            summary.total_carbon_credit += r.carbon_credit;
            summary.mean_green_alpha += r.green_alpha_score;
        }

        if !records.is_empty() {
            summary.mean_green_alpha /= records.len() as f64;
        }
        summary.co2_avoided_kg = summary.total_saved_watts / 1000.0 * CO2_KG_PER_KW_SAVED;
        summary
    }
}
