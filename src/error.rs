//! Gate error taxonomy
//!
//! Input problems (`SourceUnavailable`, `InvalidQuote`) are recovered locally
//! by skipping the cycle. `LedgerWrite` is the only fatal condition.

use std::fmt;
use std::io;

/// Which upstream feed a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Hardware,
    Market,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Market => write!(f, "market"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateError {
    /// Backing record is absent, unreadable, malformed or stale.
    SourceUnavailable { feed: FeedKind, reason: String },
    /// A quote needed for the spread is missing, zero or non-finite.
    InvalidQuote { symbol: String, value: Option<f64> },
    /// The audit ledger could not be written or flushed.
    LedgerWrite(String),
    /// The actuator refused or failed to carry out a trigger.
    Actuation { action: &'static str, reason: String },
}

impl GateError {
    pub fn unavailable(feed: FeedKind, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            feed,
            reason: reason.into(),
        }
    }

    pub fn ledger(context: &str, err: io::Error) -> Self {
        Self::LedgerWrite(format!("{}: {}", context, err))
    }

    /// Only ledger failures stop the gate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LedgerWrite(_))
    }

    /// Missing or unusable input; the cycle is skipped without a decision.
    pub fn is_input_gap(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::InvalidQuote { .. }
        )
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable { feed, reason } => {
                write!(f, "{} feed unavailable: {}", feed, reason)
            }
            Self::InvalidQuote { symbol, value } => match value {
                Some(v) => write!(f, "invalid quote for {}: {}", symbol, v),
                None => write!(f, "missing quote for {}", symbol),
            },
            Self::LedgerWrite(msg) => write!(f, "ledger write failed: {}", msg),
            Self::Actuation { action, reason } => {
                write!(f, "actuator failed on {}: {}", action, reason)
            }
        }
    }
}

impl std::error::Error for GateError {}
