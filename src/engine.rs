//! Decision Engine
//! Mission: turn a valuation into exactly one admission outcome per cycle
//!
//! THROTTLE when revenue <= liability (ties go to cost safety), EXECUTE
//! otherwise. No hysteresis: every cycle is decided on its own valuation.
//! The only carried state is the saved-watts accumulator.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::actuator::Actuator;
use crate::error::GateError;
use crate::models::{Action, Decision, Valuation};

/// Pure decision rule.
pub fn decide(valuation: &Valuation) -> Decision {
    let margin = valuation.margin();
    if margin > 0.0 {
        Decision {
            action: Action::Execute,
            saved_watts: 0.0,
            realized_profit: margin,
        }
    } else {
        Decision {
            action: Action::Throttle,
            saved_watts: valuation.saved_watts_potential,
            realized_profit: 0.0,
        }
    }
}

/// Process-lifetime counters. Never decreases; reset only by restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeState {
    pub total_saved_watts: f64,
}

impl CumulativeState {
    /// Only THROTTLE decisions contribute.
    pub fn record(&mut self, decision: &Decision) {
        if decision.action == Action::Throttle && decision.saved_watts > 0.0 {
            self.total_saved_watts += decision.saved_watts;
        }
    }
}

pub struct DecisionEngine {
    actuator: Arc<dyn Actuator>,
    state: CumulativeState,
}

impl DecisionEngine {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator,
            state: CumulativeState::default(),
        }
    }

    pub fn total_saved_watts(&self) -> f64 {
        self.state.total_saved_watts
    }

    /// Decide, fire the matching trigger, then accumulate.
    ///
    /// If the trigger fails the error is returned and the accumulator is left
    /// untouched, so a failed actuation never counts as saved energy.
    pub async fn apply(&mut self, valuation: &Valuation) -> Result<Decision, GateError> {
        let decision = decide(valuation);
        self.actuator.dispatch(decision.action).await?;
        self.state.record(&decision);

        match decision.action {
            Action::Throttle => info!(
                revenue = %format!("{:.2}", valuation.total_revenue()),
                liability = %format!("{:.2}", valuation.total_liability()),
                carbon_tax = %format!("{:.2}", valuation.carbon_tax),
                saved_watts = %format!("{:.1}", decision.saved_watts),
                total_saved_watts = %format!("{:.1}", self.state.total_saved_watts),
                "🛑 REJECT_TRADE: revenue does not cover liability"
            ),
            Action::Execute => info!(
                revenue = %format!("{:.2}", valuation.total_revenue()),
                liability = %format!("{:.2}", valuation.total_liability()),
                profit = %format!("{:.2}", decision.realized_profit),
                "✅ ACCEPT_TRADE: burst execution"
            ),
        }

        Ok(decision)
    }
}
