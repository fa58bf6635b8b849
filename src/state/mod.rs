//! Mutable runtime state threaded through interpretation, separate from
//! the static [`crate::ast::Program`] it evaluates against. Mirrors the
//! state/snapshot split the rest of this crate's facility model used:
//! the program is immutable, the ledgers mutate as periods advance.

pub mod amendments_log;
pub mod basket_ledger;
pub mod cp_state;
pub mod cure_ledger;
pub mod milestone_state;
pub mod phase_state;

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use amendments_log::AmendmentsLog;
use basket_ledger::BasketLedger;
use cp_state::CpState;
use cure_ledger::CureLedger;
use milestone_state::MilestoneState;
use phase_state::PhaseState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterpreterState {
    pub baskets: BasketLedger,
    pub cures: CureLedger,
    pub phases: PhaseState,
    pub milestones: MilestoneState,
    pub conditions_precedent: CpState,
    pub amendments: AmendmentsLog,
    pub reserve_balances: HashMap<String, Decimal>,
    pub triggered_events: std::collections::HashSet<String>,
}

impl InterpreterState {
    pub fn new() -> Self {
        InterpreterState::default()
    }

    pub fn reserve_balance(&self, name: &str) -> Decimal {
        self.reserve_balances.get(name).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn fund_reserve(&mut self, name: &str, amount: Decimal) {
        *self.reserve_balances.entry(name.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    pub fn draw_reserve(&mut self, name: &str, amount: Decimal) -> Decimal {
        let entry = self.reserve_balances.entry(name.to_string()).or_insert(Decimal::ZERO);
        let drawn = amount.min(*entry);
        *entry -= drawn;
        drawn
    }

    pub fn trigger_event(&mut self, name: &str) {
        self.triggered_events.insert(name.to_string());
    }

    pub fn is_event_triggered(&self, name: &str) -> bool {
        self.triggered_events.contains(name)
    }

    pub fn capture(&self, as_of: NaiveDate) -> StateSnapshot {
        StateSnapshot {
            as_of,
            state: self.clone(),
        }
    }
}

/// an immutable point-in-time copy of [`InterpreterState`], appended to
/// the interpreter's history on every period advance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub as_of: NaiveDate,
    pub state: InterpreterState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reserve_draw_is_capped_at_balance() {
        let mut state = InterpreterState::new();
        state.fund_reserve("DSRA", dec!(1_000_000));
        let drawn = state.draw_reserve("DSRA", dec!(1_500_000));
        assert_eq!(drawn, dec!(1_000_000));
        assert_eq!(state.reserve_balance("DSRA"), dec!(0));
    }

    #[test]
    fn snapshot_captures_independent_copy() {
        let mut state = InterpreterState::new();
        state.fund_reserve("DSRA", dec!(500_000));
        let snapshot = state.capture(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());
        state.fund_reserve("DSRA", dec!(100_000));
        assert_eq!(snapshot.state.reserve_balance("DSRA"), dec!(500_000));
        assert_eq!(state.reserve_balance("DSRA"), dec!(600_000));
    }
}
