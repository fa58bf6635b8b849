//! Reserve account funding and draws against a TARGET/MINIMUM.

use rust_decimal::Decimal;

use crate::ast::ReserveStmt;
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::interpreter::environment::Environment;
use crate::state::InterpreterState;

pub fn target(reserve: &ReserveStmt, env: &Environment) -> Result<Decimal, ProvisoError> {
    env.eval_numeric(&reserve.target)?.require_finite("reserve target")
}

pub fn minimum(reserve: &ReserveStmt, env: &Environment) -> Result<Decimal, ProvisoError> {
    match &reserve.minimum {
        Some(m) => env.eval_numeric(m)?.require_finite("reserve minimum"),
        None => Ok(Decimal::ZERO),
    }
}

/// funds the reserve up to its TARGET, returning the amount actually
/// deposited (less than `amount` if TARGET is already met or nearly so)
pub fn fund(
    reserve: &ReserveStmt,
    env: &Environment,
    state: &mut InterpreterState,
    amount: Decimal,
    events: &mut EventStore,
) -> Result<Decimal, ProvisoError> {
    let target = target(reserve, env)?;
    let current = state.reserve_balance(&reserve.name);
    let room = (target - current).max(Decimal::ZERO);
    let deposited = amount.min(room);
    state.fund_reserve(&reserve.name, deposited);
    events.emit(Event::ReserveFunded {
        name: reserve.name.clone(),
        amount: deposited,
        balance: state.reserve_balance(&reserve.name),
    });
    Ok(deposited)
}

/// draws up to `amount` from the reserve, returning the amount actually
/// drawn and any shortfall against the request
pub fn draw(
    reserve: &ReserveStmt,
    state: &mut InterpreterState,
    amount: Decimal,
    events: &mut EventStore,
) -> Decimal {
    let drawn = state.draw_reserve(&reserve.name, amount);
    let shortfall = amount - drawn;
    events.emit(Event::ReserveDrawn {
        name: reserve.name.clone(),
        amount: drawn,
        shortfall,
    });
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::financials::{FinancialHistory, FinancialObservation};
    use crate::span::Span;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn funding_stops_at_target() {
        let reserve = ReserveStmt {
            name: "DSRA".to_string(),
            target: Expr::Currency(dec!(1_000_000), Span::default()),
            minimum: None,
            funded_by: vec![],
            released_to: None,
            released_for: None,
            span: Span::default(),
        };
        let defines: HashMap<String, Expr> = HashMap::new();
        let conditions: HashMap<String, Expr> = HashMap::new();
        let history = FinancialHistory::new();
        let obs = FinancialObservation::new();
        let mut state = InterpreterState::new();
        let state_snapshot = state.clone();
        let env = Environment { defines: &defines, conditions: &conditions, history: &history, observation: &obs, state: &state_snapshot };
        let mut events = EventStore::new();
        let deposited = fund(&reserve, &env, &mut state, dec!(1_500_000), &mut events).unwrap();
        assert_eq!(deposited, dec!(1_000_000));
        assert_eq!(state.reserve_balance("DSRA"), dec!(1_000_000));
    }

    #[test]
    fn draw_reports_shortfall_when_underfunded() {
        let reserve = ReserveStmt {
            name: "DSRA".to_string(),
            target: Expr::Currency(dec!(1_000_000), Span::default()),
            minimum: None,
            funded_by: vec![],
            released_to: None,
            released_for: None,
            span: Span::default(),
        };
        let mut state = InterpreterState::new();
        state.fund_reserve("DSRA", dec!(300_000));
        let mut events = EventStore::new();
        let drawn = draw(&reserve, &mut state, dec!(500_000), &mut events);
        assert_eq!(drawn, dec!(300_000));
    }
}
