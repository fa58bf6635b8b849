//! Basket capacity computation and draw/replenish operations, across all
//! three classifications (spec.md §4.3.3).

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::ast::{BasketClass, BasketStmt};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::interpreter::environment::Environment;
use crate::state::basket_ledger::BasketLedger;

/// the basket's current capacity: for Fixed/Grower this is the CAPACITY
/// expression (optionally floored); for Builder it is STARTING plus
/// whatever has accumulated, capped at MAXIMUM
pub fn capacity(basket: &BasketStmt, env: &Environment, ledger: &BasketLedger) -> Result<Decimal, ProvisoError> {
    match basket.classification() {
        BasketClass::Fixed => {
            let cap_expr = basket.capacity.as_ref().ok_or_else(|| ProvisoError::InvariantViolation {
                message: format!("basket '{}' has no CAPACITY", basket.name),
            })?;
            env.eval_numeric(cap_expr)?.require_finite("basket capacity")
        }
        BasketClass::Grower => {
            let cap_expr = basket.capacity.as_ref().ok_or_else(|| ProvisoError::InvariantViolation {
                message: format!("basket '{}' has no CAPACITY", basket.name),
            })?;
            let computed = env.eval_numeric(cap_expr)?.require_finite("basket capacity")?;
            let floor = match &basket.floor {
                Some(f) => env.eval_numeric(f)?.require_finite("basket floor")?,
                None => Decimal::ZERO,
            };
            Ok(computed.max(floor))
        }
        BasketClass::Builder => {
            let starting = match &basket.starting {
                Some(s) => env.eval_numeric(s)?.require_finite("basket starting amount")?,
                None => Decimal::ZERO,
            };
            let built = starting + ledger.accumulated(&basket.name);
            match &basket.maximum {
                Some(m) => {
                    let max = env.eval_numeric(m)?.require_finite("basket maximum")?;
                    Ok(built.min(max))
                }
                None => Ok(built),
            }
        }
    }
}

pub fn available(basket: &BasketStmt, env: &Environment, ledger: &BasketLedger) -> Result<Decimal, ProvisoError> {
    let cap = capacity(basket, env, ledger)?;
    Ok(ledger.available(&basket.name, cap))
}

pub fn draw(
    basket: &BasketStmt,
    env: &Environment,
    ledger: &mut BasketLedger,
    amount: Decimal,
    as_of: NaiveDate,
    description: Option<String>,
    events: &mut EventStore,
) -> Result<Decimal, ProvisoError> {
    let cap = capacity(basket, env, ledger)?;
    let avail = ledger.available(&basket.name, cap);
    if amount > avail {
        return Err(ProvisoError::InsufficientBasketAvailability {
            available: crate::decimal::Money::from_decimal(avail),
            requested: crate::decimal::Money::from_decimal(amount),
        });
    }
    ledger.draw(&basket.name, amount, as_of, description);
    let remaining = ledger.available(&basket.name, cap);
    events.emit(Event::BasketDrawn {
        name: basket.name.clone(),
        amount,
        remaining,
    });
    Ok(remaining)
}

/// adds retained-earnings accumulation to a builder basket, recalculating
/// its capacity
pub fn accumulate(
    basket: &BasketStmt,
    env: &Environment,
    ledger: &mut BasketLedger,
    amount: Decimal,
    as_of: NaiveDate,
    description: Option<String>,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    ledger.accumulate(&basket.name, amount, as_of, description);
    let cap = capacity(basket, env, ledger)?;
    events.emit(Event::BasketCapacityRecalculated {
        name: basket.name.clone(),
        capacity: cap,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::financials::{FinancialHistory, FinancialObservation};
    use crate::span::Span;
    use crate::state::InterpreterState;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn env<'a>(
        defines: &'a HashMap<String, Expr>,
        conditions: &'a HashMap<String, Expr>,
        history: &'a FinancialHistory,
        observation: &'a FinancialObservation,
        state: &'a InterpreterState,
    ) -> Environment<'a> {
        Environment { defines, conditions, history, observation, state }
    }

    #[test]
    fn fixed_basket_draw_respects_capacity() {
        let basket = BasketStmt {
            name: "RPBasket".to_string(),
            capacity: Some(Expr::Currency(dec!(5_000_000), Span::default())),
            floor: None,
            builds_from: None,
            starting: None,
            maximum: None,
            subject_to: vec![],
            span: Span::default(),
        };
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let obs = FinancialObservation::new();
        let e = env(&defines, &conditions, &history, &obs, &state);
        let mut ledger = BasketLedger::new();
        let mut events = EventStore::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        draw(&basket, &e, &mut ledger, dec!(2_000_000), date, None, &mut events).unwrap();
        assert_eq!(available(&basket, &e, &ledger).unwrap(), dec!(3_000_000));
        let err = draw(&basket, &e, &mut ledger, dec!(4_000_000), date, None, &mut events).unwrap_err();
        assert!(matches!(err, ProvisoError::InsufficientBasketAvailability { .. }));
    }

    #[test]
    fn builder_basket_capacity_grows_with_accumulation_and_caps_at_maximum() {
        let basket = BasketStmt {
            name: "GrowthBasket".to_string(),
            capacity: None,
            floor: None,
            builds_from: Some(Expr::Ident("RetainedEarnings".to_string(), Span::default())),
            starting: Some(Expr::Currency(dec!(1_000_000), Span::default())),
            maximum: Some(Expr::Currency(dec!(3_000_000), Span::default())),
            subject_to: vec![],
            span: Span::default(),
        };
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let obs = FinancialObservation::new();
        let e = env(&defines, &conditions, &history, &obs, &state);
        let mut ledger = BasketLedger::new();
        let mut events = EventStore::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        accumulate(&basket, &e, &mut ledger, dec!(1_500_000), date, None, &mut events).unwrap();
        assert_eq!(capacity(&basket, &e, &ledger).unwrap(), dec!(2_500_000));
        accumulate(&basket, &e, &mut ledger, dec!(5_000_000), date, None, &mut events).unwrap();
        assert_eq!(capacity(&basket, &e, &ledger).unwrap(), dec!(3_000_000));
    }
}
