//! Ordered cash-flow distribution. Tiers run priority order; each pays
//! what it can from what remains, draws a shortfall reserve if it can't
//! be fully paid, and remainder tiers share whatever is left after all
//! revenue-sourced tiers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::{ReserveStmt, Tier, TierSource, WaterfallStmt};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::interpreter::environment::Environment;
use crate::state::InterpreterState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierResult {
    pub priority: i64,
    pub label: String,
    pub requested: Decimal,
    pub paid: Decimal,
    pub shortfall: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallResult {
    pub name: String,
    pub tiers: Vec<TierResult>,
    pub residual: Decimal,
}

pub fn execute(
    waterfall: &WaterfallStmt,
    env: &Environment,
    state: &mut InterpreterState,
    reserves: &[ReserveStmt],
    available_cash: Decimal,
    events: &mut EventStore,
) -> Result<WaterfallResult, ProvisoError> {
    let mut sorted: Vec<&Tier> = waterfall.tiers.iter().collect();
    sorted.sort_by_key(|t| t.priority);

    let mut remaining = available_cash;
    let mut results = Vec::new();

    for tier in sorted {
        if let Some(cond) = &tier.if_cond {
            if !env.eval_bool(cond)? {
                continue;
            }
        }
        let requested = resolve_tier_amount(tier, env, remaining)?;
        let paid = requested.min(remaining);
        let mut shortfall = requested - paid;
        remaining -= paid;

        if shortfall > Decimal::ZERO {
            if let Some(reserve_name) = &tier.shortfall_to {
                if let Some(reserve) = reserves.iter().find(|r| &r.name == reserve_name) {
                    let drawn = crate::interpreter::reserve::draw(reserve, state, shortfall, events);
                    shortfall -= drawn;
                }
            }
        }

        if paid > Decimal::ZERO {
            if let Some(reserve_name) = &tier.pay_to {
                if let Some(reserve) = reserves.iter().find(|r| &r.name == reserve_name) {
                    crate::interpreter::reserve::fund(reserve, env, state, paid, events)?;
                }
            }
        }

        results.push(TierResult {
            priority: tier.priority,
            label: tier.label.clone(),
            requested,
            paid,
            shortfall,
        });
    }

    let total_shortfall: Decimal = results.iter().map(|t| t.shortfall).sum();
    events.emit(Event::WaterfallExecuted {
        name: waterfall.name.clone(),
        total_available: available_cash,
        shortfall: total_shortfall,
    });

    Ok(WaterfallResult {
        name: waterfall.name.clone(),
        tiers: results,
        residual: remaining,
    })
}

fn resolve_tier_amount(tier: &Tier, env: &Environment, remaining: Decimal) -> Result<Decimal, ProvisoError> {
    let mut amount = env.eval_numeric(&tier.pay)?.require_finite("waterfall tier pay amount")?;
    if let Some(until) = &tier.until {
        let cap = env.eval_numeric(until)?.require_finite("waterfall tier until amount")?;
        amount = amount.min(cap);
    }
    if matches!(tier.from, TierSource::Remainder) {
        amount = amount.min(remaining);
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::financials::{FinancialHistory, FinancialObservation};
    use crate::span::Span;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn tier(priority: i64, label: &str, pay: Decimal, from: TierSource, shortfall_to: Option<&str>) -> Tier {
        Tier {
            priority,
            label: label.to_string(),
            pay: Expr::Currency(pay, Span::default()),
            from,
            until: None,
            shortfall_to: shortfall_to.map(String::from),
            pay_to: None,
            if_cond: None,
        }
    }

    #[test]
    fn later_tiers_draw_shortfall_reserve_when_cash_runs_out() {
        let waterfall = WaterfallStmt {
            name: "Distributions".to_string(),
            frequency: None,
            tiers: vec![
                tier(1, "Senior Debt Service", dec!(600_000), TierSource::Revenue, None),
                tier(2, "Reserve Topup", dec!(500_000), TierSource::Revenue, Some("DSRA")),
            ],
            span: Span::default(),
        };
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
        state.fund_reserve("DSRA", dec!(200_000));
        let state_snapshot = state.clone();
        let env = Environment { defines: &defines, conditions: &conditions, history: &history, observation: &obs, state: &state_snapshot };
        let mut events = EventStore::new();
        let result = execute(&waterfall, &env, &mut state, &[reserve], dec!(700_000), &mut events).unwrap();
        assert_eq!(result.tiers[0].paid, dec!(600_000));
        assert_eq!(result.tiers[1].paid, dec!(100_000));
        assert_eq!(result.tiers[1].shortfall, dec!(200_000));
    }
}
