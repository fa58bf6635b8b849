//! Covenant testing: threshold comparison, date-based step-downs, and
//! cure-right reporting and application.
//!
//! `check` is read-only: it reports compliance, headroom, the active
//! step-down (if any), and — when a cure clause exists and the covenant
//! is breached — the shortfall and whether a cure is available. It never
//! touches the cure ledger. Only `apply_cure` mutates it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::{BinOp, CompareOp, CovenantStmt, Expr, StepDown};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::interpreter::environment::Environment;
use crate::state::cure_ledger::{CureAttempt, CureLedger};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovenantResult {
    pub name: String,
    pub metric_value: Decimal,
    pub threshold: Decimal,
    pub operator: CompareOp,
    pub passed: bool,
    /// distance from breach in the direction that matters for `operator`
    pub headroom: Decimal,
    /// the covenant's un-stepped-down threshold, present only when a
    /// step-down is currently active
    pub original_threshold: Option<Decimal>,
    /// the `afterDate` of the step-down currently in effect, if any
    pub active_step: Option<NaiveDate>,
    /// the `afterDate` of the next step-down still to come, if any
    pub next_step: Option<NaiveDate>,
    /// true iff a prior `apply_cure` call succeeded for this exact
    /// evaluation date
    pub cured: bool,
    /// true iff the cure mechanism could still remedy this breach: uses
    /// remain in the rolling window and the shortfall is within the
    /// mechanism's max amount
    pub cure_available: bool,
    /// the additional amount needed to bring the covenant to exact
    /// compliance; present only when breached and a cure clause exists
    pub shortfall: Option<Decimal>,
}

fn headroom(operator: CompareOp, metric_value: Decimal, threshold: Decimal) -> Decimal {
    match operator {
        CompareOp::Le | CompareOp::Lt => threshold - metric_value,
        CompareOp::Ge | CompareOp::Gt => metric_value - threshold,
        CompareOp::Eq | CompareOp::Ne => Decimal::ZERO,
    }
}

/// the threshold in effect as of `as_of`, the step-down that produced it
/// (if any), and the next upcoming step-down's date — applies the latest
/// STEP_DOWN whose date has passed
fn effective_threshold(
    covenant: &CovenantStmt,
    env: &Environment,
    as_of: NaiveDate,
) -> Result<(Decimal, Option<&StepDown>, Option<NaiveDate>), ProvisoError> {
    let mut applicable: Option<&StepDown> = None;
    let mut upcoming: Option<&StepDown> = None;
    for step in &covenant.step_downs {
        if step.after_date <= as_of {
            if applicable.map(|a| step.after_date > a.after_date).unwrap_or(true) {
                applicable = Some(step);
            }
        } else if upcoming.map(|u| step.after_date < u.after_date).unwrap_or(true) {
            upcoming = Some(step);
        }
    }
    let next_step = upcoming.map(|s| s.after_date);
    match applicable {
        Some(step) => {
            let threshold = env.eval_numeric(&step.threshold)?.require_finite("covenant step-down threshold")?;
            Ok((threshold, Some(step), next_step))
        }
        None => {
            let threshold = env.eval_numeric(&covenant.threshold)?.require_finite("covenant threshold")?;
            Ok((threshold, None, next_step))
        }
    }
}

/// the additional amount needed to bring the covenant exactly to
/// compliance, ignoring rounding (spec.md §8 scenario 2:
/// `TotalDebt/5 - EBITDA = 20`). When the metric (after resolving one
/// level of `DEFINE` indirection) is a ratio, the shortfall is computed
/// against whichever side of the ratio a cure improves; otherwise it's
/// the direct gap between the metric and the threshold.
fn required_shortfall(covenant: &CovenantStmt, env: &Environment, threshold: Decimal, metric_value: Decimal) -> Result<Decimal, ProvisoError> {
    let resolved = match &covenant.metric {
        Expr::Ident(name, _) => env.defines.get(name).cloned().unwrap_or_else(|| covenant.metric.clone()),
        other => other.clone(),
    };
    if let Expr::Binary { op: BinOp::Div, lhs, rhs, .. } = &resolved {
        let numerator = env.eval_numeric(lhs)?.require_finite("cure shortfall numerator")?;
        let denominator = env.eval_numeric(rhs)?.require_finite("cure shortfall denominator")?;
        let shortfall = match covenant.operator {
            CompareOp::Le | CompareOp::Lt if !threshold.is_zero() => numerator / threshold - denominator,
            CompareOp::Ge | CompareOp::Gt => threshold * denominator - numerator,
            _ => metric_value - threshold,
        };
        return Ok(shortfall.max(Decimal::ZERO));
    }
    let shortfall = match covenant.operator {
        CompareOp::Le | CompareOp::Lt => metric_value - threshold,
        CompareOp::Ge | CompareOp::Gt => threshold - metric_value,
        CompareOp::Eq | CompareOp::Ne => (metric_value - threshold).abs(),
    };
    Ok(shortfall.max(Decimal::ZERO))
}

pub fn check(covenant: &CovenantStmt, env: &Environment, as_of: NaiveDate, cures: &CureLedger, events: &mut EventStore) -> Result<CovenantResult, ProvisoError> {
    let metric_value = env.eval_numeric(&covenant.metric)?.require_finite("covenant metric")?;
    let (threshold, active_step, next_step) = effective_threshold(covenant, env, as_of)?;
    let original_threshold = match active_step {
        Some(_) => Some(env.eval_numeric(&covenant.threshold)?.require_finite("covenant threshold")?),
        None => None,
    };
    let passed = covenant.operator.apply(metric_value, threshold);
    let headroom_value = headroom(covenant.operator, metric_value, threshold);

    events.emit(Event::CovenantChecked {
        name: covenant.name.clone(),
        metric_value,
        threshold,
        passed,
    });

    let mut cured = false;
    let mut cure_available = false;
    let mut shortfall = None;

    if !passed {
        events.emit(Event::CovenantBreached {
            name: covenant.name.clone(),
            metric_value,
            threshold,
        });

        if let Some(cure) = &covenant.cure {
            let sf = required_shortfall(covenant, env, threshold, metric_value)?;
            let max_amount = env.eval_numeric(&cure.max_amount)?.require_finite("cure max amount")?;
            let uses_remain = cures.can_cure(&covenant.name, as_of, cure.max_uses, cure.window_count, cure.window_unit);
            cure_available = uses_remain && sf <= max_amount;
            cured = cures.successful_attempt_on(&covenant.name, as_of);
            shortfall = Some(sf);
        }
    }

    Ok(CovenantResult {
        name: covenant.name.clone(),
        metric_value,
        threshold,
        operator: covenant.operator,
        passed,
        headroom: headroom_value,
        original_threshold,
        active_step: active_step.map(|s| s.after_date),
        next_step,
        cured,
        cure_available,
        shortfall,
    })
}

/// the outcome of a single `applyCure(name, amount)` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CureApplication {
    pub success: bool,
    pub reason: Option<String>,
    pub shortfall: Decimal,
}

/// Records a cure attempt against a breached covenant. Succeeds, and
/// appends a successful entry to `cures`, iff the covenant is currently
/// breached, uses remain in the rolling window, and `amount >= shortfall`
/// (spec.md §4.3.2). A failing attempt is still recorded, so the ledger
/// reflects every call, not only successful ones.
pub fn apply_cure(
    covenant: &CovenantStmt,
    env: &Environment,
    as_of: NaiveDate,
    amount: Decimal,
    cures: &mut CureLedger,
    events: &mut EventStore,
) -> Result<CureApplication, ProvisoError> {
    let Some(cure) = &covenant.cure else {
        return Err(ProvisoError::InvariantViolation {
            message: format!("covenant '{}' has no CURE clause", covenant.name),
        });
    };
    let metric_value = env.eval_numeric(&covenant.metric)?.require_finite("covenant metric")?;
    let (threshold, ..) = effective_threshold(covenant, env, as_of)?;
    if covenant.operator.apply(metric_value, threshold) {
        return Ok(CureApplication {
            success: false,
            reason: Some("covenant is currently compliant".to_string()),
            shortfall: Decimal::ZERO,
        });
    }

    let shortfall = required_shortfall(covenant, env, threshold, metric_value)?;
    let uses_remain = cures.can_cure(&covenant.name, as_of, cure.max_uses, cure.window_count, cure.window_unit);
    let reason = if !uses_remain {
        Some("cure uses exhausted for the rolling window".to_string())
    } else if amount < shortfall {
        Some(format!("cure amount {amount} is less than the required shortfall {shortfall}"))
    } else {
        None
    };
    let successful = reason.is_none();

    cures.record_attempt(
        &covenant.name,
        CureAttempt {
            date: as_of,
            mechanism: cure.mechanism.clone(),
            amount,
            successful,
        },
    );

    if successful {
        events.emit(Event::CureApplied {
            covenant: covenant.name.clone(),
            mechanism: cure.mechanism.clone(),
            amount,
        });
    } else {
        events.emit(Event::CureUnavailable {
            covenant: covenant.name.clone(),
            reason: reason.clone().unwrap_or_default(),
        });
    }

    Ok(CureApplication { success: successful, reason, shortfall })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, CureClause, TestFrequency, TrailingUnit};
    use crate::financials::{FinancialHistory, FinancialObservation};
    use crate::span::Span;
    use crate::state::InterpreterState;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn covenant(threshold: Decimal, with_cure: bool) -> CovenantStmt {
        CovenantStmt {
            name: "MaxLeverage".to_string(),
            metric: crate::ast::Expr::Ident("Leverage".to_string(), Span::default()),
            operator: CompareOp::Le,
            threshold: crate::ast::Expr::Number(threshold, Span::default()),
            tested: TestFrequency::Quarterly,
            cure: with_cure.then(|| CureClause {
                mechanism: "EquityCureRight".to_string(),
                max_uses: 2,
                window_count: 4,
                window_unit: TrailingUnit::Quarters,
                max_amount: crate::ast::Expr::Currency(dec!(10_000_000), Span::default()),
            }),
            breach_event: None,
            step_downs: vec![],
            span: Span::default(),
        }
    }

    fn ratio_covenant(threshold: Decimal, with_cure: bool) -> CovenantStmt {
        let mut c = covenant(threshold, with_cure);
        c.metric = crate::ast::Expr::Binary {
            op: BinOp::Div,
            lhs: Box::new(crate::ast::Expr::Ident("TotalDebt".to_string(), Span::default())),
            rhs: Box::new(crate::ast::Expr::Ident("EBITDA".to_string(), Span::default())),
            span: Span::default(),
        };
        c
    }

    fn test_env<'a>(defines: &'a HashMap<String, crate::ast::Expr>, conditions: &'a HashMap<String, crate::ast::Expr>, history: &'a FinancialHistory, obs: &'a FinancialObservation, state: &'a InterpreterState) -> Environment<'a> {
        Environment { defines, conditions, history, observation: obs, state }
    }

    #[test]
    fn breach_without_cure_stays_breached() {
        let covenant = covenant(dec!(4.0), false);
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("Leverage".to_string(), dec!(4.5));
        let env = test_env(&defines, &conditions, &history, &obs, &state);
        let cures = CureLedger::new();
        let mut events = EventStore::new();
        let result = check(&covenant, &env, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(), &cures, &mut events).unwrap();
        assert!(!result.passed);
        assert!(!result.cured);
        assert_eq!(result.shortfall, None);
    }

    #[test]
    fn check_reports_headroom_without_mutating_the_ledger() {
        let covenant = covenant(dec!(5.0), false);
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("Leverage".to_string(), dec!(4.0));
        let env = test_env(&defines, &conditions, &history, &obs, &state);
        let cures = CureLedger::new();
        let mut events = EventStore::new();
        let result = check(&covenant, &env, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(), &cures, &mut events).unwrap();
        assert!(result.passed);
        assert_eq!(result.headroom, dec!(1.0));
        assert!(cures.attempts("MaxLeverage").is_empty());
    }

    #[test]
    fn breach_reports_cure_available_but_does_not_apply_it() {
        let covenant = covenant(dec!(4.0), true);
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("Leverage".to_string(), dec!(4.5));
        let env = test_env(&defines, &conditions, &history, &obs, &state);
        let cures = CureLedger::new();
        let mut events = EventStore::new();
        let result = check(&covenant, &env, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(), &cures, &mut events).unwrap();
        assert!(!result.passed);
        assert!(!result.cured);
        assert!(result.cure_available);
        assert!(cures.attempts("MaxLeverage").is_empty());
    }

    #[test]
    fn apply_cure_succeeds_with_sufficient_shortfall_then_fails_on_repeat_with_zero() {
        let covenant = ratio_covenant(dec!(5.0), true);
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("TotalDebt".to_string(), dec!(300));
        obs.insert("EBITDA".to_string(), dec!(40));
        let env = test_env(&defines, &conditions, &history, &obs, &state);
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();

        let checked = check(&covenant, &env, as_of, &CureLedger::new(), &mut EventStore::new()).unwrap();
        assert!(!checked.passed);
        assert_eq!(checked.shortfall, Some(dec!(20)));

        let mut cures = CureLedger::new();
        let mut events = EventStore::new();
        let application = apply_cure(&covenant, &env, as_of, dec!(20), &mut cures, &mut events).unwrap();
        assert!(application.success);
        assert_eq!(application.shortfall, dec!(20));

        let rechecked = check(&covenant, &env, as_of, &cures, &mut events).unwrap();
        assert!(rechecked.cured);

        let second = apply_cure(&covenant, &env, as_of, dec!(0), &mut cures, &mut events).unwrap();
        assert!(!second.success);
        assert_eq!(cures.attempts("MaxLeverage").len(), 2);
    }
}
