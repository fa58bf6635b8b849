//! Milestone and technical milestone evaluation: achievement against
//! REQUIRES conditions, longstop misses, and progress tracking.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::ast::{MilestoneRequires, MilestoneStmt, TechnicalMilestoneStmt};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::interpreter::environment::Environment;
use crate::state::milestone_state::MilestoneState;

fn requires_met(requires: &Option<MilestoneRequires>, env: &Environment) -> Result<bool, ProvisoError> {
    let Some(requires) = requires else {
        return Ok(true);
    };
    match requires {
        MilestoneRequires::Ref(name) => single_ref_holds(name, env),
        MilestoneRequires::AllOf(names) => {
            for n in names {
                if !single_ref_holds(n, env)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        MilestoneRequires::AnyOf(names) => {
            for n in names {
                if single_ref_holds(n, env)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn single_ref_holds(name: &str, env: &Environment) -> Result<bool, ProvisoError> {
    if let Some(cond) = env.conditions.get(name) {
        env.eval_bool(cond)
    } else {
        Ok(env.state.is_event_triggered(name))
    }
}

/// evaluates a milestone as of `as_of`: achieves it if not yet achieved
/// and its REQUIRES condition holds; marks it missed once `as_of` passes
/// LONGSTOP without achievement
pub fn check(
    milestone: &MilestoneStmt,
    state: &mut MilestoneState,
    env: &Environment,
    as_of: NaiveDate,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    if state.is_achieved(&milestone.name) || state.is_missed(&milestone.name) {
        return Ok(());
    }
    if requires_met(&milestone.requires, env)? {
        state.mark_achieved(&milestone.name, as_of);
        events.emit(Event::MilestoneAchieved {
            name: milestone.name.clone(),
            date: as_of,
        });
        for trigger in &milestone.triggers {
            events.emit(Event::ExternalEventTriggered { name: trigger.clone() });
        }
    } else if as_of > milestone.longstop {
        state.mark_missed(&milestone.name);
        events.emit(Event::MilestoneMissed {
            name: milestone.name.clone(),
            longstop: milestone.longstop,
        });
    }
    Ok(())
}

pub fn update_progress(
    tm: &TechnicalMilestoneStmt,
    state: &mut MilestoneState,
    value: Decimal,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    state.update_progress(&tm.name, value);
    events.emit(Event::TechnicalMilestoneProgress {
        name: tm.name.clone(),
        current_value: value,
        target_value: Decimal::ZERO,
    });
    Ok(())
}

/// a technical milestone is achieved once its tracked progress value
/// meets TARGET_VALUE
pub fn check_technical(
    tm: &TechnicalMilestoneStmt,
    state: &mut MilestoneState,
    env: &Environment,
    as_of: NaiveDate,
    events: &mut EventStore,
) -> Result<(), ProvisoError> {
    if state.is_achieved(&tm.name) || state.is_missed(&tm.name) {
        return Ok(());
    }
    let target = env.eval_numeric(&tm.target_value)?.require_finite("technical milestone target")?;
    let current = state.progress(&tm.name).unwrap_or(Decimal::ZERO);
    if current >= target && requires_met(&tm.requires, env)? {
        state.mark_achieved(&tm.name, as_of);
        events.emit(Event::MilestoneAchieved {
            name: tm.name.clone(),
            date: as_of,
        });
        for trigger in &tm.triggers {
            events.emit(Event::ExternalEventTriggered { name: trigger.clone() });
        }
    } else if as_of > tm.longstop {
        state.mark_missed(&tm.name);
        events.emit(Event::MilestoneMissed {
            name: tm.name.clone(),
            longstop: tm.longstop,
        });
    }
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

    #[test]
    fn missed_milestone_after_longstop() {
        let milestone = MilestoneStmt {
            name: "NTP".to_string(),
            target: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            longstop: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            requires: Some(MilestoneRequires::Ref("PermitsIssued".to_string())),
            triggers: vec![],
            span: Span::default(),
        };
        let defines: HashMap<String, Expr> = HashMap::new();
        let conditions: HashMap<String, Expr> = HashMap::new();
        let history = FinancialHistory::new();
        let obs = FinancialObservation::new();
        let interp_state = InterpreterState::new();
        let env = Environment { defines: &defines, conditions: &conditions, history: &history, observation: &obs, state: &interp_state };
        let mut ms_state = MilestoneState::new();
        let mut events = EventStore::new();
        check(&milestone, &mut ms_state, &env, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), &mut events).unwrap();
        assert!(ms_state.is_missed("NTP"));
    }

    #[test]
    fn technical_milestone_achieves_once_progress_meets_target() {
        let tm = TechnicalMilestoneStmt {
            name: "MechanicalCompletion".to_string(),
            target: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            longstop: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            requires: None,
            triggers: vec![],
            target_value: Expr::Number(dec!(1.0), Span::default()),
            progress_metric: None,
            span: Span::default(),
        };
        let defines: HashMap<String, Expr> = HashMap::new();
        let conditions: HashMap<String, Expr> = HashMap::new();
        let history = FinancialHistory::new();
        let obs = FinancialObservation::new();
        let interp_state = InterpreterState::new();
        let env = Environment { defines: &defines, conditions: &conditions, history: &history, observation: &obs, state: &interp_state };
        let mut ms_state = MilestoneState::new();
        let mut events = EventStore::new();
        ms_state.update_progress("MechanicalCompletion", dec!(0.9));
        check_technical(&tm, &mut ms_state, &env, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), &mut events).unwrap();
        assert!(!ms_state.is_achieved("MechanicalCompletion"));
        ms_state.update_progress("MechanicalCompletion", dec!(1.0));
        check_technical(&tm, &mut ms_state, &env, NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(), &mut events).unwrap();
        assert!(ms_state.is_achieved("MechanicalCompletion"));
    }
}
