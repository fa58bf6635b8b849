//! Ties the static [`Program`] together with mutable runtime state and
//! exposes the public evaluation surface: covenant testing, basket draws,
//! phase transitions, milestones, amendments, waterfalls, reserves, and
//! conditions precedent, all against one shared [`FinancialHistory`] and
//! [`EventStore`].

pub mod amendment;
pub mod basket;
pub mod conditions_precedent;
pub mod covenant;
pub mod environment;
pub mod milestone;
pub mod multiperiod;
pub mod phase;
pub mod reserve;
pub mod waterfall;

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::ast::{
    BasketStmt, CovenantStmt, Expr, MilestoneStmt, Program, ReserveStmt, Statement, TechnicalMilestoneStmt,
    WaterfallStmt,
};
use crate::errors::ProvisoError;
use crate::events::{Event, EventStore};
use crate::financials::{FinancialHistory, FinancialObservation, Period};
use crate::state::InterpreterState;
use covenant::CovenantResult;
use environment::Environment;
use waterfall::WaterfallResult;

/// Owns a [`Program`] and runs it against accumulating financial history
/// and runtime state. One `Interpreter` corresponds to one credit
/// agreement across its life, advancing period by period.
pub struct Interpreter {
    program: Program,
    state: InterpreterState,
    history: FinancialHistory,
    events: EventStore,
    defines: HashMap<String, Expr>,
    conditions: HashMap<String, Expr>,
    current_date: NaiveDate,
}

impl Interpreter {
    pub fn new(program: Program, start_date: NaiveDate) -> Self {
        let mut defines = HashMap::new();
        let mut conditions = HashMap::new();
        for stmt in &program.statements {
            match stmt {
                Statement::Define(d) => {
                    defines.insert(d.name.clone(), d.expr.clone());
                }
                Statement::Condition(c) => {
                    conditions.insert(c.name.clone(), c.expr.clone());
                }
                _ => {}
            }
        }
        Interpreter {
            program,
            state: InterpreterState::new(),
            history: FinancialHistory::new(),
            events: EventStore::new(),
            defines,
            conditions,
            current_date: start_date,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    /// Moves the interpreter's business-date clock without recording a
    /// new period, for evaluating `--as-of` dates that fall between or
    /// after recorded periods (step-downs and cure windows key off this
    /// date; financial history does not gain a new entry).
    pub fn set_current_date(&mut self, date: NaiveDate) {
        self.current_date = date;
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    /// Records a period's financial observation and advances the
    /// interpreter's clock to its end date.
    pub fn record_period(&mut self, period: Period, observation: FinancialObservation) {
        tracing::debug!(period_end = %period.end_date, "recording financial period");
        self.current_date = period.end_date;
        self.history.record(period, observation);
    }

    fn environment<'a>(&'a self, observation: &'a FinancialObservation) -> Environment<'a> {
        Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation,
            state: &self.state,
        }
    }

    fn find_covenant(&self, name: &str) -> Result<&CovenantStmt, ProvisoError> {
        self.program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::Covenant(c) if c.name == name => Some(c),
                _ => None,
            })
            .ok_or_else(|| not_found("covenant", name))
    }

    fn find_basket(&self, name: &str) -> Result<&BasketStmt, ProvisoError> {
        self.program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::Basket(b) if b.name == name => Some(b),
                _ => None,
            })
            .ok_or_else(|| not_found("basket", name))
    }

    fn find_milestone(&self, name: &str) -> Result<&MilestoneStmt, ProvisoError> {
        self.program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::Milestone(m) if m.name == name => Some(m),
                _ => None,
            })
            .ok_or_else(|| not_found("milestone", name))
    }

    fn find_technical_milestone(&self, name: &str) -> Result<&TechnicalMilestoneStmt, ProvisoError> {
        self.program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::TechnicalMilestone(m) if m.name == name => Some(m),
                _ => None,
            })
            .ok_or_else(|| not_found("technical milestone", name))
    }

    fn find_reserve(&self, name: &str) -> Result<&ReserveStmt, ProvisoError> {
        self.program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::Reserve(r) if r.name == name => Some(r),
                _ => None,
            })
            .ok_or_else(|| not_found("reserve", name))
    }

    fn find_waterfall(&self, name: &str) -> Result<&WaterfallStmt, ProvisoError> {
        self.program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::Waterfall(w) if w.name == name => Some(w),
                _ => None,
            })
            .ok_or_else(|| not_found("waterfall", name))
    }

    fn reserves(&self) -> Vec<ReserveStmt> {
        self.program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Reserve(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn check_covenant(&mut self, name: &str) -> Result<CovenantResult, ProvisoError> {
        let covenant = self.find_covenant(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        let result = covenant::check(&covenant, &env, as_of, &snapshot.cures, &mut self.events)?;
        if result.passed {
            tracing::debug!(covenant = %name, value = %result.metric_value, threshold = %result.threshold, "covenant passed");
        } else if result.cured {
            tracing::info!(covenant = %name, value = %result.metric_value, threshold = %result.threshold, "covenant breached, cured");
        } else {
            tracing::warn!(covenant = %name, value = %result.metric_value, threshold = %result.threshold, "covenant breached");
        }
        Ok(result)
    }

    /// Records an attempt to cure a breached covenant with `amount`.
    /// Succeeds, and marks the covenant cured for subsequent `check_covenant`
    /// calls at the same date, iff the covenant is breached, cure uses
    /// remain in the rolling window, and `amount` meets the shortfall.
    pub fn apply_cure(&mut self, name: &str, amount: Decimal) -> Result<covenant::CureApplication, ProvisoError> {
        let covenant = self.find_covenant(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        let application = covenant::apply_cure(&covenant, &env, as_of, amount, &mut self.state.cures, &mut self.events)?;
        if application.success {
            tracing::info!(covenant = %name, amount = %amount, "cure applied");
        } else {
            tracing::warn!(covenant = %name, amount = %amount, reason = ?application.reason, "cure attempt failed");
        }
        Ok(application)
    }

    pub fn check_all_covenants(&mut self) -> Result<Vec<CovenantResult>, ProvisoError> {
        let names: Vec<String> = self
            .program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Covenant(c) => Some(c.name.clone()),
                _ => None,
            })
            .collect();
        names.iter().map(|name| self.check_covenant(name)).collect()
    }

    pub fn basket_available(&self, name: &str) -> Result<Decimal, ProvisoError> {
        let basket = self.find_basket(name)?;
        let obs = self.history.latest().cloned().unwrap_or_default();
        let env = self.environment(&obs);
        basket::available(basket, &env, &self.state.baskets)
    }

    pub fn draw_basket(&mut self, name: &str, amount: Decimal) -> Result<Decimal, ProvisoError> {
        self.draw_basket_with_description(name, amount, None)
    }

    pub fn draw_basket_with_description(&mut self, name: &str, amount: Decimal, description: Option<String>) -> Result<Decimal, ProvisoError> {
        let basket = self.find_basket(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        basket::draw(&basket, &env, &mut self.state.baskets, amount, as_of, description, &mut self.events)
    }

    pub fn accumulate_basket(&mut self, name: &str, amount: Decimal) -> Result<(), ProvisoError> {
        self.accumulate_basket_with_description(name, amount, None)
    }

    pub fn accumulate_basket_with_description(&mut self, name: &str, amount: Decimal, description: Option<String>) -> Result<(), ProvisoError> {
        let basket = self.find_basket(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        basket::accumulate(&basket, &env, &mut self.state.baskets, amount, as_of, description, &mut self.events)
    }

    /// Accumulates a builder basket by evaluating its own `BUILDS_FROM`
    /// expression against the current period, rather than a caller-supplied
    /// amount. Errors if the basket has no `BUILDS_FROM` clause.
    pub fn accumulate_basket_from_builds_from(&mut self, name: &str) -> Result<Decimal, ProvisoError> {
        self.accumulate_basket_from_builds_from_with_description(name, None)
    }

    pub fn accumulate_basket_from_builds_from_with_description(&mut self, name: &str, description: Option<String>) -> Result<Decimal, ProvisoError> {
        let basket = self.find_basket(name)?.clone();
        let builds_from = basket.builds_from.clone().ok_or_else(|| ProvisoError::InvariantViolation {
            message: format!("basket '{name}' has no BUILDS_FROM expression"),
        })?;
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let amount = env.eval_numeric(&builds_from)?.require_finite("basket BUILDS_FROM amount")?;
        let as_of = self.current_date;
        basket::accumulate(&basket, &env, &mut self.state.baskets, amount, as_of, description, &mut self.events)?;
        Ok(amount)
    }

    /// Evaluates every declared transition and fires the first whose
    /// source phase and `WHEN` condition match, returning the phase
    /// entered if one did.
    pub fn advance_phase(&mut self) -> Result<Option<String>, ProvisoError> {
        let transitions: Vec<_> = self
            .program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Transition(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        phase::advance(&transitions, &mut self.state.phases, &env, as_of, &mut self.events)
    }

    pub fn check_milestone(&mut self, name: &str) -> Result<(), ProvisoError> {
        let milestone = self.find_milestone(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        milestone::check(&milestone, &mut self.state.milestones, &env, as_of, &mut self.events)
    }

    pub fn update_technical_progress(&mut self, name: &str, value: Decimal) -> Result<(), ProvisoError> {
        let tm = self.find_technical_milestone(name)?.clone();
        milestone::update_progress(&tm, &mut self.state.milestones, value, &mut self.events)
    }

    pub fn check_technical_milestone(&mut self, name: &str) -> Result<(), ProvisoError> {
        let tm = self.find_technical_milestone(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        let as_of = self.current_date;
        milestone::check_technical(&tm, &mut self.state.milestones, &env, as_of, &mut self.events)
    }

    pub fn fund_reserve(&mut self, name: &str, amount: Decimal) -> Result<Decimal, ProvisoError> {
        let reserve = self.find_reserve(name)?.clone();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        reserve::fund(&reserve, &env, &mut self.state, amount, &mut self.events)
    }

    pub fn draw_reserve(&mut self, name: &str, amount: Decimal) -> Result<Decimal, ProvisoError> {
        let reserve = self.find_reserve(name)?.clone();
        Ok(reserve::draw(&reserve, &mut self.state, amount, &mut self.events))
    }

    pub fn run_waterfall(&mut self, name: &str, available_cash: Decimal) -> Result<WaterfallResult, ProvisoError> {
        let wf = self.find_waterfall(name)?.clone();
        let reserves = self.reserves();
        let obs = self.history.latest().cloned().unwrap_or_default();
        let snapshot = self.state.clone();
        let env = Environment {
            defines: &self.defines,
            conditions: &self.conditions,
            history: &self.history,
            observation: &obs,
            state: &snapshot,
        };
        waterfall::execute(&wf, &env, &mut self.state, &reserves, available_cash, &mut self.events)
    }

    pub fn satisfy_condition_precedent(&mut self, checklist: &str, item: &str) -> Result<(), ProvisoError> {
        let stmt = self
            .program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::ConditionsPrecedent(c) if c.name == checklist => Some(c.clone()),
                _ => None,
            })
            .ok_or_else(|| not_found("conditions precedent checklist", checklist))?;
        conditions_precedent::satisfy(&stmt, &mut self.state.conditions_precedent, item, &mut self.events)
    }

    pub fn waive_condition_precedent(&mut self, checklist: &str, item: &str) -> Result<(), ProvisoError> {
        let stmt = self
            .program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::ConditionsPrecedent(c) if c.name == checklist => Some(c.clone()),
                _ => None,
            })
            .ok_or_else(|| not_found("conditions precedent checklist", checklist))?;
        conditions_precedent::waive(&stmt, &mut self.state.conditions_precedent, item, &mut self.events)
    }

    /// Evaluates every covenant against every recorded period in order
    /// (spec.md §4.3.10). Covenants suspended in a `PHASE` active at that
    /// period's date are excluded from that period's `overall_compliant`.
    pub fn compliance_history(&self) -> Result<Vec<multiperiod::PeriodCompliance>, ProvisoError> {
        let covenants: Vec<CovenantStmt> = self
            .program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Covenant(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        let suspended_by_phase: HashMap<String, Vec<String>> = self
            .program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Phase(p) => Some((p.name.clone(), p.covenants_suspended.clone())),
                _ => None,
            })
            .collect();
        // phase active as of each date, oldest transition first
        let transitions = self.state.phases.history().to_vec();
        multiperiod::compliance_history(&covenants, &self.defines, &self.conditions, &self.history, move |period| {
            let active_phase = transitions
                .iter()
                .rev()
                .find(|t| t.date <= period.end_date)
                .map(|t| t.to.clone());
            match active_phase.and_then(|name| suspended_by_phase.get(&name).cloned()) {
                Some(list) => list,
                None => Vec::new(),
            }
        })
    }

    /// Reports what covenant results would obtain if `changes` were merged
    /// into the current period's observation, without mutating any state
    /// (spec.md §4.3.11).
    pub fn simulate(&self, changes: &HashMap<String, Decimal>) -> Result<multiperiod::SimulationResult, ProvisoError> {
        let covenants: Vec<CovenantStmt> = self
            .program
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Covenant(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        let current = self.history.latest().cloned().unwrap_or_default();
        multiperiod::simulate(&covenants, &self.defines, &self.conditions, &self.history, &current, changes, self.current_date)
    }

    pub fn trigger_event(&mut self, name: &str) {
        self.state.trigger_event(name);
    }

    /// Applies a single amendment by number, mutating the running
    /// program in place and recording it as applied so a later re-apply
    /// is a no-op.
    pub fn apply_amendment(&mut self, number: i64) -> Result<(), ProvisoError> {
        let stmt = self
            .program
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::Amendment(a) if a.number == number => Some(a.clone()),
                _ => None,
            })
            .ok_or_else(|| not_found("amendment", &number.to_string()))?;
        let result = amendment::apply(&stmt, &mut self.program, &mut self.state.amendments, &mut self.events);
        match &result {
            Ok(()) => tracing::info!(amendment = number, "amendment applied"),
            Err(e) => {
                tracing::error!(amendment = number, error = %e, "amendment failed");
                self.events.emit(Event::AmendmentDirectiveFailed {
                    number,
                    directive_index: 0,
                    reason: e.to_string(),
                });
            }
        }
        // DEFINE/CONDITION may have been added, replaced, or deleted; rebuild the lookups.
        self.defines.clear();
        self.conditions.clear();
        for stmt in &self.program.statements {
            match stmt {
                Statement::Define(d) => {
                    self.defines.insert(d.name.clone(), d.expr.clone());
                }
                Statement::Condition(c) => {
                    self.conditions.insert(c.name.clone(), c.expr.clone());
                }
                _ => {}
            }
        }
        result
    }
}

fn not_found(kind: &str, name: &str) -> ProvisoError {
    ProvisoError::InvariantViolation {
        message: format!("no {kind} named '{name}' in the program"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::financials::PeriodType;
    use crate::parser::parse;
    use rust_decimal_macros::dec;

    fn source() -> &'static str {
        "COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n\
         BASKET GeneralRP CAPACITY $5,000,000\n"
    }

    #[test]
    fn checks_covenant_against_recorded_observation() {
        let program = parse(source()).unwrap();
        let mut interp = Interpreter::new(program, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());
        let mut obs = FinancialObservation::new();
        obs.insert("Debt".to_string(), dec!(300));
        obs.insert("EBITDA".to_string(), dec!(100));
        interp.record_period(Period::new(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(), PeriodType::Quarter), obs);
        let result = interp.check_covenant("MaxLeverage").unwrap();
        assert!(result.passed);
    }

    #[test]
    fn draws_and_exhausts_basket() {
        let program = parse(source()).unwrap();
        let mut interp = Interpreter::new(program, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        interp.draw_basket("GeneralRP", dec!(2_000_000)).unwrap();
        assert_eq!(interp.basket_available("GeneralRP").unwrap(), dec!(3_000_000));
        assert!(interp.draw_basket("GeneralRP", dec!(10_000_000)).is_err());
    }

    #[test]
    fn applying_unknown_amendment_number_errors() {
        let program = parse(source()).unwrap();
        let mut interp = Interpreter::new(program, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert!(interp.apply_amendment(99).is_err());
    }
}
