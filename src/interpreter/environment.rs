//! Expression evaluation. Resolves `DEFINE` references, financial metric
//! lookups, and `TRAILING` windows against a [`FinancialHistory`], and
//! carries the division-by-zero semantics the spec leaves open (see
//! [`NumericOutcome`] and DESIGN.md).

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::ast::{BinOp, CompareOp, Expr, UnOp};
use crate::errors::ProvisoError;
use crate::financials::{FinancialHistory, FinancialObservation, PeriodType};
use crate::state::InterpreterState;

/// The result of evaluating a numeric expression. `Decimal` has no native
/// infinities, so division by zero is represented explicitly rather than
/// panicking or silently clamping (spec.md's Open Question on this is
/// resolved here — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericOutcome {
    Finite(Decimal),
    PosInfinity,
    NegInfinity,
    NaN,
}

impl NumericOutcome {
    pub fn as_finite(&self) -> Option<Decimal> {
        match self {
            NumericOutcome::Finite(d) => Some(*d),
            _ => None,
        }
    }

    pub fn require_finite(&self, context: &str) -> Result<Decimal, ProvisoError> {
        self.as_finite().ok_or_else(|| ProvisoError::InvariantViolation {
            message: format!("{context} evaluated to a non-finite value ({self:?})"),
        })
    }

    fn sign(d: Decimal) -> i32 {
        if d.is_sign_positive() { 1 } else { -1 }
    }

    pub fn add(self, other: NumericOutcome) -> NumericOutcome {
        use NumericOutcome::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a + b),
            (NaN, _) | (_, NaN) => NaN,
            (PosInfinity, NegInfinity) | (NegInfinity, PosInfinity) => NaN,
            (PosInfinity, _) | (_, PosInfinity) => PosInfinity,
            (NegInfinity, _) | (_, NegInfinity) => NegInfinity,
        }
    }

    pub fn sub(self, other: NumericOutcome) -> NumericOutcome {
        self.add(other.neg())
    }

    pub fn neg(self) -> NumericOutcome {
        match self {
            NumericOutcome::Finite(d) => NumericOutcome::Finite(-d),
            NumericOutcome::PosInfinity => NumericOutcome::NegInfinity,
            NumericOutcome::NegInfinity => NumericOutcome::PosInfinity,
            NumericOutcome::NaN => NumericOutcome::NaN,
        }
    }

    pub fn mul(self, other: NumericOutcome) -> NumericOutcome {
        use NumericOutcome::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a * b),
            (NaN, _) | (_, NaN) => NaN,
            (Finite(a), _) | (_, Finite(a)) if a.is_zero() => NaN,
            (a, b) => {
                let sa = if matches!(a, PosInfinity) { 1 } else if matches!(a, NegInfinity) { -1 } else { Self::sign(a.as_finite().unwrap()) };
                let sb = if matches!(b, PosInfinity) { 1 } else if matches!(b, NegInfinity) { -1 } else { Self::sign(b.as_finite().unwrap()) };
                if sa * sb > 0 { PosInfinity } else { NegInfinity }
            }
        }
    }

    pub fn div(self, other: NumericOutcome) -> NumericOutcome {
        use NumericOutcome::*;
        match (self, other) {
            (_, NaN) | (NaN, _) => NaN,
            (Finite(a), Finite(b)) => {
                if b.is_zero() {
                    if a.is_zero() {
                        NaN
                    } else if Self::sign(a) > 0 {
                        PosInfinity
                    } else {
                        NegInfinity
                    }
                } else {
                    Finite(a / b)
                }
            }
            (Finite(_), PosInfinity) | (Finite(_), NegInfinity) => Finite(Decimal::ZERO),
            (PosInfinity, Finite(b)) => {
                if Self::sign(b) > 0 { PosInfinity } else { NegInfinity }
            }
            (NegInfinity, Finite(b)) => {
                if Self::sign(b) > 0 { NegInfinity } else { PosInfinity }
            }
            (PosInfinity, PosInfinity) | (PosInfinity, NegInfinity) | (NegInfinity, PosInfinity) | (NegInfinity, NegInfinity) => NaN,
        }
    }

    pub fn compare(&self, op: CompareOp, other: &NumericOutcome) -> bool {
        use NumericOutcome::*;
        match (self, other) {
            (NaN, _) | (_, NaN) => false,
            (Finite(a), Finite(b)) => op.apply(*a, *b),
            (PosInfinity, PosInfinity) | (NegInfinity, NegInfinity) => matches!(op, CompareOp::Le | CompareOp::Ge | CompareOp::Eq),
            (PosInfinity, _) => matches!(op, CompareOp::Gt | CompareOp::Ge | CompareOp::Ne),
            (_, PosInfinity) => matches!(op, CompareOp::Lt | CompareOp::Le | CompareOp::Ne),
            (NegInfinity, _) => matches!(op, CompareOp::Lt | CompareOp::Le | CompareOp::Ne),
            (_, NegInfinity) => matches!(op, CompareOp::Gt | CompareOp::Ge | CompareOp::Ne),
        }
    }
}

impl std::fmt::Display for NumericOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericOutcome::Finite(d) => write!(f, "{d}"),
            NumericOutcome::PosInfinity => write!(f, "+Infinity"),
            NumericOutcome::NegInfinity => write!(f, "-Infinity"),
            NumericOutcome::NaN => write!(f, "NaN"),
        }
    }
}

pub struct Environment<'a> {
    pub defines: &'a HashMap<String, Expr>,
    pub conditions: &'a HashMap<String, Expr>,
    pub history: &'a FinancialHistory,
    pub observation: &'a FinancialObservation,
    pub state: &'a InterpreterState,
}

impl<'a> Environment<'a> {
    pub fn with_observation(&self, observation: &'a FinancialObservation) -> Environment<'a> {
        Environment {
            defines: self.defines,
            conditions: self.conditions,
            history: self.history,
            observation,
            state: self.state,
        }
    }

    pub fn eval_numeric(&self, expr: &Expr) -> Result<NumericOutcome, ProvisoError> {
        match expr {
            Expr::Number(d, _) | Expr::Currency(d, _) | Expr::Ratio(d, _) | Expr::Bps(d, _) => {
                Ok(NumericOutcome::Finite(*d))
            }
            // bare "15%" in identifier position is the raw percent figure
            // (15); the /100 conversion only happens when a percentage is
            // one side of a multiplication, e.g. "15% * EBITDA"
            Expr::Percentage(d, _) => Ok(NumericOutcome::Finite(*d)),
            Expr::Ident(name, _) => self.resolve_ident(name),
            Expr::Binary { op: BinOp::Mul, lhs, rhs, .. } => {
                let l = self.eval_percent_operand(lhs)?;
                let r = self.eval_percent_operand(rhs)?;
                Ok(l.mul(r))
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let l = self.eval_numeric(lhs)?;
                let r = self.eval_numeric(rhs)?;
                match op {
                    BinOp::Add => Ok(l.add(r)),
                    BinOp::Sub => Ok(l.sub(r)),
                    BinOp::Div => Ok(l.div(r)),
                    BinOp::Mul => unreachable!("Mul is matched above"),
                    BinOp::And | BinOp::Or => Err(ProvisoError::InvariantViolation {
                        message: "AND/OR cannot appear in a numeric expression".to_string(),
                    }),
                }
            }
            Expr::Unary { op, expr, .. } => {
                let v = self.eval_numeric(expr)?;
                match op {
                    UnOp::Neg => Ok(v.neg()),
                    UnOp::Not => Err(ProvisoError::InvariantViolation {
                        message: "NOT cannot appear in a numeric expression".to_string(),
                    }),
                }
            }
            Expr::Compare { .. } => Err(ProvisoError::InvariantViolation {
                message: "a comparison cannot appear in a numeric expression".to_string(),
            }),
            Expr::Call { name, args, .. } => self.eval_call(name, args),
            Expr::Trailing { n, unit, expr, .. } => self.eval_trailing(*n, *unit, expr),
        }
    }

    /// evaluates one side of a multiplication, dividing a literal
    /// percentage by 100 first (spec.md §4.3.1: "`15% * X` is
    /// `(15 / 100) * X`"); any other expression evaluates normally
    fn eval_percent_operand(&self, expr: &Expr) -> Result<NumericOutcome, ProvisoError> {
        if let Expr::Percentage(d, _) = expr {
            Ok(NumericOutcome::Finite(*d / Decimal::from(100)))
        } else {
            self.eval_numeric(expr)
        }
    }

    fn resolve_ident(&self, name: &str) -> Result<NumericOutcome, ProvisoError> {
        if let Some(expr) = self.defines.get(name) {
            return self.eval_numeric(expr);
        }
        if let Some(value) = self.observation.get(name) {
            return Ok(NumericOutcome::Finite(*value));
        }
        Err(ProvisoError::UndefinedIdentifier { name: name.to_string() })
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> Result<NumericOutcome, ProvisoError> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "GREATEROF" | "MAX" => self.fold_numeric(args, NumericOutcome::NegInfinity, |a, b| {
                if a.compare(CompareOp::Ge, &b) { a } else { b }
            }),
            "LESSEROF" | "MIN" => self.fold_numeric(args, NumericOutcome::PosInfinity, |a, b| {
                if a.compare(CompareOp::Le, &b) { a } else { b }
            }),
            "ABS" => {
                if args.len() != 1 {
                    return Err(arity_error(name, "1", args.len()));
                }
                match self.eval_numeric(&args[0])? {
                    NumericOutcome::Finite(d) => Ok(NumericOutcome::Finite(d.abs())),
                    NumericOutcome::NaN => Ok(NumericOutcome::NaN),
                    _ => Ok(NumericOutcome::PosInfinity),
                }
            }
            "SUM" => self.fold_numeric(args, NumericOutcome::Finite(Decimal::ZERO), |a, b| a.add(b)),
            "AVERAGE" => {
                if args.is_empty() {
                    return Err(arity_error(name, "at least 1", 0));
                }
                let sum = self.fold_numeric(args, NumericOutcome::Finite(Decimal::ZERO), |a, b| a.add(b))?;
                Ok(sum.div(NumericOutcome::Finite(Decimal::from(args.len() as u64))))
            }
            "ALLOF" | "ANYOF" => Err(ProvisoError::InvariantViolation {
                message: format!("{name} produces a boolean and cannot appear in a numeric expression"),
            }),
            _ => Err(ProvisoError::UnknownFunction { name: name.to_string() }),
        }
    }

    fn fold_numeric(
        &self,
        args: &[Expr],
        init: NumericOutcome,
        f: impl Fn(NumericOutcome, NumericOutcome) -> NumericOutcome,
    ) -> Result<NumericOutcome, ProvisoError> {
        let mut acc = init;
        for (i, a) in args.iter().enumerate() {
            let v = self.eval_numeric(a)?;
            acc = if i == 0 && matches!(init, NumericOutcome::NegInfinity | NumericOutcome::PosInfinity) {
                v
            } else {
                f(acc, v)
            };
        }
        Ok(acc)
    }

    fn eval_trailing(&self, n: u32, unit: crate::ast::TrailingUnit, expr: &Expr) -> Result<NumericOutcome, ProvisoError> {
        let kind = match unit {
            crate::ast::TrailingUnit::Months => PeriodType::Month,
            crate::ast::TrailingUnit::Quarters => PeriodType::Quarter,
            crate::ast::TrailingUnit::Years => PeriodType::Year,
        };
        let observations: Vec<&FinancialObservation> = self.history.periods_of_kind_desc(kind, n as usize);
        if observations.len() < n as usize {
            return Err(ProvisoError::MissingPeriod {
                needed: n,
                available: observations.len() as u32,
            });
        }
        let mut total = NumericOutcome::Finite(Decimal::ZERO);
        for obs in observations {
            let sub_env = self.with_observation(obs);
            total = total.add(sub_env.eval_numeric(expr)?);
        }
        Ok(total)
    }

    pub fn eval_bool(&self, expr: &Expr) -> Result<bool, ProvisoError> {
        match expr {
            Expr::Compare { op, lhs, rhs, .. } => {
                let l = self.eval_numeric(lhs)?;
                let r = self.eval_numeric(rhs)?;
                Ok(l.compare(*op, &r))
            }
            Expr::Binary { op: BinOp::And, lhs, rhs, .. } => Ok(self.eval_bool(lhs)? && self.eval_bool(rhs)?),
            Expr::Binary { op: BinOp::Or, lhs, rhs, .. } => Ok(self.eval_bool(lhs)? || self.eval_bool(rhs)?),
            Expr::Unary { op: UnOp::Not, expr, .. } => Ok(!self.eval_bool(expr)?),
            Expr::Call { name, args, .. } if name.eq_ignore_ascii_case("ALL_OF") || name.eq_ignore_ascii_case("AllOf") => {
                for a in args {
                    if !self.eval_bool(a)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Call { name, args, .. } if name.eq_ignore_ascii_case("ANY_OF") || name.eq_ignore_ascii_case("AnyOf") => {
                for a in args {
                    if self.eval_bool(a)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Ident(name, _) => {
                if let Some(cond) = self.conditions.get(name) {
                    self.eval_bool(cond)
                } else if self.state.is_event_triggered(name) {
                    Ok(true)
                } else if self.defines.contains_key(name) || self.observation.contains_key(name) {
                    Err(ProvisoError::InvariantViolation {
                        message: format!("'{name}' is a numeric term and cannot be used as a condition"),
                    })
                } else {
                    Ok(false)
                }
            }
            _ => Err(ProvisoError::InvariantViolation {
                message: "expected a boolean expression".to_string(),
            }),
        }
    }
}

fn arity_error(name: &str, expected: &str, got: usize) -> ProvisoError {
    ProvisoError::ArityMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        got,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;
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
    fn division_by_zero_produces_signed_infinity() {
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("Debt".to_string(), dec!(100));
        obs.insert("EBITDA".to_string(), dec!(0));
        let e = env(&defines, &conditions, &history, &obs, &state);
        let expr = Expr::Binary {
            op: BinOp::Div,
            lhs: Box::new(Expr::Ident("Debt".to_string(), Span::default())),
            rhs: Box::new(Expr::Ident("EBITDA".to_string(), Span::default())),
            span: Span::default(),
        };
        assert_eq!(e.eval_numeric(&expr).unwrap(), NumericOutcome::PosInfinity);
    }

    #[test]
    fn zero_over_zero_is_nan() {
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let obs = FinancialObservation::new();
        let e = env(&defines, &conditions, &history, &obs, &state);
        let expr = Expr::Binary {
            op: BinOp::Div,
            lhs: Box::new(Expr::Number(dec!(0), Span::default())),
            rhs: Box::new(Expr::Number(dec!(0), Span::default())),
            span: Span::default(),
        };
        assert_eq!(e.eval_numeric(&expr).unwrap(), NumericOutcome::NaN);
    }

    #[test]
    fn bare_percentage_evaluates_to_the_raw_percent() {
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let obs = FinancialObservation::new();
        let e = env(&defines, &conditions, &history, &obs, &state);
        let expr = Expr::Percentage(dec!(15), Span::default());
        assert_eq!(e.eval_numeric(&expr).unwrap(), NumericOutcome::Finite(dec!(15)));
    }

    #[test]
    fn percentage_divides_by_100_when_multiplied() {
        let defines = HashMap::new();
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("EBITDA".to_string(), dec!(200));
        let e = env(&defines, &conditions, &history, &obs, &state);
        let expr = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::Percentage(dec!(15), Span::default())),
            rhs: Box::new(Expr::Ident("EBITDA".to_string(), Span::default())),
            span: Span::default(),
        };
        assert_eq!(e.eval_numeric(&expr).unwrap(), NumericOutcome::Finite(dec!(30)));
    }

    #[test]
    fn resolves_defines_transitively() {
        let mut defines = HashMap::new();
        defines.insert(
            "EBITDA".to_string(),
            Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Ident("NetIncome".to_string(), Span::default())),
                rhs: Box::new(Expr::Ident("Interest".to_string(), Span::default())),
                span: Span::default(),
            },
        );
        let conditions = HashMap::new();
        let history = FinancialHistory::new();
        let state = InterpreterState::new();
        let mut obs = FinancialObservation::new();
        obs.insert("NetIncome".to_string(), dec!(80));
        obs.insert("Interest".to_string(), dec!(20));
        let e = env(&defines, &conditions, &history, &obs, &state);
        let expr = Expr::Ident("EBITDA".to_string(), Span::default());
        assert_eq!(e.eval_numeric(&expr).unwrap(), NumericOutcome::Finite(dec!(100)));
    }
}
