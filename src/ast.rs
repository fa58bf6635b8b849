//! The syntax tree produced by the parser. A [`Program`] is an ordered
//! sequence of [`Statement`]s; every node carries a [`Span`] for
//! diagnostics. Expressions are side-effect-free per spec — evaluation
//! lives in [`crate::interpreter`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Program { statements }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Define(DefineStmt),
    Covenant(CovenantStmt),
    Basket(BasketStmt),
    Condition(ConditionStmt),
    Prohibit(ProhibitStmt),
    Event(EventStmt),
    Phase(PhaseStmt),
    Transition(TransitionStmt),
    Milestone(MilestoneStmt),
    TechnicalMilestone(TechnicalMilestoneStmt),
    RegulatoryRequirement(RegulatoryRequirementStmt),
    PerformanceGuarantee(PerformanceGuaranteeStmt),
    DegradationSchedule(DegradationScheduleStmt),
    SeasonalAdjustment(SeasonalAdjustmentStmt),
    TaxEquityStructure(TaxEquityStructureStmt),
    TaxCredit(TaxCreditStmt),
    Depreciation(DepreciationStmt),
    FlipEvent(FlipEventStmt),
    Reserve(ReserveStmt),
    Waterfall(WaterfallStmt),
    ConditionsPrecedent(ConditionsPrecedentStmt),
    Load(LoadStmt),
    Comment(CommentStmt),
    Amendment(AmendmentStmt),
}

/// The fixed kind tag used for duplicate-name checks, identifier
/// resolution order, and the differ/classifier/renderer switches. Comments
/// and Amendments are not addressable by kind — they are excluded from the
/// state compiler's element maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Define,
    Covenant,
    Basket,
    Condition,
    Prohibit,
    Event,
    Phase,
    Transition,
    Milestone,
    TechnicalMilestone,
    RegulatoryRequirement,
    PerformanceGuarantee,
    DegradationSchedule,
    SeasonalAdjustment,
    TaxEquityStructure,
    TaxCredit,
    Depreciation,
    FlipEvent,
    Reserve,
    Waterfall,
    ConditionsPrecedent,
    Load,
}

impl Statement {
    /// the fixed kind tag, or None for Comment/Amendment which are not
    /// name-addressable statements
    pub fn kind(&self) -> Option<StatementKind> {
        use StatementKind::*;
        Some(match self {
            Statement::Define(_) => Define,
            Statement::Covenant(_) => Covenant,
            Statement::Basket(_) => Basket,
            Statement::Condition(_) => Condition,
            Statement::Prohibit(_) => Prohibit,
            Statement::Event(_) => Event,
            Statement::Phase(_) => Phase,
            Statement::Transition(_) => Transition,
            Statement::Milestone(_) => Milestone,
            Statement::TechnicalMilestone(_) => TechnicalMilestone,
            Statement::RegulatoryRequirement(_) => RegulatoryRequirement,
            Statement::PerformanceGuarantee(_) => PerformanceGuarantee,
            Statement::DegradationSchedule(_) => DegradationSchedule,
            Statement::SeasonalAdjustment(_) => SeasonalAdjustment,
            Statement::TaxEquityStructure(_) => TaxEquityStructure,
            Statement::TaxCredit(_) => TaxCredit,
            Statement::Depreciation(_) => Depreciation,
            Statement::FlipEvent(_) => FlipEvent,
            Statement::Reserve(_) => Reserve,
            Statement::Waterfall(_) => Waterfall,
            Statement::ConditionsPrecedent(_) => ConditionsPrecedent,
            Statement::Load(_) => Load,
            Statement::Comment(_) | Statement::Amendment(_) => return None,
        })
    }

    pub fn name(&self) -> Option<&str> {
        Some(match self {
            Statement::Define(s) => &s.name,
            Statement::Covenant(s) => &s.name,
            Statement::Basket(s) => &s.name,
            Statement::Condition(s) => &s.name,
            Statement::Prohibit(s) => &s.name,
            Statement::Event(s) => &s.name,
            Statement::Phase(s) => &s.name,
            Statement::Transition(s) => &s.name,
            Statement::Milestone(s) => &s.name,
            Statement::TechnicalMilestone(s) => &s.name,
            Statement::RegulatoryRequirement(s) => &s.name,
            Statement::PerformanceGuarantee(s) => &s.name,
            Statement::DegradationSchedule(s) => &s.name,
            Statement::SeasonalAdjustment(s) => &s.name,
            Statement::TaxEquityStructure(s) => &s.name,
            Statement::TaxCredit(s) => &s.name,
            Statement::Depreciation(s) => &s.name,
            Statement::FlipEvent(s) => &s.name,
            Statement::Reserve(s) => &s.name,
            Statement::Waterfall(s) => &s.name,
            Statement::ConditionsPrecedent(s) => &s.name,
            Statement::Load(s) => &s.name,
            Statement::Comment(_) | Statement::Amendment(_) => return None,
        })
    }

    pub fn span(&self) -> Span {
        match self {
            Statement::Define(s) => s.span,
            Statement::Covenant(s) => s.span,
            Statement::Basket(s) => s.span,
            Statement::Condition(s) => s.span,
            Statement::Prohibit(s) => s.span,
            Statement::Event(s) => s.span,
            Statement::Phase(s) => s.span,
            Statement::Transition(s) => s.span,
            Statement::Milestone(s) => s.span,
            Statement::TechnicalMilestone(s) => s.span,
            Statement::RegulatoryRequirement(s) => s.span,
            Statement::PerformanceGuarantee(s) => s.span,
            Statement::DegradationSchedule(s) => s.span,
            Statement::SeasonalAdjustment(s) => s.span,
            Statement::TaxEquityStructure(s) => s.span,
            Statement::TaxCredit(s) => s.span,
            Statement::Depreciation(s) => s.span,
            Statement::FlipEvent(s) => s.span,
            Statement::Reserve(s) => s.span,
            Statement::Waterfall(s) => s.span,
            Statement::ConditionsPrecedent(s) => s.span,
            Statement::Load(s) => s.span,
            Statement::Comment(s) => s.span,
            Statement::Amendment(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Le,
    Ge,
    Lt,
    Gt,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        }
    }

    pub fn apply(&self, lhs: Decimal, rhs: Decimal) -> bool {
        match self {
            CompareOp::Le => lhs <= rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailingUnit {
    Quarters,
    Months,
    Years,
}

impl TrailingUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrailingUnit::Quarters => "quarters",
            TrailingUnit::Months => "months",
            TrailingUnit::Years => "years",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Ident(String, Span),
    Number(Decimal, Span),
    Currency(Decimal, Span),
    /// stores the raw percent figure, e.g. 15 for "15%"; evaluates to that
    /// raw figure except as an operand of multiplication, where it divides
    /// by 100 first (spec.md §4.3.1)
    Percentage(Decimal, Span),
    Ratio(Decimal, Span),
    Bps(Decimal, Span),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        span: Span,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    Trailing {
        n: u32,
        unit: TrailingUnit,
        expr: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Ident(_, s)
            | Expr::Number(_, s)
            | Expr::Currency(_, s)
            | Expr::Percentage(_, s)
            | Expr::Ratio(_, s)
            | Expr::Bps(_, s) => *s,
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Compare { span, .. }
            | Expr::Call { span, .. }
            | Expr::Trailing { span, .. } => *span,
        }
    }

    /// a canonical string rendering used by the differ so that
    /// semantically equal expressions (modulo span and whitespace) render
    /// equal field values (spec.md §4.4)
    pub fn canonical(&self) -> String {
        match self {
            Expr::Ident(name, _) => name.clone(),
            Expr::Number(n, _) => n.normalize().to_string(),
            Expr::Currency(n, _) => format!("${}", n.normalize()),
            Expr::Percentage(n, _) => format!("{}%", n.normalize()),
            Expr::Ratio(n, _) => format!("{}x", n.normalize()),
            Expr::Bps(n, _) => format!("{}bps", n.normalize()),
            Expr::Binary { op, lhs, rhs, .. } => {
                let op_str = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::And => "AND",
                    BinOp::Or => "OR",
                };
                format!("({} {} {})", lhs.canonical(), op_str, rhs.canonical())
            }
            Expr::Unary { op, expr, .. } => match op {
                UnOp::Neg => format!("(-{})", expr.canonical()),
                UnOp::Not => format!("(NOT {})", expr.canonical()),
            },
            Expr::Compare { op, lhs, rhs, .. } => {
                format!("({} {} {})", lhs.canonical(), op.as_str(), rhs.canonical())
            }
            Expr::Call { name, args, .. } => {
                let args_str: Vec<String> = args.iter().map(|a| a.canonical()).collect();
                format!("{}({})", name, args_str.join(", "))
            }
            Expr::Trailing { n, unit, expr, .. } => {
                format!("TRAILING {} {} OF {}", n, unit.as_str(), expr.canonical())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestFrequency {
    Monthly,
    Quarterly,
    SemiAnnually,
    Annually,
}

impl TestFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestFrequency::Monthly => "MONTHLY",
            TestFrequency::Quarterly => "QUARTERLY",
            TestFrequency::SemiAnnually => "SEMI_ANNUALLY",
            TestFrequency::Annually => "ANNUALLY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefineStmt {
    pub name: String,
    pub expr: Expr,
    pub excluding: Vec<String>,
    pub capped_at: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDown {
    pub after_date: NaiveDate,
    pub threshold: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CureClause {
    pub mechanism: String,
    pub max_uses: i64,
    pub window_count: i64,
    pub window_unit: TrailingUnit,
    pub max_amount: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovenantStmt {
    pub name: String,
    pub metric: Expr,
    pub operator: CompareOp,
    pub threshold: Expr,
    pub tested: TestFrequency,
    pub cure: Option<CureClause>,
    pub breach_event: Option<String>,
    pub step_downs: Vec<StepDown>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketStmt {
    pub name: String,
    pub capacity: Option<Expr>,
    pub floor: Option<Expr>,
    pub builds_from: Option<Expr>,
    pub starting: Option<Expr>,
    pub maximum: Option<Expr>,
    pub subject_to: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasketClass {
    Fixed,
    Grower,
    Builder,
}

impl BasketStmt {
    /// classification per spec.md §4.3.3: distinguished by which fields
    /// are present. BUILDS_FROM makes it a builder regardless of other
    /// fields; a bare CAPACITY with a FLOOR is a grower (the floor is the
    /// grower-specific field the grammar exposes); CAPACITY alone is
    /// fixed. See DESIGN.md for why FLOOR is the discriminant rather than
    /// inspecting whether the capacity expression calls GreaterOf.
    pub fn classification(&self) -> BasketClass {
        if self.builds_from.is_some() {
            BasketClass::Builder
        } else if self.floor.is_some() {
            BasketClass::Grower
        } else {
            BasketClass::Fixed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionStmt {
    pub name: String,
    pub expr: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProhibitStmt {
    pub name: String,
    pub action: String,
    pub unless: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStmt {
    pub name: String,
    /// if present, the event is computed rather than externally triggered
    pub when: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStmt {
    pub name: String,
    pub until: Option<String>,
    pub from: Option<String>,
    pub covenants_suspended: Vec<String>,
    pub covenants_active: Vec<String>,
    pub required: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransitionWhen {
    Ref(String),
    AllOf(Vec<String>),
    AnyOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionStmt {
    pub name: String,
    pub from_phase: String,
    pub to_phase: String,
    pub when: TransitionWhen,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MilestoneRequires {
    Ref(String),
    AllOf(Vec<String>),
    AnyOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneStmt {
    pub name: String,
    pub target: NaiveDate,
    pub longstop: NaiveDate,
    pub requires: Option<MilestoneRequires>,
    pub triggers: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalMilestoneStmt {
    pub name: String,
    pub target: NaiveDate,
    pub longstop: NaiveDate,
    pub requires: Option<MilestoneRequires>,
    pub triggers: Vec<String>,
    pub target_value: Expr,
    pub progress_metric: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryRequirementStmt {
    pub name: String,
    pub citation: Option<String>,
    pub requires: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceGuaranteeStmt {
    pub name: String,
    pub guaranteed_output: Expr,
    pub shortfall_remedy: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationScheduleStmt {
    pub name: String,
    pub base_output: Expr,
    pub annual_factor: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAdjustmentStmt {
    pub name: String,
    pub base: Expr,
    /// (month 1-12, multiplier)
    pub monthly_factors: Vec<(u32, Decimal)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEquityStructureStmt {
    pub name: String,
    pub pre_flip_allocation: Decimal,
    pub post_flip_allocation: Decimal,
    pub flip_event: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCreditStmt {
    pub name: String,
    pub basis: Expr,
    pub rate: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepreciationStmt {
    pub name: String,
    pub method: String,
    pub basis: Expr,
    pub class_life_years: i64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipEventStmt {
    pub name: String,
    pub target_irr: Option<Expr>,
    pub target_date: Option<NaiveDate>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveStmt {
    pub name: String,
    pub target: Expr,
    pub minimum: Option<Expr>,
    pub funded_by: Vec<String>,
    pub released_to: Option<String>,
    pub released_for: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierSource {
    Revenue,
    Remainder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub priority: i64,
    pub label: String,
    pub pay: Expr,
    pub from: TierSource,
    pub until: Option<Expr>,
    pub shortfall_to: Option<String>,
    pub pay_to: Option<String>,
    pub if_cond: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterfallFrequency {
    Monthly,
    Quarterly,
    Annually,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStmt {
    pub name: String,
    pub frequency: Option<WaterfallFrequency>,
    pub tiers: Vec<Tier>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpStatus {
    Pending,
    Satisfied,
    Waived,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpItem {
    pub name: String,
    pub description: Option<String>,
    pub responsible: Option<String>,
    pub initial_status: CpStatus,
    pub satisfies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionsPrecedentStmt {
    pub name: String,
    pub section: Option<String>,
    pub items: Vec<CpItem>,
    pub span: Span,
}

/// an include-like directive; the interpreter treats it as an inert
/// marker (see DESIGN.md — resolving external references is a caller
/// concern, the core carries no file I/O)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadStmt {
    pub name: String,
    pub source: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentStmt {
    pub text: String,
    pub block: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyField {
    pub field: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AmendmentDirective {
    Add(Box<Statement>),
    Delete {
        kind: StatementKind,
        name: String,
    },
    Replace {
        kind: StatementKind,
        name: String,
        statement: Box<Statement>,
    },
    Modify {
        kind: StatementKind,
        name: String,
        fields: Vec<ModifyField>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendmentStmt {
    pub number: i64,
    pub effective: Option<NaiveDate>,
    pub description: Option<String>,
    pub directives: Vec<AmendmentDirective>,
    pub span: Span,
}
