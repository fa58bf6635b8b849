//! Recursive-descent parser with a Pratt expression core. Kept
//! hand-written rather than built on a grammar-macro crate so that
//! [`ParseError`] can carry the exact `location` / `expected` / `found`
//! shape the CLI's caret formatter needs (spec.md §4.1, §6.4).

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::ast::*;
use crate::lexer::{tokenize, LexError, Token, TokenKind};
use crate::span::{Location, Span};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub location: Location,
    pub expected: Vec<String>,
    pub found: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.message, self.location.line, self.location.column
        )
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            location: e.location,
            expected: vec![],
            found: String::new(),
        }
    }
}

pub fn parse(src: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(src)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(s) => s.clone(),
        TokenKind::Number(d) => d.to_string(),
        TokenKind::Currency(d) => format!("${d}"),
        TokenKind::Percentage(d) => format!("{d}%"),
        TokenKind::Ratio(d) => format!("{d}x"),
        TokenKind::Bps(d) => format!("{d}bps"),
        TokenKind::Date(d) => d.to_string(),
        TokenKind::Str(s) => format!("\"{s}\""),
        TokenKind::Comment { .. } => "comment".to_string(),
        TokenKind::LParen => "(".to_string(),
        TokenKind::RParen => ")".to_string(),
        TokenKind::Comma => ",".to_string(),
        TokenKind::Colon => ":".to_string(),
        TokenKind::Semicolon => ";".to_string(),
        TokenKind::Plus => "+".to_string(),
        TokenKind::Minus => "-".to_string(),
        TokenKind::Star => "*".to_string(),
        TokenKind::Slash => "/".to_string(),
        TokenKind::Le => "<=".to_string(),
        TokenKind::Ge => ">=".to_string(),
        TokenKind::Lt => "<".to_string(),
        TokenKind::Gt => ">".to_string(),
        TokenKind::Eq => "=".to_string(),
        TokenKind::Ne => "!=".to_string(),
        TokenKind::Eof => "end of input".to_string(),
    }
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn cur_span(&self) -> Span {
        self.cur().span
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur().kind, TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>, expected: Vec<&str>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.cur_span().start,
            expected: expected.into_iter().map(String::from).collect(),
            found: describe(&self.cur().kind),
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(&self.cur().kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<Span, ParseError> {
        if self.is_kw(kw) {
            Ok(self.bump().span)
        } else {
            Err(self.err(format!("expected '{kw}'"), vec![kw]))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        match self.cur().kind.clone() {
            TokenKind::Ident(s) => {
                let span = self.bump().span;
                Ok((s, span))
            }
            _ => Err(self.err("expected an identifier", vec!["identifier"])),
        }
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.cur().kind.clone() {
            TokenKind::Str(s) => {
                self.bump();
                Ok(s)
            }
            _ => Err(self.err("expected a string literal", vec!["string"])),
        }
    }

    fn expect_date(&mut self) -> Result<NaiveDate, ParseError> {
        match self.cur().kind {
            TokenKind::Date(d) => {
                self.bump();
                Ok(d)
            }
            _ => Err(self.err("expected a date literal (YYYY-MM-DD)", vec!["date"])),
        }
    }

    fn expect_integer(&mut self) -> Result<i64, ParseError> {
        match self.cur().kind {
            TokenKind::Number(d) => {
                self.bump();
                d.to_string().parse::<i64>().map_err(|_| {
                    ParseError {
                        message: "expected an integer".to_string(),
                        location: self.cur_span().start,
                        expected: vec!["integer".to_string()],
                        found: d.to_string(),
                    }
                })
            }
            _ => Err(self.err("expected an integer", vec!["integer"])),
        }
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.expect_ident()?.0];
        while self.eat_punct(&TokenKind::Comma) {
            names.push(self.expect_ident()?.0);
        }
        Ok(names)
    }

    fn eat_punct(&mut self, kind: &TokenKind) -> bool {
        if self.cur().kind == *kind {
            self.bump();
            true
        } else {
            false
        }
    }

    // ---- program ----

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program::new(statements))
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if let TokenKind::Comment { text, block } = self.cur().kind.clone() {
            let span = self.bump().span;
            return Ok(Statement::Comment(CommentStmt { text, block, span }));
        }

        let (kw, start) = match self.cur().kind.clone() {
            TokenKind::Ident(s) => (s.to_ascii_uppercase(), self.cur_span().start),
            _ => {
                return Err(self.err(
                    "expected a statement keyword",
                    vec!["DEFINE", "COVENANT", "BASKET", "..."],
                ))
            }
        };

        match kw.as_str() {
            "DEFINE" => self.parse_define(start),
            "COVENANT" => self.parse_covenant(start),
            "BASKET" => self.parse_basket(start),
            "CONDITION" => self.parse_condition(start),
            "PROHIBIT" => self.parse_prohibit(start),
            "EVENT" => self.parse_event(start),
            "PHASE" => self.parse_phase(start),
            "TRANSITION" => self.parse_transition(start),
            "MILESTONE" => self.parse_milestone(start),
            "TECHNICAL_MILESTONE" => self.parse_technical_milestone(start),
            "REGULATORY_REQUIREMENT" => self.parse_regulatory_requirement(start),
            "PERFORMANCE_GUARANTEE" => self.parse_performance_guarantee(start),
            "DEGRADATION_SCHEDULE" => self.parse_degradation_schedule(start),
            "SEASONAL_ADJUSTMENT" => self.parse_seasonal_adjustment(start),
            "TAX_EQUITY_STRUCTURE" => self.parse_tax_equity_structure(start),
            "TAX_CREDIT" => self.parse_tax_credit(start),
            "DEPRECIATION" => self.parse_depreciation(start),
            "FLIP_EVENT" => self.parse_flip_event(start),
            "RESERVE" => self.parse_reserve(start),
            "WATERFALL" => self.parse_waterfall(start),
            "CONDITIONS_PRECEDENT" => self.parse_conditions_precedent(start),
            "LOAD" => self.parse_load(start),
            "AMENDMENT" => self.parse_amendment(start),
            other => Err(ParseError {
                message: format!("unknown statement keyword '{other}'"),
                location: start,
                expected: vec!["DEFINE".into(), "COVENANT".into(), "BASKET".into()],
                found: other.to_string(),
            }),
        }
    }

    fn finish(&self, start: Location) -> Span {
        Span::new(start, self.tokens[self.pos.saturating_sub(1)].span.end)
    }

    // ---- individual statements ----

    fn parse_define(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        if !self.eat_punct(&TokenKind::Eq) {
            return Err(self.err("expected '=' after DEFINE name", vec!["="]));
        }
        let expr = self.parse_expr()?;
        let mut excluding = Vec::new();
        let mut capped_at = None;
        loop {
            if self.eat_kw("EXCLUDING") {
                excluding = self.parse_name_list()?;
            } else if self.eat_kw("CAPPED_AT") {
                capped_at = Some(self.parse_expr()?);
            } else {
                break;
            }
        }
        Ok(Statement::Define(DefineStmt {
            name,
            expr,
            excluding,
            capped_at,
            span: self.finish(start),
        }))
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ParseError> {
        let op = match self.cur().kind {
            TokenKind::Le => CompareOp::Le,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            _ => return Err(self.err("expected a comparison operator", vec!["<=", ">=", "<", ">", "=", "!="])),
        };
        self.bump();
        Ok(op)
    }

    fn parse_test_frequency(&mut self) -> Result<TestFrequency, ParseError> {
        let (name, span) = self.expect_ident()?;
        match name.to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(TestFrequency::Monthly),
            "QUARTERLY" => Ok(TestFrequency::Quarterly),
            "SEMI_ANNUALLY" => Ok(TestFrequency::SemiAnnually),
            "ANNUALLY" => Ok(TestFrequency::Annually),
            other => Err(ParseError {
                message: format!("unknown test frequency '{other}'"),
                location: span.start,
                expected: vec!["MONTHLY".into(), "QUARTERLY".into(), "SEMI_ANNUALLY".into(), "ANNUALLY".into()],
                found: other.to_string(),
            }),
        }
    }

    fn parse_trailing_unit(&mut self) -> Result<TrailingUnit, ParseError> {
        let (name, span) = self.expect_ident()?;
        match name.to_ascii_uppercase().as_str() {
            "QUARTERS" | "QUARTER" => Ok(TrailingUnit::Quarters),
            "MONTHS" | "MONTH" => Ok(TrailingUnit::Months),
            "YEARS" | "YEAR" => Ok(TrailingUnit::Years),
            other => Err(ParseError {
                message: format!("unknown period unit '{other}'"),
                location: span.start,
                expected: vec!["QUARTERS".into(), "MONTHS".into(), "YEARS".into()],
                found: other.to_string(),
            }),
        }
    }

    fn parse_covenant(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("REQUIRES")?;
        let metric = self.parse_additive()?;
        let operator = self.parse_compare_op()?;
        let threshold = self.parse_additive()?;
        self.expect_kw("TESTED")?;
        let tested = self.parse_test_frequency()?;

        let mut cure = None;
        let mut breach_event = None;
        let mut step_downs = Vec::new();
        loop {
            if self.eat_kw("CURE") {
                let (mechanism, _) = self.expect_ident()?;
                self.expect_kw("MAX_USES")?;
                let max_uses = self.expect_integer()?;
                self.expect_kw("WINDOW")?;
                let window_count = self.expect_integer()?;
                let window_unit = self.parse_trailing_unit()?;
                self.expect_kw("MAX_AMOUNT")?;
                let max_amount = self.parse_expr()?;
                cure = Some(CureClause {
                    mechanism,
                    max_uses,
                    window_count,
                    window_unit,
                    max_amount,
                });
            } else if self.eat_kw("BREACH_EVENT") {
                breach_event = Some(self.expect_ident()?.0);
            } else if self.eat_kw("STEP_DOWN") {
                self.expect_kw("AFTER")?;
                let after_date = self.expect_date()?;
                self.expect_kw("TO")?;
                let threshold = self.parse_additive()?;
                step_downs.push(StepDown { after_date, threshold });
            } else {
                break;
            }
        }

        Ok(Statement::Covenant(CovenantStmt {
            name,
            metric,
            operator,
            threshold,
            tested,
            cure,
            breach_event,
            step_downs,
            span: self.finish(start),
        }))
    }

    fn parse_basket(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let mut capacity = None;
        let mut floor = None;
        let mut builds_from = None;
        let mut starting = None;
        let mut maximum = None;
        let mut subject_to = Vec::new();
        loop {
            if self.eat_kw("CAPACITY") {
                capacity = Some(self.parse_expr()?);
            } else if self.eat_kw("FLOOR") {
                floor = Some(self.parse_expr()?);
            } else if self.eat_kw("BUILDS_FROM") {
                builds_from = Some(self.parse_expr()?);
            } else if self.eat_kw("STARTING") {
                starting = Some(self.parse_expr()?);
            } else if self.eat_kw("MAXIMUM") {
                maximum = Some(self.parse_expr()?);
            } else if self.eat_kw("SUBJECT_TO") {
                subject_to = self.parse_name_list()?;
            } else {
                break;
            }
        }
        Ok(Statement::Basket(BasketStmt {
            name,
            capacity,
            floor,
            builds_from,
            starting,
            maximum,
            subject_to,
            span: self.finish(start),
        }))
    }

    fn parse_condition(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        if !self.eat_punct(&TokenKind::Eq) {
            return Err(self.err("expected '=' after CONDITION name", vec!["="]));
        }
        let expr = self.parse_expr()?;
        Ok(Statement::Condition(ConditionStmt {
            name,
            expr,
            span: self.finish(start),
        }))
    }

    fn parse_prohibit(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("ACTION")?;
        let (action, _) = self.expect_ident()?;
        let unless = if self.eat_kw("UNLESS") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Prohibit(ProhibitStmt {
            name,
            action,
            unless,
            span: self.finish(start),
        }))
    }

    fn parse_event(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let when = if self.eat_kw("WHEN") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Event(EventStmt {
            name,
            when,
            span: self.finish(start),
        }))
    }

    fn parse_phase(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let mut until = None;
        let mut from = None;
        let mut covenants_suspended = Vec::new();
        let mut covenants_active = Vec::new();
        let mut required = Vec::new();
        loop {
            if self.eat_kw("UNTIL") {
                until = Some(self.expect_ident()?.0);
            } else if self.eat_kw("FROM") {
                from = Some(self.expect_ident()?.0);
            } else if self.eat_kw("SUSPEND") {
                covenants_suspended = self.parse_name_list()?;
            } else if self.eat_kw("ACTIVE") {
                covenants_active = self.parse_name_list()?;
            } else if self.eat_kw("REQUIRED") {
                required = self.parse_name_list()?;
            } else {
                break;
            }
        }
        Ok(Statement::Phase(PhaseStmt {
            name,
            until,
            from,
            covenants_suspended,
            covenants_active,
            required,
            span: self.finish(start),
        }))
    }

    fn parse_when_set(&mut self) -> Result<TransitionWhen, ParseError> {
        if self.eat_kw("ALL_OF") {
            self.expect_punct(&TokenKind::LParen, "(")?;
            let names = self.parse_name_list()?;
            self.expect_punct(&TokenKind::RParen, ")")?;
            Ok(TransitionWhen::AllOf(names))
        } else if self.eat_kw("ANY_OF") {
            self.expect_punct(&TokenKind::LParen, "(")?;
            let names = self.parse_name_list()?;
            self.expect_punct(&TokenKind::RParen, ")")?;
            Ok(TransitionWhen::AnyOf(names))
        } else {
            Ok(TransitionWhen::Ref(self.expect_ident()?.0))
        }
    }

    fn expect_punct(&mut self, kind: &TokenKind, label: &str) -> Result<(), ParseError> {
        if self.cur().kind == *kind {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected '{label}'"), vec![label]))
        }
    }

    fn parse_transition(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("FROM")?;
        let (from_phase, _) = self.expect_ident()?;
        self.expect_kw("TO")?;
        let (to_phase, _) = self.expect_ident()?;
        self.expect_kw("WHEN")?;
        let when = self.parse_when_set()?;
        Ok(Statement::Transition(TransitionStmt {
            name,
            from_phase,
            to_phase,
            when,
            span: self.finish(start),
        }))
    }

    fn parse_milestone_requires(&mut self) -> Result<MilestoneRequires, ParseError> {
        if self.eat_kw("ALL_OF") {
            self.expect_punct(&TokenKind::LParen, "(")?;
            let names = self.parse_name_list()?;
            self.expect_punct(&TokenKind::RParen, ")")?;
            Ok(MilestoneRequires::AllOf(names))
        } else if self.eat_kw("ANY_OF") {
            self.expect_punct(&TokenKind::LParen, "(")?;
            let names = self.parse_name_list()?;
            self.expect_punct(&TokenKind::RParen, ")")?;
            Ok(MilestoneRequires::AnyOf(names))
        } else {
            Ok(MilestoneRequires::Ref(self.expect_ident()?.0))
        }
    }

    fn parse_milestone(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("TARGET")?;
        let target = self.expect_date()?;
        self.expect_kw("LONGSTOP")?;
        let longstop = self.expect_date()?;
        let mut requires = None;
        let mut triggers = Vec::new();
        loop {
            if self.eat_kw("REQUIRES") {
                requires = Some(self.parse_milestone_requires()?);
            } else if self.eat_kw("TRIGGERS") {
                triggers = self.parse_name_list()?;
            } else {
                break;
            }
        }
        Ok(Statement::Milestone(MilestoneStmt {
            name,
            target,
            longstop,
            requires,
            triggers,
            span: self.finish(start),
        }))
    }

    fn parse_technical_milestone(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("TARGET")?;
        let target = self.expect_date()?;
        self.expect_kw("LONGSTOP")?;
        let longstop = self.expect_date()?;
        self.expect_kw("TARGET_VALUE")?;
        let target_value = self.parse_expr()?;
        let mut progress_metric = None;
        let mut requires = None;
        let mut triggers = Vec::new();
        loop {
            if self.eat_kw("PROGRESS_METRIC") {
                progress_metric = Some(self.expect_ident()?.0);
            } else if self.eat_kw("REQUIRES") {
                requires = Some(self.parse_milestone_requires()?);
            } else if self.eat_kw("TRIGGERS") {
                triggers = self.parse_name_list()?;
            } else {
                break;
            }
        }
        Ok(Statement::TechnicalMilestone(TechnicalMilestoneStmt {
            name,
            target,
            longstop,
            requires,
            triggers,
            target_value,
            progress_metric,
            span: self.finish(start),
        }))
    }

    fn parse_regulatory_requirement(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let citation = if self.eat_kw("CITATION") {
            Some(self.expect_string()?)
        } else {
            None
        };
        self.expect_kw("REQUIRES")?;
        let requires = self.parse_expr()?;
        Ok(Statement::RegulatoryRequirement(RegulatoryRequirementStmt {
            name,
            citation,
            requires,
            span: self.finish(start),
        }))
    }

    fn parse_performance_guarantee(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("GUARANTEED_OUTPUT")?;
        let guaranteed_output = self.parse_expr()?;
        let shortfall_remedy = if self.eat_kw("SHORTFALL_REMEDY") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::PerformanceGuarantee(PerformanceGuaranteeStmt {
            name,
            guaranteed_output,
            shortfall_remedy,
            span: self.finish(start),
        }))
    }

    fn parse_degradation_schedule(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("BASE_OUTPUT")?;
        let base_output = self.parse_expr()?;
        self.expect_kw("ANNUAL_FACTOR")?;
        let annual_factor = self.parse_expr()?;
        Ok(Statement::DegradationSchedule(DegradationScheduleStmt {
            name,
            base_output,
            annual_factor,
            span: self.finish(start),
        }))
    }

    fn parse_seasonal_adjustment(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("BASE")?;
        let base = self.parse_expr()?;
        let mut monthly_factors = Vec::new();
        while self.eat_kw("MONTH") {
            let month = self.expect_integer()?;
            let factor = self.parse_decimal_literal()?;
            monthly_factors.push((month as u32, factor));
        }
        Ok(Statement::SeasonalAdjustment(SeasonalAdjustmentStmt {
            name,
            base,
            monthly_factors,
            span: self.finish(start),
        }))
    }

    fn parse_decimal_literal(&mut self) -> Result<Decimal, ParseError> {
        match self.cur().kind {
            TokenKind::Number(d) | TokenKind::Ratio(d) => {
                self.bump();
                Ok(d)
            }
            TokenKind::Percentage(d) => {
                self.bump();
                Ok(d / Decimal::from(100))
            }
            _ => Err(self.err("expected a numeric literal", vec!["number"])),
        }
    }

    fn parse_tax_equity_structure(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("PRE_FLIP")?;
        let pre_flip_allocation = self.parse_decimal_literal()?;
        self.expect_kw("POST_FLIP")?;
        let post_flip_allocation = self.parse_decimal_literal()?;
        let flip_event = if self.eat_kw("FLIP_EVENT") {
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        Ok(Statement::TaxEquityStructure(TaxEquityStructureStmt {
            name,
            pre_flip_allocation,
            post_flip_allocation,
            flip_event,
            span: self.finish(start),
        }))
    }

    fn parse_tax_credit(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("BASIS")?;
        let basis = self.parse_expr()?;
        self.expect_kw("RATE")?;
        let rate = self.parse_expr()?;
        Ok(Statement::TaxCredit(TaxCreditStmt {
            name,
            basis,
            rate,
            span: self.finish(start),
        }))
    }

    fn parse_depreciation(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("METHOD")?;
        let (method, _) = self.expect_ident()?;
        self.expect_kw("BASIS")?;
        let basis = self.parse_expr()?;
        self.expect_kw("CLASS_LIFE")?;
        let class_life_years = self.expect_integer()?;
        Ok(Statement::Depreciation(DepreciationStmt {
            name,
            method,
            basis,
            class_life_years,
            span: self.finish(start),
        }))
    }

    fn parse_flip_event(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let mut target_irr = None;
        let mut target_date = None;
        loop {
            if self.eat_kw("TARGET_IRR") {
                target_irr = Some(self.parse_expr()?);
            } else if self.eat_kw("TARGET_DATE") {
                target_date = Some(self.expect_date()?);
            } else {
                break;
            }
        }
        Ok(Statement::FlipEvent(FlipEventStmt {
            name,
            target_irr,
            target_date,
            span: self.finish(start),
        }))
    }

    fn parse_reserve(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("TARGET")?;
        let target = self.parse_expr()?;
        let mut minimum = None;
        let mut funded_by = Vec::new();
        let mut released_to = None;
        let mut released_for = None;
        loop {
            if self.eat_kw("MINIMUM") {
                minimum = Some(self.parse_expr()?);
            } else if self.eat_kw("FUNDED_BY") {
                funded_by = self.parse_name_list()?;
            } else if self.eat_kw("RELEASED_TO") {
                released_to = Some(self.expect_ident()?.0);
            } else if self.eat_kw("RELEASED_FOR") {
                released_for = Some(self.expect_ident()?.0);
            } else {
                break;
            }
        }
        Ok(Statement::Reserve(ReserveStmt {
            name,
            target,
            minimum,
            funded_by,
            released_to,
            released_for,
            span: self.finish(start),
        }))
    }

    fn parse_waterfall_frequency(&mut self) -> Result<WaterfallFrequency, ParseError> {
        let (name, span) = self.expect_ident()?;
        match name.to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(WaterfallFrequency::Monthly),
            "QUARTERLY" => Ok(WaterfallFrequency::Quarterly),
            "ANNUALLY" => Ok(WaterfallFrequency::Annually),
            other => Err(ParseError {
                message: format!("unknown waterfall frequency '{other}'"),
                location: span.start,
                expected: vec!["MONTHLY".into(), "QUARTERLY".into(), "ANNUALLY".into()],
                found: other.to_string(),
            }),
        }
    }

    fn parse_waterfall(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let frequency = if self.eat_kw("FREQUENCY") {
            Some(self.parse_waterfall_frequency()?)
        } else {
            None
        };
        let mut tiers = Vec::new();
        while self.eat_kw("TIER") {
            let priority = self.expect_integer()?;
            let label = self.expect_string()?;
            self.expect_kw("PAY")?;
            let pay = self.parse_expr()?;
            self.expect_kw("FROM")?;
            let from = if self.eat_kw("REVENUE") {
                TierSource::Revenue
            } else if self.eat_kw("REMAINDER") {
                TierSource::Remainder
            } else {
                return Err(self.err("expected REVENUE or REMAINDER", vec!["REVENUE", "REMAINDER"]));
            };
            let mut until = None;
            let mut shortfall_to = None;
            let mut pay_to = None;
            let mut if_cond = None;
            loop {
                if self.eat_kw("UNTIL") {
                    until = Some(self.parse_expr()?);
                } else if self.eat_kw("SHORTFALL_TO") {
                    shortfall_to = Some(self.expect_ident()?.0);
                } else if self.eat_kw("PAY_TO") {
                    pay_to = Some(self.expect_ident()?.0);
                } else if self.eat_kw("IF") {
                    if_cond = Some(self.parse_expr()?);
                } else {
                    break;
                }
            }
            tiers.push(Tier {
                priority,
                label,
                pay,
                from,
                until,
                shortfall_to,
                pay_to,
                if_cond,
            });
        }
        Ok(Statement::Waterfall(WaterfallStmt {
            name,
            frequency,
            tiers,
            span: self.finish(start),
        }))
    }

    fn parse_cp_status(&mut self) -> Result<CpStatus, ParseError> {
        let (name, span) = self.expect_ident()?;
        match name.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(CpStatus::Pending),
            "SATISFIED" => Ok(CpStatus::Satisfied),
            "WAIVED" => Ok(CpStatus::Waived),
            "NOT_APPLICABLE" => Ok(CpStatus::NotApplicable),
            other => Err(ParseError {
                message: format!("unknown CP status '{other}'"),
                location: span.start,
                expected: vec!["PENDING".into(), "SATISFIED".into(), "WAIVED".into(), "NOT_APPLICABLE".into()],
                found: other.to_string(),
            }),
        }
    }

    fn parse_conditions_precedent(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        let section = if self.eat_kw("SECTION") {
            Some(self.expect_string()?)
        } else {
            None
        };
        let mut items = Vec::new();
        while self.eat_kw("ITEM") {
            let (item_name, _) = self.expect_ident()?;
            let mut description = None;
            let mut responsible = None;
            let mut initial_status = CpStatus::Pending;
            let mut satisfies = Vec::new();
            loop {
                if self.eat_kw("DESC") {
                    description = Some(self.expect_string()?);
                } else if self.eat_kw("RESPONSIBLE") {
                    responsible = Some(self.expect_ident()?.0);
                } else if self.eat_kw("STATUS") {
                    initial_status = self.parse_cp_status()?;
                } else if self.eat_kw("SATISFIES") {
                    satisfies = self.parse_name_list()?;
                } else {
                    break;
                }
            }
            items.push(CpItem {
                name: item_name,
                description,
                responsible,
                initial_status,
                satisfies,
            });
        }
        Ok(Statement::ConditionsPrecedent(ConditionsPrecedentStmt {
            name,
            section,
            items,
            span: self.finish(start),
        }))
    }

    fn parse_load(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw("FROM")?;
        let source = self.expect_string()?;
        Ok(Statement::Load(LoadStmt {
            name,
            source,
            span: self.finish(start),
        }))
    }

    fn parse_statement_kind(&mut self) -> Result<StatementKind, ParseError> {
        let (name, span) = self.expect_ident()?;
        use StatementKind::*;
        Ok(match name.to_ascii_uppercase().as_str() {
            "DEFINE" => Define,
            "COVENANT" => Covenant,
            "BASKET" => Basket,
            "CONDITION" => Condition,
            "PROHIBIT" => Prohibit,
            "EVENT" => Event,
            "PHASE" => Phase,
            "TRANSITION" => Transition,
            "MILESTONE" => Milestone,
            "TECHNICAL_MILESTONE" => TechnicalMilestone,
            "REGULATORY_REQUIREMENT" => RegulatoryRequirement,
            "PERFORMANCE_GUARANTEE" => PerformanceGuarantee,
            "DEGRADATION_SCHEDULE" => DegradationSchedule,
            "SEASONAL_ADJUSTMENT" => SeasonalAdjustment,
            "TAX_EQUITY_STRUCTURE" => TaxEquityStructure,
            "TAX_CREDIT" => TaxCredit,
            "DEPRECIATION" => Depreciation,
            "FLIP_EVENT" => FlipEvent,
            "RESERVE" => Reserve,
            "WATERFALL" => Waterfall,
            "CONDITIONS_PRECEDENT" => ConditionsPrecedent,
            "LOAD" => Load,
            other => {
                return Err(ParseError {
                    message: format!("unknown statement kind '{other}'"),
                    location: span.start,
                    expected: vec!["COVENANT".into(), "BASKET".into()],
                    found: other.to_string(),
                })
            }
        })
    }

    fn parse_amendment(&mut self, start: Location) -> Result<Statement, ParseError> {
        self.bump();
        let number = self.expect_integer()?;
        let mut effective = None;
        let mut description = None;
        loop {
            if self.eat_kw("EFFECTIVE") {
                effective = Some(self.expect_date()?);
            } else if self.eat_kw("DESCRIPTION") {
                description = Some(self.expect_string()?);
            } else {
                break;
            }
        }

        let mut directives = Vec::new();
        loop {
            if self.eat_kw("ADD") {
                let statement = self.parse_statement()?;
                directives.push(AmendmentDirective::Add(Box::new(statement)));
            } else if self.eat_kw("DELETE") {
                let kind = self.parse_statement_kind()?;
                let (name, _) = self.expect_ident()?;
                directives.push(AmendmentDirective::Delete { kind, name });
            } else if self.eat_kw("REPLACE") {
                let kind = self.parse_statement_kind()?;
                let (name, _) = self.expect_ident()?;
                let statement = self.parse_statement()?;
                directives.push(AmendmentDirective::Replace {
                    kind,
                    name,
                    statement: Box::new(statement),
                });
            } else if self.eat_kw("MODIFY") {
                let kind = self.parse_statement_kind()?;
                let (name, _) = self.expect_ident()?;
                self.expect_kw("SET")?;
                let mut fields = vec![self.parse_modify_field()?];
                while self.eat_punct(&TokenKind::Comma) {
                    fields.push(self.parse_modify_field()?);
                }
                directives.push(AmendmentDirective::Modify { kind, name, fields });
            } else {
                break;
            }
        }

        Ok(Statement::Amendment(AmendmentStmt {
            number,
            effective,
            description,
            directives,
            span: self.finish(start),
        }))
    }

    fn parse_modify_field(&mut self) -> Result<ModifyField, ParseError> {
        let (field, _) = self.expect_ident()?;
        if !self.eat_punct(&TokenKind::Eq) {
            return Err(self.err("expected '=' in SET clause", vec!["="]));
        }
        let value = self.parse_expr()?;
        Ok(ModifyField { field, value })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat_kw("OR") {
            let rhs = self.parse_and()?;
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_compare()?;
        while self.eat_kw("AND") {
            let rhs = self.parse_compare()?;
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_additive()?;
        if matches!(
            self.cur().kind,
            TokenKind::Le | TokenKind::Ge | TokenKind::Lt | TokenKind::Gt | TokenKind::Eq | TokenKind::Ne
        ) {
            let op = self.parse_compare_op()?;
            let rhs = self.parse_additive()?;
            let span = lhs.span().to(rhs.span());
            Ok(Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            })
        } else {
            Ok(lhs)
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_mul()?;
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.cur_span().start;
        if self.eat_punct(&TokenKind::Minus) {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        if self.eat_kw("NOT") {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.cur_span().start;
        match self.cur().kind.clone() {
            TokenKind::Number(d) => {
                let span = self.bump().span;
                Ok(Expr::Number(d, span))
            }
            TokenKind::Currency(d) => {
                let span = self.bump().span;
                Ok(Expr::Currency(d, span))
            }
            TokenKind::Percentage(d) => {
                let span = self.bump().span;
                Ok(Expr::Percentage(d, span))
            }
            TokenKind::Ratio(d) => {
                let span = self.bump().span;
                Ok(Expr::Ratio(d, span))
            }
            TokenKind::Bps(d) => {
                let span = self.bump().span;
                Ok(Expr::Bps(d, span))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect_punct(&TokenKind::RParen, ")")?;
                Ok(inner)
            }
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("TRAILING") => {
                self.bump();
                let n = self.expect_integer()? as u32;
                let unit = self.parse_trailing_unit()?;
                self.expect_kw("OF")?;
                let expr = self.parse_unary()?;
                let span = Span::new(start, expr.span().end);
                Ok(Expr::Trailing {
                    n,
                    unit,
                    expr: Box::new(expr),
                    span,
                })
            }
            TokenKind::Ident(name) => {
                self.bump();
                if self.eat_punct(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.cur().kind != TokenKind::RParen {
                        args.push(self.parse_expr()?);
                        while self.eat_punct(&TokenKind::Comma) {
                            args.push(self.parse_expr()?);
                        }
                    }
                    let end = self.cur_span().end;
                    self.expect_punct(&TokenKind::RParen, ")")?;
                    Ok(Expr::Call {
                        name,
                        args,
                        span: Span::new(start, end),
                    })
                } else {
                    let span = self.tokens[self.pos - 1].span;
                    Ok(Expr::Ident(name, span))
                }
            }
            _ => Err(self.err("expected an expression", vec!["expression"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_define_with_excluding_and_cap() {
        let src = "DEFINE EBITDA = NetIncome + Interest EXCLUDING OneTimeCharges CAPPED_AT $5_000_000";
        let program = parse(src).unwrap();
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Statement::Define(d) => {
                assert_eq!(d.name, "EBITDA");
                assert_eq!(d.excluding, vec!["OneTimeCharges".to_string()]);
                assert!(d.capped_at.is_some());
            }
            _ => panic!("expected Define"),
        }
    }

    #[test]
    fn parses_covenant_with_cure_and_step_down() {
        let src = "COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY \
                   CURE EquityCureRight MAX_USES 2 WINDOW 4 QUARTERS MAX_AMOUNT $10_000_000 \
                   STEP_DOWN AFTER 2027-01-01 TO 3.5x";
        let program = parse(src).unwrap();
        match &program.statements[0] {
            Statement::Covenant(c) => {
                assert_eq!(c.operator, CompareOp::Le);
                assert_eq!(c.tested, TestFrequency::Quarterly);
                assert!(c.cure.is_some());
                assert_eq!(c.step_downs.len(), 1);
            }
            _ => panic!("expected Covenant"),
        }
    }

    #[test]
    fn parses_waterfall_with_multiple_tiers() {
        let src = r#"WATERFALL Distributions FREQUENCY QUARTERLY
            TIER 1 "Senior Debt Service" PAY DebtService FROM REVENUE
            TIER 2 "Reserve Funding" PAY ReserveTopUp FROM REMAINDER SHORTFALL_TO DSRA
            TIER 3 "Residual" PAY Remaining FROM REMAINDER"#;
        let program = parse(src).unwrap();
        match &program.statements[0] {
            Statement::Waterfall(w) => {
                assert_eq!(w.tiers.len(), 3);
                assert_eq!(w.tiers[1].shortfall_to, Some("DSRA".to_string()));
            }
            _ => panic!("expected Waterfall"),
        }
    }

    #[test]
    fn error_reports_location_and_expected() {
        let src = "COVENANT Leverage REQUIRES Debt / EBITDA TESTED QUARTERLY";
        let err = parse(src).unwrap_err();
        assert!(err.expected.iter().any(|e| e == "<=" || e == ">="));
    }

    #[test]
    fn parses_nested_amendment_directives() {
        let src = r#"AMENDMENT 1 EFFECTIVE 2026-06-01 DESCRIPTION "First amendment"
            MODIFY COVENANT MaxLeverage SET threshold = 4.5x
            DELETE BASKET RestrictedPaymentsBasket"#;
        let program = parse(src).unwrap();
        match &program.statements[0] {
            Statement::Amendment(a) => {
                assert_eq!(a.number, 1);
                assert_eq!(a.directives.len(), 2);
            }
            _ => panic!("expected Amendment"),
        }
    }
}
