//! Classifies a [`Diff`] into a stable, human-readable [`Change`] with a
//! borrower/lender-favorability impact, per the authoritative heuristic
//! table in spec.md §4.5.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::{CompareOp, StatementKind};
use crate::diff::differ::{ChangeType, Diff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    BorrowerFavorable,
    LenderFavorable,
    Neutral,
    Unclear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub title: String,
    pub description: String,
    pub impact: Impact,
    pub impact_description: Option<String>,
    pub section_reference: &'static str,
    pub source_form: String,
}

/// parses a canonical expression rendering (`"$25000000"`, `"5.25x"`,
/// `"5.25"`) back into a `Decimal`, stripping the currency/ratio/bps
/// suffix decoration spec.md's canonical-value comparisons need.
fn parse_numeric(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix("bps")
        .or_else(|| trimmed.strip_suffix('x'))
        .or_else(|| trimmed.strip_suffix('%'))
        .unwrap_or(trimmed);
    trimmed.replace(',', "").parse().ok()
}

fn section_reference(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Define => "Article 1",
        StatementKind::Covenant => "Article 7.11",
        StatementKind::Basket => "Article 7.02",
        StatementKind::ConditionsPrecedent => "Article 4",
        StatementKind::Phase | StatementKind::Milestone | StatementKind::Reserve | StatementKind::Waterfall => "Article 6",
        StatementKind::Event => "Article 8",
        _ => "Schedule",
    }
}

fn source_form(kind: StatementKind, diff: &Diff) -> String {
    match kind {
        StatementKind::Covenant => "covenant-simple".to_string(),
        StatementKind::Basket => {
            let is_grower = diff
                .to_element
                .as_ref()
                .and_then(|s| match s {
                    crate::ast::Statement::Basket(b) => Some(b.floor.is_some()),
                    _ => None,
                })
                .unwrap_or(false);
            if is_grower { "basket-grower".to_string() } else { "basket-simple".to_string() }
        }
        other => format!("{other:?}").to_lowercase(),
    }
}

fn covenant_operator(diff: &Diff) -> Option<CompareOp> {
    diff.to_element
        .as_ref()
        .or(diff.from_element.as_ref())
        .and_then(|s| match s {
            crate::ast::Statement::Covenant(c) => Some(c.operator),
            _ => None,
        })
}

fn classify_covenant(diff: &Diff) -> (Impact, Option<String>) {
    match diff.change_type {
        ChangeType::Added => (Impact::LenderFavorable, None),
        ChangeType::Removed => (Impact::BorrowerFavorable, None),
        ChangeType::Modified => {
            if let Some(fc) = diff.field_changes.iter().find(|f| f.field == "cure") {
                return if fc.from_value.is_empty() && !fc.to_value.is_empty() {
                    (Impact::BorrowerFavorable, Some("cure right added".to_string()))
                } else if !fc.from_value.is_empty() && fc.to_value.is_empty() {
                    (Impact::LenderFavorable, Some("cure right removed".to_string()))
                } else {
                    (Impact::Neutral, None)
                };
            }
            if let Some(fc) = diff.field_changes.iter().find(|f| f.field == "threshold") {
                let (Some(from), Some(to)) = (parse_numeric(&fc.from_value), parse_numeric(&fc.to_value)) else {
                    return (Impact::Unclear, None);
                };
                let raised = to > from;
                return match covenant_operator(diff) {
                    Some(CompareOp::Le) | Some(CompareOp::Lt) => {
                        if raised {
                            (Impact::BorrowerFavorable, Some("threshold raised".to_string()))
                        } else {
                            (Impact::LenderFavorable, Some("threshold lowered".to_string()))
                        }
                    }
                    Some(CompareOp::Ge) | Some(CompareOp::Gt) => {
                        if raised {
                            (Impact::LenderFavorable, Some("threshold raised".to_string()))
                        } else {
                            (Impact::BorrowerFavorable, Some("threshold lowered".to_string()))
                        }
                    }
                    _ => (Impact::Unclear, None),
                };
            }
            (Impact::Neutral, None)
        }
    }
}

fn classify_basket(diff: &Diff) -> (Impact, Option<String>) {
    match diff.change_type {
        ChangeType::Added => (Impact::BorrowerFavorable, None),
        ChangeType::Removed => (Impact::LenderFavorable, None),
        ChangeType::Modified => {
            for field in ["capacity", "floor", "maximum"] {
                if let Some(fc) = diff.field_changes.iter().find(|f| f.field == field) {
                    let (Some(from), Some(to)) = (parse_numeric(&fc.from_value), parse_numeric(&fc.to_value)) else {
                        continue;
                    };
                    return if to > from {
                        (Impact::BorrowerFavorable, Some(format!("{field} raised")))
                    } else if to < from {
                        (Impact::LenderFavorable, Some(format!("{field} lowered")))
                    } else {
                        continue;
                    };
                }
            }
            (Impact::Neutral, None)
        }
    }
}

/// Classifies one diff into a fully-formed [`Change`] (spec.md §4.5's
/// authoritative heuristic table).
pub fn classify_change(diff: &Diff) -> Change {
    let (impact, impact_description) = match diff.element_type {
        StatementKind::Covenant => classify_covenant(diff),
        StatementKind::Basket => classify_basket(diff),
        StatementKind::Define => (Impact::Neutral, None),
        _ => (Impact::Neutral, None),
    };

    let verb = match diff.change_type {
        ChangeType::Added => "added",
        ChangeType::Removed => "removed",
        ChangeType::Modified => "modified",
    };
    let title = format!("{:?} {} {}", diff.element_type, diff.element_name, verb);
    let description = if diff.field_changes.is_empty() {
        title.clone()
    } else {
        let parts: Vec<String> = diff
            .field_changes
            .iter()
            .map(|f| format!("{}: {} -> {}", f.field, f.from_value, f.to_value))
            .collect();
        format!("{title} ({})", parts.join(", "))
    };

    Change {
        id: format!("{:?}:{}", diff.element_type, diff.element_name),
        title,
        description,
        impact,
        impact_description,
        section_reference: section_reference(diff.element_type),
        source_form: source_form(diff.element_type, diff),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub by_kind: std::collections::HashMap<String, usize>,
    pub by_impact: std::collections::HashMap<String, usize>,
    pub changes: Vec<Change>,
    pub created_at: NaiveDate,
    pub author_party: Option<String>,
}

pub fn summarize(diffs: &[Diff], created_at: NaiveDate, author_party: Option<String>) -> ChangeSummary {
    let changes: Vec<Change> = diffs.iter().map(classify_change).collect();
    let mut by_kind = std::collections::HashMap::new();
    let mut by_impact = std::collections::HashMap::new();
    for (diff, change) in diffs.iter().zip(&changes) {
        *by_kind.entry(format!("{:?}", diff.element_type)).or_insert(0) += 1;
        let impact_key = match change.impact {
            Impact::BorrowerFavorable => "borrower_favorable",
            Impact::LenderFavorable => "lender_favorable",
            Impact::Neutral => "neutral",
            Impact::Unclear => "unclear",
        };
        *by_impact.entry(impact_key.to_string()).or_insert(0) += 1;
    }
    ChangeSummary {
        by_kind,
        by_impact,
        changes,
        created_at,
        author_party,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compiler::compile_source;
    use crate::diff::differ::diff_sources;

    #[test]
    fn raised_le_threshold_is_borrower_favorable() {
        let from = compile_source("COVENANT MaxLeverage REQUIRES Leverage <= 5.00 TESTED QUARTERLY\n");
        let to = compile_source("COVENANT MaxLeverage REQUIRES Leverage <= 5.25 TESTED QUARTERLY\n");
        let result = diff_sources(&from, &to);
        let change = classify_change(&result.diffs[0]);
        assert_eq!(change.impact, Impact::BorrowerFavorable);
    }

    #[test]
    fn basket_capacity_markup_summary_counts_borrower_favorable() {
        let from = compile_source(
            "COVENANT MaxLeverage REQUIRES Leverage <= 5.00 TESTED QUARTERLY\n\
             BASKET GeneralRP CAPACITY $25,000,000\n",
        );
        let to = compile_source(
            "COVENANT MaxLeverage REQUIRES Leverage <= 5.25 TESTED QUARTERLY\n\
             BASKET GeneralRP CAPACITY $35,000,000\n",
        );
        let result = diff_sources(&from, &to);
        let summary = summarize(&result.diffs, NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), None);
        assert_eq!(summary.by_impact.get("borrower_favorable").copied(), Some(2));
        assert_eq!(summary.by_impact.get("lender_favorable").copied(), None);
    }
}
