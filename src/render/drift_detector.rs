//! Compares externally edited prose against the rendered expectation
//! (spec.md §4.7): extracts section-level chunks from both texts, matches
//! by section reference, then pattern-matches phrase-level differences
//! within each matched section.

use serde::{Deserialize, Serialize};

use crate::render::word_renderer::{RenderedDocument, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftFinding {
    pub section_reference: String,
    pub element_name: String,
    pub change_category: String,
    pub confidence: f64,
    pub severity: Severity,
    pub suggested_snippet: Option<String>,
    pub source_form: String,
}

/// lexer-adjacent: split prose into loosely section-demarcated chunks by
/// looking for a leading "(<label>)" marker line, mirroring the shape the
/// renderer produces
fn split_into_chunks(text: &str) -> Vec<(String, String)> {
    let mut chunks = Vec::new();
    let mut current_label: Option<String> = None;
    let mut current_text = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('(') {
            if let Some(close) = rest.find(')') {
                if !current_text.is_empty() {
                    if let Some(label) = current_label.take() {
                        chunks.push((label, std::mem::take(&mut current_text)));
                    }
                }
                current_label = Some(rest[..close].to_string());
            }
        }
        current_text.push_str(line);
        current_text.push('\n');
    }
    if let Some(label) = current_label {
        chunks.push((label, current_text));
    }
    chunks
}

fn numbers_in(text: &str) -> Vec<String> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            current.push(ch);
        } else if !current.is_empty() {
            numbers.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        numbers.push(current);
    }
    numbers
}

fn classify_phrase_diff(expected: &str, actual: &str) -> (&'static str, f64, Severity) {
    let expected_numbers = numbers_in(expected);
    let actual_numbers = numbers_in(actual);
    if expected_numbers != actual_numbers {
        let threshold_like = expected.contains("exceed") || expected.contains("to 1.00") || actual.contains("exceed") || actual.contains("to 1.00");
        let capacity_like = expected.contains("not to exceed") || actual.contains("not to exceed");
        if threshold_like || capacity_like {
            return ("threshold_or_capacity_changed", 0.85, Severity::High);
        }
        return ("numeric_value_changed", 0.6, Severity::Medium);
    }
    if expected.to_ascii_lowercase().contains("greater of") != actual.to_ascii_lowercase().contains("greater of") {
        return ("structural_change", 0.55, Severity::Medium);
    }
    if expected.to_ascii_lowercase().contains("cure") != actual.to_ascii_lowercase().contains("cure") {
        return ("cure_provision_changed", 0.7, Severity::High);
    }
    ("wording_change", 0.3, Severity::Low)
}

/// Compares `edited_text` against `expected` (the renderer's output for
/// the current AST). Findings below confidence 0.5 are reported but
/// flagged so the caller can hide them unless `verbose` is requested
/// (spec.md §7's drift-detector omission rule).
pub fn detect_drift(expected: &RenderedDocument, edited_text: &str) -> Vec<DriftFinding> {
    let edited_chunks = split_into_chunks(edited_text);
    let mut findings = Vec::new();

    for section in &expected.sections {
        let expected_chunk = find_chunk_for(section, &expected.full_text);
        let matched = edited_chunks
            .iter()
            .find(|(label, _)| section_label_matches(section, label));
        match matched {
            None => {
                findings.push(DriftFinding {
                    section_reference: section.section_reference.clone(),
                    element_name: section.element_name.clone(),
                    change_category: "section_missing".to_string(),
                    confidence: 0.9,
                    severity: Severity::High,
                    suggested_snippet: None,
                    source_form: section.element_kind.clone(),
                });
                continue;
            }
            Some((_, actual_text)) => {
                if normalize_whitespace(actual_text) == normalize_whitespace(&expected_chunk) {
                    continue;
                }
                let (category, confidence, severity) = classify_phrase_diff(&expected_chunk, actual_text);
                findings.push(DriftFinding {
                    section_reference: section.section_reference.clone(),
                    element_name: section.element_name.clone(),
                    change_category: category.to_string(),
                    confidence,
                    severity,
                    suggested_snippet: Some(suggested_snippet(section)),
                    source_form: section.element_kind.clone(),
                });
            }
        }
    }
    findings
}

fn find_chunk_for(section: &Section, _full_text: &str) -> String {
    section.text.clone()
}

fn section_label_matches(section: &Section, label: &str) -> bool {
    section.text.trim_start().starts_with(&format!("({label})"))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn suggested_snippet(section: &Section) -> String {
    match section.element_kind.as_str() {
        "Covenant" => format!("COVENANT {} REQUIRES <metric> <= <threshold>", section.element_name),
        "Basket" => format!("BASKET {} CAPACITY <expr>", section.element_name),
        other => format!("{} {} ...", other.to_ascii_uppercase(), section.element_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::render::word_renderer::render;

    #[test]
    fn unchanged_prose_produces_no_findings() {
        let program = parse("COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n").unwrap();
        let doc = render(&program, "Credit Agreement");
        let findings = detect_drift(&doc, &doc.full_text);
        assert!(findings.is_empty());
    }

    #[test]
    fn threshold_edit_is_flagged_high_severity() {
        let program = parse("COVENANT MaxLeverage REQUIRES Debt / EBITDA <= 4.0x TESTED QUARTERLY\n").unwrap();
        let doc = render(&program, "Credit Agreement");
        let edited = doc.full_text.replace("4.00 to 1.00", "4.50 to 1.00");
        let findings = detect_drift(&doc, &edited);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }
}
