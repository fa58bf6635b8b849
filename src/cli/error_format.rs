//! The parse-error caret formatter (spec.md §6.4): renders a
//! [`crate::parser::ParseError`] the way a compiler would, pointing at
//! the offending source line.

use std::fmt;

use crate::parser::ParseError;

pub struct FormattedParseError<'a> {
    file: &'a str,
    source: &'a str,
    error: &'a ParseError,
}

pub fn format_parse_error<'a>(file: &'a str, source: &'a str, error: &'a ParseError) -> FormattedParseError<'a> {
    FormattedParseError { file, source, error }
}

impl fmt::Display for FormattedParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = &self.error.location;
        let line_text = self.source.lines().nth(loc.line.saturating_sub(1)).unwrap_or("");

        writeln!(f, "Parse Error")?;
        writeln!(f, "------------------------------------------------------------")?;
        writeln!(f, "  --> {}:{}:{}", self.file, loc.line, loc.column)?;
        writeln!(f, "   |")?;
        writeln!(f, "{:>3} | {}", loc.line, line_text)?;
        let caret_pad = " ".repeat(loc.column.saturating_sub(1));
        writeln!(f, "   | {caret_pad}^^^^")?;
        writeln!(f, "Error: {}", self.error.message)?;
        match self.error.expected.len() {
            0 => {}
            1 => writeln!(f, "Expected: {}", self.error.expected[0])?,
            _ => {
                let shown: Vec<&String> = self.error.expected.iter().take(5).collect();
                let rendered: Vec<String> = shown.iter().map(|s| s.to_string()).collect();
                writeln!(f, "Expected one of: {}", rendered.join(", "))?;
            }
        }
        let found = if self.error.found.is_empty() { "end of input".to_string() } else { format!("\"{}\"", self.error.found) };
        write!(f, "Found: {found}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn renders_caret_at_the_failing_token() {
        let source = "COVENANT Leverage REQUIRES Debt / EBITDA TESTED QUARTERLY";
        let err = parse(source).unwrap_err();
        let rendered = format_parse_error("agreement.proviso", source, &err).to_string();
        assert!(rendered.starts_with("Parse Error\n"));
        assert!(rendered.contains("--> agreement.proviso:"));
        assert!(rendered.contains("^^^^"));
        assert!(rendered.contains("Found:"));
    }
}
