//! Hand-written tokenizer. Keywords are not special-cased here — they
//! surface as ordinary [`TokenKind::Ident`] tokens and the parser matches
//! on the uppercased text, the same way most of this grammar's keywords
//! read naturally as capitalized words in source (`DEFINE`, `COVENANT`,
//! `REQUIRES`, ...).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::span::{Location, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(Decimal),
    Currency(Decimal),
    Percentage(Decimal),
    Ratio(Decimal),
    Bps(Decimal),
    Date(NaiveDate),
    Str(String),
    Comment { text: String, block: bool },
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Le,
    Ge,
    Lt,
    Gt,
    Eq,
    Ne,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub location: Location,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            chars: src.chars().collect(),
            pos: 0,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn loc(&self) -> Location {
        Location {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.loc();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start),
                });
                break;
            };

            let kind = match c {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                ';' => {
                    self.advance();
                    TokenKind::Semicolon
                }
                '+' => {
                    self.advance();
                    TokenKind::Plus
                }
                '-' => {
                    self.advance();
                    TokenKind::Minus
                }
                '*' => {
                    self.advance();
                    TokenKind::Star
                }
                '/' => {
                    if self.peek_at(1) == Some('/') {
                        self.lex_line_comment()
                    } else if self.peek_at(1) == Some('*') {
                        self.lex_block_comment(start)?
                    } else {
                        self.advance();
                        TokenKind::Slash
                    }
                }
                '<' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '=' => {
                    self.advance();
                    TokenKind::Eq
                }
                '!' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Ne
                    } else {
                        return Err(LexError {
                            message: "unexpected '!'".to_string(),
                            location: start,
                        });
                    }
                }
                '"' => self.lex_string(start)?,
                '$' => self.lex_currency(start)?,
                c if c.is_ascii_digit() => self.lex_number_or_date(start)?,
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                other => {
                    return Err(LexError {
                        message: format!("unexpected character '{other}'"),
                        location: start,
                    });
                }
            };

            let end = self.loc();
            tokens.push(Token {
                kind,
                span: Span::new(start, end),
            });
        }
        Ok(tokens)
    }

    fn lex_line_comment(&mut self) -> TokenKind {
        self.advance();
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        TokenKind::Comment {
            text: text.trim().to_string(),
            block: false,
        }
    }

    fn lex_block_comment(&mut self, start: Location) -> Result<TokenKind, LexError> {
        self.advance();
        self.advance();
        let mut text = String::new();
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some('*'), Some('/')) => {
                    self.advance();
                    self.advance();
                    break;
                }
                (Some(c), _) => {
                    text.push(c);
                    self.advance();
                }
                (None, _) => {
                    return Err(LexError {
                        message: "unterminated block comment".to_string(),
                        location: start,
                    });
                }
            }
        }
        Ok(TokenKind::Comment {
            text: text.trim().to_string(),
            block: true,
        })
    }

    fn lex_string(&mut self, start: Location) -> Result<TokenKind, LexError> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => {
                        return Err(LexError {
                            message: "unterminated string literal".to_string(),
                            location: start,
                        });
                    }
                },
                Some(c) => s.push(c),
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        location: start,
                    });
                }
            }
        }
        Ok(TokenKind::Str(s))
    }

    fn lex_digits(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    s.push(c);
                }
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn lex_currency(&mut self, start: Location) -> Result<TokenKind, LexError> {
        self.advance();
        let raw = self.lex_number_raw(start)?;
        let d = Decimal::from_str(&raw).map_err(|e| LexError {
            message: format!("invalid number literal: {e}"),
            location: start,
        })?;
        Ok(TokenKind::Currency(d))
    }

    fn lex_number_raw(&mut self, start: Location) -> Result<String, LexError> {
        let mut s = self.lex_digits();
        if s.is_empty() {
            return Err(LexError {
                message: "expected digits".to_string(),
                location: start,
            });
        }
        if self.peek() == Some('.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            s.push('.');
            self.advance();
            s.push_str(&self.lex_digits());
        }
        Ok(s)
    }

    fn lex_number_or_date(&mut self, start: Location) -> Result<TokenKind, LexError> {
        // a date literal is YYYY-MM-DD: four digits, '-', two digits, '-', two digits
        if self.looks_like_date() {
            return self.lex_date(start);
        }
        let raw = self.lex_number_raw(start)?;
        let d = Decimal::from_str(&raw).map_err(|e| LexError {
            message: format!("invalid number literal: {e}"),
            location: start,
        })?;
        match self.peek() {
            Some('%') => {
                self.advance();
                Ok(TokenKind::Percentage(d))
            }
            Some('x') if !self.peek_at(1).map(|c| c.is_alphanumeric()).unwrap_or(false) => {
                self.advance();
                Ok(TokenKind::Ratio(d))
            }
            Some('b') if self.matches_keyword("bps") => {
                self.advance();
                self.advance();
                self.advance();
                Ok(TokenKind::Bps(d))
            }
            _ => Ok(TokenKind::Number(d)),
        }
    }

    fn matches_keyword(&self, kw: &str) -> bool {
        kw.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn looks_like_date(&self) -> bool {
        let digits_at = |from: usize, n: usize| -> bool {
            (0..n).all(|i| self.peek_at(from + i).map(|c| c.is_ascii_digit()).unwrap_or(false))
        };
        digits_at(0, 4)
            && self.peek_at(4) == Some('-')
            && digits_at(5, 2)
            && self.peek_at(7) == Some('-')
            && digits_at(8, 2)
            && !self.peek_at(10).map(|c| c.is_ascii_digit()).unwrap_or(false)
    }

    fn lex_date(&mut self, start: Location) -> Result<TokenKind, LexError> {
        let mut raw = String::new();
        for _ in 0..10 {
            raw.push(self.advance().unwrap());
        }
        let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| LexError {
            message: format!("invalid date literal '{raw}': {e}"),
            location: start,
        })?;
        Ok(TokenKind::Date(date))
    }

    fn lex_ident(&mut self) -> TokenKind {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident(s)
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_keywords_as_idents() {
        let tokens = tokenize("DEFINE EBITDA = 100").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("DEFINE".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::Ident("EBITDA".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::Eq);
    }

    #[test]
    fn tokenizes_currency_percentage_ratio_bps() {
        let tokens = tokenize("$1_000_000 15% 3.0x 250bps").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Currency(Decimal::from(1_000_000)));
        assert_eq!(tokens[1].kind, TokenKind::Percentage(Decimal::from(15)));
        assert_eq!(tokens[2].kind, TokenKind::Ratio(Decimal::new(30, 1)));
        assert_eq!(tokens[3].kind, TokenKind::Bps(Decimal::from(250)));
    }

    #[test]
    fn tokenizes_date_literal() {
        let tokens = tokenize("2026-03-31").unwrap();
        assert_eq!(
            tokens[0].kind,
            TokenKind::Date(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap())
        );
    }

    #[test]
    fn tokenizes_line_and_block_comments() {
        let tokens = tokenize("// a note\n/* block\ntext */").unwrap();
        assert_eq!(
            tokens[0].kind,
            TokenKind::Comment {
                text: "a note".to_string(),
                block: false
            }
        );
        assert_eq!(
            tokens[1].kind,
            TokenKind::Comment {
                text: "block\ntext".to_string(),
                block: true
            }
        );
    }

    #[test]
    fn tokenizes_string_with_escapes() {
        let tokens = tokenize("\"hello \\\"world\\\"\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("hello \"world\"".to_string()));
    }

    #[test]
    fn reports_location_on_unexpected_character() {
        let err = tokenize("DEFINE X = @").unwrap_err();
        assert_eq!(err.location.column, 12);
    }
}
