pub mod ast;
pub mod decimal;
pub mod diff;
pub mod errors;
pub mod events;
pub mod financials;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod span;
pub mod state;
pub mod validator;

#[cfg(feature = "cli")]
pub mod cli;

// re-export key types
pub use ast::{Expr, Program, Statement, StatementKind};
pub use decimal::{Money, Rate};
pub use diff::classifier::{Change, ChangeSummary, Impact};
pub use diff::differ::{Diff, DiffResult};
pub use errors::{ProvisoError, Result};
pub use events::{Event, EventStore};
pub use financials::{FinancialHistory, FinancialObservation, Period, PeriodType};
pub use interpreter::Interpreter;
pub use parser::{parse, ParseError};
pub use render::drift_detector::DriftFinding;
pub use render::word_renderer::RenderedDocument;
pub use validator::{validate, ValidationReport};

// re-export external dependencies that users will need
pub use chrono;
pub use rust_decimal::Decimal;
