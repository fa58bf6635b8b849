//! Projecting an agreement's AST to prose, and detecting when a human
//! has edited that prose out of sync with the AST it was derived from.

pub mod drift_detector;
pub mod word_renderer;
