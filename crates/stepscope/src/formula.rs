//! Formula display leaf.

use crate::event::Formula;

/// Turns a formula into something displayable. Typesetting backends plug in
/// here; the core never interprets the result.
pub trait FormulaRenderer {
    fn render(&self, formula: &Formula) -> String;
}

/// LaTeX source when the tracer produced one, the raw expression otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormula;

impl FormulaRenderer for PlainFormula {
    fn render(&self, formula: &Formula) -> String {
        formula.latex.clone().unwrap_or_else(|| formula.expr.clone())
    }
}
