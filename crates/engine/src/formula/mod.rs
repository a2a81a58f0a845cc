// Formula parsing and evaluation

pub mod eval;
pub mod parser;

use crate::position::Position;

pub use eval::{CellLookup, FormulaError, FormulaValue, Value};
pub use parser::FormulaSyntaxError;

/// A parsed formula expression.
///
/// Wraps the AST and exposes the operations the sheet needs: evaluation,
/// the referenced positions, and the canonical expression text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: parser::Expr,
}

/// Parse a formula expression (without the leading '=').
pub fn parse_formula(expression: &str) -> Result<Formula, FormulaSyntaxError> {
    parser::parse(expression).map(|ast| Formula { ast })
}

impl Formula {
    /// Evaluate against `lookup`. Never returns a non-finite number.
    pub fn evaluate(&self, lookup: &dyn CellLookup) -> FormulaValue {
        eval::evaluate(&self.ast, lookup)
    }

    /// Canonical expression text, without the leading '='.
    pub fn expression(&self) -> String {
        parser::format_expr(&self.ast)
    }

    /// Valid positions this formula reads, sorted row-major, without duplicates.
    pub fn referenced_cells(&self) -> Vec<Position> {
        parser::extract_cell_refs(&self.ast)
    }
}
