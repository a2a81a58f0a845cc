// Formula evaluator - evaluates parsed expressions against a cell lookup

use std::fmt;

use serde::{Serialize, Serializer};

use super::parser::{Expr, Op, UnaryOp};
use crate::position::Position;

/// Source of cell values for formula evaluation.
///
/// Implemented by `Sheet`. Returns the observable value of the cell at
/// `pos`, or `Value::Empty` when nothing is stored there.
pub trait CellLookup {
    fn value_at(&self, pos: Position) -> Value;
}

// =============================================================================
// Value: what a reader observes in a cell
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Coerce to a formula operand.
    ///
    /// Empty and empty text count as 0. Text must parse as a number in full,
    /// otherwise `#VALUE!`; so must a literal too large for `f64`. Errors
    /// propagate unchanged.
    pub fn to_number(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Empty => Ok(0.0),
            Value::Number(n) => Ok(*n),
            Value::Text(s) if s.is_empty() => Ok(0.0),
            Value::Text(s) => text_to_number(s),
            Value::Error(e) => Err(*e),
        }
    }
}

fn text_to_number(s: &str) -> Result<f64, FormulaError> {
    let n = s.parse::<f64>().map_err(|_| FormulaError::Value)?;
    if n.is_infinite() && !is_infinity_literal(s) {
        // "1e400" saturates to inf
        return Err(FormulaError::Value);
    }
    Ok(n)
}

fn is_infinity_literal(s: &str) -> bool {
    let unsigned = s.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(s);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

impl From<FormulaValue> for Value {
    fn from(v: FormulaValue) -> Self {
        match v {
            Ok(n) => Value::Number(n),
            Err(e) => Value::Error(e),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Empty => serializer.serialize_none(),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Error(e) => serializer.serialize_str(e.token()),
        }
    }
}

/// Error value produced by evaluating a formula.
///
/// These are ordinary cell values, not failures of the sheet API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaError {
    /// Reference to a position outside the grid.
    Ref,
    /// Operand could not be coerced to a number.
    Value,
    /// Non-finite arithmetic result (division by zero, overflow).
    Arithmetic,
}

impl FormulaError {
    pub fn token(&self) -> &'static str {
        match self {
            FormulaError::Ref => "#REF!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Arithmetic => "#ARITHM!",
        }
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Result of evaluating a formula: a finite number or an error value.
pub type FormulaValue = Result<f64, FormulaError>;

// =============================================================================
// Evaluation
// =============================================================================

/// Resolve a referenced position to a numeric operand.
fn resolve(lookup: &dyn CellLookup, pos: Position) -> FormulaValue {
    if !pos.is_valid() {
        return Err(FormulaError::Ref);
    }
    lookup.value_at(pos).to_number()
}

/// Evaluate an expression. The first error encountered wins; a non-finite
/// result is reported as `#ARITHM!`.
pub fn evaluate(expr: &Expr, lookup: &dyn CellLookup) -> FormulaValue {
    let n = eval_inner(expr, lookup)?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(FormulaError::Arithmetic)
    }
}

fn eval_inner(expr: &Expr, lookup: &dyn CellLookup) -> FormulaValue {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::CellRef(pos) => resolve(lookup, *pos),
        Expr::Unary { op, operand } => {
            let v = eval_inner(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => -v,
            })
        }
        Expr::BinaryOp { op, left, right } => {
            let l = eval_inner(left, lookup)?;
            let r = eval_inner(right, lookup)?;
            let n = match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
            };
            // Intermediate infinities would otherwise be masked by later ops
            // (e.g. 1/(1/0) == 0).
            if n.is_finite() { Ok(n) } else { Err(FormulaError::Arithmetic) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use rustc_hash::FxHashMap;

    #[derive(Default)]
    struct MapLookup(FxHashMap<Position, Value>);

    impl MapLookup {
        fn with(mut self, a1: &str, v: Value) -> Self {
            self.0.insert(Position::parse_a1(a1), v);
            self
        }
    }

    impl CellLookup for MapLookup {
        fn value_at(&self, pos: Position) -> Value {
            self.0.get(&pos).cloned().unwrap_or_default()
        }
    }

    fn eval(src: &str, lookup: &MapLookup) -> FormulaValue {
        evaluate(&parse(src).unwrap(), lookup)
    }

    #[test]
    fn test_arithmetic() {
        let lookup = MapLookup::default();
        assert_eq!(eval("1+2*3", &lookup), Ok(7.0));
        assert_eq!(eval("(1+2)*3", &lookup), Ok(9.0));
        assert_eq!(eval("-2*3", &lookup), Ok(-6.0));
        assert_eq!(eval("10/4", &lookup), Ok(2.5));
        assert_eq!(eval("8-3-2", &lookup), Ok(3.0));
    }

    #[test]
    fn test_division_by_zero_is_arithmetic_error() {
        let lookup = MapLookup::default();
        assert_eq!(eval("1/0", &lookup), Err(FormulaError::Arithmetic));
        assert_eq!(eval("1/(1/0)", &lookup), Err(FormulaError::Arithmetic));
        assert_eq!(eval("0/0", &lookup), Err(FormulaError::Arithmetic));
    }

    #[test]
    fn test_overflow_is_arithmetic_error() {
        let lookup = MapLookup::default();
        assert_eq!(eval("1e308*10", &lookup), Err(FormulaError::Arithmetic));
    }

    #[test]
    fn test_resolver_coercions() {
        let lookup = MapLookup::default()
            .with("A1", Value::Number(2.0))
            .with("A2", Value::Text("3.5".into()))
            .with("A3", Value::Text("3.5x".into()))
            .with("A4", Value::Text(String::new()))
            .with("A5", Value::Text(" 1".into()))
            .with("A6", Value::Text("1e400".into()))
            .with("A7", Value::Text("-1e400".into()))
            .with("A8", Value::Text("1e-400".into()))
            .with("A9", Value::Text("inf".into()));

        assert_eq!(eval("A1*10", &lookup), Ok(20.0));
        assert_eq!(eval("A2+1", &lookup), Ok(4.5));
        assert_eq!(eval("A3+1", &lookup), Err(FormulaError::Value));
        assert_eq!(eval("A4+1", &lookup), Ok(1.0));
        assert_eq!(eval("A5+1", &lookup), Err(FormulaError::Value));
        // Out of range text is not a number; underflow is just zero
        assert_eq!(eval("A6+1", &lookup), Err(FormulaError::Value));
        assert_eq!(eval("A7", &lookup), Err(FormulaError::Value));
        assert_eq!(eval("A8+1", &lookup), Ok(1.0));
        // An explicit infinity is a number; the result is what overflows
        assert_eq!(eval("A9+1", &lookup), Err(FormulaError::Arithmetic));
        // Never set
        assert_eq!(eval("Z9+1", &lookup), Ok(1.0));
    }

    #[test]
    fn test_invalid_reference_is_ref_error() {
        let lookup = MapLookup::default();
        assert_eq!(eval("ZZZZ1+1", &lookup), Err(FormulaError::Ref));
        assert_eq!(eval("A0", &lookup), Err(FormulaError::Ref));
    }

    #[test]
    fn test_first_error_wins() {
        let lookup = MapLookup::default()
            .with("A1", Value::Error(FormulaError::Value))
            .with("A2", Value::Error(FormulaError::Arithmetic));

        assert_eq!(eval("A1+A2", &lookup), Err(FormulaError::Value));
        assert_eq!(eval("A2+A1", &lookup), Err(FormulaError::Arithmetic));
    }

    #[test]
    fn test_value_kinds() {
        assert!(Value::Empty.is_empty());
        assert!(!Value::Text(String::new()).is_empty());
        assert_eq!(Value::from(Ok(2.0)), Value::Number(2.0));
        assert_eq!(Value::from(Err(FormulaError::Ref)), Value::Error(FormulaError::Ref));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Empty.to_string(), "");
        assert_eq!(Value::Number(6.0).to_string(), "6");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Text("hi".into()).to_string(), "hi");
        assert_eq!(Value::Error(FormulaError::Arithmetic).to_string(), "#ARITHM!");
        assert_eq!(Value::Error(FormulaError::Ref).to_string(), "#REF!");
        assert_eq!(Value::Error(FormulaError::Value).to_string(), "#VALUE!");
    }

    #[test]
    fn test_value_json() {
        let values = vec![
            Value::Empty,
            Value::Number(2.5),
            Value::Text("x".into()),
            Value::Error(FormulaError::Ref),
        ];
        assert_eq!(
            serde_json::to_string(&values).unwrap(),
            r##"[null,2.5,"x","#REF!"]"##
        );
    }
}
