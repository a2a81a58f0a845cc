// Formula parser - converts formula expressions into an AST
// Supports: numbers (1, 2.5, .5, 1e3), cell refs (A1), + - * /, unary + and -, parentheses

use crate::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Cell reference. May hold an out-of-grid position, which evaluates to #REF!.
    CellRef(Position),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Formula text that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FormulaSyntaxError {
    pub message: String,
}

impl FormulaSyntaxError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

type ParseResult<T> = Result<T, FormulaSyntaxError>;

/// Parse a formula expression (the text after the leading '=').
pub fn parse(expression: &str) -> ParseResult<Expr> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(FormulaSyntaxError::new("Empty formula"));
    }
    let (parsed, pos) = parse_add_sub(&tokens, 0, 0)?;
    if pos < tokens.len() {
        return Err(FormulaSyntaxError::new(format!(
            "Unexpected token at position {}",
            pos
        )));
    }
    Ok(parsed.expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    CellRef(Position),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            'A'..='Z' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_uppercase() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let letters = ident.len();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident.len() == letters {
                    return Err(FormulaSyntaxError::new(format!(
                        "Invalid cell reference: {}",
                        ident
                    )));
                }
                // Out-of-grid references still tokenize; they evaluate to #REF!
                tokens.push(Token::CellRef(Position::parse_a1(&ident)));
            }
            '0'..='9' | '.' => {
                let num_str = scan_number(&mut chars);
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| FormulaSyntaxError::new(format!("Invalid number: {}", num_str)))?;
                if !num.is_finite() {
                    return Err(FormulaSyntaxError::new(format!(
                        "Number out of range: {}",
                        num_str
                    )));
                }
                tokens.push(Token::Number(num));
            }
            _ => return Err(FormulaSyntaxError::new(format!("Unexpected character: {}", c))),
        }
    }

    Ok(tokens)
}

/// Collect `digits [. digits] [e [+-] digits]`. Validation is left to `f64::from_str`.
fn scan_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut num_str = String::new();
    while let Some(&d) = chars.peek() {
        if d.is_ascii_digit() || d == '.' {
            num_str.push(d);
            chars.next();
        } else {
            break;
        }
    }

    if let Some(&e) = chars.peek() {
        if e == 'e' || e == 'E' {
            num_str.push(e);
            chars.next();
            if let Some(&sign) = chars.peek() {
                if sign == '+' || sign == '-' {
                    num_str.push(sign);
                    chars.next();
                }
            }
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }

    num_str
}

/// Deepest parenthesis/unary nesting accepted by the parser.
const MAX_NESTING: usize = 256;
/// Tallest expression tree accepted. Printing and evaluation recurse over
/// the tree, so this bounds their stack use too.
const MAX_HEIGHT: usize = 1024;

/// A parsed subexpression together with the height of its tree.
struct Parsed {
    expr: Expr,
    height: usize,
}

fn too_deep() -> FormulaSyntaxError {
    FormulaSyntaxError::new("Formula nesting too deep")
}

fn binary(op: Op, left: Parsed, right: Parsed) -> ParseResult<Parsed> {
    let height = left.height.max(right.height) + 1;
    if height > MAX_HEIGHT {
        return Err(too_deep());
    }
    Ok(Parsed {
        expr: Expr::BinaryOp {
            op,
            left: Box::new(left.expr),
            right: Box::new(right.expr),
        },
        height,
    })
}

fn parse_add_sub(tokens: &[Token], pos: usize, nesting: usize) -> ParseResult<(Parsed, usize)> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos, nesting)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, nesting)?;
        left = binary(op, left, right)?;
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize, nesting: usize) -> ParseResult<(Parsed, usize)> {
    let (mut left, mut pos) = parse_primary(tokens, pos, nesting)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_primary(tokens, pos + 1, nesting)?;
        left = binary(op, left, right)?;
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_primary(tokens: &[Token], pos: usize, nesting: usize) -> ParseResult<(Parsed, usize)> {
    let Some(token) = tokens.get(pos) else {
        return Err(FormulaSyntaxError::new("Unexpected end of expression"));
    };

    let atom = |expr: Expr| -> ParseResult<(Parsed, usize)> {
        Ok((Parsed { expr, height: 1 }, pos + 1))
    };
    match token {
        Token::Number(n) => atom(Expr::Number(*n)),
        Token::CellRef(p) => atom(Expr::CellRef(*p)),
        Token::LParen => {
            if nesting >= MAX_NESTING {
                return Err(too_deep());
            }
            let (inner, pos) = parse_add_sub(tokens, pos + 1, nesting + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((inner, pos + 1)),
                Some(_) => Err(FormulaSyntaxError::new("Expected closing parenthesis")),
                None => Err(FormulaSyntaxError::new("Missing closing parenthesis")),
            }
        }
        Token::Plus | Token::Minus => {
            if nesting >= MAX_NESTING {
                return Err(too_deep());
            }
            let op = if *token == Token::Plus { UnaryOp::Plus } else { UnaryOp::Minus };
            let (operand, pos) = parse_primary(tokens, pos + 1, nesting + 1)?;
            let height = operand.height + 1;
            if height > MAX_HEIGHT {
                return Err(too_deep());
            }
            Ok((
                Parsed {
                    expr: Expr::Unary {
                        op,
                        operand: Box::new(operand.expr),
                    },
                    height,
                },
                pos,
            ))
        }
        _ => Err(FormulaSyntaxError::new(format!("Unexpected token at position {}", pos))),
    }
}

// =============================================================================
// Formula Printing - canonical text with minimal parentheses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precedence {
    Add,
    Sub,
    Mul,
    Div,
    Unary,
    Atom,
}

fn precedence(expr: &Expr) -> Precedence {
    match expr {
        Expr::Number(_) | Expr::CellRef(_) => Precedence::Atom,
        Expr::Unary { .. } => Precedence::Unary,
        Expr::BinaryOp { op, .. } => match op {
            Op::Add => Precedence::Add,
            Op::Sub => Precedence::Sub,
            Op::Mul => Precedence::Mul,
            Op::Div => Precedence::Div,
        },
    }
}

/// Whether `child` must be parenthesized as the left (`right == false`) or
/// right operand of `parent`.
fn needs_parens(parent: Precedence, child: Precedence, right: bool) -> bool {
    use Precedence::*;
    let additive = matches!(child, Add | Sub);
    match parent {
        Add | Atom => false,
        Sub => right && additive,
        Mul | Unary => additive,
        Div => additive || (right && matches!(child, Mul | Div)),
    }
}

/// Format an expression without the leading '='.
pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

fn write_operand(parent: Precedence, child: &Expr, right: bool, out: &mut String) {
    if needs_parens(parent, precedence(child), right) {
        out.push('(');
        write_expr(child, out);
        out.push(')');
    } else {
        write_expr(child, out);
    }
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Number(n) => out.push_str(&n.to_string()),
        Expr::CellRef(pos) => {
            if pos.is_valid() {
                out.push_str(&pos.to_string());
            } else {
                out.push_str("#REF!");
            }
        }
        Expr::Unary { op, operand } => {
            out.push(match op {
                UnaryOp::Plus => '+',
                UnaryOp::Minus => '-',
            });
            write_operand(Precedence::Unary, operand, true, out);
        }
        Expr::BinaryOp { op, left, right } => {
            let parent = precedence(expr);
            write_operand(parent, left, false, out);
            out.push(match op {
                Op::Add => '+',
                Op::Sub => '-',
                Op::Mul => '*',
                Op::Div => '/',
            });
            write_operand(parent, right, true, out);
        }
    }
}

// =============================================================================
// Cell Reference Extraction
// =============================================================================

/// Valid positions referenced by an expression, sorted and deduplicated.
pub fn extract_cell_refs(expr: &Expr) -> Vec<Position> {
    let mut refs = Vec::new();
    collect_cell_refs(expr, &mut refs);
    refs.sort();
    refs.dedup();
    refs
}

fn collect_cell_refs(expr: &Expr, refs: &mut Vec<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::CellRef(pos) => {
            if pos.is_valid() {
                refs.push(*pos);
            }
        }
        Expr::Unary { operand, .. } => collect_cell_refs(operand, refs),
        Expr::BinaryOp { left, right, .. } => {
            collect_cell_refs(left, refs);
            collect_cell_refs(right, refs);
        }
    }
}
