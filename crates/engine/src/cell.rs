//! Cell content and dependency edges.
//!
//! A `Cell` is one of three kinds (empty, text, formula) and carries both
//! directions of the reference graph as sets of positions:
//!
//! ```text
//! B1 = A1 + 1   =>   B1.references = {A1}   A1.dependents = {B1}
//! ```
//!
//! Edges are keys into the owning `Sheet`, never pointers to other cells.

use std::cell::Cell as Memo;

use log::trace;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::formula::{self, CellLookup, Formula, FormulaSyntaxError, FormulaValue, Value};
use crate::position::Position;

/// Leading character marking the text as a formula.
pub const FORMULA_SIGN: char = '=';
/// Leading character forcing literal text. Not part of the cell's value.
pub const ESCAPE_SIGN: char = '\'';

/// The three kinds of cell content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Empty,
    Text,
    Formula,
}

#[derive(Debug, Clone)]
enum Content {
    Empty,
    /// Raw text exactly as entered, escape sign included.
    Text(String),
    /// Parsed formula with a lazily filled value.
    Formula {
        formula: Formula,
        cache: Memo<Option<FormulaValue>>,
    },
}

#[derive(Debug, Clone)]
pub struct Cell {
    content: Content,
    /// Positions this cell reads from (outgoing edges).
    references: FxHashSet<Position>,
    /// Positions of cells that read this one (incoming edges).
    dependents: FxHashSet<Position>,
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

impl Cell {
    /// An empty cell with no edges.
    pub fn new() -> Self {
        Self {
            content: Content::Empty,
            references: FxHashSet::default(),
            dependents: FxHashSet::default(),
        }
    }

    /// Classify `text` and build a detached cell for it.
    ///
    /// The returned cell has its outgoing edges filled in but no dependents;
    /// wiring it into a sheet is the sheet's job.
    pub fn from_input(text: &str) -> Result<Self, FormulaSyntaxError> {
        let content = if text.is_empty() {
            Content::Empty
        } else if text.starts_with(ESCAPE_SIGN)
            || !text.starts_with(FORMULA_SIGN)
            || text.len() == FORMULA_SIGN.len_utf8()
        {
            Content::Text(text.to_string())
        } else {
            let formula = formula::parse_formula(&text[FORMULA_SIGN.len_utf8()..])?;
            Content::Formula {
                formula,
                cache: Memo::new(None),
            }
        };

        let references = match &content {
            Content::Formula { formula, .. } => formula.referenced_cells().into_iter().collect(),
            _ => FxHashSet::default(),
        };

        Ok(Self {
            content,
            references,
            dependents: FxHashSet::default(),
        })
    }

    pub fn kind(&self) -> CellKind {
        match self.content {
            Content::Empty => CellKind::Empty,
            Content::Text(_) => CellKind::Text,
            Content::Formula { .. } => CellKind::Formula,
        }
    }

    /// Text as the user would edit it. Formulas come back in canonical form.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Empty => String::new(),
            Content::Text(s) => s.clone(),
            Content::Formula { formula, .. } => {
                format!("{}{}", FORMULA_SIGN, formula.expression())
            }
        }
    }

    /// True if the cell has no text at all.
    pub fn is_empty(&self) -> bool {
        matches!(self.content, Content::Empty)
    }

    /// Observable value. Formula results are memoized until invalidated.
    pub fn value(&self, lookup: &dyn CellLookup) -> Value {
        match &self.content {
            Content::Empty => Value::Empty,
            Content::Text(s) => match s.strip_prefix(ESCAPE_SIGN) {
                Some(rest) => Value::Text(rest.to_string()),
                None => Value::Text(s.clone()),
            },
            Content::Formula { formula, cache } => {
                if let Some(v) = cache.get() {
                    return v.into();
                }
                let v = formula.evaluate(lookup);
                trace!("evaluated ={} -> {}", formula.expression(), Value::from(v));
                cache.set(Some(v));
                v.into()
            }
        }
    }

    /// Positions this cell reads from, row-major.
    pub fn referenced_cells(&self) -> Vec<Position> {
        sorted(&self.references)
    }

    /// Positions of cells that read this one, row-major.
    pub fn dependent_cells(&self) -> Vec<Position> {
        sorted(&self.dependents)
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.is_empty()
    }

    /// A formula whose value has not been computed since its last change.
    pub(crate) fn is_stale(&self) -> bool {
        matches!(&self.content, Content::Formula { cache, .. } if cache.get().is_none())
    }

    pub fn has_cached_value(&self) -> bool {
        match &self.content {
            Content::Formula { cache, .. } => cache.get().is_some(),
            _ => false,
        }
    }

    /// Drop the memoized value. Returns whether there was one.
    pub(crate) fn invalidate_cache(&self) -> bool {
        match &self.content {
            Content::Formula { cache, .. } => cache.take().is_some(),
            _ => false,
        }
    }

    pub(crate) fn references(&self) -> &FxHashSet<Position> {
        &self.references
    }

    pub(crate) fn dependents(&self) -> &FxHashSet<Position> {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, pos: Position) {
        self.dependents.insert(pos);
    }

    pub(crate) fn remove_dependent(&mut self, pos: Position) {
        self.dependents.remove(&pos);
    }

    /// Move the incoming edges out of this cell (used when replacing it).
    pub(crate) fn take_dependents(&mut self) -> FxHashSet<Position> {
        std::mem::take(&mut self.dependents)
    }

    pub(crate) fn set_dependents(&mut self, dependents: FxHashSet<Position>) {
        self.dependents = dependents;
    }
}

fn sorted(set: &FxHashSet<Position>) -> Vec<Position> {
    let mut v: Vec<Position> = set.iter().copied().collect();
    v.sort();
    v
}
