use std::io::{self, Write};

use log::{debug, trace};
use rustc_hash::FxHashMap;

use super::cell::{Cell, CellKind};
use super::dep_graph;
use super::formula::{CellLookup, FormulaSyntaxError, Value};
use super::position::{Position, Size};

/// Failure of a sheet mutation or lookup. The sheet is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetError {
    #[error("invalid position (row {}, col {})", .0.row, .0.col)]
    InvalidPosition(Position),

    #[error("circular dependency: {0} would depend on itself")]
    CircularDependency(Position),

    #[error("formula syntax error: {0}")]
    FormulaSyntax(#[from] FormulaSyntaxError),
}

impl SheetError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SheetError::InvalidPosition(_) => "invalid_position",
            SheetError::CircularDependency(_) => "circular_dependency",
            SheetError::FormulaSyntax(_) => "formula_parse_error",
        }
    }
}

/// A grid of cells with live dependency tracking.
///
/// # Invariants
///
/// 1. **Mirrored edges:** if A references p, a cell is stored at p and
///    lists A among its dependents, and vice versa.
/// 2. **Acyclic:** following references from any cell never returns to it.
/// 3. **Fresh caches:** a memoized formula value never reflects inputs that
///    have since changed.
#[derive(Debug, Default)]
pub struct Sheet {
    cells: FxHashMap<Position, Cell>,
}

impl CellLookup for Sheet {
    fn value_at(&self, pos: Position) -> Value {
        let Some(cell) = self.cells.get(&pos) else {
            return Value::Empty;
        };
        self.fill_caches(pos);
        cell.value(self)
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_position(pos: Position) -> Result<(), SheetError> {
        if pos.is_valid() {
            Ok(())
        } else {
            Err(SheetError::InvalidPosition(pos))
        }
    }

    /// Set the text of the cell at `pos`.
    ///
    /// Either the new content and all its edges are committed, or the sheet
    /// is left as it was (apart from referenced cells auto-created as empty,
    /// which survive a rejected formula).
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        Self::check_position(pos)?;

        let staged = Cell::from_input(text).map_err(|e| {
            debug!("set {} rejected: formula syntax error: {}", pos, e);
            SheetError::from(e)
        })?;

        let refs = staged.referenced_cells();
        if !refs.is_empty() {
            for r in &refs {
                if *r != pos && !self.cells.contains_key(r) {
                    trace!("auto-creating empty cell at {} (referenced by {})", r, pos);
                    self.cells.insert(*r, Cell::new());
                }
            }

            if self.would_create_cycle(pos, &refs) {
                debug!("set {} rejected: circular dependency", pos);
                return Err(SheetError::CircularDependency(pos));
            }
        }

        debug!("set {} = {:?} ({:?}, {} refs)", pos, text, staged.kind(), refs.len());
        self.commit(pos, staged);
        Ok(())
    }

    /// Cycle check over the sheet as it would be with `pos` reading `refs`.
    fn would_create_cycle(&self, pos: Position, refs: &[Position]) -> bool {
        dep_graph::has_cycle_from(pos, |p| {
            if p == pos {
                refs.to_vec()
            } else {
                self.cells
                    .get(&p)
                    .map(|c| c.references().iter().copied().collect())
                    .unwrap_or_default()
            }
        })
    }

    /// Swap `staged` in at `pos`, moving edges over from the cell it replaces.
    fn commit(&mut self, pos: Position, mut staged: Cell) {
        if let Some(mut old) = self.cells.remove(&pos) {
            self.unlink_references(pos, &old);
            staged.set_dependents(old.take_dependents());
        }

        for r in staged.references() {
            if let Some(target) = self.cells.get_mut(r) {
                target.add_dependent(pos);
            }
        }

        self.cells.insert(pos, staged);
        self.invalidate(pos);
    }

    fn unlink_references(&mut self, pos: Position, cell: &Cell) {
        for r in cell.references() {
            if let Some(target) = self.cells.get_mut(r) {
                target.remove_dependent(pos);
            }
        }
    }

    fn invalidate(&self, pos: Position) {
        let cleared = dep_graph::invalidate_from(
            pos,
            |p| {
                self.cells
                    .get(&p)
                    .map(|c| c.dependents().iter().copied().collect())
                    .unwrap_or_default()
            },
            |p| self.cells.get(&p).is_some_and(|c| c.invalidate_cache()),
        );
        if cleared > 0 {
            trace!("invalidated {} cached values downstream of {}", cleared, pos);
        }
    }

    /// Evaluate every stale formula `pos` depends on, precedents first.
    ///
    /// Post-order walk with an explicit stack: a formula is evaluated only
    /// once all of its references hold a value, so each evaluation reads
    /// cached operands and never recurses into the sheet. Long reference
    /// chains therefore cost heap, not call stack.
    fn fill_caches(&self, pos: Position) {
        let needs_eval = |p: &Position| self.cells.get(p).is_some_and(Cell::is_stale);
        if !needs_eval(&pos) {
            return;
        }

        let mut stack = vec![(pos, false)];
        while let Some((p, expanded)) = stack.pop() {
            if !needs_eval(&p) {
                continue;
            }
            let Some(cell) = self.cells.get(&p) else {
                continue;
            };
            if expanded {
                cell.value(self);
            } else {
                stack.push((p, true));
                let stale = cell.references().iter().filter(|r| needs_eval(r));
                stack.extend(stale.map(|r| (*r, false)));
            }
        }
    }

    /// The cell stored at `pos`, if any.
    pub fn get_cell(&self, pos: Position) -> Result<Option<&Cell>, SheetError> {
        Self::check_position(pos)?;
        Ok(self.cells.get(&pos))
    }

    /// Reset the cell at `pos` to empty.
    ///
    /// Outgoing edges are dropped and dependents invalidated. The entry is
    /// removed unless other cells still reference the position, in which
    /// case it stays as an empty cell holding those back edges.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        Self::check_position(pos)?;

        let Some(mut old) = self.cells.remove(&pos) else {
            return Ok(());
        };
        self.unlink_references(pos, &old);

        if old.has_dependents() {
            let mut empty = Cell::new();
            empty.set_dependents(old.take_dependents());
            self.cells.insert(pos, empty);
            self.invalidate(pos);
            debug!("cleared {} (kept as empty, still referenced)", pos);
        } else {
            debug!("cleared {}", pos);
        }
        Ok(())
    }

    /// Value of the cell at `pos`; `Value::Empty` if nothing is stored there.
    pub fn value(&self, pos: Position) -> Result<Value, SheetError> {
        Self::check_position(pos)?;
        Ok(self.value_at(pos))
    }

    /// Text of the cell at `pos`; empty if nothing is stored there.
    pub fn text(&self, pos: Position) -> Result<String, SheetError> {
        Self::check_position(pos)?;
        Ok(self.cells.get(&pos).map(Cell::text).unwrap_or_default())
    }

    /// Smallest origin-anchored rectangle holding every cell with non-empty text.
    pub fn printable_size(&self) -> Size {
        self.cells
            .iter()
            .filter(|(_, cell)| !cell.is_empty())
            .fold(Size::default(), |size, (pos, _)| Size {
                rows: size.rows.max(pos.row + 1),
                cols: size.cols.max(pos.col + 1),
            })
    }

    /// Write evaluated values, tab-separated, one line per row.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |pos, _| self.value_at(pos).to_string())
    }

    /// Write raw cell texts, tab-separated, one line per row.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |_, cell| cell.text())
    }

    fn print_with<W, F>(&self, out: &mut W, render: F) -> io::Result<()>
    where
        W: Write,
        F: Fn(Position, &Cell) -> String,
    {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                let pos = Position::new(row, col);
                if let Some(cell) = self.cells.get(&pos) {
                    out.write_all(render(pos, cell).as_bytes())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Stored cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        let mut positions: Vec<Position> = self.cells.keys().copied().collect();
        positions.sort();
        positions.into_iter().map(move |pos| (pos, &self.cells[&pos]))
    }

    /// Number of stored cells, including empty ones kept for references.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Count of stored cells by kind: (empty, text, formula).
    pub fn kind_counts(&self) -> (usize, usize, usize) {
        self.cells.values().fold((0, 0, 0), |(e, t, f), cell| match cell.kind() {
            CellKind::Empty => (e + 1, t, f),
            CellKind::Text => (e, t + 1, f),
            CellKind::Formula => (e, t, f + 1),
        })
    }

    /// Panics if the edge or acyclicity invariants are broken.
    pub fn assert_consistent(&self) {
        for (pos, cell) in &self.cells {
            for r in cell.references() {
                let target = self
                    .cells
                    .get(r)
                    .unwrap_or_else(|| panic!("{} references {} but nothing is stored there", pos, r));
                assert!(
                    target.dependents().contains(pos),
                    "Missing back edge: {} should list {} as dependent",
                    r,
                    pos
                );
            }
            for d in cell.dependents() {
                let source = self
                    .cells
                    .get(d)
                    .unwrap_or_else(|| panic!("{} lists dependent {} but nothing is stored there", pos, d));
                assert!(
                    source.references().contains(pos),
                    "Stale back edge: {} does not reference {}",
                    d,
                    pos
                );
            }
            assert!(
                !dep_graph::has_cycle_from(*pos, |p| {
                    self.cells
                        .get(&p)
                        .map(|c| c.references().iter().copied().collect())
                        .unwrap_or_default()
                }),
                "Cycle reachable from {}",
                pos
            );
        }
    }
}
