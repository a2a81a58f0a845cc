//! Traversals over the cell reference graph.
//!
//! The graph itself lives in the cells (see `cell.rs`); these functions only
//! walk it through neighbour callbacks, so the sheet can present a staged
//! view (a cell's candidate edges in place of its committed ones) without
//! touching its map.
//!
//! # Edge Direction
//!
//! ```text
//! B → A  means  "B reads A"  (A is a precedent of B, B a dependent of A)
//! ```
//!
//! Cycle detection follows precedents; cache invalidation follows dependents.

use rustc_hash::FxHashMap;

use crate::position::Position;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Gray,
    /// Fully explored, known not to reach the path.
    Black,
}

/// Returns true if a cycle is reachable from `start` by following precedents.
///
/// Three-color depth-first search: meeting a gray node closes a cycle. A
/// self-reference (`start` among its own precedents) is found immediately.
/// Iterative so that long reference chains cannot overflow the stack.
/// O(V + E) over the cells reachable from `start`.
pub fn has_cycle_from<F>(start: Position, mut precedents: F) -> bool
where
    F: FnMut(Position) -> Vec<Position>,
{
    struct DfsFrame {
        cell: Position,
        neighbours: Vec<Position>,
        next_idx: usize,
    }

    let mut colors: FxHashMap<Position, Color> = FxHashMap::default();
    colors.insert(start, Color::Gray);
    let mut dfs_stack = vec![DfsFrame {
        cell: start,
        neighbours: precedents(start),
        next_idx: 0,
    }];

    while let Some(frame) = dfs_stack.last_mut() {
        if frame.next_idx < frame.neighbours.len() {
            let next = frame.neighbours[frame.next_idx];
            frame.next_idx += 1;

            match colors.get(&next) {
                Some(Color::Gray) => return true,
                Some(Color::Black) => {}
                None => {
                    colors.insert(next, Color::Gray);
                    dfs_stack.push(DfsFrame {
                        cell: next,
                        neighbours: precedents(next),
                        next_idx: 0,
                    });
                }
            }
        } else {
            let cell = frame.cell;
            dfs_stack.pop();
            colors.insert(cell, Color::Black);
        }
    }

    false
}

/// Clear memoized values downstream of a change at `start`.
///
/// `clear(pos)` drops the cache at `pos` and reports whether one was present.
/// The start cell's dependents are always visited; below that, a cell whose
/// cache was already empty ends its branch, since its own dependents were
/// cleared when it was (or it has never been read). Returns the number of
/// caches actually cleared.
pub fn invalidate_from<D, C>(start: Position, mut dependents: D, mut clear: C) -> usize
where
    D: FnMut(Position) -> Vec<Position>,
    C: FnMut(Position) -> bool,
{
    let mut cleared = usize::from(clear(start));
    let mut work = dependents(start);

    while let Some(pos) = work.pop() {
        if clear(pos) {
            cleared += 1;
            work.extend(dependents(pos));
        }
    }

    cleared
}
