//! Cell coordinates.
//!
//! A `Position` identifies a cell on the sheet by zero-based row and column.
//! Coordinates are signed so that out-of-grid references parsed from formula
//! text can still be represented and rejected by `is_valid`.

use std::fmt;
use std::str::FromStr;

/// Zero-based grid coordinate.
///
/// Ordering is row-major, which gives deterministic iteration over cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    /// Number of addressable rows.
    pub const MAX_ROWS: i32 = 16384;
    /// Number of addressable columns.
    pub const MAX_COLS: i32 = 16384;

    /// The canonical invalid position, produced by failed parses.
    pub const NONE: Position = Position { row: -1, col: -1 };

    const MAX_LETTERS: usize = 3;
    const MAX_DIGITS: usize = 5;

    #[inline]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// True if both coordinates fall inside the grid.
    pub fn is_valid(&self) -> bool {
        (0..Self::MAX_ROWS).contains(&self.row) && (0..Self::MAX_COLS).contains(&self.col)
    }

    /// Parse A1 notation. Returns `Position::NONE` for anything malformed or
    /// outside the grid.
    pub fn parse_a1(s: &str) -> Position {
        let letters = s.bytes().take_while(|b| b.is_ascii_uppercase()).count();
        if letters == 0 || letters > Self::MAX_LETTERS {
            return Self::NONE;
        }

        let digits = &s[letters..];
        if digits.is_empty()
            || digits.len() > Self::MAX_DIGITS
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Self::NONE;
        }

        let col = s[..letters]
            .bytes()
            .fold(0i32, |acc, b| acc * 26 + i32::from(b - b'A' + 1))
            - 1;
        let row = match digits.parse::<i32>() {
            Ok(n) => n - 1,
            Err(_) => return Self::NONE,
        };

        let pos = Position { row, col };
        if pos.is_valid() { pos } else { Self::NONE }
    }
}

/// Error returned by `Position::from_str`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cell reference: {0}")]
pub struct ParsePositionError(pub String);

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pos = Position::parse_a1(s);
        if pos.is_valid() {
            Ok(pos)
        } else {
            Err(ParsePositionError(s.to_string()))
        }
    }
}

impl fmt::Display for Position {
    /// A1 form for valid positions, empty for invalid ones.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

/// Convert a 0-based column index to letter(s): 0 -> A, 25 -> Z, 26 -> AA.
pub(crate) fn col_to_letters(col: i32) -> String {
    let mut result = String::new();
    let mut n = col + 1;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Printable extent of a sheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub rows: i32,
    pub cols: i32,
}

impl Size {
    pub const fn new(rows: i32, cols: i32) -> Self {
        Self { rows, cols }
    }
}
