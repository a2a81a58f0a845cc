//! Edit scripts: one sheet command per line.
//!
//! ```text
//! # comment
//! set A1 =B1+2
//! set B1 40
//! get A1          -> A1<TAB>=B1+2<TAB>42
//! clear B1
//! print values
//! size            -> 1<TAB>1
//! ```

use std::io::{self, Write};

use serde::Serialize;
use tabula_engine::formula::CellLookup;
use tabula_engine::{CellKind, Position, Sheet, SheetError, Value};

/// Which grid rendering a `print` command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTarget {
    Values,
    Texts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { pos: Position, text: String },
    Clear(Position),
    Get(Position),
    Print(PrintTarget),
    Size,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("'{0}' needs a cell reference")]
    MissingReference(&'static str),

    #[error("invalid cell reference '{0}'")]
    BadReference(String),

    #[error("'print' expects 'values' or 'texts', got '{0}'")]
    BadPrintTarget(String),

    #[error("unexpected trailing input '{0}'")]
    TrailingInput(String),

    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Split off the first space-delimited word. Only one separator is consumed.
fn split_word(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

fn parse_ref(word: &str, command: &'static str) -> Result<Position, ScriptError> {
    if word.is_empty() {
        return Err(ScriptError::MissingReference(command));
    }
    word.parse()
        .map_err(|_| ScriptError::BadReference(word.to_string()))
}

/// A command taking exactly one reference and nothing else.
fn single_ref(rest: &str, command: &'static str) -> Result<Position, ScriptError> {
    let (cell, tail) = split_word(rest.trim_start());
    expect_end(tail)?;
    parse_ref(cell.trim_end(), command)
}

fn expect_end(rest: &str) -> Result<(), ScriptError> {
    let rest = rest.trim();
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::TrailingInput(rest.to_string()))
    }
}

/// Parse one script line. Blank lines and `#` comments yield `None`.
///
/// For `set`, everything after the space following the reference is the
/// cell text verbatim, including leading spaces, tabs and `#`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ScriptError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let line = line.trim_start();
    if line.trim_end().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = split_word(line);
    let command = match word {
        "set" => {
            let (cell, text) = split_word(rest);
            Command::Set {
                pos: parse_ref(cell, "set")?,
                text: text.to_string(),
            }
        }
        "clear" => Command::Clear(single_ref(rest, "clear")?),
        "get" => Command::Get(single_ref(rest, "get")?),
        "print" => {
            let (target, tail) = split_word(rest.trim_start());
            expect_end(tail)?;
            match target.trim_end() {
                "values" => Command::Print(PrintTarget::Values),
                "texts" => Command::Print(PrintTarget::Texts),
                other => return Err(ScriptError::BadPrintTarget(other.to_string())),
            }
        }
        "size" => {
            expect_end(rest)?;
            Command::Size
        }
        other => return Err(ScriptError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

/// A cell as dumped by `--json`.
#[derive(Debug, Serialize)]
pub struct CellDump {
    pub cell: String,
    pub kind: CellKind,
    pub text: String,
    pub value: Value,
}

/// Applies script commands to a sheet, writing any command output to `out`.
pub struct Runner {
    sheet: Sheet,
    failed_lines: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            sheet: Sheet::new(),
            failed_lines: 0,
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    /// Number of lines that failed so far.
    pub fn failed_lines(&self) -> usize {
        self.failed_lines
    }

    /// Execute a single command.
    pub fn execute<W: Write>(&mut self, command: &Command, out: &mut W) -> Result<(), ScriptError> {
        match command {
            Command::Set { pos, text } => self.sheet.set_cell(*pos, text)?,
            Command::Clear(pos) => self.sheet.clear_cell(*pos)?,
            Command::Get(pos) => {
                let text = self.sheet.text(*pos)?;
                let value = self.sheet.value(*pos)?;
                writeln!(out, "{}\t{}\t{}", pos, text, value)?;
            }
            Command::Print(PrintTarget::Values) => self.sheet.print_values(out)?,
            Command::Print(PrintTarget::Texts) => self.sheet.print_texts(out)?,
            Command::Size => {
                let size = self.sheet.printable_size();
                writeln!(out, "{}\t{}", size.rows, size.cols)?;
            }
        }
        Ok(())
    }

    /// Run every line of `script`. A failing line is reported to `err` as
    /// `error: line N: ...` and the run moves on to the next line.
    ///
    /// Only a failure to write to `out` or `err` aborts the run.
    pub fn run_script<W: Write, E: Write>(
        &mut self,
        script: &str,
        out: &mut W,
        err: &mut E,
    ) -> io::Result<()> {
        for (idx, line) in script.lines().enumerate() {
            let line_no = idx + 1;
            let result = parse_line(line).and_then(|command| match command {
                Some(command) => self.execute(&command, out),
                None => Ok(()),
            });

            match result {
                Ok(()) => {}
                Err(ScriptError::Io(e)) => return Err(e),
                Err(e) => {
                    self.failed_lines += 1;
                    tracing::debug!(line = line_no, error = %e, "script line failed");
                    writeln!(err, "error: line {}: {}", line_no, e)?;
                }
            }
        }
        Ok(())
    }

    /// Every stored cell, row-major, with its text and current value.
    pub fn dump(&self) -> Vec<CellDump> {
        self.sheet
            .cells()
            .map(|(pos, cell)| CellDump {
                cell: pos.to_string(),
                kind: cell.kind(),
                text: cell.text(),
                value: self.sheet.value_at(pos),
            })
            .collect()
    }
}
