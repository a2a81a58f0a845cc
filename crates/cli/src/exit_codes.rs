//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Scripts driving `tabula` rely on them.
//!
//! | Code | Meaning                                           |
//! |------|---------------------------------------------------|
//! | 0    | Success, every script line applied                |
//! | 1    | At least one script line failed (run continued)   |
//! | 2    | Usage error (bad arguments, unreadable config)    |
//! | 3    | I/O error (script not readable, output failed)    |

/// Success - every line of the script was applied.
pub const EXIT_SUCCESS: u8 = 0;

/// One or more script lines failed. The remaining lines still ran.
pub const EXIT_LINE_FAILED: u8 = 1;

/// Usage error - bad arguments, invalid `--config` file.
pub const EXIT_USAGE: u8 = 2;

/// I/O error - script could not be read or output could not be written.
pub const EXIT_IO: u8 = 3;
