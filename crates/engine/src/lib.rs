pub mod cell;
pub mod dep_graph;
pub mod formula;
pub mod position;
pub mod sheet;

pub use cell::{Cell, CellKind};
pub use formula::{FormulaError, Value};
pub use position::{Position, Size};
pub use sheet::{Sheet, SheetError};
