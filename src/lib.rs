//! progress-table: live, in-place updating tables and progress bars for the
//! terminal.
//!
//! Rows are appended as work progresses; cells of the current row (and, at
//! full interactivity, of any visible row) are rewritten in place by moving
//! the cursor rather than redrawing the screen.
//!
//! ```no_run
//! use progress_table::{PbarOptions, ProgressTable};
//!
//! # fn main() -> progress_table::Result<()> {
//! let table = ProgressTable::new();
//! for epoch in 0..3 {
//!     table.update("epoch", epoch)?;
//!     for step in table.pbar_iter(0..100, None, PbarOptions::new())? {
//!         table.update("loss", 1.0 / f64::from(step + 1))?;
//!     }
//!     table.next_row()?;
//! }
//! table.close()?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod display;
pub mod error;
pub mod export;
pub mod format;
pub mod pbar;
pub mod render;
pub mod rows;
pub mod scheduler;
pub mod style;
pub mod table;
pub mod types;

pub use aggregate::Aggregate;
pub use error::{Result, TableError};
pub use pbar::{PbarOptions, Placement};
pub use render::SharedBuffer;
pub use rows::ColumnSpec;
pub use style::{StyleArg, StyleToken, TableStyle, parse_color, parse_pbar_style, parse_table_style};
pub use table::{CellUpdate, ColumnKey, NextRow, PbarIter, ProgressBar, ProgressTable, RefreshMode, TableBuilder};
pub use types::{Alignment, Interactivity, TableConfig, Value};
