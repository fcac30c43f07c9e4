//! Domain types for progress-table.
//!
//! Cell values, layout enums, display entries and the serialisable table
//! configuration. Pure data, no terminal access.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TableError;

// ============================================================================
// VALUES
// ============================================================================

/// A cell value.
///
/// Integers stay integers through `sum`/`min`/`max`; `mean` always produces
/// a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::Text(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

// ============================================================================
// LAYOUT ENUMS
// ============================================================================

/// Horizontal alignment of text inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl FromStr for Alignment {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            _ => Err(TableError::UnknownAlignment { name: s.to_string() }),
        }
    }
}

/// How freely the renderer may move the cursor over lines it already printed.
///
/// Ordered: a higher level permits everything a lower level does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Interactivity {
    /// Every line is printed once, top to bottom. No cursor movement, no
    /// progress bars. Safe for files and pipes.
    AppendOnly,
    /// The line under the cursor (the live row) and anything below it may be
    /// rewritten.
    CurrentRow,
    /// Any line may be revisited.
    #[default]
    Full,
}

impl Interactivity {
    pub fn level(self) -> u8 {
        match self {
            Interactivity::AppendOnly => 0,
            Interactivity::CurrentRow => 1,
            Interactivity::Full => 2,
        }
    }
}

impl TryFrom<u8> for Interactivity {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Interactivity::AppendOnly),
            1 => Ok(Interactivity::CurrentRow),
            2 => Ok(Interactivity::Full),
            other => Err(format!("interactivity must be 0, 1 or 2 (got {})", other)),
        }
    }
}

impl From<Interactivity> for u8 {
    fn from(level: Interactivity) -> Self {
        level.level()
    }
}

// ============================================================================
// DISPLAY ENTRIES
// ============================================================================

/// One terminal line owned by the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEntry {
    /// A data row, by index into the row store.
    DataRow(usize),
    Header,
    SplitTop,
    SplitMid,
    SplitBot,
    /// One line of free text written through the table.
    UserText(String),
}

impl DisplayEntry {
    pub fn is_decoration(&self) -> bool {
        matches!(
            self,
            DisplayEntry::Header
                | DisplayEntry::SplitTop
                | DisplayEntry::SplitMid
                | DisplayEntry::SplitBot
        )
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Serialisable table configuration.
///
/// Style and color fields hold descriptions (`"round"`, `"blue bold"`) that
/// are resolved when the table is built; a bad description fails the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// None = detect: full interactivity on a terminal, append-only otherwise.
    pub interactivity: Option<Interactivity>,
    /// Background repaints per second. 0 = repaint synchronously on every
    /// mutation.
    pub refresh_rate: u32,
    /// Paint only on `refresh()` and `close()`.
    pub manual_refresh: bool,
    pub num_decimal_places: usize,
    pub default_column_width: usize,
    pub default_column_alignment: Alignment,
    pub default_column_color: Option<String>,
    pub default_column_aggregate: Option<String>,
    pub default_row_color: Option<String>,
    /// The first progress bar overlays the live row instead of taking a line.
    pub embedded_progress_bar: bool,
    pub pbar_show_throughput: bool,
    pub pbar_show_progress: bool,
    pub pbar_show_percents: bool,
    pub pbar_show_eta: bool,
    pub pbar_style: String,
    pub pbar_style_embed: String,
    /// Reprint the header after this many rows. 0 = never.
    pub print_header_every_n_rows: usize,
    /// Show the live row while it is being filled in, not only once finished.
    pub print_row_on_update: bool,
    pub table_style: String,
    /// Override the detected terminal width (columns).
    pub terminal_width: Option<usize>,
    /// Override the detected terminal height (lines).
    pub terminal_height: Option<usize>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            interactivity: None,
            refresh_rate: 10,
            manual_refresh: false,
            num_decimal_places: 4,
            default_column_width: 8,
            default_column_alignment: Alignment::Center,
            default_column_color: None,
            default_column_aggregate: None,
            default_row_color: None,
            embedded_progress_bar: true,
            pbar_show_throughput: true,
            pbar_show_progress: false,
            pbar_show_percents: false,
            pbar_show_eta: false,
            pbar_style: "square".to_string(),
            pbar_style_embed: "cdots".to_string(),
            print_header_every_n_rows: 30,
            print_row_on_update: true,
            table_style: "round".to_string(),
            terminal_width: None,
            terminal_height: None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
