//! Column registry and row store.
//!
//! Rows are append-only and kept for export; the last row is always the
//! live one. Columns are declared once and may only have their properties
//! updated afterwards.

use std::collections::HashMap;

use tracing::info;
use unicode_width::UnicodeWidthStr;

use crate::aggregate::Aggregate;
use crate::error::{Result, TableError};
use crate::style::{StyleArg, StyleToken};
use crate::types::{Alignment, Value};

// ============================================================================
// COLUMNS
// ============================================================================

/// A declared column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Body width, never narrower than the name.
    pub width: usize,
    pub alignment: Alignment,
    pub color: StyleToken,
    pub aggregate: Aggregate,
}

/// Properties applied to columns that do not specify their own.
#[derive(Debug, Clone)]
pub struct ColumnDefaults {
    pub width: usize,
    pub alignment: Alignment,
    pub color: StyleToken,
    pub aggregate: Aggregate,
}

impl Default for ColumnDefaults {
    fn default() -> Self {
        Self {
            width: 8,
            alignment: Alignment::Center,
            color: StyleToken::plain(),
            aggregate: Aggregate::None,
        }
    }
}

/// Column declaration. Unset properties fall back to the table defaults for
/// a new column and stay untouched for an existing one.
#[derive(Debug, Clone, Default)]
pub struct ColumnSpec {
    pub name: String,
    pub width: Option<usize>,
    pub alignment: Option<Alignment>,
    pub color: Option<StyleArg<StyleToken>>,
    pub aggregate: Option<Aggregate>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn color(mut self, color: impl Into<StyleArg<StyleToken>>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    /// Same properties under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self {
        ColumnSpec::new(name)
    }
}

impl From<String> for ColumnSpec {
    fn from(name: String) -> Self {
        ColumnSpec::new(name)
    }
}

/// Ordered set of declared columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a column or update an existing one. Returns true when the
    /// column is new. A bad color leaves the registry untouched.
    pub fn declare(&mut self, spec: &ColumnSpec, defaults: &ColumnDefaults) -> Result<bool> {
        let color = spec.color.as_ref().map(|c| c.resolve()).transpose()?;
        let min_width = spec.name.width();

        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == spec.name) {
            info!(column = %spec.name, "column already exists, updating its properties");
            if let Some(width) = spec.width {
                existing.width = width.max(min_width);
            }
            if let Some(alignment) = spec.alignment {
                existing.alignment = alignment;
            }
            if let Some(color) = color {
                existing.color = color;
            }
            if let Some(aggregate) = &spec.aggregate {
                existing.aggregate = aggregate.clone();
            }
            return Ok(false);
        }

        self.columns.push(Column {
            name: spec.name.clone(),
            width: spec.width.unwrap_or(defaults.width).max(min_width),
            alignment: spec.alignment.unwrap_or(defaults.alignment),
            color: color.unwrap_or(defaults.color),
            aggregate: spec
                .aggregate
                .clone()
                .unwrap_or_else(|| defaults.aggregate.clone()),
        });
        Ok(true)
    }

    /// Move the named columns to the front in the given order; the rest keep
    /// their relative order. Returns true when the order changed.
    pub fn reorder(&mut self, names: &[&str]) -> Result<bool> {
        for name in names {
            self.require(name)?;
        }
        let mut reordered: Vec<Column> = Vec::with_capacity(self.columns.len());
        for name in names {
            if reordered.iter().any(|c| c.name == *name) {
                continue;
            }
            if let Some(column) = self.get(name) {
                reordered.push(column.clone());
            }
        }
        for column in &self.columns {
            if !reordered.iter().any(|c| c.name == column.name) {
                reordered.push(column.clone());
            }
        }
        let changed = reordered
            .iter()
            .zip(&self.columns)
            .any(|(a, b)| a.name != b.name);
        self.columns = reordered;
        Ok(changed)
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Like [`get`](Self::get) but reports what is available.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.get(name).ok_or_else(|| TableError::UnknownColumn {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn widths(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.width).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns between the two outer frame glyphs: each cell with its
    /// blanks, plus one separator between neighbours.
    pub fn inner_width(&self) -> usize {
        let cells: usize = self.columns.iter().map(|c| c.width + 2).sum();
        cells + self.columns.len().saturating_sub(1)
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// One logical data row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub values: HashMap<String, Value>,
    pub weights: HashMap<String, f64>,
    /// Per-cell overrides, highest priority.
    pub colors: HashMap<String, StyleToken>,
    /// Applied to every cell of the row under the per-cell overrides.
    pub row_color: StyleToken,
}

impl Row {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Effective style of a cell: column color, then row color, then the
    /// cell override.
    pub fn cell_style(&self, column: &Column) -> StyleToken {
        let mut style = column.color.merge(self.row_color);
        if let Some(cell) = self.colors.get(&column.name) {
            style = style.merge(*cell);
        }
        style
    }
}

/// Where an explicit row index lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSlot {
    Stored(usize),
    /// One past the last row: the caller advances first.
    Next,
}

/// Append-only sequence of rows. Never empty.
#[derive(Debug, Clone)]
pub struct RowStore {
    rows: Vec<Row>,
}

impl Default for RowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowStore {
    pub fn new() -> Self {
        Self {
            rows: vec![Row::default()],
        }
    }

    pub fn append_empty_row(&mut self) -> usize {
        self.rows.push(Row::default());
        self.rows.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.rows.len() - 1
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Normalise a possibly negative index.
    pub fn resolve(&self, index: i64) -> Result<RowSlot> {
        let len = self.rows.len();
        let out_of_range = || TableError::RowIndexOutOfRange { index, len };
        let absolute = if index < 0 {
            i64::try_from(len).map_err(|_| out_of_range())? + index
        } else {
            index
        };
        let absolute = usize::try_from(absolute).map_err(|_| out_of_range())?;
        match absolute.cmp(&len) {
            std::cmp::Ordering::Less => Ok(RowSlot::Stored(absolute)),
            std::cmp::Ordering::Equal => Ok(RowSlot::Next),
            std::cmp::Ordering::Greater => Err(out_of_range()),
        }
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut Row> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or(TableError::RowIndexOutOfRange {
                index: index as i64,
                len,
            })
    }

    /// Fold `value` into a cell through the column's aggregate and add
    /// `weight` to the cell's running weight.
    pub fn update(
        &mut self,
        index: usize,
        column: &Column,
        value: Value,
        weight: f64,
        color: Option<StyleToken>,
    ) -> Result<()> {
        let row = self.row_mut(index)?;
        let zero = Value::Int(0);
        let running = row.values.get(&column.name).unwrap_or(&zero);
        let running_weight = row.weights.get(&column.name).copied().unwrap_or(0.0);
        let combined = column
            .aggregate
            .apply(&value, running, weight, running_weight)
            .ok_or_else(|| TableError::NonNumeric {
                column: column.name.clone(),
            })?;

        row.values.insert(column.name.clone(), combined);
        row.weights.insert(column.name.clone(), running_weight + weight);
        if let Some(color) = color {
            row.colors.insert(column.name.clone(), color);
        }
        Ok(())
    }

    pub fn get(&self, index: usize, column: &str) -> Option<&Value> {
        self.rows.get(index)?.values.get(column)
    }

    pub fn weight(&self, index: usize, column: &str) -> Option<f64> {
        self.rows.get(index)?.weights.get(column).copied()
    }

    pub fn color(&self, index: usize, column: &str) -> Option<StyleToken> {
        self.rows.get(index)?.colors.get(column).copied()
    }

    /// Overwrite a cell without aggregation.
    pub fn set_value(&mut self, index: usize, column: &str, value: Value) -> Result<()> {
        self.row_mut(index)?.values.insert(column.to_string(), value);
        Ok(())
    }

    pub fn set_weight(&mut self, index: usize, column: &str, weight: f64) -> Result<()> {
        self.row_mut(index)?.weights.insert(column.to_string(), weight);
        Ok(())
    }

    pub fn set_color(&mut self, index: usize, column: &str, color: StyleToken) -> Result<()> {
        self.row_mut(index)?.colors.insert(column.to_string(), color);
        Ok(())
    }

    pub fn set_row_color(&mut self, index: usize, color: StyleToken) -> Result<()> {
        self.row_mut(index)?.row_color = color;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::parse_color;

    fn registry(names: &[&str]) -> ColumnRegistry {
        let mut columns = ColumnRegistry::new();
        for name in names {
            columns.declare(&ColumnSpec::new(*name), &ColumnDefaults::default()).unwrap();
        }
        columns
    }

    #[test]
    fn width_never_below_name_length() {
        let mut columns = ColumnRegistry::new();
        let spec = ColumnSpec::new("average x-y").width(3);
        columns.declare(&spec, &ColumnDefaults::default()).unwrap();
        assert_eq!(columns.get("average x-y").unwrap().width, 11);
    }

    #[test]
    fn redeclaring_updates_only_given_properties() {
        let mut columns = registry(&["a"]);
        let again = ColumnSpec::new("a").alignment(Alignment::Left);
        assert!(!columns.declare(&again, &ColumnDefaults::default()).unwrap());
        let a = columns.get("a").unwrap();
        assert_eq!(a.alignment, Alignment::Left);
        assert_eq!(a.width, 8);
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn bad_color_leaves_registry_unchanged() {
        let mut columns = ColumnRegistry::new();
        let spec = ColumnSpec::new("a").color("sparkly");
        assert!(columns.declare(&spec, &ColumnDefaults::default()).is_err());
        assert!(columns.is_empty());
    }

    #[test]
    fn reorder_moves_named_columns_first() {
        let mut columns = registry(&["col1", "col2", "col3"]);
        assert!(columns.reorder(&["col3", "col1"]).unwrap());
        assert_eq!(columns.names(), vec!["col3", "col1", "col2"]);
        assert!(!columns.reorder(&["col3", "col1", "col2"]).unwrap());
        assert!(columns.reorder(&["nope"]).is_err());
    }

    #[test]
    fn inner_width_counts_blanks_and_separators() {
        let columns = registry(&["a", "b"]);
        assert_eq!(columns.inner_width(), 10 + 10 + 1);
    }

    #[test]
    fn resolve_handles_negative_and_next() {
        let mut rows = RowStore::new();
        rows.append_empty_row();
        assert_eq!(rows.resolve(-1).unwrap(), RowSlot::Stored(1));
        assert_eq!(rows.resolve(0).unwrap(), RowSlot::Stored(0));
        assert_eq!(rows.resolve(2).unwrap(), RowSlot::Next);
        assert!(matches!(
            rows.resolve(3),
            Err(TableError::RowIndexOutOfRange { index: 3, len: 2 })
        ));
        assert!(rows.resolve(-3).is_err());
    }

    #[test]
    fn update_aggregates_and_accumulates_weight() {
        let mut columns = ColumnRegistry::new();
        let spec = ColumnSpec::new("v").aggregate(Aggregate::Mean);
        columns.declare(&spec, &ColumnDefaults::default()).unwrap();
        let v = columns.get("v").unwrap();

        let mut rows = RowStore::new();
        rows.update(0, v, Value::Int(2), 1.0, None).unwrap();
        rows.update(0, v, Value::Int(4), 1.0, None).unwrap();
        assert_eq!(rows.get(0, "v"), Some(&Value::Float(3.0)));
        assert_eq!(rows.weight(0, "v"), Some(2.0));
    }

    #[test]
    fn numeric_aggregate_rejects_text_without_mutation() {
        let mut columns = ColumnRegistry::new();
        let spec = ColumnSpec::new("s").aggregate(Aggregate::Sum);
        columns.declare(&spec, &ColumnDefaults::default()).unwrap();
        let mut rows = RowStore::new();
        let err = rows.update(0, columns.get("s").unwrap(), Value::from("x"), 1.0, None);
        assert!(matches!(err, Err(TableError::NonNumeric { .. })));
        assert!(rows.row(0).unwrap().is_empty());
    }

    #[test]
    fn cell_color_beats_row_color_beats_column_color() {
        let mut columns = ColumnRegistry::new();
        let spec = ColumnSpec::new("c").color("red bold");
        columns.declare(&spec, &ColumnDefaults::default()).unwrap();
        let column = columns.get("c").unwrap();

        let mut rows = RowStore::new();
        rows.set_row_color(0, parse_color("green").unwrap()).unwrap();
        let row = rows.row(0).unwrap();
        assert_eq!(row.cell_style(column).foreground(), parse_color("green").unwrap().foreground());

        rows.set_color(0, "c", parse_color("blue").unwrap()).unwrap();
        let style = rows.row(0).unwrap().cell_style(column);
        assert_eq!(style.foreground(), parse_color("blue").unwrap().foreground());
        assert!(style.has_attribute(crossterm::style::Attribute::Bold));
    }
}
