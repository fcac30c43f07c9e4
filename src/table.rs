//! The live table: public API and the state every call mutates.
//!
//! All state sits behind one mutex shared with the refresh thread and the
//! progress bar handles. A mutation call and a repaint pass are the atomic
//! units; nothing locks at a finer grain.

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::{Bound, Range, RangeBounds};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::aggregate::Aggregate;
use crate::display::DisplayLog;
use crate::error::{Result, TableError};
use crate::export;
use crate::format::{FormatFn, StyledLine, border_line, cells_line, default_formatter, fit_cell};
use crate::pbar::{
    Bar, BarEngine, BarId, DEFAULT_BAR_WIDTH, InfoFlags, PbarOptions, Placement, embed_into,
    standalone_line,
};
use crate::render::{Renderer, Sinks, terminal_size};
use crate::rows::{ColumnDefaults, ColumnRegistry, ColumnSpec, RowSlot, RowStore};
use crate::scheduler::Refresher;
use crate::style::{
    PbarStyle, StyleArg, StyleToken, TableStyle, parse_color, parse_pbar_style, parse_table_style,
};
use crate::types::{Alignment, DisplayEntry, Interactivity, TableConfig, Value};

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// When repaints happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// A background thread repaints pending changes every period.
    Timer(Duration),
    /// Every mutation repaints before returning.
    Immediate,
    /// Only `refresh()` and `close()` paint.
    Manual,
}

impl RefreshMode {
    pub fn from_config(config: &TableConfig) -> Self {
        if config.manual_refresh {
            RefreshMode::Manual
        } else if config.refresh_rate == 0 {
            RefreshMode::Immediate
        } else {
            RefreshMode::Timer(Duration::from_secs_f64(1.0 / f64::from(config.refresh_rate)))
        }
    }
}

/// A column addressed by name or by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    Name(String),
    Index(usize),
}

impl From<&str> for ColumnKey {
    fn from(name: &str) -> Self {
        ColumnKey::Name(name.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(name: String) -> Self {
        ColumnKey::Name(name)
    }
}

impl From<usize> for ColumnKey {
    fn from(index: usize) -> Self {
        ColumnKey::Index(index)
    }
}

/// One cell write through the column's aggregate.
#[derive(Debug, Clone)]
pub struct CellUpdate {
    /// Target column. Its properties are used if the column has to be
    /// created.
    pub column: ColumnSpec,
    pub value: Value,
    /// Explicit row; negative counts from the end. `None` is the live row.
    pub row: Option<i64>,
    pub weight: f64,
    pub color: Option<StyleArg<StyleToken>>,
}

impl CellUpdate {
    pub fn new(column: impl Into<ColumnSpec>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            row: None,
            weight: 1.0,
            color: None,
        }
    }

    pub fn row(mut self, row: i64) -> Self {
        self.row = Some(row);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn color(mut self, color: impl Into<StyleArg<StyleToken>>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Options for finishing the live row.
#[derive(Debug, Clone, Default)]
pub struct NextRow {
    /// Color for the whole finished row.
    pub color: Option<StyleArg<StyleToken>>,
    /// Colors for single cells of the finished row.
    pub column_colors: Vec<(String, StyleArg<StyleToken>)>,
    /// Draw a separator before the next row.
    pub split: bool,
    /// Reprint the header before the next row.
    pub header: bool,
}

impl NextRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(mut self, color: impl Into<StyleArg<StyleToken>>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn column_color(mut self, column: impl Into<String>, color: impl Into<StyleArg<StyleToken>>) -> Self {
        self.column_colors.push((column.into(), color.into()));
        self
    }

    pub fn split(mut self) -> Self {
        self.split = true;
        self
    }

    pub fn header(mut self) -> Self {
        self.header = true;
        self
    }
}

struct ResolvedNextRow {
    color: Option<StyleToken>,
    column_colors: Vec<(String, StyleToken)>,
    split: bool,
    header: bool,
}

impl NextRow {
    fn resolve(&self) -> Result<ResolvedNextRow> {
        let color = self.color.as_ref().map(|c| c.resolve()).transpose()?;
        let column_colors = self
            .column_colors
            .iter()
            .map(|(name, c)| Ok((name.clone(), c.resolve()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResolvedNextRow {
            color,
            column_colors,
            split: self.split,
            header: self.header,
        })
    }
}

// ============================================================================
// TABLE STATE
// ============================================================================

struct TableState {
    columns: ColumnRegistry,
    column_defaults: ColumnDefaults,
    rows: RowStore,
    log: DisplayLog,
    renderer: Renderer,
    bars: BarEngine,
    sinks: Sinks,
    formatter: FormatFn,
    table_style: TableStyle,
    pbar_style: PbarStyle,
    pbar_style_embed: PbarStyle,
    pbar_flags: InfoFlags,
    default_row_color: StyleToken,
    interactivity: Interactivity,
    refresh: RefreshMode,
    print_row_on_update: bool,
    header_every: usize,
    rows_since_header: usize,
    embedded_progress_bar: bool,
    terminal_width: Option<usize>,
    /// The live row received an `update` and is shown when sealed.
    current_touched: bool,
    closed: bool,
    /// Failure of a background repaint, reported by the next call.
    pending_error: Option<TableError>,
}

fn lock(shared: &Mutex<TableState>) -> MutexGuard<'_, TableState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Normalise a range against `len`.
fn span(range: &impl RangeBounds<usize>, len: usize, what: &str) -> Result<Range<usize>> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    if start > end || end > len {
        return Err(TableError::BadIndex(format!(
            "{what} range {start}..{end} is outside 0..{len}"
        )));
    }
    Ok(start..end)
}

impl TableState {
    fn check_open(&mut self) -> Result<()> {
        if self.closed {
            return Err(TableError::TableClosed);
        }
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn after_mutation(&mut self) -> Result<()> {
        match self.refresh {
            RefreshMode::Immediate => self.paint(true),
            RefreshMode::Timer(_) | RefreshMode::Manual => Ok(()),
        }
    }

    fn needs_paint(&self) -> bool {
        self.log.has_dirty() || self.bars.needs_paint()
    }

    // ------------------------------------------------------------------------
    // rows and columns
    // ------------------------------------------------------------------------

    /// Line the live row occupies, or will occupy once its staged
    /// decorations are flushed.
    fn predicted_row_line(&self) -> usize {
        let current = self.rows.current_index();
        self.log.line_of_row(current).unwrap_or_else(|| {
            let staged = if self.log.is_opened() { self.log.pending().len() } else { 3 };
            self.log.len() + staged
        })
    }

    /// The live row was written through `update`.
    fn show_current(&mut self) {
        self.current_touched = true;
        if self.interactivity > Interactivity::AppendOnly && self.print_row_on_update {
            self.log.bind_row(self.rows.current_index(), true);
        }
    }

    /// Re-dirty a row that is already on screen, if the policy allows.
    fn refresh_row(&mut self, row: usize) {
        if self.log.line_of_row(row).is_none() {
            return;
        }
        let live = row == self.rows.current_index();
        let allow = match self.interactivity {
            Interactivity::Full => true,
            Interactivity::CurrentRow => live,
            Interactivity::AppendOnly => false,
        };
        self.log.bind_row(row, allow);
    }

    fn write_text(&mut self, text: &str) {
        let live_shown = self.log.line_of_row(self.rows.current_index()).is_some();
        if live_shown && self.interactivity == Interactivity::CurrentRow {
            self.log.hold_user_text(text);
        } else {
            self.log.append_user_text(text);
        }
    }

    fn seal_current(&mut self) {
        let allow = self.interactivity > Interactivity::AppendOnly;
        self.log.bind_row(self.rows.current_index(), allow);
    }

    fn advance(&mut self, next: ResolvedNextRow) -> Result<()> {
        let current = self.rows.current_index();
        if let Some(color) = next.color {
            self.rows.set_row_color(current, color)?;
        }
        for (column, color) in &next.column_colors {
            self.rows.set_color(current, column, *color)?;
        }
        self.seal_current();
        self.log.release_held_text();

        let created = self.rows.append_empty_row();
        self.rows.set_row_color(created, self.default_row_color)?;
        self.current_touched = false;
        self.rows_since_header += 1;

        let reprint = next.header
            || (self.header_every > 0 && self.rows_since_header >= self.header_every);
        let staged = if reprint {
            self.rows_since_header = 0;
            vec![
                DisplayEntry::SplitMid,
                DisplayEntry::Header,
                DisplayEntry::SplitMid,
            ]
        } else if next.split {
            vec![DisplayEntry::SplitMid]
        } else {
            Vec::new()
        };
        self.log.stage_decorations(staged);
        Ok(())
    }

    /// Apply `change` to a copy of the registry; commit only on success.
    /// A change of names or widths re-lays the table out.
    fn change_columns<R>(&mut self, change: impl FnOnce(&mut ColumnRegistry) -> Result<R>) -> Result<R> {
        let mut next = self.columns.clone();
        let outcome = change(&mut next)?;
        let relayout = next.names() != self.columns.names() || next.widths() != self.columns.widths();

        if relayout && self.log.is_opened() && self.interactivity < Interactivity::Full {
            info!("column layout changed, closing the current table segment");
            self.close_segment()?;
        }
        self.columns = next;
        if self.interactivity == Interactivity::Full {
            self.log.mark_all_dirty();
            self.bars.mark_all_dirty();
        }
        Ok(outcome)
    }

    fn column_name(&self, key: &ColumnKey) -> Result<String> {
        match key {
            ColumnKey::Name(name) => self.columns.require(name).map(|c| c.name.clone()),
            ColumnKey::Index(index) => self
                .columns
                .at(*index)
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    TableError::BadIndex(format!(
                        "column index {index} is outside 0..{}",
                        self.columns.len()
                    ))
                }),
        }
    }

    fn stored_row(&self, row: i64) -> Result<usize> {
        match self.rows.resolve(row)? {
            RowSlot::Stored(index) => Ok(index),
            RowSlot::Next => Err(TableError::RowIndexOutOfRange {
                index: row,
                len: self.rows.len(),
            }),
        }
    }

    fn update_cell(&mut self, update: &CellUpdate) -> Result<()> {
        let color = update.color.as_ref().map(|c| c.resolve()).transpose()?;
        let slot = match update.row {
            Some(row) => self.rows.resolve(row)?,
            None => RowSlot::Stored(self.rows.current_index()),
        };
        let name = update.column.name.clone();
        let aggregate = match self.columns.get(&name) {
            Some(column) => column.aggregate.clone(),
            None => update
                .column
                .aggregate
                .clone()
                .unwrap_or_else(|| self.column_defaults.aggregate.clone()),
        };
        if aggregate.is_numeric() && !update.value.is_numeric() {
            return Err(TableError::NonNumeric { column: name });
        }

        if self.columns.get(&name).is_none() {
            let defaults = self.column_defaults.clone();
            let spec = update.column.clone();
            self.change_columns(|columns| columns.declare(&spec, &defaults))?;
        }
        let index = match slot {
            RowSlot::Stored(index) => index,
            RowSlot::Next => {
                self.advance(NextRow::new().resolve()?)?;
                self.rows.current_index()
            }
        };

        let column = self.columns.require(&name)?;
        self.rows
            .update(index, column, update.value.clone(), update.weight, color)?;
        if index == self.rows.current_index() {
            self.show_current();
        } else {
            self.refresh_row(index);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // progress bars
    // ------------------------------------------------------------------------

    fn create_bar(&mut self, total: Option<u64>, options: &PbarOptions) -> Result<BarId> {
        let style = options.style.as_ref().map(|s| s.resolve()).transpose()?;
        let style_embed = options.style_embed.as_ref().map(|s| s.resolve()).transpose()?;
        let color = options.color.as_ref().map(|c| c.resolve()).transpose()?;
        let color_empty = options.color_empty.as_ref().map(|c| c.resolve()).transpose()?;

        let style = style
            .unwrap_or(self.pbar_style)
            .with_colors(color, color_empty);
        let style_embed = style_embed
            .unwrap_or(self.pbar_style_embed)
            .with_colors(color, color_empty);
        let flags = InfoFlags {
            throughput: options.show_throughput.unwrap_or(self.pbar_flags.throughput),
            progress: options.show_progress.unwrap_or(self.pbar_flags.progress),
            percents: options.show_percents.unwrap_or(self.pbar_flags.percents),
            eta: options.show_eta.unwrap_or(self.pbar_flags.eta),
        };
        let placement = if options.static_position {
            Placement::Static {
                row: options.position.unwrap_or(0),
            }
        } else {
            let first = if self.embedded_progress_bar { 0 } else { 1 };
            Placement::Floating {
                level: options
                    .position
                    .unwrap_or_else(|| self.bars.free_level(first)),
            }
        };
        let bar = Bar::new(
            total,
            style,
            style_embed,
            placement,
            options.description.clone(),
            flags,
        );
        let id = self.bars.insert(bar);
        debug!(?id, ?placement, "progress bar created");
        Ok(id)
    }

    fn with_bar(&mut self, id: BarId, f: impl FnOnce(&mut Bar)) {
        if let Some(bar) = self.bars.get_mut(id) {
            f(bar);
        }
    }

    fn close_bar(&mut self, id: BarId) {
        let Some(bar) = self.bars.remove(id) else {
            return;
        };
        if let Some(line) = bar.last_line {
            if line < self.log.len() {
                self.log.mark_dirty(line);
            } else {
                self.bars.schedule_blank(line);
            }
        }
    }

    // ------------------------------------------------------------------------
    // line text
    // ------------------------------------------------------------------------

    fn data_row_line(&self, index: usize) -> StyledLine {
        let Some(row) = self.rows.row(index) else {
            return StyledLine::new();
        };
        let overflow = self.table_style.cell_overflow;
        let cells = self
            .columns
            .iter()
            .map(|column| {
                let text = row
                    .values
                    .get(&column.name)
                    .map(|v| (self.formatter)(v))
                    .unwrap_or_default();
                (
                    fit_cell(&text, column.width, column.alignment, overflow),
                    row.cell_style(column),
                )
            })
            .collect();
        cells_line(cells, &self.table_style)
    }

    fn header_line(&self) -> StyledLine {
        let overflow = self.table_style.cell_overflow;
        let cells = self
            .columns
            .iter()
            .map(|column| {
                (
                    fit_cell(&column.name, column.width, column.alignment, overflow),
                    column.color,
                )
            })
            .collect();
        cells_line(cells, &self.table_style)
    }

    fn entry_line(&self, entry: &DisplayEntry) -> StyledLine {
        let s = &self.table_style;
        let widths = self.columns.widths();
        match entry {
            DisplayEntry::DataRow(index) => self.data_row_line(*index),
            DisplayEntry::Header => self.header_line(),
            DisplayEntry::SplitTop => border_line(&widths, s, (s.down_right, s.no_up, s.down_left)),
            DisplayEntry::SplitMid => border_line(&widths, s, (s.no_left, s.all, s.no_right)),
            DisplayEntry::SplitBot => border_line(&widths, s, (s.up_right, s.no_down, s.up_left)),
            DisplayEntry::UserText(text) => StyledLine::plain(text.clone()),
        }
    }

    fn bar_inner_width(&self) -> usize {
        let inner = if self.columns.is_empty() {
            DEFAULT_BAR_WIDTH
        } else {
            self.columns.inner_width()
        };
        match self.terminal_width {
            Some(width) => inner.min(width.saturating_sub(2)),
            None => inner,
        }
    }

    fn bar_line(&self, bar: &Bar, line: usize) -> StyledLine {
        if let Some(DisplayEntry::DataRow(row)) = self.log.entry(line) {
            let embed = match bar.placement {
                Placement::Static { .. } => true,
                Placement::Floating { level } => level == 0 && self.embedded_progress_bar,
            };
            if embed {
                return embed_into(&self.data_row_line(*row), &bar.style_embed, bar.progress());
            }
        }
        standalone_line(
            bar,
            bar.started.elapsed(),
            self.bar_inner_width(),
            self.table_style.vertical,
        )
    }

    fn finalize(&self, line: StyledLine) -> String {
        match self.terminal_width {
            Some(width) => line.clip(width).render(),
            None => line.render(),
        }
    }

    // ------------------------------------------------------------------------
    // painting
    // ------------------------------------------------------------------------

    /// One repaint pass: dirty entries, lines vacated by bars, then bars.
    fn paint(&mut self, draw_bars: bool) -> Result<()> {
        let draw_bars = draw_bars && self.interactivity > Interactivity::AppendOnly;
        let len = self.log.len();
        let row_line = self.predicted_row_line();

        let mut targets = Vec::new();
        let mut vacated = Vec::new();
        if draw_bars {
            let log = &self.log;
            for (id, bar) in self.bars.iter_mut() {
                let line = bar.placement.line(row_line, len, |row| log.line_of_row(row));
                if let Some(old) = bar.last_line.filter(|old| Some(*old) != line) {
                    vacated.push(old);
                }
                match line {
                    Some(line) => targets.push((*id, line)),
                    None => bar.last_line = None,
                }
            }
        }
        for old in vacated {
            if old < len {
                self.log.mark_dirty(old);
            } else {
                self.bars.schedule_blank(old);
            }
        }

        let mut plan = BTreeMap::new();
        for line in self.log.take_dirty() {
            if let Some(entry) = self.log.entry(line) {
                plan.insert(line, self.finalize(self.entry_line(entry)));
            }
        }
        for line in self.bars.take_cleanup() {
            if line >= len && !targets.iter().any(|(_, target)| *target == line) {
                plan.entry(line).or_insert_with(String::new);
            }
        }
        for (id, line) in targets {
            let Some(bar) = self.bars.get(id) else {
                continue;
            };
            if bar.dirty || bar.last_line != Some(line) || plan.contains_key(&line) {
                let text = self.finalize(self.bar_line(bar, line));
                plan.insert(line, text);
            }
            self.with_bar(id, |bar| {
                bar.last_line = Some(line);
                bar.dirty = false;
            });
        }

        let mut out = String::new();
        let stats = self
            .renderer
            .paint(&plan, len.saturating_sub(1), &mut out);
        if stats.painted + stats.skipped > 0 {
            debug!(painted = stats.painted, skipped = stats.skipped, "repaint");
        }
        self.sinks.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Finish the segment: bottom border, final paint without bars, cursor
    /// below the table. The next row starts a fresh segment.
    fn close_segment(&mut self) -> Result<()> {
        let len = self.log.len();
        let mut stale = Vec::new();
        for (_, bar) in self.bars.iter_mut() {
            if let Some(line) = bar.last_line.take() {
                stale.push(line);
            }
        }
        for line in stale {
            if line < len {
                self.log.mark_dirty(line);
            } else {
                self.bars.schedule_blank(line);
            }
        }

        self.log.close_segment();
        self.paint(false)?;
        let mut out = String::new();
        self.renderer.finish(&mut out);
        self.sinks.write_all(out.as_bytes())?;

        self.log.reset();
        self.bars.forget_lines();
        self.rows_since_header = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for id in self.bars.ids() {
            self.close_bar(id);
        }
        if self.current_touched {
            self.seal_current();
        }
        self.close_segment()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Everything a table needs beyond its serialisable configuration.
struct Resolved {
    table_style: TableStyle,
    pbar_style: PbarStyle,
    pbar_style_embed: PbarStyle,
    column_defaults: ColumnDefaults,
    default_row_color: StyleToken,
}

impl Resolved {
    fn from_config(config: &TableConfig, table_style: Option<&StyleArg<TableStyle>>) -> Result<Self> {
        let table_style = match table_style {
            Some(style) => style.resolve()?,
            None => parse_table_style(&config.table_style)?,
        };
        let color = config
            .default_column_color
            .as_deref()
            .map(parse_color)
            .transpose()?
            .unwrap_or_default();
        let aggregate = config
            .default_column_aggregate
            .as_deref()
            .map(str::parse::<Aggregate>)
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            table_style,
            pbar_style: parse_pbar_style(&config.pbar_style)?,
            pbar_style_embed: parse_pbar_style(&config.pbar_style_embed)?,
            column_defaults: ColumnDefaults {
                width: config.default_column_width,
                alignment: config.default_column_alignment,
                color,
                aggregate,
            },
            default_row_color: config
                .default_row_color
                .as_deref()
                .map(parse_color)
                .transpose()?
                .unwrap_or_default(),
        })
    }

    fn defaults() -> Self {
        Self {
            table_style: TableStyle::default(),
            pbar_style: PbarStyle::default(),
            pbar_style_embed: PbarStyle::embed_default(),
            column_defaults: ColumnDefaults::default(),
            default_row_color: StyleToken::plain(),
        }
    }
}

/// Configures and creates a [`ProgressTable`].
#[derive(Default)]
pub struct TableBuilder {
    config: TableConfig,
    sinks: Vec<Box<dyn Write + Send>>,
    formatter: Option<FormatFn>,
    columns: Vec<ColumnSpec>,
    table_style: Option<StyleArg<TableStyle>>,
}

impl TableBuilder {
    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interactivity(mut self, level: Interactivity) -> Self {
        self.config.interactivity = Some(level);
        self
    }

    pub fn refresh_rate(mut self, hz: u32) -> Self {
        self.config.refresh_rate = hz;
        self
    }

    pub fn manual_refresh(mut self, manual: bool) -> Self {
        self.config.manual_refresh = manual;
        self
    }

    pub fn table_style(mut self, style: impl Into<StyleArg<TableStyle>>) -> Self {
        self.table_style = Some(style.into());
        self
    }

    pub fn pbar_style(mut self, description: impl Into<String>) -> Self {
        self.config.pbar_style = description.into();
        self
    }

    pub fn pbar_style_embed(mut self, description: impl Into<String>) -> Self {
        self.config.pbar_style_embed = description.into();
        self
    }

    pub fn embedded_progress_bar(mut self, embedded: bool) -> Self {
        self.config.embedded_progress_bar = embedded;
        self
    }

    pub fn num_decimal_places(mut self, places: usize) -> Self {
        self.config.num_decimal_places = places;
        self
    }

    pub fn default_column_width(mut self, width: usize) -> Self {
        self.config.default_column_width = width;
        self
    }

    pub fn default_column_alignment(mut self, alignment: Alignment) -> Self {
        self.config.default_column_alignment = alignment;
        self
    }

    pub fn default_column_color(mut self, description: impl Into<String>) -> Self {
        self.config.default_column_color = Some(description.into());
        self
    }

    pub fn default_column_aggregate(mut self, name: impl Into<String>) -> Self {
        self.config.default_column_aggregate = Some(name.into());
        self
    }

    pub fn default_row_color(mut self, description: impl Into<String>) -> Self {
        self.config.default_row_color = Some(description.into());
        self
    }

    pub fn print_header_every_n_rows(mut self, rows: usize) -> Self {
        self.config.print_header_every_n_rows = rows;
        self
    }

    pub fn print_row_on_update(mut self, print: bool) -> Self {
        self.config.print_row_on_update = print;
        self
    }

    pub fn terminal_width(mut self, columns: usize) -> Self {
        self.config.terminal_width = Some(columns);
        self
    }

    pub fn terminal_height(mut self, lines: usize) -> Self {
        self.config.terminal_height = Some(lines);
        self
    }

    /// Add an output sink. Without any, the table writes to stdout.
    pub fn sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Replace the default value formatter.
    pub fn formatter(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.formatter = Some(Arc::new(f));
        self
    }

    pub fn column(mut self, column: impl Into<ColumnSpec>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn columns<C: Into<ColumnSpec>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Resolve every description and start the table. Nothing is written
    /// until the first row becomes visible.
    pub fn build(self) -> Result<ProgressTable> {
        let resolved = Resolved::from_config(&self.config, self.table_style.as_ref())?;
        let mut columns = ColumnRegistry::new();
        for spec in &self.columns {
            columns.declare(spec, &resolved.column_defaults)?;
        }
        Ok(ProgressTable::assemble(
            self.config,
            resolved,
            columns,
            self.sinks,
            self.formatter,
        ))
    }
}

// ============================================================================
// PROGRESS TABLE
// ============================================================================

/// A table printed incrementally to one or more sinks.
pub struct ProgressTable {
    shared: Arc<Mutex<TableState>>,
    refresher: Mutex<Option<Refresher>>,
}

impl Default for ProgressTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTable {
    /// A table with the default configuration writing to stdout.
    pub fn new() -> Self {
        Self::assemble(
            TableConfig::default(),
            Resolved::defaults(),
            ColumnRegistry::new(),
            Vec::new(),
            None,
        )
    }

    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    fn assemble(
        config: TableConfig,
        resolved: Resolved,
        columns: ColumnRegistry,
        writers: Vec<Box<dyn Write + Send>>,
        formatter: Option<FormatFn>,
    ) -> Self {
        let custom_sinks = !writers.is_empty();
        let sinks = if custom_sinks {
            Sinks::from_writers(writers)
        } else {
            Sinks::stdout()
        };
        let detected = if custom_sinks { None } else { terminal_size() };
        let interactivity = config.interactivity.unwrap_or(if detected.is_some() {
            Interactivity::Full
        } else {
            Interactivity::AppendOnly
        });
        let terminal_width = config.terminal_width.or(detected.map(|(w, _)| w));
        let terminal_height = config.terminal_height.or(detected.map(|(_, h)| h));
        let refresh = RefreshMode::from_config(&config);

        let mut rows = RowStore::new();
        let _ = rows.set_row_color(0, resolved.default_row_color);

        let state = TableState {
            columns,
            column_defaults: resolved.column_defaults,
            rows,
            log: DisplayLog::new(),
            renderer: Renderer::new(interactivity, terminal_height),
            bars: BarEngine::new(),
            sinks,
            formatter: formatter.unwrap_or_else(|| default_formatter(config.num_decimal_places)),
            table_style: resolved.table_style,
            pbar_style: resolved.pbar_style,
            pbar_style_embed: resolved.pbar_style_embed,
            pbar_flags: InfoFlags {
                throughput: config.pbar_show_throughput,
                progress: config.pbar_show_progress,
                percents: config.pbar_show_percents,
                eta: config.pbar_show_eta,
            },
            default_row_color: resolved.default_row_color,
            interactivity,
            refresh,
            print_row_on_update: config.print_row_on_update,
            header_every: config.print_header_every_n_rows,
            rows_since_header: 0,
            embedded_progress_bar: config.embedded_progress_bar,
            terminal_width,
            current_touched: false,
            closed: false,
            pending_error: None,
        };
        debug!(?interactivity, ?refresh, "progress table created");

        let shared = Arc::new(Mutex::new(state));
        let refresher = match refresh {
            RefreshMode::Timer(period) => Self::start_refresher(&shared, period),
            RefreshMode::Immediate | RefreshMode::Manual => None,
        };
        Self {
            shared,
            refresher: Mutex::new(refresher),
        }
    }

    fn start_refresher(shared: &Arc<Mutex<TableState>>, period: Duration) -> Option<Refresher> {
        let weak: Weak<Mutex<TableState>> = Arc::downgrade(shared);
        let spawned = Refresher::spawn(period, move || {
            let Some(shared) = weak.upgrade() else {
                return false;
            };
            let mut state = lock(&shared);
            if state.closed {
                return false;
            }
            if state.pending_error.is_none() && state.needs_paint() {
                if let Err(err) = state.paint(true) {
                    warn!(error = %err, "background repaint failed");
                    state.pending_error = Some(err);
                }
            }
            true
        });
        match spawned {
            Ok(refresher) => Some(refresher),
            Err(err) => {
                warn!(error = %err, "could not start refresh thread, repainting synchronously");
                lock(shared).refresh = RefreshMode::Immediate;
                None
            }
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut TableState) -> Result<R>) -> Result<R> {
        let mut state = lock(&self.shared);
        state.check_open()?;
        let outcome = f(&mut state)?;
        state.after_mutation()?;
        Ok(outcome)
    }

    fn read<R>(&self, f: impl FnOnce(&TableState) -> Result<R>) -> Result<R> {
        let state = lock(&self.shared);
        f(&state)
    }

    // ------------------------------------------------------------------------
    // columns
    // ------------------------------------------------------------------------

    /// Declare a column, or update the properties of an existing one.
    pub fn add_column(&self, column: impl Into<ColumnSpec>) -> Result<()> {
        let spec = column.into();
        self.mutate(|state| {
            let defaults = state.column_defaults.clone();
            state
                .change_columns(|columns| columns.declare(&spec, &defaults))
                .map(|_| ())
        })
    }

    pub fn add_columns<C: Into<ColumnSpec>>(&self, columns: impl IntoIterator<Item = C>) -> Result<()> {
        let specs: Vec<ColumnSpec> = columns.into_iter().map(Into::into).collect();
        self.mutate(|state| {
            let defaults = state.column_defaults.clone();
            state.change_columns(|columns| {
                for spec in &specs {
                    columns.declare(spec, &defaults)?;
                }
                Ok(())
            })
        })
    }

    /// Add `n` columns named after their position (`"0"`, `"1"`, ...),
    /// continuing from the current column count.
    pub fn add_numbered_columns(&self, n: usize) -> Result<()> {
        let start = self.num_columns();
        self.add_columns((start..start + n).map(|i| i.to_string()))
    }

    /// Put the named columns first, in this order.
    pub fn reorder_columns(&self, names: &[&str]) -> Result<()> {
        self.mutate(|state| state.change_columns(|columns| columns.reorder(names)).map(|_| ()))
    }

    pub fn num_columns(&self) -> usize {
        lock(&self.shared).columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        lock(&self.shared)
            .columns
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    // ------------------------------------------------------------------------
    // cells
    // ------------------------------------------------------------------------

    /// Write `value` into the live row, creating the column if needed.
    pub fn update(&self, column: &str, value: impl Into<Value>) -> Result<()> {
        self.update_cell(CellUpdate::new(column, value))
    }

    pub fn update_cell(&self, update: CellUpdate) -> Result<()> {
        self.mutate(|state| state.update_cell(&update))
    }

    pub fn update_many<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<ColumnSpec>,
        V: Into<Value>,
    {
        let updates: Vec<CellUpdate> = pairs
            .into_iter()
            .map(|(k, v)| CellUpdate::new(k, v))
            .collect();
        self.mutate(|state| {
            for update in &updates {
                state.update_cell(update)?;
            }
            Ok(())
        })
    }

    /// Value of a column in the live row.
    pub fn get(&self, column: &str) -> Result<Option<Value>> {
        self.get_at(-1, column)
    }

    pub fn get_at(&self, row: i64, column: &str) -> Result<Option<Value>> {
        self.read(|state| {
            state.columns.require(column)?;
            let index = state.stored_row(row)?;
            Ok(state.rows.get(index, column).cloned())
        })
    }

    /// Overwrite one cell, bypassing aggregation.
    pub fn set_cell(&self, row: i64, column: impl Into<ColumnKey>, value: impl Into<Value>) -> Result<()> {
        let key = column.into();
        let value = value.into();
        self.mutate(|state| {
            let name = state.column_name(&key)?;
            let index = state.stored_row(row)?;
            state.rows.set_value(index, &name, value)?;
            state.refresh_row(index);
            Ok(())
        })
    }

    /// Overwrite every cell in a block of rows and columns.
    pub fn set_region(
        &self,
        rows: impl RangeBounds<usize>,
        columns: impl RangeBounds<usize>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        self.edit_region(&rows, &columns, |store, row, name| {
            store.set_value(row, name, value.clone())
        })
    }

    pub fn set_weight(
        &self,
        rows: impl RangeBounds<usize>,
        columns: impl RangeBounds<usize>,
        weight: f64,
    ) -> Result<()> {
        self.edit_region(&rows, &columns, |store, row, name| {
            store.set_weight(row, name, weight)
        })
    }

    pub fn set_color(
        &self,
        rows: impl RangeBounds<usize>,
        columns: impl RangeBounds<usize>,
        color: impl Into<StyleArg<StyleToken>>,
    ) -> Result<()> {
        let color = color.into().resolve()?;
        self.edit_region(&rows, &columns, |store, row, name| {
            store.set_color(row, name, color)
        })
    }

    fn edit_region(
        &self,
        rows: &impl RangeBounds<usize>,
        columns: &impl RangeBounds<usize>,
        mut edit: impl FnMut(&mut RowStore, usize, &str) -> Result<()>,
    ) -> Result<()> {
        self.mutate(|state| {
            let rows = span(rows, state.rows.len(), "row")?;
            let columns = span(columns, state.columns.len(), "column")?;
            let names: Vec<String> = state.columns.names()[columns]
                .iter()
                .map(|s| s.to_string())
                .collect();
            for row in rows {
                for name in &names {
                    edit(&mut state.rows, row, name)?;
                }
                state.refresh_row(row);
            }
            Ok(())
        })
    }

    fn read_region<T>(
        &self,
        rows: &impl RangeBounds<usize>,
        columns: &impl RangeBounds<usize>,
        cell: impl Fn(&RowStore, usize, &str) -> Option<T>,
    ) -> Result<Vec<Vec<Option<T>>>> {
        self.read(|state| {
            let rows = span(rows, state.rows.len(), "row")?;
            let columns = span(columns, state.columns.len(), "column")?;
            let names = &state.columns.names()[columns];
            Ok(rows
                .map(|row| names.iter().map(|name| cell(&state.rows, row, name)).collect())
                .collect())
        })
    }

    /// Values of a block of rows and columns; missing cells are `None`.
    pub fn get_region(
        &self,
        rows: impl RangeBounds<usize>,
        columns: impl RangeBounds<usize>,
    ) -> Result<Vec<Vec<Option<Value>>>> {
        self.read_region(&rows, &columns, |store, row, name| store.get(row, name).cloned())
    }

    pub fn get_weights(
        &self,
        rows: impl RangeBounds<usize>,
        columns: impl RangeBounds<usize>,
    ) -> Result<Vec<Vec<Option<f64>>>> {
        self.read_region(&rows, &columns, |store, row, name| store.weight(row, name))
    }

    pub fn get_colors(
        &self,
        rows: impl RangeBounds<usize>,
        columns: impl RangeBounds<usize>,
    ) -> Result<Vec<Vec<Option<StyleToken>>>> {
        self.read_region(&rows, &columns, |store, row, name| store.color(row, name))
    }

    // ------------------------------------------------------------------------
    // rows
    // ------------------------------------------------------------------------

    /// Finish the live row and start a new one.
    pub fn next_row(&self) -> Result<()> {
        self.next_row_with(NextRow::new())
    }

    pub fn next_row_with(&self, options: NextRow) -> Result<()> {
        let resolved = options.resolve()?;
        self.mutate(|state| state.advance(resolved))
    }

    /// Fill the live row positionally, then finish it.
    pub fn add_row<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(|state| {
            if values.len() > state.columns.len() {
                return Err(TableError::BadIndex(format!(
                    "row has {} values but the table has {} columns",
                    values.len(),
                    state.columns.len()
                )));
            }
            let names: Vec<String> = state.columns.names().into_iter().map(str::to_string).collect();
            for (name, value) in names.into_iter().zip(values) {
                state.update_cell(&CellUpdate::new(name, value))?;
            }
            state.advance(NextRow::new().resolve()?)
        })
    }

    /// Finish `n` rows in a row.
    pub fn add_rows(&self, n: usize) -> Result<()> {
        self.add_rows_with(n, NextRow::new())
    }

    pub fn add_rows_with(&self, n: usize, options: NextRow) -> Result<()> {
        let resolved = options.resolve()?;
        self.mutate(|state| {
            for _ in 0..n {
                state.advance(ResolvedNextRow {
                    color: resolved.color,
                    column_colors: resolved.column_colors.clone(),
                    split: resolved.split,
                    header: resolved.header,
                })?;
            }
            Ok(())
        })
    }

    /// Rows stored so far, the live row included.
    pub fn num_rows(&self) -> usize {
        lock(&self.shared).rows.len()
    }

    /// Print free text below the table without disturbing it. Below full
    /// interactivity, text written while the live row is on screen waits
    /// until that row is sealed, so the row stays the last line.
    pub fn write(&self, text: &str) -> Result<()> {
        self.mutate(|state| {
            state.write_text(text);
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // progress bars
    // ------------------------------------------------------------------------

    /// Start a progress bar. `None` (or zero) as total animates instead of
    /// filling.
    pub fn pbar(&self, total: impl Into<Option<u64>>, options: PbarOptions) -> Result<ProgressBar> {
        let total = total.into();
        let id = self.mutate(|state| state.create_bar(total, &options))?;
        Ok(ProgressBar {
            shared: Arc::clone(&self.shared),
            id,
            closed: false,
        })
    }

    /// Wrap an iterator in a progress bar. Without an explicit total the
    /// iterator's exact size hint is used, if it has one.
    pub fn pbar_iter<I: IntoIterator>(
        &self,
        iter: I,
        total: Option<u64>,
        options: PbarOptions,
    ) -> Result<PbarIter<I::IntoIter>> {
        let iter = iter.into_iter();
        let total = total.or_else(|| match iter.size_hint() {
            (lower, Some(upper)) if lower == upper => u64::try_from(lower).ok(),
            _ => None,
        });
        let bar = self.pbar(total, options)?;
        Ok(PbarIter {
            iter,
            bar,
            started: false,
        })
    }

    // ------------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------------

    /// Paint pending changes now, whatever the refresh mode.
    pub fn refresh(&self) -> Result<()> {
        let mut state = lock(&self.shared);
        state.check_open()?;
        state.paint(true)
    }

    /// Stop the refresh thread, flush everything and draw the bottom border.
    /// Further mutations fail with [`TableError::TableClosed`]. Closing twice
    /// is a no-op.
    pub fn close(&self) -> Result<()> {
        let refresher = self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(refresher) = refresher {
            refresher.stop();
        }

        let mut state = lock(&self.shared);
        if state.closed {
            return Ok(());
        }
        let pending = state.pending_error.take();
        let outcome = state.close();
        state.closed = true;
        debug!("progress table closed");
        match pending {
            Some(err) => Err(err),
            None => outcome,
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }

    pub fn interactivity(&self) -> Interactivity {
        lock(&self.shared).interactivity
    }

    // ------------------------------------------------------------------------
    // export
    // ------------------------------------------------------------------------

    /// Every row as values in column order. The live row is left out while
    /// it is empty.
    pub fn to_list(&self) -> Vec<Vec<Option<Value>>> {
        let state = lock(&self.shared);
        export::to_list(&state.columns, &state.rows)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let state = lock(&self.shared);
        export::to_json(&state.columns, &state.rows)
    }
}

impl Drop for ProgressTable {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close progress table");
        }
    }
}

// ============================================================================
// PROGRESS BAR HANDLES
// ============================================================================

/// Handle to one bar of a table. Closed on drop.
pub struct ProgressBar {
    shared: Arc<Mutex<TableState>>,
    id: BarId,
    closed: bool,
}

impl ProgressBar {
    fn mutate(&self, f: impl FnOnce(&mut Bar)) -> Result<()> {
        let mut state = lock(&self.shared);
        state.check_open()?;
        state.with_bar(self.id, f);
        state.after_mutation()
    }

    /// Advance by `n` steps.
    pub fn update(&self, n: u64) -> Result<()> {
        self.mutate(|bar| bar.update(n))
    }

    pub fn set_step(&self, step: u64) -> Result<()> {
        self.mutate(|bar| bar.set_step(step))
    }

    pub fn set_total(&self, total: impl Into<Option<u64>>) -> Result<()> {
        let total = total.into();
        self.mutate(|bar| bar.set_total(total))
    }

    /// Back to step zero with a fresh clock, optionally with a new total.
    pub fn reset(&self, total: impl Into<Option<u64>>) -> Result<()> {
        let total = total.into();
        self.mutate(|bar| bar.reset(total))
    }

    pub fn step(&self) -> Option<u64> {
        lock(&self.shared).bars.get(self.id).map(|bar| bar.step)
    }

    pub fn total(&self) -> Option<u64> {
        lock(&self.shared).bars.get(self.id).and_then(|bar| bar.total)
    }

    pub fn placement(&self) -> Option<Placement> {
        lock(&self.shared).bars.get(self.id).map(|bar| bar.placement)
    }

    /// Remove the bar; its line is restored or blanked on the next paint.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = lock(&self.shared);
        if state.closed {
            return Ok(());
        }
        state.close_bar(self.id);
        state.after_mutation()
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close progress bar");
        }
    }
}

/// Iterator adapter advancing a bar by one per finished item.
pub struct PbarIter<I> {
    iter: I,
    bar: ProgressBar,
    started: bool,
}

impl<I> PbarIter<I> {
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl<I: Iterator> Iterator for PbarIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bar.closed {
            return None;
        }
        if self.started {
            if let Err(err) = self.bar.update(1) {
                warn!(error = %err, "progress bar update failed");
            }
        }
        self.started = true;
        let item = self.iter.next();
        if item.is_none() {
            if let Err(err) = self.bar.close() {
                warn!(error = %err, "progress bar close failed");
            }
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

// ============================================================================
// TESTS
// ============================================================================
