//! Progress bar state and bar text.
//!
//! A bar is either standalone (its own line: info segment then glyph run,
//! framed like a table row) or embedded (glyphs painted over the blank
//! columns of a visible data row). The engine owns every active bar and the
//! lines that need blanking once a bar goes away.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use indicatif::FormattedDuration;
use unicode_width::UnicodeWidthStr;

use crate::format::StyledLine;
use crate::style::{PbarStyle, StyleArg, StyleToken};

/// Inner width used for standalone bars when the table has no columns.
pub const DEFAULT_BAR_WIDTH: usize = 40;

// ============================================================================
// OPTIONS
// ============================================================================

/// Identifies a bar within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarId(u64);

/// Where a bar is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Relative to the live row: level 0 sits on the row itself, level `k`
    /// `k` lines below the end of the table.
    Floating { level: usize },
    /// Pinned to a data row, wherever that row is shown.
    Static { row: usize },
}

impl Placement {
    /// Line this bar occupies given where the live row is (or will be).
    /// A static bar whose row is not on screen has no line.
    pub fn line(
        &self,
        row_line: usize,
        log_len: usize,
        line_of_row: impl Fn(usize) -> Option<usize>,
    ) -> Option<usize> {
        match *self {
            Placement::Floating { level: 0 } => Some(row_line),
            Placement::Floating { level } => Some(row_line.max(log_len.saturating_sub(1)) + level),
            Placement::Static { row } => line_of_row(row),
        }
    }
}

/// Which parts of the info segment are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoFlags {
    pub throughput: bool,
    pub progress: bool,
    pub percents: bool,
    pub eta: bool,
}

/// Per-bar settings. Anything left unset falls back to the table's
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct PbarOptions {
    pub description: Option<String>,
    pub position: Option<usize>,
    pub static_position: bool,
    pub style: Option<StyleArg<PbarStyle>>,
    pub style_embed: Option<StyleArg<PbarStyle>>,
    pub color: Option<StyleArg<StyleToken>>,
    pub color_empty: Option<StyleArg<StyleToken>>,
    pub show_throughput: Option<bool>,
    pub show_progress: Option<bool>,
    pub show_percents: Option<bool>,
    pub show_eta: Option<bool>,
}

impl PbarOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Floating level, or the pinned data row when combined with
    /// [`static_position`](Self::static_position).
    pub fn position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn static_position(mut self, pinned: bool) -> Self {
        self.static_position = pinned;
        self
    }

    pub fn style(mut self, style: impl Into<StyleArg<PbarStyle>>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn style_embed(mut self, style: impl Into<StyleArg<PbarStyle>>) -> Self {
        self.style_embed = Some(style.into());
        self
    }

    pub fn color(mut self, color: impl Into<StyleArg<StyleToken>>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn color_empty(mut self, color: impl Into<StyleArg<StyleToken>>) -> Self {
        self.color_empty = Some(color.into());
        self
    }

    pub fn show_throughput(mut self, show: bool) -> Self {
        self.show_throughput = Some(show);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = Some(show);
        self
    }

    pub fn show_percents(mut self, show: bool) -> Self {
        self.show_percents = Some(show);
        self
    }

    pub fn show_eta(mut self, show: bool) -> Self {
        self.show_eta = Some(show);
        self
    }
}

// ============================================================================
// BAR STATE
// ============================================================================

/// One active progress bar.
#[derive(Debug, Clone)]
pub struct Bar {
    pub step: u64,
    /// `None` or zero: unknown, the bar animates instead.
    pub total: Option<u64>,
    pub started: Instant,
    pub style: PbarStyle,
    pub style_embed: PbarStyle,
    pub placement: Placement,
    pub description: Option<String>,
    pub flags: InfoFlags,
    /// Line painted on the last pass.
    pub last_line: Option<usize>,
    pub dirty: bool,
}

impl Bar {
    pub fn new(
        total: Option<u64>,
        style: PbarStyle,
        style_embed: PbarStyle,
        placement: Placement,
        description: Option<String>,
        flags: InfoFlags,
    ) -> Self {
        Self {
            step: 0,
            total,
            started: Instant::now(),
            style,
            style_embed,
            placement,
            description,
            flags,
            last_line: None,
            dirty: true,
        }
    }

    fn known_total(&self) -> Option<u64> {
        self.total.filter(|t| *t > 0)
    }

    pub fn progress(&self) -> Progress {
        match self.known_total() {
            Some(total) => Progress::Fraction((self.step as f64 / total as f64).min(1.0)),
            None => Progress::Unknown(self.step),
        }
    }

    pub fn update(&mut self, n: u64) {
        self.step = self.step.saturating_add(n);
        self.dirty = true;
    }

    pub fn set_step(&mut self, step: u64) {
        self.step = step;
        self.dirty = true;
    }

    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
        self.dirty = true;
    }

    pub fn reset(&mut self, total: Option<u64>) {
        self.step = 0;
        if total.is_some() {
            self.total = total;
        }
        self.started = Instant::now();
        self.dirty = true;
    }

    /// `"[description, 3/10, 30.0%, 1.50 it/s, ETA 00:00:04] "`, or empty
    /// when nothing is shown.
    pub fn info_segment(&self, elapsed: Duration) -> String {
        let mut parts = Vec::new();
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            parts.push(description.to_string());
        }
        let total = self.known_total();
        if self.flags.progress {
            match total {
                Some(total) => parts.push(format!("{}/{}", self.step, total)),
                None => parts.push(format!("{}/?", self.step)),
            }
        }
        if self.flags.percents {
            if let Some(total) = total {
                parts.push(format!("{:.1}%", self.step as f64 / total as f64 * 100.0));
            }
        }
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 { self.step as f64 / secs } else { 0.0 };
        if self.flags.throughput {
            parts.push(format!("{:.2} it/s", throughput));
        }
        if self.flags.eta {
            if let Some(total) = total.filter(|_| throughput > 0.0) {
                let remaining = total.saturating_sub(self.step) as f64 / throughput;
                match Duration::try_from_secs_f64(remaining) {
                    Ok(eta) => parts.push(format!("ETA {}", FormattedDuration(eta))),
                    Err(_) => parts.push("ETA ?".to_string()),
                }
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("[{}] ", parts.join(", "))
        }
    }
}

/// How far along a bar is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Fraction(f64),
    /// Total unknown: the step wraps around the bar width.
    Unknown(u64),
}

impl Progress {
    fn filled(&self, width: usize) -> f64 {
        match *self {
            Progress::Fraction(frac) => frac * width as f64,
            Progress::Unknown(step) if width > 0 => (step % width as u64) as f64 + 0.5,
            Progress::Unknown(_) => 0.0,
        }
    }
}

// ============================================================================
// BAR TEXT
// ============================================================================

/// `width` glyphs: whole filled cells, a head for the partial cell, then
/// empty cells.
pub fn glyph_run(style: &PbarStyle, progress: Progress, width: usize) -> StyledLine {
    let exact = progress.filled(width).clamp(0.0, width as f64);
    let full = exact.floor() as usize;
    let remainder = exact - full as f64;

    let mut line = StyledLine::new();
    line.push(style.filled.to_string().repeat(full), style.color);
    let mut used = full;
    if used < width && remainder > 0.0 {
        line.push(style.head.glyph(remainder).to_string(), style.color);
        used += 1;
    }
    line.push(style.empty.to_string().repeat(width - used), style.color_empty);
    line
}

/// A standalone bar framed by `vertical`, `inner_width` columns between the
/// frame glyphs.
pub fn standalone_line(
    bar: &Bar,
    elapsed: Duration,
    inner_width: usize,
    vertical: char,
) -> StyledLine {
    let info = bar.info_segment(elapsed);
    let info = if info.width() > inner_width {
        StyledLine::plain(info).clip(inner_width).plain_text()
    } else {
        info
    };
    let run_width = inner_width.saturating_sub(info.width());

    let mut line = StyledLine::new();
    line.push(vertical.to_string(), StyleToken::plain());
    line.push(info, StyleToken::plain());
    for span in glyph_run(&bar.style, bar.progress(), run_width).spans() {
        line.push(span.text.clone(), span.style);
    }
    line.push(vertical.to_string(), StyleToken::plain());
    line
}

/// Overlay `style` onto the blank columns of `row`. Blanks up to the
/// progress point become filled glyphs, the first blank just past it the
/// head. Everything else keeps its text and style.
pub fn embed_into(row: &StyledLine, style: &PbarStyle, progress: Progress) -> StyledLine {
    let cells = row.to_cells();
    let exact = progress.filled(cells.len());
    let remainder = exact - exact.floor();
    let mut head_used = false;

    StyledLine::from_cells(cells.into_iter().enumerate().map(|(idx, (c, cell_style))| {
        if c != ' ' {
            return (c, cell_style);
        }
        let pos = idx as f64;
        if pos < exact.floor() {
            (style.filled, cell_style.merge(style.color))
        } else if !head_used && pos < exact + 1.0 && exact > 0.0 {
            head_used = true;
            (style.head.glyph(remainder), cell_style.merge(style.color))
        } else {
            (c, cell_style)
        }
    }))
}

// ============================================================================
// ENGINE
// ============================================================================

/// All active bars of one table.
#[derive(Debug, Clone, Default)]
pub struct BarEngine {
    bars: BTreeMap<BarId, Bar>,
    next_id: u64,
    /// Lines once owned by a closed bar that nothing else will repaint.
    cleanup: BTreeSet<usize>,
}

impl BarEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest floating level not in use, starting at `first`.
    pub fn free_level(&self, first: usize) -> usize {
        let used: BTreeSet<usize> = self
            .bars
            .values()
            .filter_map(|b| match b.placement {
                Placement::Floating { level } => Some(level),
                Placement::Static { .. } => None,
            })
            .collect();
        (first..).find(|level| !used.contains(level)).unwrap_or(first)
    }

    pub fn insert(&mut self, bar: Bar) -> BarId {
        let id = BarId(self.next_id);
        self.next_id += 1;
        self.bars.insert(id, bar);
        id
    }

    pub fn get(&self, id: BarId) -> Option<&Bar> {
        self.bars.get(&id)
    }

    pub fn get_mut(&mut self, id: BarId) -> Option<&mut Bar> {
        self.bars.get_mut(&id)
    }

    pub fn remove(&mut self, id: BarId) -> Option<Bar> {
        self.bars.remove(&id)
    }

    pub fn ids(&self) -> Vec<BarId> {
        self.bars.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&BarId, &mut Bar)> {
        self.bars.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Some bar changed or some vacated line still needs blanking.
    pub fn needs_paint(&self) -> bool {
        !self.cleanup.is_empty() || self.bars.values().any(|b| b.dirty)
    }

    pub fn mark_all_dirty(&mut self) {
        for bar in self.bars.values_mut() {
            bar.dirty = true;
        }
    }

    pub fn schedule_blank(&mut self, line: usize) {
        self.cleanup.insert(line);
    }

    pub fn take_cleanup(&mut self) -> BTreeSet<usize> {
        std::mem::take(&mut self.cleanup)
    }

    /// Forget painted positions, e.g. after the segment was closed.
    pub fn forget_lines(&mut self) {
        self.cleanup.clear();
        for bar in self.bars.values_mut() {
            bar.last_line = None;
            bar.dirty = true;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::parse_pbar_style;

    fn flags(throughput: bool, progress: bool, percents: bool, eta: bool) -> InfoFlags {
        InfoFlags { throughput, progress, percents, eta }
    }

    fn bar(total: Option<u64>, style: &str) -> Bar {
        let style = parse_pbar_style(style).unwrap();
        Bar::new(
            total,
            style,
            parse_pbar_style("cdots").unwrap(),
            Placement::Floating { level: 1 },
            None,
            flags(false, false, false, false),
        )
    }

    #[test]
    fn glyph_run_fills_proportionally() {
        let style = parse_pbar_style("square").unwrap();
        let run = glyph_run(&style, Progress::Fraction(0.5), 10);
        assert_eq!(run.plain_text(), "■■■■■□□□□□");
        let run = glyph_run(&style, Progress::Fraction(0.25), 10);
        assert_eq!(run.plain_text(), "■■◩□□□□□□□");
    }

    #[test]
    fn glyph_run_uses_graded_head() {
        let style = parse_pbar_style("full").unwrap();
        let run = glyph_run(&style, Progress::Fraction(0.55), 10);
        assert_eq!(run.plain_text(), "█████▌    ");
        assert_eq!(run.width(), 10);
    }

    #[test]
    fn glyph_run_complete_and_empty() {
        let style = parse_pbar_style("dash").unwrap();
        assert_eq!(glyph_run(&style, Progress::Fraction(1.0), 4).plain_text(), "----");
        assert_eq!(glyph_run(&style, Progress::Fraction(0.0), 4).plain_text(), "    ");
    }

    #[test]
    fn unknown_total_wraps_around() {
        let style = parse_pbar_style("dash").unwrap();
        assert_eq!(glyph_run(&style, Progress::Unknown(2), 5).plain_text(), "-->  ");
        assert_eq!(glyph_run(&style, Progress::Unknown(7), 5).plain_text(), "-->  ");
    }

    #[test]
    fn info_segment_lists_enabled_parts() {
        let mut b = bar(Some(10), "square");
        b.description = Some("train".to_string());
        b.flags = flags(true, true, true, true);
        b.step = 5;
        let info = b.info_segment(Duration::from_secs(5));
        assert_eq!(info, "[train, 5/10, 50.0%, 1.00 it/s, ETA 00:00:05] ");
    }

    #[test]
    fn eta_beyond_duration_range_is_unknown() {
        let mut b = bar(Some(u64::MAX), "square");
        b.flags = flags(false, false, false, true);
        b.step = 1;
        assert_eq!(b.info_segment(Duration::from_secs(10)), "[ETA ?] ");
    }

    #[test]
    fn info_segment_empty_when_nothing_shown() {
        let b = bar(Some(10), "square");
        assert_eq!(b.info_segment(Duration::from_secs(1)), "");
    }

    #[test]
    fn standalone_line_spans_inner_width() {
        let mut b = bar(Some(4), "dash");
        b.step = 2;
        let line = standalone_line(&b, Duration::ZERO, 10, '│');
        assert_eq!(line.plain_text(), "│-----     │");
        assert_eq!(line.width(), 12);
    }

    #[test]
    fn embed_overlays_only_blanks() {
        let style = parse_pbar_style("cdots").unwrap();
        let row = StyledLine::plain("│ 1  │ 2  │");
        let half = embed_into(&row, &style, Progress::Fraction(0.5));
        assert_eq!(half.plain_text(), "│ꞏ1ꞏꞏ│>2  │");
        let none = embed_into(&row, &style, Progress::Fraction(0.0));
        assert_eq!(none, row);
    }

    #[test]
    fn reset_restarts_and_keeps_total() {
        let mut b = bar(Some(10), "square");
        b.update(5);
        b.reset(None);
        assert_eq!(b.step, 0);
        assert_eq!(b.total, Some(10));
        b.reset(Some(3));
        assert_eq!(b.total, Some(3));
    }

    #[test]
    fn placement_lines() {
        let rows = |row: usize| (row < 2).then_some(row + 3);
        assert_eq!(Placement::Floating { level: 0 }.line(4, 5, rows), Some(4));
        assert_eq!(Placement::Floating { level: 2 }.line(4, 5, rows), Some(6));
        assert_eq!(Placement::Floating { level: 1 }.line(5, 5, rows), Some(6));
        assert_eq!(Placement::Static { row: 1 }.line(9, 10, rows), Some(4));
        assert_eq!(Placement::Static { row: 7 }.line(9, 10, rows), None);
    }

    #[test]
    fn engine_hands_out_free_levels() {
        let mut engine = BarEngine::new();
        assert_eq!(engine.free_level(0), 0);
        let first = engine.insert(Bar {
            placement: Placement::Floating { level: 0 },
            ..bar(None, "square")
        });
        assert_eq!(engine.free_level(0), 1);
        engine.insert(bar(None, "square"));
        assert_eq!(engine.free_level(0), 2);
        engine.remove(first);
        assert_eq!(engine.free_level(0), 0);
        assert_eq!(engine.len(), 1);
    }
}
