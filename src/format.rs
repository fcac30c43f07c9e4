//! Cell and line formatting.
//!
//! Turns values into fixed-width cell text and assembles table lines as
//! styled spans. Escape codes are only produced by [`StyledLine::render`],
//! so overlays (embedded progress bars) work on plain characters.

use std::sync::Arc;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::style::{StyleToken, TableStyle};
use crate::types::{Alignment, Value};

// ============================================================================
// VALUE FORMATTERS
// ============================================================================

/// Converts a cell value into display text.
pub type FormatFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Integers as-is, floats with `decimals` places, text unchanged.
pub fn default_formatter(decimals: usize) -> FormatFn {
    Arc::new(move |value: &Value| match value {
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{:.*}", decimals, f),
        Value::Text(s) => s.clone(),
    })
}

// ============================================================================
// STYLED LINES
// ============================================================================

/// A run of text drawn with one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: StyleToken,
}

/// One terminal line as a sequence of styled spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledLine {
    spans: Vec<Span>,
}

impl StyledLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plain(text: impl Into<String>) -> Self {
        let mut line = Self::new();
        line.push(text, StyleToken::plain());
        line
    }

    pub fn push(&mut self, text: impl Into<String>, style: StyleToken) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(&text),
            _ => self.spans.push(Span { text, style }),
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Display width in terminal columns.
    pub fn width(&self) -> usize {
        self.spans.iter().map(|s| s.text.width()).sum()
    }

    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Flatten into per-character cells.
    pub fn to_cells(&self) -> Vec<(char, StyleToken)> {
        self.spans
            .iter()
            .flat_map(|span| span.text.chars().map(move |c| (c, span.style)))
            .collect()
    }

    pub fn from_cells(cells: impl IntoIterator<Item = (char, StyleToken)>) -> Self {
        let mut line = Self::new();
        for (c, style) in cells {
            line.push(c.to_string(), style);
        }
        line
    }

    /// Drop everything past `max_width` columns.
    pub fn clip(&self, max_width: usize) -> StyledLine {
        let mut clipped = StyledLine::new();
        let mut used = 0;
        for (c, style) in self.to_cells() {
            let w = c.width().unwrap_or(0);
            if used + w > max_width {
                break;
            }
            used += w;
            clipped.push(c.to_string(), style);
        }
        clipped
    }

    /// Text with escape codes.
    pub fn render(&self) -> String {
        self.spans.iter().map(|s| s.style.paint(&s.text)).collect()
    }
}

// ============================================================================
// CELLS
// ============================================================================

/// Pad `text` to `width` columns. Text already that wide is returned as is.
///
/// Centering puts the odd column on the right unless both the padding and
/// the width are odd.
pub fn align(text: &str, width: usize, alignment: Alignment) -> String {
    let used = text.width();
    if used >= width {
        return text.to_string();
    }
    let pad = width - used;
    let left = match alignment {
        Alignment::Left => 0,
        Alignment::Right => pad,
        Alignment::Center => pad / 2 + (pad & width & 1),
    };
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(pad - left))
}

/// Cut `text` to at most `width` columns.
fn truncate(text: &str, width: usize) -> String {
    let mut used = 0;
    text.chars()
        .take_while(|c| {
            used += c.width().unwrap_or(0);
            used <= width
        })
        .collect()
}

/// Cell body of exactly `width + 2` columns: one blank on each side of the
/// aligned text. Text wider than `width` keeps `width - 1` columns followed
/// by the overflow glyph.
pub fn fit_cell(text: &str, width: usize, alignment: Alignment, overflow: char) -> String {
    let body = if text.width() > width {
        let mut cut = truncate(text, width.saturating_sub(1));
        cut.push(overflow);
        align(&cut, width, Alignment::Left)
    } else {
        align(text, width, alignment)
    };
    format!(" {} ", body)
}

// ============================================================================
// LINES
// ============================================================================

/// `left`, then one run of horizontal glyphs per column joined by `center`,
/// then `right`. Each run covers the cell body plus its two blanks.
pub fn border_line(
    widths: &[usize],
    style: &TableStyle,
    (left, center, right): (char, char, char),
) -> StyledLine {
    let runs: Vec<String> = widths
        .iter()
        .map(|w| style.horizontal.to_string().repeat(w + 2))
        .collect();
    StyledLine::plain(format!(
        "{}{}{}",
        left,
        runs.join(&center.to_string()),
        right
    ))
}

/// Already fitted cells separated and framed by the vertical glyph.
pub fn cells_line(cells: Vec<(String, StyleToken)>, style: &TableStyle) -> StyledLine {
    let vertical = style.vertical.to_string();
    let mut line = StyledLine::new();
    line.push(vertical.clone(), StyleToken::plain());
    for (text, token) in cells {
        line.push(text, token);
        line.push(vertical.clone(), StyleToken::plain());
    }
    line
}

// ============================================================================
// TESTS
// ============================================================================
