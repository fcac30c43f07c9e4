//! Incremental terminal renderer and output sinks.
//!
//! The renderer remembers which line of the current segment the cursor is
//! on and turns a paint plan (line index -> finished text) into cursor
//! movement plus text. It never decides *what* a line shows; that is the
//! table's job. This is the only module that writes bytes.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use crossterm::Command;
use crossterm::cursor::MoveUp;
use crossterm::terminal::{Clear, ClearType};

use crate::types::Interactivity;

// ============================================================================
// SINKS
// ============================================================================

/// In-memory sink that can be cloned and inspected while a table writes
/// into it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output streams. Every sink receives identical bytes.
pub struct Sinks {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl fmt::Debug for Sinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sinks").field("count", &self.sinks.len()).finish()
    }
}

impl Default for Sinks {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Sinks {
    pub fn stdout() -> Self {
        Self {
            sinks: vec![Box::new(io::stdout())],
        }
    }

    pub fn from_writers(sinks: Vec<Box<dyn Write + Send>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        for sink in &mut self.sinks {
            sink.write_all(bytes)?;
            sink.flush()?;
        }
        Ok(())
    }
}

/// Terminal size as (columns, lines) when stdout is a terminal.
pub fn terminal_size() -> Option<(usize, usize)> {
    if !io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size()
        .ok()
        .map(|(cols, lines)| (usize::from(cols), usize::from(lines)))
}

// ============================================================================
// RENDERER
// ============================================================================

/// Outcome of one paint pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaintStats {
    pub painted: usize,
    /// Lines the interactivity policy or the terminal height kept us from
    /// reaching.
    pub skipped: usize,
}

/// Cursor state machine for one table segment.
///
/// Line 0 is where the cursor stood when the segment started.
#[derive(Debug, Clone)]
pub struct Renderer {
    interactivity: Interactivity,
    cursor_line: usize,
    at_line_start: bool,
    /// Highest line already written in append-only mode.
    painted_through: Option<usize>,
    painted_any: bool,
    /// How far up the cursor may travel; lines beyond have scrolled away.
    max_rewind: Option<usize>,
}

fn push_command(out: &mut String, command: impl Command) {
    // Formatting into a String never fails.
    let _ = command.write_ansi(out);
}

impl Renderer {
    pub fn new(interactivity: Interactivity, terminal_height: Option<usize>) -> Self {
        Self {
            interactivity,
            cursor_line: 0,
            at_line_start: true,
            painted_through: None,
            painted_any: false,
            max_rewind: terminal_height.map(|h| h.saturating_sub(1)),
        }
    }

    pub fn interactivity(&self) -> Interactivity {
        self.interactivity
    }

    pub fn cursor_line(&self) -> usize {
        self.cursor_line
    }

    pub fn has_painted(&self) -> bool {
        self.painted_any
    }

    fn reachable(&self, line: usize) -> bool {
        if self.interactivity == Interactivity::AppendOnly {
            return self.painted_through.is_none_or(|done| line > done);
        }
        if line >= self.cursor_line {
            return true;
        }
        self.interactivity == Interactivity::Full
            && self
                .max_rewind
                .is_none_or(|max| self.cursor_line - line <= max)
    }

    fn move_to(&mut self, line: usize, out: &mut String) {
        if line < self.cursor_line {
            let mut distance = self.cursor_line - line;
            while distance > 0 {
                let step = distance.min(usize::from(u16::MAX));
                push_command(out, MoveUp(step as u16));
                distance -= step;
            }
            self.at_line_start = false;
        } else if line > self.cursor_line {
            out.push_str(&"\n".repeat(line - self.cursor_line));
            self.at_line_start = true;
        }
        self.cursor_line = line;
    }

    /// Emit every planned line in ascending order, then park the cursor on
    /// `home` (the segment's last line).
    pub fn paint(&mut self, plan: &BTreeMap<usize, String>, home: usize, out: &mut String) -> PaintStats {
        let mut stats = PaintStats::default();
        for (&line, text) in plan {
            if !self.reachable(line) {
                stats.skipped += 1;
                continue;
            }
            self.move_to(line, out);
            if !self.at_line_start {
                out.push('\r');
            }
            out.push_str(text);
            if self.interactivity > Interactivity::AppendOnly {
                push_command(out, Clear(ClearType::UntilNewLine));
            }
            self.at_line_start = false;
            self.painted_any = true;
            self.painted_through = Some(self.painted_through.map_or(line, |done| done.max(line)));
            stats.painted += 1;
        }
        if self.interactivity > Interactivity::AppendOnly && home != self.cursor_line {
            self.move_to(home, out);
        }
        stats
    }

    /// Leave the cursor on a fresh line right below home. Blanked lines
    /// further down are simply overwritten by whatever comes next.
    pub fn finish(&mut self, out: &mut String) {
        if !self.painted_any {
            return;
        }
        out.push('\n');
        self.reset();
    }

    /// Start a new segment at the current cursor position.
    pub fn reset(&mut self) {
        self.cursor_line = 0;
        self.at_line_start = true;
        self.painted_through = None;
        self.painted_any = false;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(lines: &[(usize, &str)]) -> BTreeMap<usize, String> {
        lines.iter().map(|(i, t)| (*i, t.to_string())).collect()
    }

    #[test]
    fn append_only_writes_lines_in_order() {
        let mut renderer = Renderer::new(Interactivity::AppendOnly, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(1, "b"), (0, "a"), (2, "c")]), 2, &mut out);
        renderer.finish(&mut out);
        assert_eq!(out, "a\nb\nc\n");
    }

    #[test]
    fn append_only_never_moves_up() {
        let mut renderer = Renderer::new(Interactivity::AppendOnly, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(0, "a"), (1, "b")]), 1, &mut out);
        let stats = renderer.paint(&plan(&[(0, "A"), (1, "B"), (2, "c")]), 2, &mut out);
        assert_eq!(stats, PaintStats { painted: 1, skipped: 2 });
        assert_eq!(out, "a\nb\nc");
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn full_interactivity_moves_up_and_returns_home() {
        let mut renderer = Renderer::new(Interactivity::Full, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(0, "a"), (1, "b"), (2, "c")]), 2, &mut out);
        out.clear();
        renderer.paint(&plan(&[(0, "A")]), 2, &mut out);
        assert_eq!(out, "\x1b[2A\rA\x1b[K\n\n");
        assert_eq!(renderer.cursor_line(), 2);
    }

    #[test]
    fn current_row_level_skips_lines_above_cursor() {
        let mut renderer = Renderer::new(Interactivity::CurrentRow, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(0, "a"), (1, "b")]), 1, &mut out);
        out.clear();
        let stats = renderer.paint(&plan(&[(0, "A"), (1, "B")]), 1, &mut out);
        assert_eq!(stats.skipped, 1);
        assert_eq!(out, "\rB\x1b[K");
    }

    #[test]
    fn lines_below_home_are_left_by_moving_back_up() {
        let mut renderer = Renderer::new(Interactivity::CurrentRow, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(0, "row"), (1, "bar")]), 0, &mut out);
        assert_eq!(renderer.cursor_line(), 0);
        assert!(out.ends_with("\x1b[1A"));
    }

    #[test]
    fn empty_plan_is_silent() {
        let mut renderer = Renderer::new(Interactivity::Full, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(0, "a"), (1, "b")]), 1, &mut out);
        out.clear();
        renderer.paint(&BTreeMap::new(), 1, &mut out);
        renderer.paint(&BTreeMap::new(), 1, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn scrolled_away_lines_are_skipped() {
        let mut renderer = Renderer::new(Interactivity::Full, Some(3));
        let mut out = String::new();
        let all: Vec<(usize, &str)> = (0..6).map(|i| (i, "x")).collect();
        renderer.paint(&plan(&all), 5, &mut out);
        out.clear();
        let stats = renderer.paint(&plan(&[(1, "y"), (3, "z")]), 5, &mut out);
        assert_eq!(stats, PaintStats { painted: 1, skipped: 1 });
    }

    #[test]
    fn finish_starts_a_fresh_line_below_home() {
        let mut renderer = Renderer::new(Interactivity::Full, None);
        let mut out = String::new();
        renderer.paint(&plan(&[(0, "a"), (1, "")]), 0, &mut out);
        out.clear();
        renderer.finish(&mut out);
        assert_eq!(out, "\n");
        assert!(!renderer.has_painted());
        assert_eq!(renderer.cursor_line(), 0);
    }

    #[test]
    fn finish_without_output_is_silent() {
        let mut renderer = Renderer::new(Interactivity::AppendOnly, None);
        let mut out = String::new();
        renderer.finish(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn shared_buffer_collects_bytes() {
        let buffer = SharedBuffer::new();
        let mut sinks = Sinks::from_writers(vec![Box::new(buffer.clone()), Box::new(buffer.clone())]);
        sinks.write_all(b"hi").unwrap();
        assert_eq!(buffer.contents(), "hihi");
        assert_eq!(sinks.len(), 2);
    }
}
