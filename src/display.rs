//! The display log: which entry owns each terminal line.
//!
//! Line `i` of the current segment shows entry `i`. Entries are only ever
//! appended; the log is cleared as a whole when a segment ends. Dirty
//! entries are tracked by line index and handed to the renderer in
//! ascending order.

use std::collections::{BTreeSet, HashMap};

use crate::types::DisplayEntry;

#[derive(Debug, Clone, Default)]
pub struct DisplayLog {
    entries: Vec<DisplayEntry>,
    dirty: BTreeSet<usize>,
    row_lines: HashMap<usize, usize>,
    /// Decorations flushed right before the next newly bound row.
    pending: Vec<DisplayEntry>,
    /// Whether the top border of this segment has been emitted.
    opened: bool,
    /// Text that would land below a live row nobody may revisit.
    held_text: Vec<String>,
}

impl DisplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    pub fn entry(&self, line: usize) -> Option<&DisplayEntry> {
        self.entries.get(line)
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    fn push(&mut self, entry: DisplayEntry) -> usize {
        if let DisplayEntry::DataRow(row) = entry {
            self.row_lines.insert(row, self.entries.len());
        }
        self.entries.push(entry);
        let line = self.entries.len() - 1;
        self.dirty.insert(line);
        line
    }

    pub fn append_decoration(&mut self, kind: DisplayEntry) -> usize {
        self.push(kind)
    }

    /// Queue decorations for the next row that becomes visible.
    pub fn stage_decorations(&mut self, decorations: Vec<DisplayEntry>) {
        self.pending = decorations;
    }

    pub fn pending(&self) -> &[DisplayEntry] {
        &self.pending
    }

    /// Make `row` visible. A row seen for the first time is appended after
    /// the staged decorations (the segment's top border and header if this
    /// is its first row). A row already on screen is re-dirtied when
    /// `allow_revisit` permits it and silently left alone otherwise.
    pub fn bind_row(&mut self, row: usize, allow_revisit: bool) -> usize {
        if let Some(&line) = self.row_lines.get(&row) {
            if allow_revisit {
                self.dirty.insert(line);
            }
            return line;
        }
        if !self.opened {
            self.opened = true;
            self.pending = vec![
                DisplayEntry::SplitTop,
                DisplayEntry::Header,
                DisplayEntry::SplitMid,
            ];
        }
        for decoration in std::mem::take(&mut self.pending) {
            self.push(decoration);
        }
        self.push(DisplayEntry::DataRow(row))
    }

    pub fn line_of_row(&self, row: usize) -> Option<usize> {
        self.row_lines.get(&row).copied()
    }

    /// One entry per line of `text`.
    pub fn append_user_text(&mut self, text: &str) -> Vec<usize> {
        text.split('\n')
            .map(|line| self.push(DisplayEntry::UserText(line.trim_end_matches('\r').to_string())))
            .collect()
    }

    /// Keep `text` back until `release_held_text`.
    pub fn hold_user_text(&mut self, text: &str) {
        self.held_text.push(text.to_string());
    }

    /// Append every held text, in the order it was written.
    pub fn release_held_text(&mut self) -> Vec<usize> {
        let mut lines = Vec::new();
        for text in std::mem::take(&mut self.held_text) {
            lines.extend(self.append_user_text(&text));
        }
        lines
    }

    /// Append the bottom border if the segment was opened. Returns its line.
    /// Held text is released first.
    pub fn close_segment(&mut self) -> Option<usize> {
        self.release_held_text();
        if !self.opened {
            return None;
        }
        Some(self.push(DisplayEntry::SplitBot))
    }

    pub fn mark_dirty(&mut self, line: usize) {
        if line < self.entries.len() {
            self.dirty.insert(line);
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.extend(0..self.entries.len());
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain dirty lines, ascending and deduplicated.
    pub fn take_dirty(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Forget the segment entirely.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// TESTS
// ============================================================================
