//! Shared helpers for the integration tests.

#![allow(dead_code)]

use progress_table::{Interactivity, ProgressTable, SharedBuffer, TableBuilder};

/// Builder preset for deterministic output: explicit interactivity, manual
/// refresh, a wide terminal and `buffer` as the only sink.
pub fn manual_builder(level: Interactivity, buffer: &SharedBuffer) -> TableBuilder {
    ProgressTable::builder()
        .interactivity(level)
        .manual_refresh(true)
        .terminal_width(200)
        .sink(buffer.clone())
}

/// A table writing into a fresh in-memory buffer, painting only on
/// `refresh()` and `close()`.
pub fn manual_table(level: Interactivity) -> (ProgressTable, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let table = manual_builder(level, &buffer).build().unwrap();
    (table, buffer)
}

/// Replays terminal output onto a blank screen and returns its lines with
/// trailing blanks removed. Understands the subset the renderer emits:
/// text, `\n`, `\r`, cursor up (`ESC [ n A`) and erase to end of line
/// (`ESC [ K`). Color sequences are dropped.
pub fn screen(output: &str) -> Vec<String> {
    let mut lines: Vec<Vec<char>> = vec![Vec::new()];
    let (mut row, mut col) = (0usize, 0usize);
    let mut chars = output.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                row += 1;
                col = 0;
                if lines.len() <= row {
                    lines.resize(row + 1, Vec::new());
                }
            }
            '\r' => col = 0,
            '\x1b' => {
                if chars.peek() != Some(&'[') {
                    continue;
                }
                chars.next();
                let mut params = String::new();
                let mut command = None;
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        command = Some(next);
                        break;
                    }
                    params.push(next);
                }
                match command {
                    Some('A') => {
                        let n: usize = params.parse().unwrap_or(1);
                        row = row.saturating_sub(n);
                    }
                    Some('K') => lines[row].truncate(col),
                    _ => {}
                }
            }
            other => {
                let line = &mut lines[row];
                if line.len() < col {
                    line.resize(col, ' ');
                }
                if col < line.len() {
                    line[col] = other;
                } else {
                    line.push(other);
                }
                col += 1;
            }
        }
    }

    let mut rendered: Vec<String> = lines
        .into_iter()
        .map(|l| l.into_iter().collect::<String>().trim_end().to_string())
        .collect();
    while rendered.last().is_some_and(|l| l.is_empty()) {
        rendered.pop();
    }
    rendered
}

/// Expected lines written as one block, one line per row.
pub fn lines(block: &str) -> Vec<String> {
    block
        .trim_matches('\n')
        .lines()
        .map(|l| l.trim_end().to_string())
        .collect()
}
