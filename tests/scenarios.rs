//! End-to-end behaviour of the live table across interactivity levels.

mod common;

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use common::{lines, manual_builder, manual_table, screen};
use progress_table::{
    Aggregate, CellUpdate, ColumnSpec, Interactivity, PbarOptions, ProgressTable, SharedBuffer,
    TableError, Value,
};

fn table_of(rows: &[&str]) -> Vec<String> {
    let mut expected = vec![
        "╭──────────╮".to_string(),
        "│    v     │".to_string(),
        "├──────────┤".to_string(),
    ];
    expected.extend(rows.iter().map(|r| r.to_string()));
    expected
}

struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// DATA MODEL
// ============================================================================

#[test]
fn rows_export_in_order_with_missing_cells() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table.add_columns(["x", "y"]).unwrap();
    table.update("x", 5).unwrap();
    table.update("y", 10).unwrap();
    table.next_row().unwrap();
    table.update("x", 20).unwrap();
    table.close().unwrap();

    assert_eq!(
        table.to_list(),
        vec![
            vec![Some(Value::Int(5)), Some(Value::Int(10))],
            vec![Some(Value::Int(20)), None],
        ]
    );
}

#[test]
fn mean_column_averages_updates_in_one_row() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table
        .add_column(ColumnSpec::new("v").aggregate(Aggregate::Mean))
        .unwrap();
    table.update("v", 2).unwrap();
    table.update("v", 4).unwrap();
    assert_eq!(table.get("v").unwrap(), Some(Value::Float(3.0)));
}

#[test]
fn numeric_aggregate_rejects_text() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table
        .add_column(ColumnSpec::new("v").aggregate(Aggregate::Sum))
        .unwrap();
    let err = table.update("v", "many").unwrap_err();
    assert!(matches!(err, TableError::NonNumeric { column } if column == "v"));
}

#[test]
fn explicit_rows_past_the_end_are_rejected() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table.add_column("v").unwrap();
    let err = table
        .update_cell(CellUpdate::new("v", 1).row(5))
        .unwrap_err();
    assert!(matches!(err, TableError::RowIndexOutOfRange { index: 5, .. }));

    // One past the last row starts a new row.
    table.update_cell(CellUpdate::new("v", 1).row(1)).unwrap();
    assert_eq!(table.num_rows(), 2);
}

#[test]
fn unknown_style_leaves_the_table_untouched() {
    let (table, _buffer) = manual_table(Interactivity::Full);
    table.add_column("v").unwrap();

    let err = table
        .pbar(10, PbarOptions::new().style("bogus_theme"))
        .err()
        .unwrap();
    match err {
        TableError::UnknownStyle { description, available, .. } => {
            assert_eq!(description, "bogus_theme");
            assert!(available.contains("square"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(table.num_columns(), 1);
    assert_eq!(table.num_rows(), 1);

    let built = ProgressTable::builder().table_style("bogus_theme").build();
    assert!(matches!(built, Err(TableError::UnknownStyle { .. })));
}

#[test]
fn regions_report_weights_and_colors() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table.add_numbered_columns(2).unwrap();
    table.add_rows(2).unwrap();
    table.set_region(0..2, .., 1.0).unwrap();
    table.set_weight(0..1, 1..2, 3.0).unwrap();
    table.set_color(1..2, ..1, "red").unwrap();

    let weights = table.get_weights(0..2, ..).unwrap();
    assert_eq!(weights[0][1], Some(3.0));
    let colors = table.get_colors(0..2, ..).unwrap();
    assert!(colors[1][0].is_some());
    assert!(colors[0][0].is_none());

    let err = table.get_region(0..9, ..).unwrap_err();
    assert!(matches!(err, TableError::BadIndex(_)));
}

#[test]
fn reordering_moves_named_columns_first() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table.add_columns(["a", "b", "c"]).unwrap();
    table.reorder_columns(&["c", "a"]).unwrap();
    assert_eq!(table.column_names(), vec!["c", "a", "b"]);
}

#[test]
fn concurrent_updates_are_all_counted() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table
        .add_column(ColumnSpec::new("n").aggregate(Aggregate::Sum))
        .unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    table.update("n", 1).unwrap();
                }
            });
        }
    });
    assert_eq!(table.get("n").unwrap(), Some(Value::Int(400)));
}

// ============================================================================
// REPAINTING
// ============================================================================

#[test]
fn append_only_never_moves_the_cursor_up() {
    let buffer = SharedBuffer::new();
    let table = ProgressTable::builder()
        .interactivity(Interactivity::AppendOnly)
        .refresh_rate(0)
        .sink(buffer.clone())
        .build()
        .unwrap();
    table.add_column("v").unwrap();
    table.add_row([1]).unwrap();
    table.add_row([2]).unwrap();
    table.set_cell(0, "v", 5).unwrap();
    table.update("v", 3).unwrap();
    table.close().unwrap();

    let out = buffer.contents();
    assert!(!out.contains('\x1b'));
    assert_eq!(
        screen(&out),
        table_of(&["│    1     │", "│    2     │", "│    3     │", "╰──────────╯"])
    );
    assert_eq!(table.get_at(0, "v").unwrap(), Some(Value::Int(5)));
}

#[test]
fn full_interactivity_rewrites_past_rows() {
    let (table, buffer) = manual_table(Interactivity::Full);
    table.add_column("v").unwrap();
    table.add_row([1]).unwrap();
    table.add_row([2]).unwrap();
    table.refresh().unwrap();

    table.set_cell(0, "v", 9).unwrap();
    table.refresh().unwrap();

    let out = buffer.contents();
    assert!(out.contains("\x1b[1A"));
    assert_eq!(screen(&out), table_of(&["│    9     │", "│    2     │"]));

    table.close().unwrap();
    assert_eq!(
        screen(&buffer.contents()),
        table_of(&["│    9     │", "│    2     │", "╰──────────╯"])
    );
}

#[test]
fn current_row_level_only_updates_the_live_row() {
    let (table, buffer) = manual_table(Interactivity::CurrentRow);
    table.add_column("v").unwrap();
    table.update("v", 1).unwrap();
    table.refresh().unwrap();
    assert_eq!(screen(&buffer.contents()), table_of(&["│    1     │"]));

    table.update("v", 2).unwrap();
    table.refresh().unwrap();
    assert_eq!(screen(&buffer.contents()), table_of(&["│    2     │"]));

    table.next_row().unwrap();
    table.refresh().unwrap();
    table.set_cell(0, "v", 7).unwrap();
    table.refresh().unwrap();
    assert_eq!(screen(&buffer.contents()), table_of(&["│    2     │"]));
    assert_eq!(table.get_at(0, "v").unwrap(), Some(Value::Int(7)));
}

#[test]
fn repeated_refresh_writes_nothing_new() {
    let (table, buffer) = manual_table(Interactivity::Full);
    table.add_column("v").unwrap();
    table.add_row([1]).unwrap();
    table.refresh().unwrap();
    let before = buffer.contents();
    table.refresh().unwrap();
    table.refresh().unwrap();
    assert_eq!(buffer.contents(), before);
}

#[test]
fn written_text_appears_between_rows() {
    let (table, buffer) = manual_table(Interactivity::AppendOnly);
    table.add_column("v").unwrap();
    table.add_row([1]).unwrap();
    table.write("checkpoint\nsaved").unwrap();
    table.add_row([2]).unwrap();
    table.close().unwrap();

    assert_eq!(
        screen(&buffer.contents()),
        lines(
            "
╭──────────╮
│    v     │
├──────────┤
│    1     │
checkpoint
saved
│    2     │
╰──────────╯
"
        )
    );
}

#[test]
fn text_written_under_the_live_row_waits_for_it() {
    let (table, buffer) = manual_table(Interactivity::CurrentRow);
    table.add_column("v").unwrap();
    table.update("v", 1).unwrap();
    table.refresh().unwrap();
    table.write("note").unwrap();
    table.refresh().unwrap();
    table.update("v", 2).unwrap();
    table.refresh().unwrap();
    assert_eq!(screen(&buffer.contents()), table_of(&["│    2     │"]));

    table.next_row().unwrap();
    table.update("v", 3).unwrap();
    table.close().unwrap();
    assert_eq!(
        screen(&buffer.contents()),
        table_of(&["│    2     │", "note", "│    3     │", "╰──────────╯"])
    );
    assert_eq!(table.get_at(0, "v").unwrap(), Some(Value::Int(2)));
}

#[test]
fn text_held_at_close_lands_above_the_bottom_border() {
    let (table, buffer) = manual_table(Interactivity::CurrentRow);
    table.add_column("v").unwrap();
    table.update("v", 1).unwrap();
    table.refresh().unwrap();
    table.write("done").unwrap();
    table.update("v", 4).unwrap();
    table.close().unwrap();
    assert_eq!(
        screen(&buffer.contents()),
        table_of(&["│    4     │", "done", "╰──────────╯"])
    );
}

#[test]
fn new_column_below_full_starts_a_new_segment() {
    let (table, buffer) = manual_table(Interactivity::CurrentRow);
    table.add_column("a").unwrap();
    table.add_row([1]).unwrap();
    table.refresh().unwrap();

    table.add_column("b").unwrap();
    table.add_row([1, 2]).unwrap();
    table.close().unwrap();

    assert_eq!(
        screen(&buffer.contents()),
        lines(
            "
╭──────────╮
│    a     │
├──────────┤
│    1     │
╰──────────╯
╭──────────┬──────────╮
│    a     │    b     │
├──────────┼──────────┤
│    1     │    2     │
╰──────────┴──────────╯
"
        )
    );
}

#[test]
fn closing_a_floating_bar_keeps_a_static_bar_intact() {
    let (table, buffer) = manual_table(Interactivity::Full);
    table.add_column("v").unwrap();
    table.add_rows(3).unwrap();

    let pinned = table
        .pbar(10, PbarOptions::new().position(2).static_position(true))
        .unwrap();
    let mut floating = table.pbar(None, PbarOptions::new().position(1)).unwrap();
    pinned.set_step(3).unwrap();
    table.refresh().unwrap();
    assert_eq!(screen(&buffer.contents()).len(), 8);

    floating.close().unwrap();
    pinned.set_step(5).unwrap();
    table.refresh().unwrap();

    let empty = "│          │";
    let mut expected = table_of(&[empty, empty]);
    expected.push("│ꞏꞏꞏꞏꞏ>    │".to_string());
    assert_eq!(screen(&buffer.contents()), expected);

    table.close().unwrap();
    assert_eq!(screen(&buffer.contents())[5], empty);
}

#[test]
fn bars_are_never_drawn_append_only() {
    let (table, buffer) = manual_table(Interactivity::AppendOnly);
    table.add_column("v").unwrap();
    let bar = table.pbar(4, PbarOptions::new()).unwrap();
    bar.update(2).unwrap();
    assert_eq!(bar.step(), Some(2));
    table.add_row([1]).unwrap();
    table.close().unwrap();
    assert_eq!(
        screen(&buffer.contents()),
        table_of(&["│    1     │", "╰──────────╯"])
    );
}

#[test]
fn iterator_bar_closes_when_exhausted() {
    let (table, _buffer) = manual_table(Interactivity::Full);
    let mut iter = table.pbar_iter(0..3, None, PbarOptions::new()).unwrap();
    assert_eq!(iter.bar().total(), Some(3));
    assert_eq!(iter.by_ref().count(), 3);
    assert_eq!(iter.bar().step(), None);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn closed_table_rejects_updates() {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table.add_column("v").unwrap();
    table.close().unwrap();
    assert!(table.is_closed());
    assert!(matches!(table.update("v", 1), Err(TableError::TableClosed)));
    assert!(matches!(table.next_row(), Err(TableError::TableClosed)));
    table.close().unwrap();
}

#[test]
fn sink_failures_surface_as_io_errors() {
    let table = ProgressTable::builder()
        .interactivity(Interactivity::AppendOnly)
        .refresh_rate(0)
        .sink(FailingSink)
        .build()
        .unwrap();
    table.add_column("v").unwrap();
    let err = table.add_row([1]).unwrap_err();
    assert!(matches!(err, TableError::Io(_)));
}

#[test]
fn timer_repaints_without_explicit_refresh() {
    let buffer = SharedBuffer::new();
    let table = manual_builder(Interactivity::AppendOnly, &buffer)
        .manual_refresh(false)
        .refresh_rate(50)
        .build()
        .unwrap();
    table.add_column("v").unwrap();
    table.add_row([1]).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !buffer.contents().contains("│    1     │") {
        assert!(Instant::now() < deadline, "timer never painted the row");
        thread::sleep(Duration::from_millis(10));
    }
    table.close().unwrap();
    assert!(buffer.contents().ends_with("╰──────────╯\n"));
}
