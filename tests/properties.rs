//! Property tests: aggregation laws and repaint convergence.

mod common;

use proptest::prelude::*;

use common::{manual_table, screen};
use progress_table::{Aggregate, CellUpdate, ColumnSpec, Interactivity, Value};

fn sum_of(values: &[i64]) -> Value {
    let (table, _buffer) = manual_table(Interactivity::AppendOnly);
    table
        .add_column(ColumnSpec::new("n").aggregate(Aggregate::Sum))
        .unwrap();
    for v in values {
        table.update("n", *v).unwrap();
    }
    table.get("n").unwrap().unwrap()
}

/// Final screen of a table with `rows`, after applying `edits` one refresh
/// at a time.
fn final_screen(level: Interactivity, rows: &[[i64; 2]], edits: &[(usize, usize, i64)]) -> Vec<String> {
    let (table, buffer) = manual_table(level);
    table.add_columns(["a", "b"]).unwrap();
    for row in rows {
        table.add_row(*row).unwrap();
    }
    table.refresh().unwrap();
    for &(row, column, value) in edits {
        let row = (row % rows.len()) as i64;
        table.set_cell(row, column % 2, value).unwrap();
        table.refresh().unwrap();
    }
    table.close().unwrap();
    screen(&buffer.contents())
}

proptest! {
    #[test]
    fn sum_ignores_update_order(
        (values, shuffled) in prop::collection::vec(-1000i64..1000, 1..20)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let expected = Value::Int(values.iter().sum());
        prop_assert_eq!(sum_of(&values), expected.clone());
        prop_assert_eq!(sum_of(&shuffled), expected);
    }

    #[test]
    fn mean_is_the_weighted_average(
        samples in prop::collection::vec((-1000.0f64..1000.0, 0.1f64..10.0), 1..20)
    ) {
        let (table, _buffer) = manual_table(Interactivity::AppendOnly);
        table
            .add_column(ColumnSpec::new("m").aggregate(Aggregate::Mean))
            .unwrap();
        for (value, weight) in &samples {
            table.update_cell(CellUpdate::new("m", *value).weight(*weight)).unwrap();
        }

        let total: f64 = samples.iter().map(|(_, w)| w).sum();
        let expected = samples.iter().map(|(v, w)| v * w).sum::<f64>() / total;
        let got = table.get("m").unwrap().and_then(|v| v.as_f64()).unwrap();
        prop_assert!((got - expected).abs() < 1e-6, "got {got}, expected {expected}");
    }

    #[test]
    fn rows_added_positionally_export_unchanged(
        rows in prop::collection::vec(prop::array::uniform3(-50i64..50), 0..8)
    ) {
        let (table, _buffer) = manual_table(Interactivity::AppendOnly);
        table.add_columns(["a", "b", "c"]).unwrap();
        for row in &rows {
            table.add_row(*row).unwrap();
        }
        let expected: Vec<Vec<Option<Value>>> = rows
            .iter()
            .map(|row| row.iter().map(|v| Some(Value::Int(*v))).collect())
            .collect();
        prop_assert_eq!(table.to_list(), expected);
    }

    #[test]
    fn full_repaints_converge_to_a_fresh_render(
        rows in prop::collection::vec(prop::array::uniform2(0i64..1000), 1..6),
        edits in prop::collection::vec((0usize..6, 0usize..2, 0i64..1000), 0..10)
    ) {
        let live = final_screen(Interactivity::Full, &rows, &edits);

        let mut edited = rows.clone();
        for &(row, column, value) in &edits {
            edited[row % rows.len()][column % 2] = value;
        }
        let fresh = final_screen(Interactivity::AppendOnly, &edited, &[]);
        prop_assert_eq!(live, fresh);
    }

    #[test]
    fn refresh_is_idempotent(
        rows in prop::collection::vec(prop::array::uniform2(0i64..1000), 1..6)
    ) {
        let (table, buffer) = manual_table(Interactivity::Full);
        table.add_columns(["a", "b"]).unwrap();
        for row in &rows {
            table.add_row(*row).unwrap();
        }
        table.refresh().unwrap();
        let painted = buffer.contents();
        table.refresh().unwrap();
        prop_assert_eq!(buffer.contents(), painted);
    }
}
