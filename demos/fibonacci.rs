//! Naive Fibonacci with a live table - run with: cargo run --example fibonacci

use progress_table::{Alignment, Interactivity, PbarOptions, ProgressTable};

fn fibonacci(n: u64) -> (u64, u64) {
    if n <= 1 {
        return (n, 1);
    }
    let (r1, c1) = fibonacci(n - 1);
    let (r2, c2) = fibonacci(n - 2);
    (r1 + r2, c1 + c2 + 1)
}

fn main() -> progress_table::Result<()> {
    let table = ProgressTable::builder()
        .default_column_alignment(Alignment::Left)
        .interactivity(Interactivity::Full)
        .build()?;
    table.add_columns(["n", "fibonacci value", "number of calls"])?;

    for n in table.pbar_iter(0..32u64, None, PbarOptions::new())? {
        let (value, calls) = fibonacci(n);
        table.update("n", n)?;
        table.update("fibonacci value", value)?;
        table.update("number of calls", calls)?;
        table.next_row()?;
    }
    table.close()
}
