//! Brownian motion in 2D, rows reused as a ring - run with: cargo run --example brownian

use std::f64::consts::TAU;
use std::thread;
use std::time::Duration;

use rand::Rng;

use progress_table::{CellUpdate, PbarOptions, ProgressTable};

const TARGET_DISTANCE: f64 = 100.0;
const VELOCITY: f64 = 1.0;
const MOMENTUM: f64 = 0.999;
const MAX_ROWS: usize = 30;

fn main() -> progress_table::Result<()> {
    let table = ProgressTable::new();
    let mut distance_bar = table.pbar(
        TARGET_DISTANCE as u64,
        PbarOptions::new()
            .description("Distance")
            .show_throughput(false)
            .show_progress(true),
    )?;

    table.write("Simulating brownian motion!")?;
    table.write(&format!("Stops once the distance exceeds {TARGET_DISTANCE}"))?;

    let mut rng = rand::thread_rng();
    let (mut x, mut y) = (0.0f64, 0.0f64);
    let mut velocity = VELOCITY;
    let mut tick: u64 = 0;

    while x.hypot(y) < TARGET_DISTANCE {
        let direction = rng.gen_range(0.0..TAU);
        velocity = velocity * MOMENTUM + rng.gen_range(0.0..VELOCITY * 2.0) * (1.0 - MOMENTUM);
        x += velocity * direction.cos();
        y += velocity * direction.sin();

        let row = (tick % MAX_ROWS as u64) as i64;
        tick += 1;
        table.update_cell(CellUpdate::new("tick", tick).row(row))?;
        table.update_cell(CellUpdate::new("velocity", velocity).row(row))?;
        table.update_cell(CellUpdate::new("position X", x).row(row))?;
        table.update_cell(CellUpdate::new("position Y", y).row(row))?;
        table.update_cell(CellUpdate::new("distance from center", x.hypot(y)).row(row))?;
        distance_bar.set_step(x.hypot(y) as u64)?;

        if table.num_rows() < MAX_ROWS {
            table.next_row()?;
        }
        thread::sleep(Duration::from_millis(1));
    }

    let last = ((tick - 1) % MAX_ROWS as u64) as usize;
    table.set_color(..last, .., "blue")?;
    table.set_color(last..=last, .., "blue bold")?;
    distance_bar.close()?;
    table.close()
}
