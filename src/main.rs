//! progress-table CLI
//!
//! Demonstrations of live tables and a renderer for JSON rows.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use humansize::{DECIMAL, format_size};
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use progress_table::export::value_from_json;
use progress_table::pbar::{Progress, glyph_run};
use progress_table::style::{TABLE_STYLES, available_pbar_styles};
use progress_table::{
    Aggregate, Alignment, CellUpdate, ColumnSpec, Interactivity, NextRow, PbarOptions,
    ProgressBar, ProgressTable, TableConfig, TableError, Value, parse_pbar_style,
};

#[derive(Parser)]
#[command(name = "progress-table")]
#[command(about = "Live, in-place updating tables and progress bars")]
#[command(version)]
struct Cli {
    /// JSON file with table configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 0 = append only, 1 = live current row, 2 = any visible line
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(0..=2))]
    interactivity: Option<u8>,

    /// Repaints per second (0 = repaint on every change)
    #[arg(long, global = true)]
    refresh_rate: Option<u32>,

    /// Table theme (modern, bare, round, double, bold, ascii, asciib, hidden)
    #[arg(long, global = true)]
    table_style: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulated training loop with nested progress bars
    Demo {
        #[arg(long, default_value_t = 10)]
        epochs: u64,

        #[arg(long, default_value_t = 200)]
        steps: u64,

        /// Milliseconds per step
        #[arg(long, default_value_t = 5)]
        delay: u64,
    },

    /// Parallel fake downloads, one pinned bar per row
    Download {
        #[arg(long, default_value_t = 12)]
        files: usize,

        #[arg(long, default_value_t = 4)]
        workers: usize,
    },

    /// Preview every table and progress bar theme
    Styles,

    /// Render a JSON array of objects as a table
    Render {
        /// Input file (default: stdin)
        path: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| match cli.command {
        Commands::Demo { epochs, steps, delay } => cmd_demo(config, epochs, steps, delay),
        Commands::Download { files, workers } => cmd_download(config, files, workers),
        Commands::Styles => cmd_styles(config),
        Commands::Render { path } => cmd_render(config, path.as_deref()),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never interleave with the table on stdout.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// CONFIGURATION
// ============================================================================

fn load_config(cli: &Cli) -> Result<TableConfig, String> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?
        }
        None => TableConfig::default(),
    };

    if let Some(level) = cli.interactivity {
        config.interactivity = Some(Interactivity::try_from(level)?);
    }
    if let Some(rate) = cli.refresh_rate {
        config.refresh_rate = rate;
    }
    if let Some(style) = &cli.table_style {
        config.table_style = style.clone();
    }
    debug!(?config, "configuration loaded");
    Ok(config)
}

fn build(config: TableConfig) -> Result<ProgressTable, String> {
    ProgressTable::builder()
        .config(config)
        .build()
        .map_err(|e| e.to_string())
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

fn cmd_demo(config: TableConfig, epochs: u64, steps: u64, delay: u64) -> Result<(), String> {
    let table = build(config)?;
    run_demo(&table, epochs, steps, Duration::from_millis(delay)).map_err(|e| e.to_string())?;
    table.close().map_err(|e| e.to_string())
}

fn run_demo(table: &ProgressTable, epochs: u64, steps: u64, delay: Duration) -> Result<(), TableError> {
    table.add_column(ColumnSpec::new("epoch").width(5))?;
    table.add_column(ColumnSpec::new("train loss").aggregate(Aggregate::Mean))?;
    table.add_column(ColumnSpec::new("train acc").aggregate(Aggregate::Mean))?;
    table.add_column(ColumnSpec::new("valid loss").color("bold"))?;
    table.add_column(ColumnSpec::new("valid acc").color("bold"))?;

    let mut epoch_bar = table.pbar(
        epochs,
        PbarOptions::new()
            .description("epochs")
            .position(1)
            .show_progress(true)
            .show_eta(true),
    )?;

    let mut rng = rand::thread_rng();
    let mut best_loss = f64::INFINITY;

    for epoch in 0..epochs {
        table.update("epoch", epoch)?;
        let base = 1.0 / (epoch as f64 + 1.0);

        for _ in table.pbar_iter(0..steps, None, PbarOptions::new())? {
            let loss = base + rng.gen_range(0.0..0.3);
            let accuracy = (1.0 - base / 2.0 + rng.gen_range(-0.05..0.05)).clamp(0.0, 1.0);
            table.update_cell(CellUpdate::new("train loss", loss).weight(1.0))?;
            table.update("train acc", accuracy)?;
            thread::sleep(delay);
        }

        let valid_loss = base + rng.gen_range(0.0..0.4);
        let improved = valid_loss < best_loss;
        best_loss = best_loss.min(valid_loss);
        let color = if improved { "green" } else { "red" };
        table.update_cell(CellUpdate::new("valid loss", valid_loss).color(color))?;
        table.update("valid acc", (1.0 - valid_loss / 2.0).clamp(0.0, 1.0))?;

        let next = if (epoch + 1) % 5 == 0 {
            NextRow::new().split()
        } else {
            NextRow::new()
        };
        table.next_row_with(next)?;
        epoch_bar.update(1)?;
    }

    epoch_bar.close()?;
    table.write(&format!("best validation loss: {:.4}", best_loss))
}

/// One simulated download.
struct FileJob {
    name: String,
    bytes: u64,
    duration: Duration,
}

fn random_jobs(count: usize) -> Vec<FileJob> {
    let mut rng = rand::thread_rng();
    let kinds = ["image_.jpg", "video_.mp4", "archive_.zip", "movie_.avi"];
    (0..count)
        .map(|_| {
            let index: u32 = rng.gen_range(0..1000);
            let kind = kinds[rng.gen_range(0..kinds.len())];
            FileJob {
                name: kind.replace('_', &index.to_string()),
                bytes: rng.gen_range(1_000..5_000_000_000),
                duration: Duration::from_secs_f64(rng.gen_range(1.0..5.0)),
            }
        })
        .collect()
}

fn cmd_download(mut config: TableConfig, files: usize, workers: usize) -> Result<(), String> {
    config.pbar_show_throughput = false;
    config.pbar_show_eta = true;
    let table = build(config)?;
    let jobs = random_jobs(files);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| e.to_string())?;

    let outcome = (|| -> Result<(), TableError> {
        table.add_column(ColumnSpec::new("name").alignment(Alignment::Right).width(25))?;
        table.add_columns(["total size", "downloaded"])?;
        table.add_column(ColumnSpec::new("warnings").aggregate(Aggregate::Sum))?;
        table.add_rows_with(files, NextRow::new().color("blue"))?;

        let bars = (0..files)
            .map(|row| table.pbar(100, PbarOptions::new().position(row).static_position(true)))
            .collect::<Result<Vec<_>, _>>()?;

        pool.install(|| {
            jobs.par_iter()
                .zip(bars.into_par_iter())
                .enumerate()
                .try_for_each(|(row, (job, bar))| download_one(&table, row, job, bar))
        })
    })();

    outcome.map_err(|e| e.to_string())?;
    table.close().map_err(|e| e.to_string())?;

    let total: u64 = jobs.iter().map(|j| j.bytes).sum();
    println!("Downloaded {} files ({})", jobs.len(), format_size(total, DECIMAL));
    Ok(())
}

fn download_one(table: &ProgressTable, row: usize, job: &FileJob, mut bar: ProgressBar) -> Result<(), TableError> {
    let row_index = row as i64;
    table.set_cell(row_index, "name", job.name.as_str())?;
    table.set_cell(row_index, "total size", format_size(job.bytes, DECIMAL))?;
    table.set_cell(row_index, "warnings", 0)?;

    let mut rng = rand::thread_rng();
    let started = Instant::now();
    loop {
        let fraction = (started.elapsed().as_secs_f64() / job.duration.as_secs_f64()).min(1.0);
        let downloaded = (job.bytes as f64 * fraction) as u64;
        table.set_cell(row_index, "downloaded", format_size(downloaded, DECIMAL))?;
        bar.set_step((fraction * 100.0) as u64)?;
        if rng.gen_bool(0.004) {
            table.update_cell(CellUpdate::new("warnings", 1).row(row_index))?;
        }
        if fraction >= 1.0 {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    bar.close()
}

fn cmd_styles(config: TableConfig) -> Result<(), String> {
    for style in TABLE_STYLES {
        let table = ProgressTable::builder()
            .config(config.clone())
            .table_style(*style)
            .interactivity(Interactivity::AppendOnly)
            .manual_refresh(true)
            .build()
            .map_err(|e| e.to_string())?;
        table
            .add_columns(["theme", "value", "text"])
            .and_then(|_| table.add_row([Value::from(style.name), Value::from(1.5), Value::from("abc")]))
            .and_then(|_| table.close())
            .map_err(|e| e.to_string())?;
    }

    println!();
    for name in available_pbar_styles().split(", ") {
        let style = parse_pbar_style(name).map_err(|e| e.to_string())?;
        let bar = glyph_run(&style, Progress::Fraction(0.55), 30);
        println!("{:>12} {}", name, bar.render());
    }
    Ok(())
}

fn cmd_render(config: TableConfig, path: Option<&Path>) -> Result<(), String> {
    let text = match path {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Cannot read stdin: {}", e))?;
            buffer
        }
    };
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("Invalid JSON: {}", e))?;
    let rows = json
        .as_array()
        .ok_or_else(|| "Expected a JSON array of objects".to_string())?;

    let table = build(config)?;
    for (index, row) in rows.iter().enumerate() {
        let object = row
            .as_object()
            .ok_or_else(|| format!("Row {} is not an object", index))?;
        for (column, value) in object {
            if let Some(value) = value_from_json(value) {
                table.update(column, value).map_err(|e| e.to_string())?;
            }
        }
        table.next_row().map_err(|e| e.to_string())?;
    }
    table.close().map_err(|e| e.to_string())
}
