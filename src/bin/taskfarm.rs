//! A task-farm demo: the main thread publishes one task tuple per image
//! row, a pool of workers takes tasks and publishes result tuples with the
//! Mandelbrot escape counts for that row, and the main thread collects the
//! rows and renders them as ASCII art.

use std::collections::HashMap;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tuplespace::{registry, Pattern, Space, Value, FOREVER, NO_WAIT};

#[derive(Parser)]
struct FarmConfig {
    #[arg(long, default_value_t = 4, help = "Number of worker threads")]
    workers: usize,

    #[arg(long, default_value_t = 24, help = "Number of image rows to render")]
    rows: i64,

    #[arg(long, default_value_t = 78, help = "Pixels per row")]
    width: i64,

    #[arg(long, default_value_t = 96, help = "Escape iteration limit")]
    max_iter: i64,
}

const VIEW_X: (f64, f64) = (-2.2, 1.0);
const VIEW_Y: (f64, f64) = (-1.2, 1.2);
const SHADES: &[u8] = b" .:-=+*#%@";

fn escape_count(cx: f64, cy: f64, limit: i64) -> i64 {
    let (mut x, mut y) = (0.0f64, 0.0f64);
    let mut count = 0;
    while count < limit && x * x + y * y <= 4.0 {
        let next_x = x * x - y * y + cx;
        y = 2.0 * x * y + cy;
        x = next_x;
        count += 1;
    }
    count
}

fn shade(count: i64, limit: i64) -> char {
    let last = SHADES.len() as i64 - 1;
    let idx = (count * last / limit).min(last);
    SHADES[idx as usize] as char
}

/// Takes row tasks until none are left, publishing one result tuple per row.
fn render_rows(space: &Space, config: &FarmConfig) -> Result<()> {
    loop {
        let mut wanted = HashMap::new();
        wanted.insert("row".to_owned(), Pattern::Wildcard);
        let task = match space.take(wanted, NO_WAIT, None)? {
            Some(task) => task,
            None => return Ok(()),
        };
        let row = task["row"].as_i64();

        let cy = VIEW_Y.0 + (VIEW_Y.1 - VIEW_Y.0) * row as f64 / (config.rows - 1).max(1) as f64;
        let cells: Vec<Value> = (0..config.width)
            .map(|col| {
                let cx = VIEW_X.0
                    + (VIEW_X.1 - VIEW_X.0) * col as f64 / (config.width - 1).max(1) as f64;
                Value::I64(escape_count(cx, cy, config.max_iter))
            })
            .collect();

        let mut result = HashMap::new();
        result.insert("row".to_owned(), Value::I64(row));
        result.insert("cells".to_owned(), Value::List(cells));
        space.put(result, FOREVER, None)?;
    }
}

fn main() -> Result<()> {
    let config = FarmConfig::parse();
    let space = registry::space("taskfarm");

    for row in 0..config.rows {
        let mut task = HashMap::new();
        task.insert("row".to_owned(), Value::I64(row));
        space
            .put(task, FOREVER, None)
            .with_context(|| format!("could not publish the task for row {}", row))?;
    }

    thread::scope(|scope| {
        for _ in 0..config.workers {
            let space = &space;
            let config = &config;
            scope.spawn(move || {
                if let Err(error) = render_rows(space, config) {
                    eprintln!("worker failed: {:#}", error);
                }
            });
        }
    });

    // the workers have drained the task tuples; collect the rows in order
    for row in 0..config.rows {
        let mut wanted = HashMap::new();
        wanted.insert("row".to_owned(), Pattern::Concrete(Value::I64(row)));
        wanted.insert("cells".to_owned(), Pattern::Wildcard);
        let result = space
            .take(wanted, NO_WAIT, None)?
            .with_context(|| format!("row {} was never rendered", row))?;

        let line: String = result["cells"]
            .as_list()
            .iter()
            .map(|count| shade(count.as_i64(), config.max_iter))
            .collect();
        println!("{}", line);
    }

    registry::close_all();
    Ok(())
}
