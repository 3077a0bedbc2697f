//! Running a project's own test unit through the harness.
//!
//! Run with: cargo run --package harness --example custom_registry -- grading.EasyTests /tmp/out

use engine::{ensure_eq, CaseError, RunContext, Suite, UnitRegistry};
use std::fs;
use std::process::ExitCode;

/// Largest top-to-bottom path sum through a number triangle.
fn max_path(mut tri: Vec<Vec<i64>>) -> i64 {
    for i in (0..tri.len().saturating_sub(1)).rev() {
        for j in 0..=i {
            tri[i][j] += tri[i + 1][j].max(tri[i + 1][j + 1]);
        }
    }
    tri.first().and_then(|row| row.first()).copied().unwrap_or(0)
}

fn easy_tests() -> Suite {
    Suite::new("grading.EasyTests")
        .case("small_triangle", |_| {
            ensure_eq(max_path(vec![vec![1], vec![9, 9]]), 10, "max path")
        })
        .case("data_file", |ctx: &RunContext| {
            let path = ctx.data_location().join("0001.etxt");
            if !path.exists() {
                return Err(CaseError::skipped(format!("{} not provided", path.display())));
            }
            let text = fs::read_to_string(path)?;
            let numbers: Vec<i64> = text
                .split_whitespace()
                .filter_map(|n| n.parse().ok())
                .collect();
            let (expected, rows) = numbers.split_first().ok_or_else(|| {
                CaseError::error("format", "empty data file")
            })?;
            let mut tri = Vec::new();
            let mut rest = rows;
            let mut width = 1;
            while rest.len() >= width {
                let (row, tail) = rest.split_at(width);
                tri.push(row.to_vec());
                rest = tail;
                width += 1;
            }
            ensure_eq(max_path(tri), *expected, "max path from data file")
        })
}

fn main() -> ExitCode {
    let mut registry = UnitRegistry::new();
    registry.register(Box::new(easy_tests()));

    match harness::run_with_registry(std::env::args_os(), registry) {
        Ok(outcome) => {
            for path in &outcome.reports {
                println!("report: {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
