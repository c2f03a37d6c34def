//! The worker process.
//!
//! Speaks newline-delimited JSON: requests on stdin, responses on stdout,
//! logs on stderr. One request is processed to completion before the next
//! is read; the host runs one process per worker for parallelism.

use std::io::{BufRead, Write};

use anyhow::Context;
use log::info;

use terraforge::worker::{Worker, WorkerOptions};

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let mut options = WorkerOptions::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--builtin-biomes" => options.builtin_biomes = true,
            "--show-unknown-seams" => options.show_unknown_seams = true,
            other => {
                eprintln!("usage: terraforge [--builtin-biomes] [--show-unknown-seams]");
                anyhow::bail!("unknown argument: {other}");
            }
        }
    }

    let mut worker = Worker::with_options(options);
    info!("terraforge worker ready");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line.context("reading request line")?;
        if line.trim().is_empty() {
            continue;
        }
        for response in worker.handle_line(&line) {
            writeln!(out, "{response}").context("writing response")?;
        }
        out.flush().context("flushing responses")?;
    }

    info!("stdin closed, worker shutting down");
    Ok(())
}
