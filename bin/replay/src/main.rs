//! AccQueue replay driver
//!
//! Reads an operation script (JSON) from the file named by the first argument,
//! or from stdin when no argument or `-` is given, applies it to a fresh
//! accumulator and prints one JSON line per step with the resulting roots.
//! An external verifier can run the same script against the contract and
//! compare the lines.
//!
//! Without a `config` section in the script the accumulator is configured
//! from `ACCQUEUE_SUB_DEPTH`, `ACCQUEUE_HASH_LENGTH` and `ACCQUEUE_ZERO`.

mod script;

use std::{
    env, fs,
    io::{self, Read},
};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::script::Script;

fn read_input(arg: Option<&str>) -> Result<String> {
    match arg {
        None | Some("-") => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).context("failed to read script from stdin")?;
            Ok(text)
        }
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read {path}")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let arg = env::args().nth(1);
    let script = Script::from_json(&read_input(arg.as_deref())?)?;

    let stdout = io::stdout();
    let summary = script.run(&mut stdout.lock())?;
    info!(steps = summary.steps, failed = summary.failed, "replay finished");

    if summary.failed > 0 && env::var("ACCQUEUE_STRICT").is_ok_and(|v| v == "1" || v == "true") {
        bail!("{} of {} operations failed", summary.failed, summary.steps);
    }
    Ok(())
}
