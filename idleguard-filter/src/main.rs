mod event;

use clap::Parser;
use event::{classify, LineAction};
use std::io::{BufRead, Write};

/// Read streaming JSON events on stdin and print their text deltas.
///
/// Lines that are not JSON are printed unchanged; every other event is dropped.
#[derive(Parser, Debug)]
#[command(name = "idleguard-filter", version, about)]
struct Cli {}

fn main() {
    let _cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("IDLEGUARD_FILTER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let lines = filter_stream(stdin.lock(), stdout.lock());
    tracing::debug!(lines, "input exhausted");
}

/// Apply [`classify`] to every line of `input`, writing results to `output`.
///
/// Never stops early: read errors are retried past and write errors dropped.
/// Returns the number of lines read.
fn filter_stream<R: BufRead, W: Write>(mut input: R, mut output: W) -> u64 {
    let mut buf = Vec::new();
    let mut lines = 0u64;

    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "stdin read failed, stopping");
                break;
            }
        }
        lines += 1;

        let line = String::from_utf8_lossy(&buf);
        if let Err(e) = emit(&mut output, classify(&line)) {
            tracing::debug!(error = %e, line = lines, "write failed, continuing");
        }
    }

    lines
}

fn emit<W: Write>(output: &mut W, action: LineAction) -> std::io::Result<()> {
    match action {
        LineAction::Text(text) => output.write_all(text.as_bytes())?,
        LineAction::Passthrough(line) => {
            output.write_all(line.as_bytes())?;
            output.write_all(b"\n")?;
        }
        LineAction::Skip => return Ok(()),
    }
    output.flush()
}
