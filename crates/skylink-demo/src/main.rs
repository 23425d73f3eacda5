//! skylink-demo — command-line entry point.

use std::time::Duration;

use anyhow::{Context, Result};

use skylink_demo::cmd::{self, Environment};
use skylink_demo::DEFAULT_DELIVERY_TIMEOUT;

const DEFAULT_ROUNDS: u32 = 5;

fn print_usage() {
    println!("Usage: skylink-demo [--embedded] [--timeout-ms <ms>] [command]");
    println!();
    println!("Commands:");
    println!("  point-to-point          Send one message and verify it (default)");
    println!("  ping-pong [--rounds N]  Exchange ping/pong and print round-trip times");
    println!();
    println!("Options:");
    println!("  --embedded        Run an in-process registry instead of the configured one");
    println!(
        "  --timeout-ms <ms> Delivery timeout (default: {})",
        DEFAULT_DELIVERY_TIMEOUT.as_millis()
    );
    println!("  --rounds <n>      Ping-pong rounds (default: {})", DEFAULT_ROUNDS);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut embedded = false;
    let mut timeout = DEFAULT_DELIVERY_TIMEOUT;
    let mut rounds = DEFAULT_ROUNDS;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--embedded" => embedded = true,
            "--timeout-ms" => {
                i += 1;
                let ms: u64 = args
                    .get(i)
                    .context("--timeout-ms requires a value")?
                    .parse()
                    .context("--timeout-ms must be a number")?;
                timeout = Duration::from_millis(ms);
            }
            "--rounds" => {
                i += 1;
                rounds = args
                    .get(i)
                    .context("--rounds requires a value")?
                    .parse()
                    .context("--rounds must be a number")?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let ok = match remaining.as_slice() {
        ["point-to-point"] | [] => {
            cmd::point_to_point::run(Environment::prepare(embedded).await?, timeout).await?
        }
        ["ping-pong"] => {
            cmd::ping_pong::run(Environment::prepare(embedded).await?, rounds, timeout).await?
        }
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            return Ok(());
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    std::process::exit(if ok { 0 } else { 1 });
}
