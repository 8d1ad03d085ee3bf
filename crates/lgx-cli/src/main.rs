//! 🚀 lgx-cli — the smoke test with a command line.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads the config, wires the shipping layer into tracing, starts the pipeline,
//! then lets a few threads yell at it for a while. At the end it prints what happened
//! to every single record, the good and the lost. 🦆

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// 🎛️ Ship a burst of synthetic log events and report the damage.
#[derive(Debug, Parser)]
#[command(name = "lgx-cli", version)]
struct Args {
    /// 🔧 TOML config file. LGX_* environment variables are the base layer either way.
    #[arg(default_value = "lgx.toml")]
    config: PathBuf,

    /// 📣 Events emitted per thread.
    #[arg(long, default_value_t = 1_000)]
    events: usize,

    /// 🧵 How many threads do the yelling.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// ⏳ How long to wait after the burst before stopping, so the last batch can leave.
    #[arg(long, default_value_t = 1_500)]
    linger_ms: u64,
}

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Parse args, load config (the moment of truth)
/// 2. Init tracing, with the shipper stacked next to the console
/// 3. Start, burst, linger, stop
/// 4. Print the stats table. Or, on error, print the whole onion of sadness.
fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        // -- stderr, not tracing: the subscriber may not even be installed yet
        eprintln!("💀 error: {err}");
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        for cause in err.chain().skip(1) {
            eprintln!("⚠️  cause: {cause}");
        }
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // 🔒 a missing file is fine (env vars only), an unreadable path is not
    let config_file = args
        .config
        .try_exists()
        .with_context(|| {
            format!(
                "💀 Couldn't even check whether the config file exists. Was checking here: '{}'",
                args.config.display()
            )
        })?
        .then_some(args.config.as_path());

    let app_config = lgx::load_config(config_file)
        .context("💀 In lgx-cli, we couldn't load the config. Take a look at the file and the LGX_* variables")?;

    let shipper = lgx::Shipper::new(app_config, lgx::resolve_host_name());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .with(shipper.layer())
        .try_init()
        .context("💀 Someone already installed a global tracing subscriber. It wasn't us. Probably.")?;

    if !shipper.start() {
        anyhow::bail!(
            "log shipping didn't start. Is [elasticsearch] enabled, with a host and a port between 1 and 65535?"
        );
    }
    info!(
        "📣 {} threads × {} events, host '{}'",
        args.threads,
        args.events,
        shipper.host_name()
    );

    let yellers: Vec<_> = (0..args.threads)
        .map(|t| {
            let events = args.events;
            std::thread::Builder::new()
                .name(format!("yeller-{t}"))
                .spawn(move || yell(t, events))
                .context("💀 Couldn't spawn a yeller thread")
        })
        .collect::<Result<_>>()?;
    for yeller in yellers {
        if yeller.join().is_err() {
            warn!("⚠️ a yeller thread panicked. Rude.");
        }
    }

    std::thread::sleep(Duration::from_millis(args.linger_ms));
    shipper.stop();

    println!("{}", shipper.stats().to_table());
    Ok(())
}

// -- mostly chatter, some warnings, the occasional disaster. like a real service.
fn yell(thread: usize, events: usize) {
    for i in 0..events {
        match i % 10 {
            0 => error!(thread, event = i, "🔥 payment gateway said no"),
            1 | 2 => warn!(thread, event = i, "🐢 slow query"),
            3..=6 => info!(thread, event = i, "✅ request served"),
            _ => debug!(thread, event = i, "🔍 cache lookup"),
        }
    }
}
