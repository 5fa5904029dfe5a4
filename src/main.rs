//! lamco-edge-gesture - Edge Gesture Trace Replayer
//!
//! Entry point for the replay binary. Reads a JSON-lines touch trace, runs
//! it through the gesture service with one scripted listener and writes the
//! events that reach the downstream sink to stdout in the same format.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, Write};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use lamco_edge_gesture::config::{Config, LoggingConfig};
use lamco_edge_gesture::gesture::{parse_mask, PositionMask};
use lamco_edge_gesture::replay::{read_trace, ListenerAction, ReplayListener, TraceReplayer};
use lamco_edge_gesture::utils::format_user_error;

/// Command-line arguments for lamco-edge-gesture
#[derive(Parser, Debug)]
#[command(name = "lamco-edge-gesture")]
#[command(version, about = "Edge gesture trace replayer", long_about = None)]
struct Args {
    /// Trace file (JSON lines); '-' or nothing reads stdin
    trace: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "LAMCO_GESTURE_CONFIG")]
    config: Option<String>,

    /// Edges the scripted listener registers for
    #[arg(short, long, default_value = "left,right", value_parser = parse_mask)]
    edges: PositionMask,

    /// Sensitivity the scripted listener asks for (0 = service default)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=4))]
    sensitivity: u8,

    /// Keep the filter installed even without edges
    #[arg(long)]
    long_living: bool,

    /// Gain touch focus on activation
    #[arg(long, conflicts_with = "drop_sequence")]
    unlock: bool,

    /// Drop the sequence on activation
    #[arg(long = "drop")]
    drop_sequence: bool,

    /// Display size override, e.g. 1080x1920
    #[arg(long, value_parser = parse_display)]
    display: Option<(u32, u32)>,

    /// Default sensitivity override
    #[arg(long, env = "LAMCO_GESTURE_SENSITIVITY")]
    default_sensitivity: Option<u8>,

    /// Time-shift the replay when a sequence ends before synthesis
    #[arg(long)]
    shift_aborted_synthesis: bool,

    /// Print the service state after the replay (to stderr)
    #[arg(long)]
    dump: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "compact")]
    log_format: String,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    log_file: Option<String>,
}

fn parse_display(s: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("Invalid width '{}': {}", width, e))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("Invalid height '{}': {}", height, e))?;
    Ok((width, height))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            return Err(e);
        }
    };

    let _log_guard = init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-edge-gesture v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");
    debug!("Config: {:?}", config);

    if args.show_config {
        print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to serialize config")?
        );
        return Ok(());
    }

    if let Err(e) = run(&args, &config) {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default_config()?,
    };

    let config = config.with_overrides(
        args.display,
        args.default_sensitivity,
        args.shift_aborted_synthesis,
    );
    config.validate().context("Invalid config after overrides")?;
    Ok(config)
}

fn run(args: &Args, config: &Config) -> Result<()> {
    let records = match args.trace.as_deref() {
        None | Some("-") => read_trace(io::stdin().lock())?,
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open trace {}", path))?;
            read_trace(BufReader::new(file))?
        }
    };

    let action = if args.unlock {
        ListenerAction::GainFocus
    } else if args.drop_sequence {
        ListenerAction::DropSequence
    } else {
        ListenerAction::Ignore
    };

    let mut replayer = TraceReplayer::new(
        config.to_service_options(),
        ReplayListener {
            positions: args.edges,
            sensitivity: args.sensitivity,
            long_living: args.long_living,
            action,
        },
    )?;

    let summary = replayer.run(&records)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in replayer.output() {
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
    }
    out.flush()?;

    info!(
        events_in = summary.events_in,
        events_out = summary.events_out,
        activations = summary.activations,
        final_state = ?summary.final_state,
        "Replay complete"
    );

    if args.dump {
        eprint!("{}", replayer.service().dump());
    }

    Ok(())
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: &str, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        "json" => layer.json().boxed(),
        "pretty" if ansi => layer.pretty().boxed(),
        "pretty" => layer.boxed(),
        _ => layer.compact().boxed(),
    }
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => logging.level.to_lowercase(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("lamco={level},warn", level = log_level))
    });

    // stdout carries the replayed events, logs go to stderr
    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(&args.log_format, std::io::stderr, true)];

    if let Some(log_file_path) = &args.log_file {
        let file = File::create(log_file_path)
            .with_context(|| format!("Failed to create log file {}", log_file_path))?;
        layers.push(fmt_layer(&args.log_format, std::sync::Mutex::new(file), false));
    }

    let mut guard = None;
    if let Some(log_dir) = &logging.log_dir {
        let appender = tracing_appender::rolling::daily(log_dir, "lamco-edge-gesture.log");
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(&args.log_format, writer, false));
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    if let Some(log_file_path) = &args.log_file {
        info!("Logging to file: {}", log_file_path);
    }
    if let Some(log_dir) = &logging.log_dir {
        info!("Logging to directory: {}", log_dir.display());
    }

    Ok(guard)
}
