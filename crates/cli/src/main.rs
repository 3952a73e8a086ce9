//! buildrelay command-line interface.
//!
//! ## Commands
//!
//! - `checkconfig`: load `.buildrelay/` and report every configuration error
//! - `build`: run one build against an in-process or remote agent
//! - `agent`: serve commands for the master named in `agent.toml`
//! - `watch-log`: wait for a log file to report a start or reconfiguration

mod output;

use br_core::agent::Agent;
use br_core::build::BuildRequest;
use br_core::command::connection::AgentLink;
use br_core::command::transport::{channel_pair, tcp};
use br_core::config::{load_agent_config, load_config, AppConfig};
use br_core::logwatcher::LogWatcher;
use br_core::state::BuildManager;
use br_protocol::build_models::{BuildResult, SourceStamp};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "buildrelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run builds on remote agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and build events
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the master configuration and report every error
    Checkconfig {
        /// Directory containing `.buildrelay/`
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Run one build of a builder
    Build {
        /// Builder to run
        builder: String,

        /// Directory containing `.buildrelay/`
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Build property as NAME=VALUE (repeatable)
        #[arg(short, long = "prop", value_parser = parse_property)]
        props: Vec<(String, String)>,

        /// Branch of the source stamp
        #[arg(long)]
        branch: Option<String>,

        /// Revision of the source stamp
        #[arg(long)]
        revision: Option<String>,

        /// Wait for a remote agent on this address instead of running one
        /// in-process
        #[arg(long)]
        listen: Option<String>,
    },

    /// Connect to the master named in `agent.toml` and serve commands
    Agent {
        /// Agent directory containing `agent.toml`
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Wait for a log file to report a successful start
    WatchLog {
        /// Log file to tail (default: `log-file` from master.toml)
        file: Option<PathBuf>,

        /// Directory containing `.buildrelay/`
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Seconds to wait for an outcome
        #[arg(short, long, default_value = "10")]
        timeout: f64,
    },
}

fn parse_property(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    br_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Checkconfig { dir } => cmd_checkconfig(&dir).await,
        Commands::Build {
            builder,
            dir,
            props,
            branch,
            revision,
            listen,
        } => {
            let mut request = BuildRequest::new();
            for (name, value) in props {
                request = request.with_property(name, value);
            }
            if branch.is_some() || revision.is_some() {
                request = request.with_source_stamp(SourceStamp {
                    branch,
                    revision,
                    ..SourceStamp::default()
                });
            }
            cmd_build(&dir, &builder, request, listen, cli.json).await
        }
        Commands::Agent { dir } => cmd_agent(&dir).await,
        Commands::WatchLog { file, dir, timeout } => cmd_watch_log(file, &dir, timeout).await,
    }
}

async fn load_master(dir: &Path) -> Result<AppConfig> {
    load_config(dir)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {}", dir.display()))
}

async fn cmd_checkconfig(dir: &Path) -> Result<()> {
    let config = load_master(dir).await?;

    match config.compile() {
        Ok(builders) => {
            println!(
                "{} {} builder(s) configured",
                "Config OK:".green().bold(),
                builders.len()
            );
            for builder in &builders {
                println!("  {} ({} steps)", builder.name, builder.steps.len());
            }
            Ok(())
        }
        Err(errors) => {
            for message in errors.errors() {
                eprintln!("{} {message}", "error:".red().bold());
            }
            bail!("{} configuration error(s) found", errors.len())
        }
    }
}

async fn cmd_build(
    dir: &Path,
    builder_name: &str,
    request: BuildRequest,
    listen: Option<String>,
    json: bool,
) -> Result<()> {
    let config = load_master(dir).await?;
    let builders = config.compile().map_err(|errors| eyre!("{errors}"))?;
    if !builders.iter().any(|builder| builder.name == builder_name) {
        let known: Vec<&str> = builders.iter().map(|b| b.name.as_str()).collect();
        bail!(
            "Unknown builder '{builder_name}' (configured: {})",
            known.join(", ")
        );
    }

    let agent_config = &config.master.agent;
    let link = match listen.or_else(|| agent_config.listen.clone()) {
        Some(addr) => {
            let listener = TcpListener::bind(&addr)
                .await
                .wrap_err_with(|| format!("Failed to listen on {addr}"))?;
            info!(addr = %addr, "waiting for an agent to connect");
            let (stream, peer) = listener.accept().await?;
            info!(peer = %peer, "agent connected");
            AgentLink::connect(tcp(stream)).await?
        }
        None => {
            let basedir = dir.join(&agent_config.basedir);
            let (master_side, agent_side) = channel_pair(64);
            let agent = Agent::new(agent_config.name.clone(), basedir);
            tokio::spawn(async move {
                if let Err(err) = agent.serve(agent_side).await {
                    warn!(error = %err, "in-process agent stopped");
                }
            });
            AgentLink::connect(master_side).await?
        }
    };

    let (events_tx, events_rx) = mpsc::channel(256);
    let printer = tokio::spawn(output::print_events(events_rx, json));
    let manager = BuildManager::new(
        builders,
        config.master.properties.clone(),
        Arc::new(link),
        events_tx,
    );

    let build_id = manager
        .start_build(builder_name, request)
        .await
        .map_err(|e| eyre!(e))?;
    let record = manager.wait(build_id).await.map_err(|e| eyre!(e))?;
    drop(manager);
    let _ = printer.await;

    if !json {
        println!("{}", output::summary(&record));
    }
    match record.result {
        BuildResult::Success | BuildResult::Warnings | BuildResult::Skipped => Ok(()),
        other => bail!("Build {} #{} {}", record.builder_name, record.number, other.describe()),
    }
}

async fn cmd_agent(dir: &Path) -> Result<()> {
    let config = load_agent_config(dir)
        .wrap_err_with(|| format!("{} is not an agent directory", dir.display()))?;
    let basedir = dir.join(&config.basedir);

    info!(agent = %config.name, master = %config.master, "connecting to master");
    let stream = TcpStream::connect(&config.master)
        .await
        .wrap_err_with(|| format!("Failed to connect to master at {}", config.master))?;

    Agent::new(config.name, basedir).serve(tcp(stream)).await?;
    info!("master disconnected");
    Ok(())
}

async fn cmd_watch_log(file: Option<PathBuf>, dir: &Path, timeout: f64) -> Result<()> {
    let path = match file {
        Some(file) => file,
        None => {
            let config = load_master(dir).await?;
            let log_file = config
                .master
                .log_file
                .ok_or_else(|| eyre!("No log file given and master.toml sets no log-file"))?;
            dir.join(log_file)
        }
    };
    if !timeout.is_finite() || timeout <= 0.0 {
        bail!("Timeout must be a positive number of seconds");
    }

    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<String>();
    let echo = tokio::spawn(async move {
        while let Some(line) = echo_rx.recv().await {
            println!("{}", line.dimmed());
        }
    });

    let result = LogWatcher::new(&path)
        .with_timeout(Duration::from_secs_f64(timeout))
        .with_echo(echo_tx)
        .start()
        .await;
    let _ = echo.await;

    let outcome = result.wrap_err_with(|| format!("Watching {} failed", path.display()))?;
    println!(
        "{} the {} is running",
        "OK:".green().bold(),
        outcome.as_str()
    );
    Ok(())
}
