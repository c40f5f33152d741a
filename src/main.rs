//! Daemon entry point: CLI flags, logger setup, listener startup.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::WriteLogger;

use netd::config::{self, AppConfig};
use netd::ingress;

#[derive(Parser)]
#[command(
    name = "netd",
    version,
    about = "netd makes network device operations easy.\nA daemon that runs CLI command batches on routers, firewalls, and switches over SSH."
)]
struct Cli {
    /// Log file path.
    #[arg(long, default_value = "/var/log/netd/netd.log")]
    logfile: PathBuf,

    /// Log level: error, warn, info, debug, or trace.
    #[arg(long, default_value = "info")]
    loglevel: String,

    /// Rotate the previous log file at startup once it exceeds this many bytes.
    #[arg(long = "max-size", default_value_t = 10_240_000)]
    max_size: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon with the JSON-lines ingress.
    Serve {
        /// Ingress listen address.
        #[arg(long, default_value = "0.0.0.0:8188")]
        addr: String,

        /// Management status listen address.
        #[arg(long = "api-addr", default_value = "0.0.0.0:8189")]
        api_addr: String,

        /// Encoding detection confidence threshold.
        #[arg(long, default_value_t = 30)]
        confidence: u32,

        /// Persist captured command output to --log-cfg-dir.
        #[arg(long = "log-cfg-flag")]
        log_cfg_flag: bool,

        /// Directory for persisted command output.
        #[arg(long = "log-cfg-dir", default_value = "/var/log/netd")]
        log_cfg_dir: String,

        /// Reuse device sessions across requests.
        #[arg(long = "pool-sessions")]
        pool_sessions: bool,
    },
}

fn init_logger(path: &Path, level: &str, max_size: u64) -> anyhow::Result<()> {
    let level = level
        .parse::<LevelFilter>()
        .with_context(|| format!("unrecognized log level {level:?}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    // Size-threshold rotation: shift the previous file aside at startup.
    if let Ok(meta) = fs::metadata(path)
        && meta.len() > max_size
    {
        let mut rotated = path.as_os_str().to_owned();
        rotated.push(".1");
        let _ = fs::rename(path, rotated);
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    WriteLogger::init(level, simplelog::Config::default(), file)
        .context("installing the logger")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.logfile, &cli.loglevel, cli.max_size)?;

    match cli.command {
        Command::Serve {
            addr,
            api_addr,
            confidence,
            log_cfg_flag,
            log_cfg_dir,
            pool_sessions,
        } => {
            config::init(AppConfig {
                confidence,
                log_cfg_flag,
                log_cfg_dir: log_cfg_dir.trim_end_matches('/').to_string(),
                pool_sessions,
            });

            tokio::spawn(async move {
                if let Err(err) = ingress::serve_status(&api_addr).await {
                    log::error!("status listener failed: {err}");
                }
            });
            ingress::serve(&addr)
                .await
                .context("running the ingress listener")?;
        }
    }
    Ok(())
}
