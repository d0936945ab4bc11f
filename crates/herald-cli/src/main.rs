mod jobs;
mod serve;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use herald_config::HeraldConfig;

#[derive(Parser)]
#[command(name = "herald", about = "Scheduled group message bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: OneBot webhook, command dispatcher and job scheduler
    Serve {
        /// Config file (defaults to ~/.herald/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the scheduled job queue
    Jobs {
        /// Config file (defaults to ~/.herald/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only jobs for this target group
        #[arg(short, long)]
        group: Option<i64>,

        /// Only jobs whose content matches this regex
        #[arg(short, long)]
        filter: Option<String>,

        /// Only jobs due at this time (YYYYMMDDHHMM or YYYYMMDDHHMMSS)
        #[arg(short, long)]
        time: Option<String>,
    },
    /// Check configuration and OneBot API reachability
    Health {
        /// Config file (defaults to ~/.herald/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HeraldConfig> {
    let config = match path {
        Some(path) => herald_config::load_config_from(path),
        None => herald_config::load_config(),
    };
    config.context("failed to load configuration")
}

/// Stderr logging, plus a daily-rotated `herald.log` under `log_dir` when
/// given. The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "herald.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(config.as_deref())?;
            let _guard = init_tracing(Some(&config.data_dir()?))?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve::run_serve(config))?;
        }
        Commands::Jobs {
            config,
            group,
            filter,
            time,
        } => {
            init_tracing(None)?;
            let config = load_config(config.as_deref())?;
            print!("{}", jobs::run_jobs(&config, group, filter, time.as_deref())?);
        }
        Commands::Health { config } => {
            init_tracing(None)?;
            let config = load_config(config.as_deref())?;
            println!("herald configuration");
            println!("  admin groups: {:?}", config.admin_groups);
            println!("  receiver groups: {:?}", config.receiver_groups);
            println!("  admins: {:?}", config.admins);
            println!("  queue file: {}", config.queue_file()?.display());
            println!("  onebot api: {}", config.onebot.api_url);
            println!("  webhook: http://{}/", config.onebot.listen);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve::check_api(&config))?;
        }
    }

    Ok(())
}
