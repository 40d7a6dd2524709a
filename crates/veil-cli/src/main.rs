//! veil: ephemeral end-to-end encrypted file sharing
//!
//! Commands:
//!   send <file>         - encrypt, print a single-use link, serve one receiver over TCP
//!   receive <link>      - connect, verify, decrypt, and write the file
//!   config show         - display the effective configuration
//!
//! The CLI always transfers directly between the two processes. Staged
//! links need a transient store shared by sender and receiver, which only
//! the library API can provide.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use veil_core::config::VeilConfig;
use veil_core::TransferMode;
use veil_transfer::{
    OutgoingFile, ProgressFn, Receiver, Sender, TcpTransport, TransferEvent, TransferState,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "veil",
    version,
    about = "Ephemeral end-to-end encrypted file sharing",
    long_about = "veil: share a file through a single-use link that carries its own key"
)]
struct Cli {
    /// Path to veil.toml configuration file
    #[arg(long, short = 'c', env = "VEIL_CONFIG", default_value = "veil.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "VEIL_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "VEIL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Share a file and wait for its one receiver
    Send {
        /// File to share
        file: PathBuf,
        /// Address to accept the receiver on (overrides [transport] listen)
        #[arg(long, short = 'l')]
        listen: Option<String>,
    },

    /// Redeem a share link
    Receive {
        /// Full link or bare token
        link: String,
        /// Directory to write the file into
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = VeilConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = match cli.log_format {
        Some(format) => format,
        None if config.log.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "veil starting"
    );

    match cli.command {
        Commands::Send { file, listen } => cmd_send(&config, &file, listen.as_deref()).await,
        Commands::Receive { link, output } => cmd_receive(&config, &link, &output).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so the link on stdout stays pipeable
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

const PROGRESS_SCALE: u64 = 1000;

fn make_progress_bar(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(PROGRESS_SCALE);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Every state restarts the bar; the message names the state.
fn progress_to_bar(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Arc::new(move |event: TransferEvent| {
        let state = match event.state {
            TransferState::Sender(s) => s.to_string(),
            TransferState::Receiver(s) => s.to_string(),
        };
        pb.set_message(state);
        pb.set_position((event.fraction * PROGRESS_SCALE as f64) as u64);
    })
}

// ── `veil send` ───────────────────────────────────────────────────────────────

async fn cmd_send(config: &VeilConfig, file: &Path, listen: Option<&str>) -> Result<()> {
    let outgoing = OutgoingFile::from_path(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let size = outgoing.meta.size;

    let mut transport = TcpTransport::new(&config.transport);
    if let Some(addr) = listen {
        transport = transport.with_listen(addr);
    }

    let pb = make_progress_bar("send")?;
    let sender = Sender::new(config)
        .with_mode(TransferMode::Direct)
        .with_transport(Arc::new(transport))
        .with_progress(progress_to_bar(&pb));

    let share = sender
        .share(outgoing)
        .await
        .with_context(|| format!("preparing {}", file.display()))?;
    let delivery = share
        .delivery
        .context("direct transfer returned no pending delivery")?;

    pb.suspend(|| {
        println!("{}", share.link);
        eprintln!(
            "  {} ({}), {} frames; waiting for the receiver...",
            file.display(),
            fmt_bytes(size),
            delivery.frame_count()
        );
    });

    delivery.serve().await.context("sending to receiver")?;
    pb.finish_with_message("sent");
    Ok(())
}

// ── `veil receive` ────────────────────────────────────────────────────────────

async fn cmd_receive(config: &VeilConfig, link: &str, output: &Path) -> Result<()> {
    let pb = make_progress_bar("receive")?;
    let receiver = Receiver::new()
        .with_transport(Arc::new(TcpTransport::new(&config.transport)))
        .with_progress(progress_to_bar(&pb));

    let file = match receiver.receive(link).await {
        Ok(file) => file,
        Err(e) => {
            pb.abandon_with_message(e.category());
            return Err(anyhow::Error::new(e).context("receiving transfer"));
        }
    };

    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let path = file
        .write_to_dir(output)
        .await
        .with_context(|| format!("writing into {}", output.display()))?;

    pb.finish_with_message("delivered");
    println!("  file:  {}", path.display());
    println!("  bytes: {}", fmt_bytes(file.plaintext.len() as u64));
    Ok(())
}

// ── `veil config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &VeilConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
