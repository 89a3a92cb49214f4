use clap::{builder::BoolishValueParser, Parser};
use devdash_hub::{HubConfig, ServerRegistry};
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "devdash-hub", about = "Live status dashboard for a project's services")]
struct Args {
    /// Project directory (defaults to the current directory).
    #[arg(long, env = "DEVDASH_PROJECT_DIR")]
    project_dir: Option<PathBuf>,
    /// Listen port; 0 picks an ephemeral port. Omit to use the project's preferred port.
    #[arg(long, env = "DEVDASH_PORT")]
    port: Option<u16>,
    #[arg(long, env = "DEVDASH_DEBUG", value_parser = BoolishValueParser::new())]
    debug: bool,
    /// Default filter when RUST_LOG is unset.
    #[arg(long, env = "DEVDASH_LOG_LEVEL", default_value = "info")]
    log_level: String,
    /// Mirror logs into `devdash-hub-<pid>.log` under this directory.
    #[arg(long, env = "DEVDASH_LOG_DIR")]
    log_dir: Option<PathBuf>,
    /// Built dashboard UI to serve instead of the generated page.
    #[arg(long, env = "DEVDASH_UI_DIR")]
    ui_dir: Option<PathBuf>,
    /// Seconds between pushes of the merged view; 0 disables the ticker.
    #[arg(long, default_value_t = 2)]
    broadcast_interval: u64,
    #[arg(long, default_value_t = 2)]
    write_timeout: u64,
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            write_timeout: Duration::from_secs(self.write_timeout.max(1)),
            queue_capacity: self.queue_capacity.max(1),
            ui_dir: self.ui_dir.clone(),
            broadcast_interval: Duration::from_secs(self.broadcast_interval),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    let config = args.hub_config();
    let registry = ServerRegistry::install_global(config.clone());
    let server = registry.get_or_create(args.project_dir.clone().unwrap_or_default());
    let url = match server.start(args.port).await {
        Ok(url) => url,
        Err(err) => {
            error!(event = "dashboard_error", error = %err);
            std::process::exit(1);
        }
    };
    println!("Dashboard: {url}");

    let interval = config.broadcast_interval;
    let ticker = (!interval.is_zero()).then(|| {
        let server = server.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                server.broadcast_current().await;
            }
        })
    });

    let _ = tokio::signal::ctrl_c().await;
    info!(event = "shutdown_requested", project = %server.project());
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    server.stop().await;
}

fn init_logging(args: &Args) {
    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (log_file, file_error) = match args.log_dir.as_deref().map(open_log_file).transpose() {
        Ok(file) => (file, None),
        Err(err) => (None, Some(err)),
    };
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init();

    if let Some(err) = file_error {
        warn!(event = "log_file_error", error = %err);
    }
}

fn open_log_file(dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("devdash-hub-{}.log", std::process::id()));
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_fold_into_hub_config() {
        let args = Args::try_parse_from([
            "devdash-hub",
            "--port",
            "0",
            "--queue-capacity",
            "0",
            "--broadcast-interval",
            "0",
            "--debug",
        ])
        .expect("parse");
        assert_eq!(args.port, Some(0));
        assert!(args.debug);
        let config = args.hub_config();
        assert_eq!(config.queue_capacity, 1);
        assert!(config.broadcast_interval.is_zero());
        assert_eq!(config.write_timeout, Duration::from_secs(2));
    }

    #[test]
    fn log_file_is_created_per_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("logs");
        open_log_file(&nested).expect("open log file");
        assert!(nested
            .join(format!("devdash-hub-{}.log", std::process::id()))
            .is_file());
    }
}
