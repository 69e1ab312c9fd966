use clap::Parser;
use flexi_logger::{colored_opt_format, Logger};
use log::{error, info};
use tinymq::{config::Config, error::Result, Broker};

#[derive(Parser, Debug)]
#[command(name = "tinymq", about = "A tiny publish/subscribe message broker")]
struct Args {
    /// Listen on TCP port N (default: 1505)
    #[arg(long, value_name = "N")]
    port: Option<u16>,

    /// Worker pool size (default: 4)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Load configuration from a TOML file; explicit flags still win
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Log specification passed to the logger
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = Logger::try_with_str(&args.log_level)
        .and_then(|logger| logger.format(colored_opt_format).start())
    {
        eprintln!("logger init failed: {e}");
        std::process::exit(1);
    }

    let mut cfg = match &args.config {
        Some(path) => match Config::from_path(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(target: "Config", "Failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(port) = args.port {
        cfg.broker.port = port;
    }
    if let Some(threads) = args.threads {
        cfg.broker.threads = threads;
    }

    info!(target: "Config", "Port: {}", cfg.broker.port);
    info!(target: "Config", "Thread pool size: {}", cfg.broker.threads);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.broker.threads.max(1))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cfg)) {
        error!(target: "Broker", "Exception: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let broker = Broker::new(cfg);
    let handle = broker.handle();

    // Signal shim: interrupt and terminate post the broker's stop signal
    // instead of going through any global state.
    tokio::spawn(async move {
        wait_for_signal().await;
        info!(target: "Signal", "Received shutdown signal, stopping broker...");
        handle.stop();
    });

    broker.run().await
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                error!(target: "Signal", "Failed to install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
