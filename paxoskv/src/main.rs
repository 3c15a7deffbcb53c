use clap::Parser;
use tokio::signal;

use paxoskv::config::RuntimeConfig;
use paxoskv::server::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port of the first node; node i listens on base_port + i
    base_port: u16,

    /// Service name, used as the RPC path
    service_name: String,

    /// Runtime config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init().unwrap_or_default();
    let args = Args::parse();

    let mut config = RuntimeConfig::from_toml(&args.config)?;
    config.base_port = args.base_port;
    config.service_name = args.service_name;

    let mut server = Server::builder(config)?;
    server.start().await?;
    shutdown_signal().await;
    server.stop();
    Ok(())
}
