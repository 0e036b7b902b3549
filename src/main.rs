use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentdeck::config::ServerConfig;
use agentdeck::server;

#[derive(Parser, Debug)]
#[command(name = "agentdeck", about = "Local companion server for Codex and Claude Code")]
struct Args {
    /// Bind address (e.g. 127.0.0.1:5210); overrides config and PORT
    #[arg(long)]
    bind: Option<String>,

    /// Data directory for projects.json/providers.json
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::load()?;

    if let Some(bind) = args.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("--bind must look like host:port"))?;
        config.host = host.to_string();
        config.port = port.parse()?;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    server::start(config).await?;
    Ok(())
}
