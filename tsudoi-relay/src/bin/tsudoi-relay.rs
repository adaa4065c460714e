use clap::Parser;
use tsudoi_relay::server::ServerConfig;

/// Tsudoi agent-to-agent relay server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8765)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
    };

    println!(
        "Starting Tsudoi relay server on {}:{}",
        config.host, config.port
    );
    tsudoi_relay::start_with_config(config).await?;

    Ok(())
}
