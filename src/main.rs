mod auth;
mod chats;
mod commands;
mod config;
mod console;
mod engine;
mod ping;
mod protocol;
mod realtime;
mod session;
mod update;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ProxyConfig};
use crate::console::{Console, Output};
use crate::engine::ChatId;
use crate::realtime::EngineClient;
use crate::session::SessionSettings;

#[derive(Parser)]
#[command(
    name = "chatping",
    version,
    about = "Log in to a messaging account and measure ping round trips",
    after_help = "Commands (one per line on stdin once authorized):\n  ping      send \"ping\" to the selected chat and time the reply\n  chatlist  list known chats with their ids\n  setchat   select the chat that receives pings\n\nEnvironment:\n  CHATPING_API_ID, CHATPING_API_HASH are required; RUST_LOG controls diagnostics"
)]
struct Cli {
    #[arg(long, help = "Engine WebSocket URL")]
    engine_url: Option<String>,

    #[arg(long, allow_negative_numbers = true, help = "Chat selected at startup")]
    chat_id: Option<ChatId>,

    #[arg(long, help = "Directory for the engine database and files")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
    // A pending stdin read would otherwise keep the runtime alive.
    std::process::exit(0);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(engine_url) = cli.engine_url {
        config.engine_url = engine_url;
    }
    if let Some(chat_id) = cli.chat_id {
        config.chat_id = chat_id;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let client = Arc::new(EngineClient::connect(&config.engine_url, config.tdlib_parameters()).await?);

    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; shutting down");
            interrupt.cancel();
        }
    });

    let output = Output::stdout();
    announce_proxy(&client, config.proxy.as_ref(), &output).await;

    let settings = SessionSettings {
        update_buffer: config.update_buffer,
        ..SessionSettings::new(config.chat_id)
    };
    let result = session::run(Arc::clone(&client), Console::stdin(), settings, shutdown).await;
    client.close().await;
    Ok(result?)
}

async fn announce_proxy(client: &EngineClient, proxy: Option<&ProxyConfig>, output: &Output) {
    let Some(proxy) = proxy else {
        output.line("No proxy");
        return;
    };

    let added = client.add_proxy(&proxy.host, proxy.port, proxy.proxy_type()).await;
    output.line(proxy.label());
    let proxy_id = match added {
        Ok(id) => id,
        Err(error) => {
            warn!(%error, host = %proxy.host, "failed to add proxy");
            output.line(format_args!("Error adding proxy: {error}"));
            return;
        }
    };

    match client.ping_proxy(proxy_id).await {
        Ok(seconds) => output.line(format_args!("Proxy ping: {seconds:.6} s")),
        Err(error) => output.line(format_args!("Error pinging proxy: {error}")),
    }
}
