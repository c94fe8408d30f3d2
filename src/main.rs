use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use deepseek_relay::config::{Cli, Command, Config};
use deepseek_relay::demo;
use deepseek_relay::relay::upstream::UpstreamClient;
use deepseek_relay::relay::{ModelVariant, StreamRelay};
use deepseek_relay::server::chat_api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "deepseek_relay=debug,tower_http=debug"
    } else {
        "deepseek_relay=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    // The terminal demos print the answer on stdout, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    // Fails before any request when the credential is missing.
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve(args) => {
            let config = Arc::new(config.with_serve_args(&args));
            serve(config, args.model).await
        }
        Command::Chat(args) => {
            let relay = build_relay(&config, ModelVariant::Chat)?;
            demo::run(&relay, args.prompt, args.batch, &mut std::io::stdout()).await?;
            Ok(())
        }
        Command::Reason(args) => {
            let relay = build_relay(&config, ModelVariant::Reasoner)?;
            demo::run(&relay, args.prompt, args.batch, &mut std::io::stdout()).await?;
            Ok(())
        }
    }
}

fn build_relay(config: &Config, variant: ModelVariant) -> anyhow::Result<StreamRelay> {
    let client = UpstreamClient::new(&config.upstream)?;
    info!(
        endpoint = client.endpoint(),
        model = %variant,
        "Upstream configured"
    );
    Ok(StreamRelay::new(Arc::new(client), variant))
}

async fn serve(config: Arc<Config>, variant: ModelVariant) -> anyhow::Result<()> {
    let relay = build_relay(&config, variant)?;

    let state = Arc::new(AppState {
        relay,
        config: config.clone(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    let listen_addr = config.server.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!(
        static_dir = %config.server.static_dir.display(),
        "Listening on http://{listen_addr}"
    );
    info!("Chat endpoint: POST http://{listen_addr}/api/chat");

    axum::serve(listener, app).await?;

    Ok(())
}
