use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use webhookd::api;
use webhookd::api::AppState;
use webhookd::auth::Verifier;
use webhookd::format_diagnostics;
use webhookd::gateway::HomeAssistantClient;
use webhookd::gateway::StateGateway;
use webhookd::logging;
use webhookd::startup;
use webhookd::ActionResolver;
use webhookd::Config;
use webhookd::SwitchRegistry;

/// Authenticated webhook relay for Home Assistant switches
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file(s); later files may not redefine values from earlier ones
    #[arg(short, long = "config", default_value = "webhookd.toml")]
    config: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match Config::from_files(&args.config) {
        Ok((config, diagnostics)) => {
            if !diagnostics.is_empty() {
                eprintln!("{}", format_diagnostics(&diagnostics));
            }
            config
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    tracing::info!("webhookd {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {:?}", args.config);

    let registry = Arc::new(
        SwitchRegistry::new(config.switches).context("Failed to build switch registry")?,
    );
    for switch in registry.iter() {
        tracing::info!("Registered switch '{}' ({})", switch.id, switch.name);
    }

    tracing::info!("Using Home Assistant at {}", config.home_assistant.url);
    let gateway: Arc<dyn StateGateway> = Arc::new(
        HomeAssistantClient::new(config.home_assistant)
            .context("Failed to create Home Assistant client")?,
    );

    // Reported in the background; a missing entity must not delay serving
    tokio::spawn({
        let registry = registry.clone();
        let gateway = gateway.clone();
        async move {
            let checks = startup::check_all(&registry, gateway.as_ref()).await;
            let missing = checks.iter().filter(|c| !c.backing_entity_found).count();
            if missing > 0 {
                tracing::warn!("{} of {} switches lack a backing entity", missing, checks.len());
            }
        }
    });

    let state = AppState::new(
        Verifier::new(&config.auth.jwt_secret),
        ActionResolver::new(registry, gateway),
    );

    let server_config = config.server;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut server = tokio::spawn(async move {
        api::serve(&server_config.listen, server_config.port, state, shutdown_rx).await
    });

    tokio::select! {
        result = &mut server => {
            // The server only returns on its own if it failed to start
            return result.context("HTTP API server task panicked")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
        }
    }

    tracing::info!("Received shutdown signal, shutting down...");
    let _ = shutdown_tx.send(());
    server.await.context("HTTP API server task panicked")??;

    tracing::info!("webhookd stopped");
    Ok(())
}
