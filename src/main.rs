// src/main.rs

use anyhow::Context;
use llm_keypool::cli::{Cli, Commands, KeyCommands};
use llm_keypool::config::{self, AppConfig};
use llm_keypool::core::HealthTargets;
use llm_keypool::monitoring;
use llm_keypool::utils::preview_key;
use llm_keypool::{KeyStore, RequestOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Shutting down...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Shutting down...") },
    }
}

fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn targets_for(config: &AppConfig, provider: Option<&str>) -> anyhow::Result<HealthTargets> {
    let mut targets = config.key_names_by_provider();
    if let Some(provider) = provider {
        anyhow::ensure!(targets.contains_key(provider), "Provider {provider} is not configured");
        targets.retain(|name, _| name == provider);
    }
    Ok(targets)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    match cli.command {
        Commands::Config { file, verbose } => {
            let path = file.unwrap_or(cli.config);
            let config = config::load_config(&path)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            let total_keys: usize = config.providers.values().map(|p| p.api_keys.len()).sum();
            println!(
                "Configuration is valid: {} providers, {} keys",
                config.providers.len(),
                total_keys
            );
            if verbose {
                for (name, provider) in &config.providers {
                    println!(
                        "  {name}: strategy={} keys={} enabled_keys={} models={}",
                        config.strategy_for(provider),
                        provider.api_keys.len(),
                        provider.enabled_keys().len(),
                        provider.enabled_models().len()
                    );
                }
            }
        }

        Commands::Keys { action } => {
            let state = llm_keypool::run(&cli.config).await?;
            let config = state.config();
            let store = state.store();
            match action {
                KeyCommands::List { verbose } => {
                    for (provider, provider_config) in &config.providers {
                        for key in &provider_config.api_keys {
                            let healthy = store.is_healthy(provider, &key.name).await.unwrap_or(false);
                            if verbose {
                                let secret = store.get_key(provider, &key.name).await?;
                                println!(
                                    "{provider}\t{}\t{}\tenabled={}\thealthy={healthy}\trate_limit={}\tcost_limit={}",
                                    key.name,
                                    preview_key(secret.expose_secret()),
                                    key.enabled,
                                    key.rate_limit,
                                    key.cost_limit
                                );
                            } else {
                                println!("{provider}\t{}\tenabled={}\thealthy={healthy}", key.name, key.enabled);
                            }
                        }
                    }
                }
                KeyCommands::Stats { provider } => match provider {
                    Some(provider) => {
                        print_json(&monitoring::provider_statistics(store.as_ref(), &provider).await?)?
                    }
                    None => print_json(&monitoring::pool_statistics(store.as_ref()).await?)?,
                },
                KeyCommands::Check { provider } => {
                    let targets = targets_for(&config, provider.as_deref())?;
                    let report = state
                        .health_checker()
                        .sweep_once(&targets, &CancellationToken::new())
                        .await;
                    print_json(&report)?;
                }
                KeyCommands::Status { provider } => {
                    print_json(&state.rotator().get_rotation_status(&provider).await?)?;
                }
            }
        }

        Commands::Chat {
            prompt,
            provider,
            model,
            max_tokens,
        } => {
            let state = llm_keypool::run(&cli.config).await?;
            let options = RequestOptions {
                provider,
                model,
                max_tokens,
                ..Default::default()
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                on_signal.cancel();
            });

            let messages = [llm_keypool::Message::user(prompt)];
            let response = state
                .dispatcher()
                .chat_with_cancel(&messages, options, cancel)
                .await?;
            println!("{}", response.content);
            info!(
                provider = %response.provider,
                key_name = %response.key_name,
                tokens = response.usage.total_tokens,
                cost = response.cost,
                "Chat completed"
            );
        }

        Commands::Watch => {
            let state = llm_keypool::run(&cli.config).await?;
            let config = state.config();
            let cancel = CancellationToken::new();
            let checker = state.health_checker();
            let handle = checker.spawn(cancel.clone(), config.key_names_by_provider());

            shutdown_signal().await;
            cancel.cancel();
            handle.await.context("health checker task failed")?;
            info!("Health checker shut down gracefully.");
        }
    }

    Ok(())
}
