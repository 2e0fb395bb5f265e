mod access;
mod assist;
mod commands;
mod config;
mod context;
mod error;
mod facebook;
mod notify;
mod storage;
mod telegram;
mod web;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use config::{AppConfig, IngressMode};
use context::BridgeContext;
use telegram::{PollingIngress, UpdateDispatcher, UpdateIngress, WebhookIngress};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comment_bridge=info,tower_http=info".into()),
        )
        .init();

    info!("Loading configuration...");
    let config = AppConfig::load()?;

    let ctx = Arc::new(BridgeContext::build(&config).await?);
    info!("Comment store ready with {} records", ctx.store.count().await);

    let ingress_handle = spawn_ingress(&config, &ctx);

    let router = web::create_router(web::state::AppState::new(ctx.clone()));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting web server at http://{}", addr);

    let web_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Web server error: {:#}", e);
        }
    });

    tokio::select! {
        _ = web_handle => info!("Web server ended"),
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    if let Some(handle) = ingress_handle {
        handle.abort();
    }
    Ok(())
}

/// Starts the configured Telegram ingress. An ingress failure is logged and
/// leaves the Facebook side of the bridge running.
fn spawn_ingress(config: &AppConfig, ctx: &Arc<BridgeContext>) -> Option<JoinHandle<()>> {
    let bot = ctx.bot.clone()?;

    match config.telegram.mode {
        IngressMode::Polling => {
            let dispatcher = Arc::new(UpdateDispatcher::new(bot.clone(), ctx.router.clone()));
            let ingress = PollingIngress::new(
                bot,
                config.telegram.poll_timeout_secs,
                Duration::from_secs(config.telegram.retry_delay_secs.max(1)),
            );
            Some(tokio::spawn(async move {
                if let Err(e) = ingress.run(dispatcher).await {
                    error!("Telegram polling error: {:#}", e);
                }
            }))
        }
        IngressMode::Webhook => {
            // Missing URL or secret was reported while building the context.
            let push = ctx.telegram.as_ref()?;
            let dispatcher = push.dispatcher.clone();
            let ingress =
                WebhookIngress::new(bot, &push.public_base_url, push.secret_token.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = ingress.run(dispatcher).await {
                    error!("Telegram webhook registration error: {:#}", e);
                }
            }))
        }
    }
}
