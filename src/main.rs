use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use snubi_blog::{
    config::Config,
    content_loader::load_templates,
    hot_reload::start_content_watcher,
    posts::PostRepository,
    routes,
    state::{AppState, RouterState},
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!("RUST_ENV is set to development: {}", config.is_development);
    info!(
        content_dir = %config.content_dir.display(),
        posts_dir = %config.posts_dir.display(),
        "configuration loaded"
    );

    let templates = load_templates(&config.content_dir)
        .await
        .with_context(|| format!("Failed to load templates from {}", config.content_dir.display()))?;

    let posts = PostRepository::from_dir(config.posts_dir.clone());
    let state = Arc::new(AppState::new(&config, templates, posts));

    // Hot-reload setup
    let (tx, _rx) = broadcast::channel(1);
    if config.is_development {
        let mut dirs = vec![config.content_dir.clone()];
        if !config.posts_dir.starts_with(&config.content_dir) {
            dirs.push(config.posts_dir.clone());
        }
        info!("Hot reload enabled. Check logs for file change events.");
        start_content_watcher(tx.clone(), state.clone(), dirs);
    }

    let app = routes::router(RouterState {
        app_state: state,
        broadcaster: tx,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
