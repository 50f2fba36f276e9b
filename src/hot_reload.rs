use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use notify_debouncer_full::{
    new_debouncer, DebouncedEvent,
    notify::{RecursiveMode, Watcher, Error as NotifyError},
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info};

use crate::content_loader::reload_templates;
use crate::state::{AppState, RefreshBroadcaster};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(tx): State<RefreshBroadcaster>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, tx))
}

async fn handle_socket(mut socket: WebSocket, tx: RefreshBroadcaster) {
    let mut rx = tx.subscribe();

    if wait_for_reload(&mut rx).await
        && socket.send(Message::Text("reload".into())).await.is_err()
    {
        debug!("Client disconnected before reload message could be sent");
    }
}

/// True once a reload was signalled. A lagged receiver still missed at least
/// one signal, so it counts as a reload too.
async fn wait_for_reload(rx: &mut broadcast::Receiver<()>) -> bool {
    match rx.recv().await {
        Ok(()) => true,
        Err(RecvError::Lagged(skipped)) => {
            debug!("Reload receiver lagged by {} signals", skipped);
            true
        }
        Err(RecvError::Closed) => false,
    }
}

/// Emacs lock files (`.#name`) and backups (`name~`).
fn is_temp_file(path: &std::path::Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|s| s.starts_with(".#") || s.ends_with('~'))
}

fn is_relevant(event: &DebouncedEvent) -> bool {
    let is_relevant_kind =
        event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();

    is_relevant_kind && !event.event.paths.iter().any(|path| is_temp_file(path))
}

/// Watches the given directories and, on change, reloads templates and tells
/// connected browsers to refresh. Posts are re-read per request, so they need
/// no reload of their own.
pub fn start_content_watcher(tx: RefreshBroadcaster, app_state: Arc<AppState>, dirs: Vec<PathBuf>) {
    info!("Starting content watcher for hot-reload...");
    tokio::spawn(async move {
        let (watcher_tx, mut watcher_rx) = tokio::sync::mpsc::channel(1);

        let debouncer = new_debouncer(Duration::from_millis(200), None, move |res: Result<Vec<DebouncedEvent>, Vec<NotifyError>>| {
            match res {
                Ok(events) => {
                    let relevant_events: Vec<&DebouncedEvent> =
                        events.iter().filter(|event| is_relevant(event)).collect();

                    if !relevant_events.is_empty() {
                        debug!("Relevant file change detected: {:?}", relevant_events.iter().flat_map(|e| &e.event.paths).map(|p| p.display()).collect::<Vec<_>>());
                        if let Err(e) = watcher_tx.blocking_send(()) {
                            error!("Failed to send watcher event: {}", e);
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        error!("Watcher error: {}", e);
                    }
                }
            }
        });

        let mut debouncer = match debouncer {
            Ok(debouncer) => debouncer,
            Err(e) => {
                error!("Failed to create debouncer: {}", e);
                return;
            }
        };

        for dir in &dirs {
            if let Err(e) = debouncer.watcher().watch(dir, RecursiveMode::Recursive) {
                error!("Failed to watch {}: {}", dir.display(), e);
                return;
            }
            info!("Watching {}", dir.display());
        }

        // The debouncer stays alive as long as this loop runs.
        while watcher_rx.recv().await.is_some() {
            info!("Content change detected, reloading templates and sending signal...");

            reload_templates(&app_state).await;

            if let Err(e) = tx.send(()) {
                debug!("No browser to notify of reload: {}", e);
            }
        }
    });
}
