use std::{path::PathBuf, sync::Arc};
use tokio::sync::{broadcast, RwLock};

use crate::config::{Config, SiteConfig};
use crate::content_loader::Templates;
use crate::posts::PostRepository;

pub type RefreshBroadcaster = broadcast::Sender<()>;

pub struct AppState {
    pub templates: RwLock<Templates>,
    pub posts: PostRepository,
    pub site: SiteConfig,
    pub content_dir: PathBuf,
    pub is_development: bool,
}

impl AppState {
    pub fn new(config: &Config, templates: Templates, posts: PostRepository) -> Self {
        Self {
            templates: RwLock::new(templates),
            posts,
            site: config.site.clone(),
            content_dir: config.content_dir.clone(),
            is_development: config.is_development,
        }
    }
}

#[derive(Clone)]
pub struct RouterState {
    pub app_state: Arc<AppState>,
    pub broadcaster: RefreshBroadcaster,
}

impl axum::extract::FromRef<RouterState> for Arc<AppState> {
    fn from_ref(state: &RouterState) -> Self {
        state.app_state.clone()
    }
}

impl axum::extract::FromRef<RouterState> for RefreshBroadcaster {
    fn from_ref(state: &RouterState) -> Self {
        state.broadcaster.clone()
    }
}
