use std::path::Path;

use tokio::fs;
use tracing::{error, info};

use crate::state::AppState;

/// Page templates kept in memory between reloads.
#[derive(Debug, Clone)]
pub struct Templates {
    pub layout: String,
    pub not_found: String, // supports {{slug}} placeholder
    pub error: String,     // supports {{ message }} placeholder
}

pub async fn load_templates(content_dir: &Path) -> Result<Templates, std::io::Error> {
    let layout = fs::read_to_string(content_dir.join("layout.html")).await?;
    let not_found = fs::read_to_string(content_dir.join("not_found.html")).await?;
    let error = fs::read_to_string(content_dir.join("error.html")).await?;

    Ok(Templates {
        layout,
        not_found,
        error,
    })
}

pub async fn reload_templates(app_state: &AppState) {
    info!("Reloading page templates...");
    match load_templates(&app_state.content_dir).await {
        Ok(templates) => {
            *app_state.templates.write().await = templates;
            info!("Templates successfully reloaded.");
        }
        Err(e) => {
            error!("Failed to reload templates: {}", e);
        }
    }
}
