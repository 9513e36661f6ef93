use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::classify::CategoryConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Session-scoped keyword→category mapping; set via config.setCategories
    /// and passed explicitly into the classifier and import paths.
    pub categories: CategoryConfig,
}
