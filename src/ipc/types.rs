use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::settings::Settings;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Caller as authenticated by the host. Absent for anonymous requests.
    #[serde(default)]
    pub identity: Option<Identity>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            workspace: None,
            db: None,
            settings,
        }
    }
}
