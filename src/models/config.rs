use serde::{Deserialize, Serialize};

/// Runtime configuration shared with the request handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Interface the capture runs on
    pub interface: String,

    /// SQLite database path; None disables persistence
    pub db_path: Option<String>,
}
