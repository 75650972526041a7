pub mod handlers;
pub mod routes;
pub mod websocket;

use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::models::config::AppConfig;
use crate::store::{Database, PacketStore};

/// Shared state handed to every handler
pub struct AppState {
    pub store: Arc<PacketStore>,
    pub db: Option<Arc<Database>>,
    pub broadcaster: Arc<Broadcaster>,
    pub config: AppConfig,
}
