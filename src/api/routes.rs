use actix_web::web;

use crate::api::handlers::{history, live};
use crate::api::websocket;

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/packets", web::get().to(live::get_packets))
            .route("/stats", web::get().to(live::get_stats))
            .route("/connections", web::get().to(live::get_connections))
            .route("/interfaces", web::get().to(live::get_interfaces))
            .route("/database", web::get().to(history::get_database_info))
            .route("/history", web::get().to(history::get_history))
            .route("/history/stats", web::get().to(history::get_history_stats))
            .route("/countries", web::get().to(history::get_countries)),
    )
    .route("/ws", web::get().to(websocket::ws_index));
}
