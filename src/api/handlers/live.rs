use actix_web::{web, HttpResponse, Responder};
use pcap::Device;

use crate::api::AppState;
use crate::models::interface::NetworkInterface;
use crate::utils::error::AppError;

/// Last 500 live packets
pub async fn get_packets(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.store.recent_packets(500))
}

/// Current aggregate statistics including top talkers
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.store.stats())
}

/// Top 100 active connections by bytes
pub async fn get_connections(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.store.connections())
}

/// Capture devices on this host; the active flag marks the one in use
pub async fn get_interfaces(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let devices = Device::list()?;
    let interfaces: Vec<NetworkInterface> = devices
        .into_iter()
        .map(|device| NetworkInterface {
            active: device.name == state.config.interface,
            description: device.desc.unwrap_or_default(),
            addresses: device
                .addresses
                .iter()
                .map(|addr| addr.addr.to_string())
                .collect(),
            name: device.name,
        })
        .collect();
    Ok(HttpResponse::Ok().json(interfaces))
}
