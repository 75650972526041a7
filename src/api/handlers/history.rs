use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::AppState;
use crate::models::packet::Packet;
use crate::store::db::{DatabaseInfo, HistoryQuery};
use crate::utils::error::AppError;

const MAX_LIMIT: i64 = 1000;

/// Query parameters for `/api/history`
#[derive(Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    limit: i64,

    #[serde(default)]
    offset: i64,

    /// Case-insensitive substring matched across the text columns
    #[serde(default)]
    filter: String,

    /// Country code matched against either endpoint
    #[serde(default)]
    country: String,

    /// Comma-separated IPs to exclude
    #[serde(default)]
    exclude: String,

    /// RFC3339 range start
    #[serde(default)]
    start: String,

    /// RFC3339 range end
    #[serde(default)]
    end: String,
}

/// Query parameters for `/api/history/stats`
#[derive(Deserialize)]
pub struct RangeParams {
    #[serde(default)]
    start: String,

    #[serde(default)]
    end: String,
}

fn default_limit() -> i64 {
    100
}

#[derive(Serialize)]
struct HistoryResponse {
    packets: Vec<Packet>,
    total: i64,
    limit: i64,
    offset: i64,
}

#[derive(Serialize)]
struct DatabaseResponse {
    enabled: bool,
    path: String,
    #[serde(flatten)]
    info: DatabaseInfo,
}

/// Historical packet query with filters and pagination
pub async fn get_history(
    state: web::Data<AppState>,
    params: web::Query<HistoryParams>,
) -> Result<HttpResponse, AppError> {
    let db = match &state.db {
        Some(db) => db.clone(),
        None => return Ok(persistence_disabled()),
    };

    let limit = if params.limit <= 0 {
        default_limit()
    } else {
        params.limit.min(MAX_LIMIT)
    };
    let query = HistoryQuery {
        limit,
        offset: params.offset.max(0),
        text: params.filter.clone(),
        country: params.country.clone(),
        exclude_ips: params.exclude.split(',').map(str::to_string).collect(),
        start: parse_rfc3339(&params.start),
        end: parse_rfc3339(&params.end),
    };
    let offset = query.offset;

    let (packets, total) = web::block(move || db.query_packets(&query))
        .await
        .map_err(|e| AppError::Generic(e.to_string()))??;

    Ok(HttpResponse::Ok().json(HistoryResponse {
        packets,
        total,
        limit,
        offset,
    }))
}

/// Aggregates over a historical time range
pub async fn get_history_stats(
    state: web::Data<AppState>,
    params: web::Query<RangeParams>,
) -> Result<HttpResponse, AppError> {
    let db = match &state.db {
        Some(db) => db.clone(),
        None => return Ok(persistence_disabled()),
    };

    let start = parse_rfc3339(&params.start);
    let end = parse_rfc3339(&params.end);
    let stats = web::block(move || db.stats(start, end))
        .await
        .map_err(|e| AppError::Generic(e.to_string()))??;

    Ok(HttpResponse::Ok().json(stats))
}

/// Database status and size information
pub async fn get_database_info(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let db = match &state.db {
        Some(db) => db.clone(),
        None => return Ok(HttpResponse::Ok().json(json!({ "enabled": false }))),
    };

    let info = web::block(move || db.info())
        .await
        .map_err(|e| AppError::Generic(e.to_string()))??;

    Ok(HttpResponse::Ok().json(DatabaseResponse {
        enabled: true,
        path: state.config.db_path.clone().unwrap_or_default(),
        info,
    }))
}

/// Distinct country codes seen in persistence
pub async fn get_countries(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let db = match &state.db {
        Some(db) => db.clone(),
        None => return Ok(persistence_disabled()),
    };

    let countries = web::block(move || db.distinct_countries())
        .await
        .map_err(|e| AppError::Generic(e.to_string()))??;

    Ok(HttpResponse::Ok().json(countries))
}

fn persistence_disabled() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "persistence is disabled" }))
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
