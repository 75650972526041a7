mod api;
mod broadcast;
mod capture;
mod enrich;
mod models;
mod store;
mod utils;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::api::AppState;
use crate::broadcast::Broadcaster;
use crate::enrich::{Enricher, IpInfoCache, ProcessTracker};
use crate::models::config::AppConfig;
use crate::store::{Database, PacketStore};
use crate::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Passive network traffic monitor with live browser dashboard")]
struct Args {
    /// Port for the web server
    #[clap(short, long, default_value = "25565")]
    port: u16,

    /// Network interface to capture from (auto-detected when omitted)
    #[clap(short, long)]
    interface: Option<String>,

    /// Maximum packets kept in memory
    #[clap(long, default_value = "10000")]
    max_packets: usize,

    /// SQLite database path (empty string disables persistence)
    #[clap(long, default_value = "pitrack.db")]
    db: String,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logger(logging::get_log_level(&args.log_level));

    info!("Starting Pi-Track v{}", env!("CARGO_PKG_VERSION"));

    // Startup preconditions: device and capture handle first, so permission
    // problems abort before anything else is wired up
    let interface = capture::source::resolve_interface(args.interface.as_deref())?;
    let capture_handle = capture::source::open_capture(&interface)?;
    info!("Capturing on interface: {}", interface);

    let enricher: Arc<dyn Enricher> = Arc::new(IpInfoCache::new());

    let tracker = Arc::new(ProcessTracker::new());
    tracker.spawn_refresh();

    let db = if args.db.is_empty() {
        info!("Persistence disabled");
        None
    } else {
        Some(Database::open(&args.db, enricher.clone())?)
    };

    let store = Arc::new(PacketStore::new(args.max_packets, enricher.clone()));
    let broadcaster = Arc::new(Broadcaster::new());

    capture::source::spawn_pipeline(
        capture_handle,
        store.clone(),
        db.clone(),
        broadcaster.clone(),
        enricher,
        tracker,
    );

    // Stats pushed to streaming clients once per second
    {
        let store = store.clone();
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                broadcaster.broadcast("stats", &store.stats());
            }
        });
    }

    let config = AppConfig {
        interface,
        db_path: (!args.db.is_empty()).then(|| args.db.clone()),
    };
    let state = web::Data::new(AppState {
        store,
        db: db.clone(),
        broadcaster,
        config,
    });

    info!("Web interface listening on 0.0.0.0:{}", args.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
            .configure(api::routes::configure)
    })
    .bind(("0.0.0.0", args.port))?
    .run()
    .await?;

    if let Some(db) = db {
        db.close();
    }

    Ok(())
}
