use std::sync::Arc;

use dental_booking_server::booking::{events, pg::PgStore, BookingService};
use dental_booking_server::{config::Config, db, models::AppState, routes};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let (event_tx, _) = events::channel();
    let bookings = Arc::new(BookingService::new(store.clone(), store, event_tx));

    // Stand-in for the notification/socket layer: log every lifecycle event.
    let mut event_rx = bookings.subscribe();
    tokio::spawn(async move {
        while let Ok(ev) = event_rx.recv().await {
            tracing::info!(
                topic = ev.kind.topic(),
                booking_id = %ev.booking.booking_id,
                "booking event"
            );
        }
    });

    let state = AppState { db: pool, bookings };

    // DEV ONLY: allow browser/WebView clients to call the API; fixes CORS
    // preflight that otherwise blocks the booking UI.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
