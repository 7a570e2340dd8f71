use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use breaker_api::auth::{self, AppState, AppStateInner};
use breaker_api::channels;
use breaker_api::devices;
use breaker_api::messages;
use breaker_api::middleware::require_auth;
use breaker_gateway::connection;
use breaker_gateway::dispatcher::Dispatcher;
use breaker_progression::ProgressionService;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "breaker=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("BREAKER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("BREAKER_DB_PATH").unwrap_or_else(|_| "breaker.db".into());
    let host = std::env::var("BREAKER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("BREAKER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(breaker_db::Database::open(&PathBuf::from(&db_path))?);

    // The progression service reads resources and territories through the
    // provider traits; a single-node install backs all three with the same
    // database.
    let progression = Arc::new(ProgressionService::new(db.clone(), db.clone(), db.clone()));

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: dispatcher.clone(),
        progression,
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        dispatcher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/channels", get(channels::list_channels))
        .route("/channels", post(channels::create_channel))
        .route("/channels/{channel_id}", delete(channels::delete_channel))
        .route(
            "/channels/{channel_id}/deactivate",
            post(channels::deactivate_channel),
        )
        .route("/channels/{channel_id}/subscribe", post(channels::subscribe))
        .route(
            "/channels/{channel_id}/unsubscribe",
            post(channels::unsubscribe),
        )
        .route("/channels/{channel_id}/mute", put(channels::set_muted))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_transmissions),
        )
        .route(
            "/channels/{channel_id}/messages",
            post(messages::send_transmission),
        )
        .route("/messages/{message_id}", delete(messages::delete_transmission))
        .route("/me/subscriptions", get(channels::my_subscriptions))
        .route("/me/callsign", put(auth::set_callsign))
        .route("/devices", get(devices::list_devices))
        .route("/devices/{kind}/unlock", post(devices::unlock_device))
        .route("/devices/{kind}/switch", post(devices::switch_device))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Breaker server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
