use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::body::Body;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod scheduling;
mod services;

use config::Config;
use db::feed::ResponseFeed;
use db::store::EventStore;
use services::access_code::AccessCodeService;
use services::dialogue::DialogueController;
use services::extraction::{Extractor, OpenAiExtractor};
use services::init;

pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub feed: ResponseFeed,
    pub config: Config,
    pub dialogue: DialogueController,
    pub access_codes: AccessCodeService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flock=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Flock scheduling service");

    // Persistence backend is picked once, here; everything downstream sees
    // only the EventStore trait.
    let feed = ResponseFeed::default();
    let store = init::init_store(&config, feed.clone()).await?;

    let extractor: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::new(config.openai.clone())?);
    let dialogue = DialogueController::new(
        store.clone(),
        extractor,
        config.server.frontend_url.clone(),
    );
    let access_codes = AccessCodeService::new(store.clone());

    let app_state = Arc::new(AppState {
        store,
        feed,
        config: config.clone(),
        dialogue,
        access_codes,
    });

    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Rate limiter for the chat endpoint; it fronts a paid LLM call so it
    // gets the tightest budget. 429s are rendered through AppError so the
    // JSON shape stays uniform.
    let mut chat_builder = GovernorConfigBuilder::default();
    chat_builder.per_second(config.rate_limit.chat_per_second.into());
    chat_builder.burst_size(config.rate_limit.chat_burst);
    chat_builder.key_extractor(SmartIpKeyExtractor);
    chat_builder.error_handler(|error: GovernorError| -> http::Response<Body> {
        match error {
            GovernorError::TooManyRequests { wait_time, headers } => {
                // `wait_time` is provided as seconds
                let retry_after = wait_time;

                // One source of truth for the JSON error shape.
                let mut resp = error::AppError::RateLimited.into_response();

                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }

                // Retry-After (seconds)
                resp.headers_mut().insert(
                    http::header::RETRY_AFTER,
                    http::HeaderValue::from_str(&retry_after.to_string()).unwrap(),
                );

                resp
            }
            GovernorError::UnableToExtractKey => {
                let body = serde_json::json!({
                    "error": {
                        "code": "INVALID_REQUEST",
                        "message": "Unable to determine client IP for rate limiting"
                    }
                })
                .to_string();

                let mut resp = http::Response::new(Body::from(body));
                *resp.status_mut() = StatusCode::BAD_REQUEST;
                resp.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("application/json"),
                );
                resp
            }
            GovernorError::Other { code, msg, headers } => {
                let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
                let mut resp = http::Response::new(Body::from(body));
                let status = StatusCode::from_u16(code.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                *resp.status_mut() = status;
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }
                resp
            }
        }
    });

    let chat_gov_conf = Arc::new(
        chat_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build chat governor config"))?,
    );

    // Background cleanup for chat limiter storage
    let chat_cleaner = {
        let limiter = chat_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        let flag = thread_shutdown.clone();
        std::thread::spawn(move || {
            // Use smaller sleep granularity to allow quick shutdown.
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..interval.as_secs() {
                    if flag.load(Ordering::SeqCst) {
                        tracing::info!("Chat rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("chat rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let chat_rate_layer = GovernorLayer {
        config: chat_gov_conf.clone(),
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Conversational turns (rate limited)
        .nest("/api/chat", routes::chat::router().layer(chat_rate_layer))
        // Events: creation, lookup, access codes, responses, live updates
        .nest(
            "/api/events",
            routes::events::router().merge(routes::responses::router()),
        )
        // Add shared state
        .with_state(app_state.clone())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(
                    config
                        .server
                        .frontend_url
                        .parse::<HeaderValue>()
                        .expect("Invalid FRONTEND_URL for CORS"),
                )
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::ACCEPT,
                ]),
        );

    // Start server
    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let thread_shutdown_clone = thread_shutdown.clone();

    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to bind SIGTERM");
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to bind Ctrl+C");
        }

        tracing::info!("Shutdown signal received");
        thread_shutdown_clone.store(true, Ordering::SeqCst);
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server future dropped to stop accepting new connections");
        }
    }

    // Join the cleanup thread; it checks `thread_shutdown` and should exit
    // within a second.
    thread_shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = chat_cleaner.join() {
        tracing::warn!("Chat cleanup thread join failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
