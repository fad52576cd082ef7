//! Huddle server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware};
use huddle_api::{
    middleware::{AppState, auth_middleware},
    router as api_router,
};
use huddle_common::Config;
use huddle_core::{
    ChangeSubscriberService, ChatService, EventPublisherService, FeedService, LocalChangeBus,
    PollService, ProfileService, RepositoryFeedSource,
};
use huddle_db::repositories::{
    MessageRepository, PollRepository, PollVoteRepository, ProfileRepository,
};
use huddle_realtime::RedisPubSub;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Change bus wiring: where events go and where feed sessions listen.
struct ChangeBus {
    publisher: EventPublisherService,
    subscriber: ChangeSubscriberService,
    redis: Option<RedisPubSub>,
}

async fn connect_change_bus(config: &Config) -> Result<ChangeBus, Box<dyn std::error::Error>> {
    let buffer_size = config.realtime.buffer_size;

    if config.realtime.use_redis {
        info!("Connecting to Redis Pub/Sub...");
        let pubsub = RedisPubSub::new(&config.redis.url, &config.redis.prefix, buffer_size).await?;
        pubsub.start().await?;

        return Ok(ChangeBus {
            publisher: Arc::new(pubsub.clone()),
            subscriber: Arc::new(pubsub.clone()),
            redis: Some(pubsub),
        });
    }

    info!("Using in-process change bus");
    let bus = LocalChangeBus::new(buffer_size);
    Ok(ChangeBus {
        publisher: Arc::new(bus.clone()),
        subscriber: Arc::new(bus),
        redis: None,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting huddle server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = huddle_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    huddle_db::migrate(&db).await?;
    info!("Migrations completed");

    let bus = connect_change_bus(&config).await?;

    // Initialize repositories
    let db = Arc::new(db);
    let message_repo = MessageRepository::new(Arc::clone(&db));
    let poll_repo = PollRepository::new(Arc::clone(&db));
    let poll_vote_repo = PollVoteRepository::new(Arc::clone(&db));
    let profile_repo = ProfileRepository::new(db);

    // Initialize services
    let mut chat_service = ChatService::new(message_repo.clone(), poll_repo.clone());
    chat_service.set_event_publisher(Arc::clone(&bus.publisher));

    let mut poll_service = PollService::new(poll_repo.clone(), poll_vote_repo);
    poll_service.set_event_publisher(Arc::clone(&bus.publisher));

    let feed_service = FeedService::new(
        Arc::new(RepositoryFeedSource::new(message_repo, poll_repo)),
        Arc::clone(&bus.subscriber),
    );

    let state = AppState {
        chat_service,
        poll_service,
        feed_service,
        profile_service: ProfileService::new(profile_repo),
        subscriber: bus.subscriber,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pubsub) = bus.redis
        && let Err(e) = pubsub.shutdown().await
    {
        warn!(error = %e, "Failed to shut down Redis Pub/Sub");
    }

    info!("Server shutdown complete");
    Ok(())
}
