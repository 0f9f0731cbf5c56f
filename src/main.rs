//! EventHub HTTP server.
//!
//! Wires the durable store, the Redis cache tier (degrading to in-process
//! backends when Redis is unreachable), the reservation controller and the
//! real-time fan-out into one axum application.

use eventhub::cache::{
    CounterStore, MemoryCounters, MemorySnapshots, RedisCounters, RedisSnapshots, SnapshotCache,
};
use eventhub::config::Config;
use eventhub::identity::{SessionTokenVerifier, StaticTokenVerifier, TokenVerifier};
use eventhub::limiter::{AdmissionLimiter, LimiterSettings};
use eventhub::realtime::{Broadcaster, ConnectionRegistry, FanoutBus, RedisFanout};
use eventhub::server::{build_router, AppState};
use eventhub::store::{EventStore, PgEventStore};
use eventhub::{BookingService, CatalogService, EventQueryService};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The Redis-backed tier, present only when the connection succeeds.
struct RedisTier {
    counters: Arc<dyn CounterStore>,
    snapshots: Arc<dyn SnapshotCache>,
    bus: Arc<dyn FanoutBus>,
    verifier: Arc<dyn TokenVerifier>,
    limiter_conn: ConnectionManager,
}

async fn connect_redis_tier(config: &Config) -> Option<RedisTier> {
    let client = match redis::Client::open(config.redis.url.as_str()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "invalid Redis URL");
            return None;
        }
    };

    let connect = ConnectionManager::new(client.clone());
    let manager = match tokio::time::timeout(
        Duration::from_secs(config.redis.connect_timeout),
        connect,
    )
    .await
    {
        Ok(Ok(manager)) => manager,
        Ok(Err(e)) => {
            warn!(error = %e, "Redis connection failed");
            return None;
        }
        Err(_) => {
            warn!("Redis connection timed out");
            return None;
        }
    };

    Some(RedisTier {
        counters: Arc::new(RedisCounters::with_manager(manager.clone())),
        snapshots: Arc::new(RedisSnapshots::with_manager(manager.clone())),
        bus: Arc::new(RedisFanout::with_connection(
            client,
            manager.clone(),
            &config.realtime.channel,
        )),
        verifier: Arc::new(SessionTokenVerifier::new(manager.clone())),
        limiter_conn: manager,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eventhub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EventHub server");

    let config = Config::from_env();
    info!(
        postgres_url = %config.postgres.url,
        redis_url = %config.redis.url,
        "Configuration loaded"
    );

    // Durable store (authoritative rows).
    info!("Connecting to Postgres...");
    let store: Arc<dyn EventStore> = Arc::new(
        PgEventStore::connect(
            &config.postgres.url,
            config.postgres.max_connections,
            Duration::from_secs(config.postgres.connect_timeout),
        )
        .await?,
    );
    info!("Durable store connected");

    // Cache tier. A missing Redis degrades every consumer to in-process
    // backends: counters and snapshots go per-process, the limiter loses its
    // shared view, fan-out stays local, identity binding is disabled.
    let (counters, snapshots, bus, verifier, limiter_conn) =
        match connect_redis_tier(&config).await {
            Some(tier) => {
                info!("Redis tier connected");
                (
                    tier.counters,
                    tier.snapshots,
                    Some(tier.bus),
                    tier.verifier,
                    Some(tier.limiter_conn),
                )
            }
            None => {
                warn!("Redis unavailable; running degraded with in-process cache tier");
                (
                    Arc::new(MemoryCounters::new()) as Arc<dyn CounterStore>,
                    Arc::new(MemorySnapshots::new()) as Arc<dyn SnapshotCache>,
                    None,
                    Arc::new(StaticTokenVerifier::new()) as Arc<dyn TokenVerifier>,
                    None,
                )
            }
        };

    // Real-time fan-out.
    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry), bus);
    let _subscriber = broadcaster.spawn_subscriber();
    let _heartbeat = broadcaster
        .spawn_heartbeat(Duration::from_secs(config.realtime.ping_interval_secs));

    // Services.
    let bookings = Arc::new(BookingService::new(
        Arc::clone(&store),
        Arc::clone(&counters),
        Arc::clone(&snapshots),
        Arc::clone(&broadcaster),
    ));
    let queries = Arc::new(EventQueryService::new(
        Arc::clone(&store),
        Arc::clone(&counters),
        Arc::clone(&snapshots),
    ));
    let catalog = Arc::new(CatalogService::new(
        Arc::clone(&store),
        Arc::clone(&counters),
        Arc::clone(&snapshots),
        Arc::clone(&broadcaster),
    ));

    let limiter = Arc::new(AdmissionLimiter::new(
        LimiterSettings {
            max: config.limiter.max_requests,
            window: config.limiter.window(),
        },
        limiter_conn.clone(),
    ));
    let booking_limiter = Arc::new(AdmissionLimiter::new(
        LimiterSettings {
            max: config.limiter.booking_max_requests,
            window: config.limiter.booking_window(),
        },
        limiter_conn,
    ));

    let state = AppState {
        store,
        bookings,
        queries,
        catalog,
        registry,
        verifier,
        limiter,
        booking_limiter,
    };
    let router = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "EventHub server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("EventHub server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
