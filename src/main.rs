use axum::Router;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credit_nav_api::client_gateway::NavClientService;
use credit_nav_api::config::Config;
use credit_nav_api::contract_gateway::NavContractService;
use credit_nav_api::db::Database;
use credit_nav_api::handlers::{self, AppState};
use credit_nav_api::handoff::HandoffOrchestrator;
use credit_nav_api::soap::{NavTransport, SoapTransport};
use credit_nav_api::store::PgCreditRequestStore;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the NAV transport
/// and gateways, then serves the HTTP routes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credit_nav_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    db.ensure_schema().await?;
    tracing::info!("Database connection pool established");

    let transport: Arc<dyn NavTransport> = Arc::new(SoapTransport::new(&config.nav)?);
    let clients = Arc::new(NavClientService::new(transport.clone()));
    let contracts = Arc::new(NavContractService::new(
        transport,
        config.nav.insurance_vendor_no.clone(),
    ));
    tracing::info!("NAV gateways initialized: {}", config.nav.base_url);

    // 5 minute TTL outlives any handoff bounded by the per-call timeout
    let handoffs_in_flight = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();

    let app_state = Arc::new(AppState {
        store: Arc::new(PgCreditRequestStore::new(db.pool.clone())),
        orchestrator: Arc::new(HandoffOrchestrator::new(clients, contracts)),
        handoffs_in_flight,
    });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    let app = Router::new()
        .merge(handlers::public_routes())
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
