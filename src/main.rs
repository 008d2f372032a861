use anyhow::anyhow;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigia::app::triage::{TriageDispatcher, TriageService};
use vigia::config::{AppConfig, StoreBackend};
use vigia::infra::cache::RedisCache;
use vigia::infra::clock::{Clock, SystemClock};
use vigia::infra::db::Db;
use vigia::infra::memory_store::MemoryStore;
use vigia::infra::pg_store::PgStore;
use vigia::infra::queue::QueueClient;
use vigia::infra::storage::{MediaVerifier, ObjectStorage, ObjectStorageVerifier, PrefixMediaVerifier};
use vigia::infra::store::{AnonymousReportStore, IncidentStore, ReportStore};
use vigia::infra::triage_client::{HttpTriageClient, TriageClient, UnconfiguredTriageClient};
use vigia::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let (reports, anonymous, incidents, db) = match config.store_backend {
        StoreBackend::Postgres => {
            let db = Db::connect(&config).await?;
            let store = Arc::new(PgStore::new(db.clone()));
            stores(store, Some(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, data is lost on restart");
            stores(Arc::new(MemoryStore::new()), None)
        }
    };

    let cache = match &config.redis_url {
        Some(url) => Some(RedisCache::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    let media: Arc<dyn MediaVerifier> = match &config.s3 {
        Some(s3) => {
            let storage = ObjectStorage::new(s3).await?;
            Arc::new(ObjectStorageVerifier::new(storage, config.media_base_url.clone()))
        }
        None => Arc::new(PrefixMediaVerifier::new(config.media_base_url.clone())),
    };

    let triage_client: Arc<dyn TriageClient> = match &config.triage_endpoint {
        Some(endpoint) => Arc::new(HttpTriageClient::new(endpoint.clone())),
        None => {
            tracing::warn!("TRIAGE_ENDPOINT not set, triage will always degrade");
            Arc::new(UnconfiguredTriageClient)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let triage = TriageService::new(
        reports.clone(),
        triage_client.clone(),
        clock.clone(),
        config.policy,
    );
    let queue = match &config.queue {
        Some(queue) => Some(QueueClient::new(queue).await?),
        None => None,
    };
    let dispatcher = match &queue {
        Some(queue) => TriageDispatcher::Queue(queue.clone()),
        None => TriageDispatcher::Spawn(triage.clone()),
    };

    let state = AppState {
        reports,
        anonymous,
        incidents,
        triage_client,
        dispatcher,
        media,
        clock: clock.clone(),
        db,
        cache,
        policy: config.policy,
        rate_limits: config.rate_limits,
        fingerprint_salt: config.fingerprint_salt,
        paseto_access_key: config.paseto_access_key,
        access_ttl_minutes: config.access_ttl_minutes,
    };

    match config.app_mode.as_str() {
        "api" => {
            // Without a queue, triage runs in-process and so does the sweep.
            if queue.is_none() {
                tokio::spawn(jobs::triage_worker::run(triage, None, clock, config.policy));
            }

            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            let app = app.into_make_service_with_connect_info::<SocketAddr>();

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            tracing::info!("starting worker mode");
            tokio::select! {
                result = jobs::triage_worker::run(triage, queue, clock, config.policy) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

type Stores = (
    Arc<dyn ReportStore>,
    Arc<dyn AnonymousReportStore>,
    Arc<dyn IncidentStore>,
    Option<Db>,
);

fn stores<S>(store: Arc<S>, db: Option<Db>) -> Stores
where
    S: ReportStore + AnonymousReportStore + IncidentStore + 'static,
{
    (store.clone(), store.clone(), store, db)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
