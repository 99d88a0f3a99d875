use std::sync::Arc;

use busline_core::{Clock, SystemClock};
use busline_infra::{
    BookingLifecycleService, BookingQueries, BookingStore, BookingTransactionManager,
    CatalogStore, FleetService, InMemoryBookingStore, InMemoryCatalogStore,
};

use crate::config::AppConfig;

/// Service graph shared by every handler.
pub struct AppServices {
    pub clock: Arc<dyn Clock>,
    pub bookings: BookingTransactionManager,
    pub lifecycle: BookingLifecycleService,
    pub queries: BookingQueries,
    pub fleet: FleetService,
}

impl AppServices {
    /// Wire the services over the given stores and clock.
    pub fn new(
        config: &AppConfig,
        bookings: Arc<dyn BookingStore>,
        catalog: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings: BookingTransactionManager::new(bookings.clone(), catalog.clone(), clock.clone())
                .with_policy(config.policy)
                .with_retry(config.retry)
                .with_reference_generator(config.references.clone()),
            lifecycle: BookingLifecycleService::new(bookings.clone(), catalog.clone(), clock.clone())
                .with_policy(config.policy)
                .with_retry(config.retry),
            queries: BookingQueries::new(bookings, catalog.clone(), clock.clone())
                .with_policy(config.policy)
                .with_retry(config.retry),
            fleet: FleetService::new(catalog).with_retry(config.retry),
            clock,
        }
    }

    /// In-memory stores; used for local runs and tests.
    pub fn in_memory(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(InMemoryCatalogStore::new()),
            clock,
        )
    }
}

/// Build the production service graph.
///
/// With the `postgres` feature and `DATABASE_URL` set, both stores are backed
/// by Postgres; otherwise everything lives in memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if let Some(url) = config.database_url.as_deref() {
        return database_services(config, url, clock).await;
    }

    tracing::info!("using in-memory store");
    Ok(Arc::new(AppServices::in_memory(config, clock)))
}

#[cfg(feature = "postgres")]
async fn database_services(
    config: &AppConfig,
    url: &str,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<AppServices>> {
    let store = Arc::new(busline_infra::PostgresStore::connect(url, config.retry.timeout).await?);
    store.migrate().await?;
    tracing::info!("using postgres store");
    Ok(Arc::new(AppServices::new(config, store.clone(), store, clock)))
}

#[cfg(not(feature = "postgres"))]
async fn database_services(
    config: &AppConfig,
    _url: &str,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<AppServices>> {
    tracing::warn!("DATABASE_URL set but built without the postgres feature; using in-memory store");
    Ok(Arc::new(AppServices::in_memory(config, clock)))
}
