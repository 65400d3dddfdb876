mod api;
pub use api::Api;

mod metrics;
use metrics::HttpMetrics;

mod store;
pub use store::{Store, StoreError};

/// Shared service state behind the HTTP API: the store plus request
/// metrics, constructed once in `main` and handed to the router via `Arc`.
pub struct Backend {
    store: Store,
    http_metrics: HttpMetrics,
}

/// Point-in-time service health, reported by `GET /health`.
pub struct HealthStatus {
    pub healthy: bool,
    pub users: u64,
    pub referrals: u64,
    pub version: &'static str,
}

impl Backend {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            http_metrics: HttpMetrics::default(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    /// Health summary: row counts for both tables. A failed count marks the
    /// service unhealthy.
    pub fn health_status(&self) -> HealthStatus {
        let users = self.store.user_count();
        let referrals = self.store.referral_count();
        HealthStatus {
            healthy: users.is_ok() && referrals.is_ok(),
            users: users.unwrap_or(0),
            referrals: referrals.unwrap_or(0),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
