//! Health Service
//!
//! System health monitoring for the dashboard and load balancers.
//! Checks database connectivity and object storage status; results are
//! cached behind a timestamp comparison so a scraping load balancer cannot
//! stampede the dependencies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::services::photo_storage::PhotoStorageBackend;

/// Overall system health status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components are functioning normally
    Healthy,
    /// Some components have issues but the system is operational
    Degraded,
    /// Critical components are failing
    Unhealthy,
}

/// System health report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    /// Overall status (worst component status)
    pub status: HealthStatus,
    pub database: DatabaseHealth,
    pub storage: StorageHealth,
    pub checked_at: DateTime<Utc>,
}

/// Database health information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub status: HealthStatus,
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Object storage health information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    pub status: HealthStatus,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Health service with a short-TTL result cache
#[derive(Clone)]
pub struct HealthService {
    pool: PgPool,
    storage: Arc<dyn PhotoStorageBackend>,
    cache_ttl: Duration,
    cached: Arc<Mutex<Option<(Instant, SystemHealth)>>>,
}

impl HealthService {
    pub fn new(
        pool: PgPool,
        storage: Arc<dyn PhotoStorageBackend>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            storage,
            cache_ttl,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Check system health, serving a cached result while it is fresh
    pub async fn check_health(&self) -> SystemHealth {
        let mut cached = self.cached.lock().await;
        if let Some((at, health)) = cached.as_ref() {
            if at.elapsed() < self.cache_ttl {
                return health.clone();
            }
        }

        let (database, storage) = tokio::join!(self.check_database(), self.check_storage());
        let status = Self::determine_overall_status(&database, &storage);

        let health = SystemHealth {
            status,
            database,
            storage,
            checked_at: Utc::now(),
        };
        *cached = Some((Instant::now(), health.clone()));
        health
    }

    /// Check database connectivity and pool status
    pub async fn check_database(&self) -> DatabaseHealth {
        let pool_size = self.pool.size();
        let max_connections = self.pool.options().get_max_connections();
        let num_idle = self.pool.num_idle();
        let active_connections = pool_size.saturating_sub(num_idle as u32);
        let idle_connections = num_idle as u32;

        let start = Instant::now();
        let query_result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match query_result {
            Ok(_) => {
                let utilization = if max_connections > 0 {
                    f64::from(active_connections) / f64::from(max_connections)
                } else {
                    0.0
                };

                let status = if utilization > 0.9 {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };

                DatabaseHealth {
                    status,
                    active_connections,
                    idle_connections,
                    max_connections,
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Err(e) => DatabaseHealth {
                status: HealthStatus::Unhealthy,
                active_connections,
                idle_connections,
                max_connections,
                latency_ms: None,
                error: Some(format!("Database query failed: {e}")),
            },
        }
    }

    /// Check object storage connectivity
    pub async fn check_storage(&self) -> StorageHealth {
        let start = Instant::now();
        let result = self.storage.probe().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => StorageHealth {
                status: HealthStatus::Healthy,
                reachable: true,
                latency_ms: Some(latency_ms),
                error: None,
            },
            Err(e) => StorageHealth {
                status: HealthStatus::Unhealthy,
                reachable: false,
                latency_ms: Some(latency_ms),
                error: Some(format!("Storage probe failed: {e}")),
            },
        }
    }

    /// Overall status is the worst component status
    fn determine_overall_status(
        database: &DatabaseHealth,
        storage: &StorageHealth,
    ) -> HealthStatus {
        let statuses = [database.status, storage.status];
        if statuses.contains(&HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if statuses.contains(&HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
