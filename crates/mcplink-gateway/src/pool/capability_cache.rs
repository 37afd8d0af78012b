//! Time-bounded cache over the capabilities of the live connection
//!
//! A fetch never fails from the caller's point of view: a failed listing is
//! cached as an empty list, under the short TTL, so a broken server is not
//! hammered by every caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{CapabilityDescriptor, ConnectionError};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Anything that can list the capabilities currently reachable.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    async fn list_active_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, ConnectionError>;

    /// Changes whenever the reachable capabilities may have changed
    fn generation(&self) -> u64;
}

/// How long a computed list stays fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub non_empty: Duration,
    pub empty: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            non_empty: Duration::from_secs(30),
            empty: Duration::from_secs(2),
        }
    }
}

impl CacheTtl {
    fn for_len(&self, len: usize) -> Duration {
        if len == 0 {
            self.empty
        } else {
            self.non_empty
        }
    }
}

struct CacheEntry {
    capabilities: Arc<Vec<CapabilityDescriptor>>,
    computed_at: Instant,
    generation: u64,
}

pub struct CapabilityCache {
    source: Arc<dyn CapabilitySource>,
    ttl: CacheTtl,
    entry: RwLock<Option<CacheEntry>>,
    /// Serializes recomputation so concurrent misses fetch once
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CapabilityCache {
    pub fn new(source: Arc<dyn CapabilitySource>) -> Self {
        Self::with_ttl(source, CacheTtl::default())
    }

    pub fn with_ttl(source: Arc<dyn CapabilitySource>, ttl: CacheTtl) -> Self {
        Self {
            source,
            ttl,
            entry: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<Arc<Vec<CapabilityDescriptor>>> {
        let generation = self.source.generation();
        let guard = self.entry.read();
        let entry = guard.as_ref()?;
        let ttl = self.ttl.for_len(entry.capabilities.len());
        (entry.generation == generation && entry.computed_at.elapsed() < ttl)
            .then(|| Arc::clone(&entry.capabilities))
    }

    /// Capabilities of the live connection, from cache when fresh.
    pub async fn get_capabilities(&self) -> Vec<CapabilityDescriptor> {
        if let Some(cached) = self.fresh() {
            return cached.as_ref().clone();
        }

        let _refresh = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(cached) = self.fresh() {
            return cached.as_ref().clone();
        }

        let generation = self.source.generation();
        let capabilities = match self.source.list_active_capabilities().await {
            Ok(capabilities) => {
                debug!(
                    count = capabilities.len(),
                    "[CapabilityCache] Recomputed capability list"
                );
                capabilities
            }
            Err(e) => {
                warn!("[CapabilityCache] Capability listing failed, caching empty list: {}", e);
                Vec::new()
            }
        };

        let capabilities = Arc::new(capabilities);
        *self.entry.write() = Some(CacheEntry {
            capabilities: Arc::clone(&capabilities),
            computed_at: Instant::now(),
            generation,
        });

        capabilities.as_ref().clone()
    }

    /// Drop the cached list; the next call recomputes.
    pub fn invalidate(&self) {
        *self.entry.write() = None;
    }

    /// Populate the cache once after `delay`.
    pub fn spawn_warm_up(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let capabilities = cache.get_capabilities().await;
            info!(
                count = capabilities.len(),
                "[CapabilityCache] Warm-up complete"
            );
        })
    }
}
