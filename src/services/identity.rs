use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::RoomStore;
use crate::models::room::DisplayIdentity;

/// Resolves verified user ids to display identities (name/email) from the
/// durable user directory, with a short-lived cache in front so repeated
/// reconnects don't hit the database.
pub struct IdentityDirectory {
    cache: Cache<String, DisplayIdentity>,
    store: Arc<dyn RoomStore>,
}

impl IdentityDirectory {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();
        Self { cache, store }
    }

    /// Resolve the display identity for a verified user id.
    ///
    /// A user missing from the directory still gets a usable identity (the
    /// raw user id as name) so a stale directory never blocks a connection.
    pub async fn get_or_fetch(&self, user_id: &str) -> DisplayIdentity {
        if let Some(identity) = self.cache.get(user_id) {
            return identity;
        }

        info!("Identity cache miss for uid {}. Fetching from directory.", user_id);
        let identity = match self.store.find_user(user_id).await {
            Ok(Some(row)) => DisplayIdentity {
                name: row.name,
                email: row.email,
            },
            Ok(None) => {
                warn!("User {} not found in directory, using uid as name", user_id);
                DisplayIdentity {
                    name: user_id.to_string(),
                    email: None,
                }
            }
            Err(e) => {
                warn!("Directory lookup failed for {}: {}. Using uid as name.", user_id, e);
                DisplayIdentity {
                    name: user_id.to_string(),
                    email: None,
                }
            }
        };

        self.cache.insert(user_id.to_string(), identity.clone());
        identity
    }

    /// Number of cached identities, reported by diagnostics
    pub fn cached_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
