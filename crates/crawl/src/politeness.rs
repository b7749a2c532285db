use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

/// Per-host pacing and status-code blocking. One instance is shared by every
/// crawl in the process, so a host hammered by one request slows the others
/// down too.
pub struct HostPoliteness {
    last_visit: DashMap<String, Instant>,
    blocked_until: DashMap<String, Instant>,
    min_delay: Duration,
    throttle_block: Duration,
    auth_block: Duration,
}

impl HostPoliteness {
    pub fn new(min_delay: Duration, throttle_block: Duration, auth_block: Duration) -> Self {
        Self {
            last_visit: DashMap::new(),
            blocked_until: DashMap::new(),
            min_delay,
            throttle_block,
            auth_block,
        }
    }

    /// True while the host is serving a block issued by [`note_status`].
    /// Expired blocks are removed on the way out.
    pub fn is_blocked(&self, host: &str) -> bool {
        // Read guard scoped before the removal so the shard is not locked
        // against itself.
        let state = self
            .blocked_until
            .get(host)
            .map(|until| Instant::now() < *until);
        match state {
            Some(true) => true,
            Some(false) => {
                self.blocked_until.remove(host);
                false
            }
            None => false,
        }
    }

    /// Suspends until at least `min_delay` has passed since the previous
    /// visit to `host`, then records this visit. Concurrent callers for the
    /// same host serialize here.
    pub async fn wait_turn(&self, host: &str) {
        loop {
            let now = Instant::now();
            let wait = match self.last_visit.entry(host.to_string()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(now);
                    return;
                }
                Entry::Occupied(mut occupied) => {
                    let elapsed = occupied.get().elapsed();
                    if elapsed >= self.min_delay {
                        occupied.insert(now);
                        return;
                    }
                    self.min_delay - elapsed
                }
            };
            debug!(host, wait_ms = wait.as_millis() as u64, "politeness delay");
            tokio::time::sleep(wait).await;
        }
    }

    /// Applies block rules for throttling (429/503) and auth (401/403)
    /// responses. Other statuses are ignored.
    pub fn note_status(&self, host: &str, status: u16) {
        let duration = match status {
            429 | 503 => self.throttle_block,
            401 | 403 => self.auth_block,
            _ => return,
        };
        warn!(host, status, block_s = duration.as_secs(), "host blocked");
        self.blocked_until
            .insert(host.to_string(), Instant::now() + duration);
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked_until
            .iter()
            .filter(|entry| Instant::now() < *entry.value())
            .count()
    }
}
