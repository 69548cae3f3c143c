//! Path-to-stream registry with TTL sweeping.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::stream::StreamEntry;
use crate::types::StreamConfig;

/// Outcome of an idempotent create.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The stream did not exist and was created.
    Created(Arc<StreamEntry>),
    /// A stream with the same configuration identity already existed.
    Existing(Arc<StreamEntry>),
}

impl CreateOutcome {
    pub fn entry(&self) -> &Arc<StreamEntry> {
        match self {
            CreateOutcome::Created(entry) => entry,
            CreateOutcome::Existing(entry) => entry,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Concurrent map of `path -> stream`.
///
/// The registry lock is held only for map operations, never while touching a
/// stream's own lock. Expired streams are dropped lazily on access and by
/// the background sweeper; both paths wake the stream's waiters so pending
/// long-polls observe the deletion.
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, Arc<StreamEntry>>>,
    producer_idle_ms: i64,
}

impl StreamRegistry {
    pub fn new(producer_idle_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            streams: RwLock::new(HashMap::new()),
            producer_idle_ms,
        })
    }

    /// Create a stream, idempotently.
    ///
    /// A second create with the same configuration identity returns the
    /// existing stream; a different configuration is a conflict.
    pub fn create(&self, path: &str, config: StreamConfig) -> Result<CreateOutcome, StreamError> {
        if config.ttl_seconds.is_some() && config.expires_at.is_some() {
            return Err(StreamError::TtlConflict);
        }

        let now = Utc::now();
        let mut streams = self.streams.write();

        if let Some(existing) = streams.get(path) {
            if existing.is_expired(now) {
                let removed = streams.remove(path);
                if let Some(entry) = removed {
                    entry.mark_deleted();
                }
            } else if existing.config_matches(&config) {
                return Ok(CreateOutcome::Existing(existing.clone()));
            } else {
                return Err(StreamError::ConfigMismatch);
            }
        }

        let entry = StreamEntry::new(
            path.to_string(),
            config,
            self.producer_idle_ms,
            now.timestamp_millis(),
        );
        streams.insert(path.to_string(), entry.clone());
        info!(path = %path, "created stream");
        Ok(CreateOutcome::Created(entry))
    }

    /// Look up a live stream. Expired streams are removed on the way.
    pub fn get(&self, path: &str) -> Option<Arc<StreamEntry>> {
        let now = Utc::now();
        {
            let streams = self.streams.read();
            match streams.get(path) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: re-check under the write lock and drop it
        let mut streams = self.streams.write();
        if let Some(entry) = streams.get(path) {
            if entry.is_expired(now) {
                let entry = streams.remove(path);
                drop(streams);
                if let Some(entry) = entry {
                    info!(path = %path, "expired stream removed");
                    entry.mark_deleted();
                }
                return None;
            }
            return Some(entry.clone());
        }
        None
    }

    /// Remove a stream. Waiters are woken and observe the deletion.
    pub fn delete(&self, path: &str) -> bool {
        let removed = self.streams.write().remove(path);
        match removed {
            Some(entry) => {
                info!(path = %path, "deleted stream");
                entry.mark_deleted();
                true
            }
            None => false,
        }
    }

    /// Drop every stream whose TTL or absolute expiry has passed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = {
            let streams = self.streams.read();
            streams
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(path, _)| path.clone())
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        let mut swept = 0;
        for path in expired {
            let removed = {
                let mut streams = self.streams.write();
                // Re-check under the write lock: a PUT may have replaced it
                match streams.get(&path) {
                    Some(entry) if entry.is_expired(now) => streams.remove(&path),
                    _ => None,
                }
            };
            if let Some(entry) = removed {
                debug!(path = %path, "swept expired stream");
                entry.mark_deleted();
                swept += 1;
            }
        }
        if swept > 0 {
            info!(count = swept, "swept expired streams");
        }
        swept
    }

    /// All live stream paths.
    pub fn list(&self) -> Vec<String> {
        let now = Utc::now();
        self.streams
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }

    /// Spawn the periodic sweeper. The task stops once the registry is
    /// dropped by every other holder.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep_expired(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE_MS: i64 = 7 * 24 * 3600 * 1000;

    fn config(content_type: &str) -> StreamConfig {
        StreamConfig {
            content_type: Some(content_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let registry = StreamRegistry::new(IDLE_MS);
        let outcome = registry.create("/s1", config("text/plain")).unwrap();
        assert!(outcome.was_created());

        let entry = registry.get("/s1").unwrap();
        assert_eq!(entry.path(), "/s1");
        assert_eq!(entry.content_type(), Some("text/plain"));
        assert!(registry.get("/missing").is_none());
    }

    #[test]
    fn test_create_idempotent_same_config() {
        let registry = StreamRegistry::new(IDLE_MS);
        assert!(registry.create("/s1", config("text/plain")).unwrap().was_created());
        let second = registry.create("/s1", config("text/plain")).unwrap();
        assert!(!second.was_created());

        // Parameters and case do not change the configuration identity
        let third = registry
            .create("/s1", config("Text/Plain; charset=utf-8"))
            .unwrap();
        assert!(!third.was_created());
    }

    #[test]
    fn test_create_conflict_on_different_config() {
        let registry = StreamRegistry::new(IDLE_MS);
        registry.create("/s1", config("text/plain")).unwrap();

        let err = registry
            .create("/s1", config("application/json"))
            .unwrap_err();
        assert!(matches!(err, StreamError::ConfigMismatch));

        let err = registry
            .create(
                "/s1",
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ttl_seconds: Some(60),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StreamError::ConfigMismatch));
    }

    #[test]
    fn test_create_rejects_ttl_and_expires_together() {
        let registry = StreamRegistry::new(IDLE_MS);
        let err = registry
            .create(
                "/s1",
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ttl_seconds: Some(60),
                    expires_at: Some(Utc::now()),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StreamError::TtlConflict));
    }

    #[test]
    fn test_delete_then_recreate() {
        let registry = StreamRegistry::new(IDLE_MS);
        registry.create("/s1", config("text/plain")).unwrap();

        assert!(registry.delete("/s1"));
        assert!(!registry.delete("/s1"));
        assert!(registry.get("/s1").is_none());

        // A new stream with a different config may take the path
        assert!(registry
            .create("/s1", config("application/json"))
            .unwrap()
            .was_created());
    }

    #[test]
    fn test_expired_stream_vanishes_on_get() {
        let registry = StreamRegistry::new(IDLE_MS);
        registry
            .create(
                "/s1",
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ttl_seconds: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(registry.get("/s1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expired_stream_can_be_recreated() {
        let registry = StreamRegistry::new(IDLE_MS);
        registry
            .create(
                "/s1",
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ttl_seconds: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();

        // Same path, different config: allowed because the old one expired
        let outcome = registry.create("/s1", config("application/json")).unwrap();
        assert!(outcome.was_created());
    }

    #[test]
    fn test_sweep_expired() {
        let registry = StreamRegistry::new(IDLE_MS);
        registry
            .create(
                "/gone",
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ttl_seconds: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();
        registry.create("/kept", config("text/plain")).unwrap();

        let swept = registry.sweep_expired(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(swept, 1);
        assert_eq!(registry.list(), vec!["/kept".to_string()]);
    }

    #[tokio::test]
    async fn test_sweeper_task_runs() {
        let registry = StreamRegistry::new(IDLE_MS);
        registry
            .create(
                "/gone",
                StreamConfig {
                    content_type: Some("text/plain".to_string()),
                    ttl_seconds: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();

        let handle = registry.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_empty());
        handle.abort();
    }
}
