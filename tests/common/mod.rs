//! Common test utilities and helpers

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rapport_core::cache::membership_key;
use rapport_core::{
    CacheInvalidator, Entity, EntityId, EntityType, FixedClock, GroupId, InMemoryCache,
    InMemoryStore, MembershipCache, RapportConfig, RapportEngine, Relationship, UserId,
};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route engine logs to the test harness; honours RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Fixed evaluation instant shared by the scenarios
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 15, 14, 0, 0).unwrap()
}

/// Engine, store, cache and clock wired the way an embedding application would
pub struct Harness {
    pub engine: RapportEngine,
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<InMemoryCache>,
    pub clock: Arc<FixedClock>,
    pub user: UserId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RapportConfig::default())
    }

    pub fn with_config(config: RapportConfig) -> Self {
        init_tracing();

        let cache = Arc::new(InMemoryCache::new(config.cache.capacity));
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let invalidator = Arc::new(CacheInvalidator::new(
            cache.clone(),
            config.smart_groups.cache_timeout(),
        ));
        let store = Arc::new(InMemoryStore::new().with_invalidator(invalidator));
        let engine = RapportEngine::new(config, store.clone(), cache.clone(), clock.clone())
            .expect("Failed to build engine");

        Self {
            engine,
            store,
            cache,
            clock,
            user: UserId::new(),
        }
    }

    /// Add an entity with an active relationship
    ///
    /// `days_silent = None` means the entity was never interacted with.
    pub async fn add_contact(
        &self,
        name: &str,
        entity_type: EntityType,
        days_silent: Option<i64>,
        threshold: Option<i64>,
    ) -> EntityId {
        let mut entity = Entity::new(self.user, entity_type, name)
            .with_created_at(fixed_now() - Duration::days(365));
        entity.last_interaction_at = days_silent.map(|d| fixed_now() - Duration::days(d));
        let id = self
            .store
            .insert_entity(entity)
            .await
            .expect("Failed to insert entity");

        let mut relationship = Relationship::new(self.user, id, "friend");
        relationship.health_threshold_days = threshold;
        self.store
            .insert_relationship(relationship)
            .await
            .expect("Failed to insert relationship");
        id
    }

    /// Whether the group's member set is currently cached
    pub async fn is_cached(&self, group_id: GroupId) -> bool {
        self.cache
            .get(&membership_key(self.user, group_id))
            .await
            .expect("Cache read failed")
            .is_some()
    }
}
