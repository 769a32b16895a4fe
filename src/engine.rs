//! Wiring for the API layer
//!
//! [`RapportEngine`] builds the aggregator, digest generator, smart-group
//! evaluator and invalidator from one configuration and shared collaborators.

use std::sync::Arc;

use crate::attention::{AttentionAggregator, AttentionItem, HealthSummary};
use crate::cache::{InMemoryCache, MembershipCache};
use crate::clock::{Clock, SystemClock};
use crate::config::RapportConfig;
use crate::digest::{DigestGenerator, WeeklyDigest};
use crate::error::Result;
use crate::invalidation::CacheInvalidator;
use crate::smart_group::{
    GroupMembersView, MembershipStrategy, SmartGroupEvaluator, SmartGroupMembership,
};
use crate::storage::RelationshipStore;
use crate::types::{Group, GroupId, UserId};

pub struct RapportEngine {
    config: RapportConfig,
    attention: Arc<AttentionAggregator>,
    digest: DigestGenerator,
    smart_groups: SmartGroupEvaluator,
    invalidator: Arc<CacheInvalidator>,
}

impl RapportEngine {
    pub fn new(
        config: RapportConfig,
        store: Arc<dyn RelationshipStore>,
        cache: Arc<dyn MembershipCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let attention = Arc::new(AttentionAggregator::new(
            store.clone(),
            clock.clone(),
            config.health.clone(),
            config.attention.clone(),
        ));
        let digest = DigestGenerator::new(
            store.clone(),
            attention.clone(),
            clock.clone(),
            config.attention.clone(),
            config.digest.clone(),
        );
        let smart_groups =
            SmartGroupEvaluator::new(store, cache.clone(), clock, config.smart_groups.clone());
        let invalidator = Arc::new(CacheInvalidator::new(
            cache,
            config.smart_groups.cache_timeout(),
        ));

        Ok(Self {
            config,
            attention,
            digest,
            smart_groups,
            invalidator,
        })
    }

    /// Engine backed by the system clock and a private in-process cache
    pub fn with_in_memory_cache(
        config: RapportConfig,
        store: Arc<dyn RelationshipStore>,
    ) -> Result<Self> {
        let cache = Arc::new(InMemoryCache::new(config.cache.capacity));
        Self::new(config, store, cache, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &RapportConfig {
        &self.config
    }

    /// Shared with data collaborators so their mutations evict stale members
    pub fn invalidator(&self) -> Arc<CacheInvalidator> {
        self.invalidator.clone()
    }

    pub fn smart_groups(&self) -> &SmartGroupEvaluator {
        &self.smart_groups
    }

    pub async fn health_summary(&self, user_id: UserId) -> Result<HealthSummary> {
        self.attention.health_summary(user_id).await
    }

    pub async fn needs_attention(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<AttentionItem>> {
        self.attention
            .list_entities_needing_attention(user_id, limit)
            .await
    }

    pub async fn weekly_digest(&self, user_id: UserId) -> Result<WeeklyDigest> {
        self.digest.generate_weekly_digest(user_id).await
    }

    /// Members of a group with the configured default strategy
    pub async fn group_members(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<SmartGroupMembership> {
        self.smart_groups
            .get_members_for(user_id, group_id, self.config.smart_groups.default_strategy)
            .await
    }

    pub async fn group_members_with(
        &self,
        user_id: UserId,
        group_id: GroupId,
        strategy: MembershipStrategy,
    ) -> Result<SmartGroupMembership> {
        self.smart_groups
            .get_members_for(user_id, group_id, strategy)
            .await
    }

    /// Members for display; invalid rules come back flagged
    pub async fn group_members_view(&self, group: &Group) -> Result<GroupMembersView> {
        self.smart_groups
            .members_view(group, self.config.smart_groups.default_strategy)
            .await
    }

    pub async fn invalidate_smart_groups_for_user(&self, user_id: UserId) -> Result<usize> {
        self.invalidator
            .invalidate_smart_groups_for_user(user_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = RapportConfig::default();
        config.cache.capacity = 0;
        let result = RapportEngine::with_in_memory_cache(config, Arc::new(InMemoryStore::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_user_summary() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RapportEngine::with_in_memory_cache(RapportConfig::default(), store).unwrap();
        let summary = engine.health_summary(UserId::new()).await.unwrap();
        assert_eq!(summary.total_relationships, 0);
        assert_eq!(summary.average_health_score, 0.0);
        assert!(summary.needs_attention.is_empty());
    }
}
