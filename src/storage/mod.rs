//! Query layer consumed by the engine
//!
//! Entities, relationships, tags, groups and interactions are owned by other
//! collaborators. The engine reads them through [`RelationshipStore`]; an
//! in-process implementation lives in [`memory`].

pub mod memory;

use crate::error::Result;
use crate::smart_group::SmartGroupRules;
use crate::types::{
    DateRange, Entity, EntityFilter, EntityId, EntityProfile, Group, GroupId, Relationship, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::InMemoryStore;

/// Read-side contract the engine needs from its data collaborators
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Active relationships of a user joined with their entities
    async fn list_active_relationships(&self, user_id: UserId)
        -> Result<Vec<(Relationship, Entity)>>;

    /// Count the user's entities matching `filter`
    async fn count_entities(&self, user_id: UserId, filter: &EntityFilter) -> Result<usize>;

    /// Count interactions whose `occurred_at` falls in `range`
    async fn count_interactions(&self, user_id: UserId, range: &DateRange) -> Result<usize>;

    /// Count reminders completed in `range`
    async fn count_completed_reminders(&self, user_id: UserId, range: &DateRange)
        -> Result<usize>;

    /// Every entity owned by the user with its tags and relationship
    async fn list_entity_profiles(&self, user_id: UserId) -> Result<Vec<EntityProfile>>;

    /// Load a group, failing with `NotFound` when it does not belong to the user
    async fn get_group(&self, user_id: UserId, group_id: GroupId) -> Result<Group>;

    /// Explicit members of a manual group
    async fn list_group_member_ids(&self, user_id: UserId, group_id: GroupId)
        -> Result<Vec<EntityId>>;

    /// Entities satisfying a rule set
    ///
    /// The default fetches every profile and filters in-process; stores able
    /// to push the predicates down may override it, provided results match.
    async fn query_entities_by_predicate(
        &self,
        user_id: UserId,
        rules: &SmartGroupRules,
        now: DateTime<Utc>,
    ) -> Result<Vec<Entity>> {
        let profiles = self.list_entity_profiles(user_id).await?;
        Ok(profiles
            .into_iter()
            .filter(|profile| rules.matches(profile, now))
            .map(|profile| profile.entity)
            .collect())
    }
}
