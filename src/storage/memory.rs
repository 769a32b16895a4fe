//! In-process relationship store
//!
//! Reference collaborator used by tests, benches and embedders that keep their
//! data in memory. Mutations notify an attached [`CacheInvalidator`] and only
//! return once the affected cache entries are gone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::RelationshipStore;
use crate::error::{RapportError, Result};
use crate::health::HealthThreshold;
use crate::invalidation::{CacheInvalidator, MutationEvent};
use crate::types::{
    DateRange, Entity, EntityFilter, EntityId, EntityProfile, Group, GroupId, Relationship,
    RelationshipStatus, UserId,
};

#[derive(Debug, Clone, Copy)]
struct InteractionRecord {
    user_id: UserId,
    occurred_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreState {
    entities: HashMap<EntityId, Entity>,
    relationships: HashMap<(UserId, EntityId), Relationship>,
    tags: HashMap<EntityId, BTreeSet<String>>,
    groups: HashMap<GroupId, Group>,
    group_members: HashMap<GroupId, BTreeSet<EntityId>>,
    interactions: Vec<InteractionRecord>,
    completed_reminders: Vec<(UserId, DateTime<Utc>)>,
}

impl StoreState {
    fn owned_entity_mut(&mut self, user_id: UserId, entity_id: EntityId) -> Result<&mut Entity> {
        self.entities
            .get_mut(&entity_id)
            .filter(|e| e.owner_id == user_id)
            .ok_or_else(|| RapportError::NotFound(format!("entity {}", entity_id)))
    }
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    invalidator: Option<Arc<CacheInvalidator>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict smart-group cache entries on every relevant mutation
    pub fn with_invalidator(mut self, invalidator: Arc<CacheInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| RapportError::DataAccess("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| RapportError::DataAccess("store lock poisoned".to_string()))
    }

    async fn notify(&self, event: MutationEvent) -> Result<()> {
        if let Some(invalidator) = &self.invalidator {
            invalidator.handle(&event).await?;
        }
        Ok(())
    }

    pub async fn insert_entity(&self, entity: Entity) -> Result<EntityId> {
        let (user_id, entity_id) = (entity.owner_id, entity.id);
        {
            let mut state = self.write()?;
            if state.entities.contains_key(&entity_id) {
                return Err(RapportError::Other(format!(
                    "entity {} already exists",
                    entity_id
                )));
            }
            state.entities.insert(entity_id, entity);
        }
        self.notify(MutationEvent::EntityCreated { user_id, entity_id })
            .await?;
        Ok(entity_id)
    }

    pub async fn update_entity(&self, entity: Entity) -> Result<()> {
        let (user_id, entity_id) = (entity.owner_id, entity.id);
        {
            let mut state = self.write()?;
            let existing = state.owned_entity_mut(user_id, entity_id)?;
            *existing = entity;
        }
        self.notify(MutationEvent::EntityUpdated { user_id, entity_id })
            .await
    }

    /// Remove an entity together with its tags, relationship and group memberships
    pub async fn delete_entity(&self, user_id: UserId, entity_id: EntityId) -> Result<()> {
        {
            let mut state = self.write()?;
            state.owned_entity_mut(user_id, entity_id)?;
            state.entities.remove(&entity_id);
            state.tags.remove(&entity_id);
            state.relationships.remove(&(user_id, entity_id));
            for members in state.group_members.values_mut() {
                members.remove(&entity_id);
            }
        }
        self.notify(MutationEvent::EntityDeleted { user_id, entity_id })
            .await
    }

    pub async fn add_tag(&self, user_id: UserId, entity_id: EntityId, tag: &str) -> Result<()> {
        {
            let mut state = self.write()?;
            state.owned_entity_mut(user_id, entity_id)?;
            state
                .tags
                .entry(entity_id)
                .or_default()
                .insert(tag.to_string());
        }
        self.notify(MutationEvent::TagAdded {
            user_id,
            entity_id,
            tag: tag.to_string(),
        })
        .await
    }

    pub async fn remove_tag(&self, user_id: UserId, entity_id: EntityId, tag: &str) -> Result<()> {
        {
            let mut state = self.write()?;
            state.owned_entity_mut(user_id, entity_id)?;
            if let Some(tags) = state.tags.get_mut(&entity_id) {
                tags.remove(tag);
            }
        }
        self.notify(MutationEvent::TagRemoved {
            user_id,
            entity_id,
            tag: tag.to_string(),
        })
        .await
    }

    /// Insert or replace the user's relationship with an entity they own
    pub async fn insert_relationship(&self, relationship: Relationship) -> Result<()> {
        let (user_id, entity_id, status) = (
            relationship.user_id,
            relationship.entity_id,
            relationship.status,
        );
        {
            let mut state = self.write()?;
            state.owned_entity_mut(user_id, entity_id)?;
            state.relationships.insert((user_id, entity_id), relationship);
        }
        self.notify(MutationEvent::RelationshipStatusChanged {
            user_id,
            entity_id,
            status,
        })
        .await
    }

    pub async fn set_relationship_status(
        &self,
        user_id: UserId,
        entity_id: EntityId,
        status: RelationshipStatus,
    ) -> Result<()> {
        {
            let mut state = self.write()?;
            let relationship = state
                .relationships
                .get_mut(&(user_id, entity_id))
                .ok_or_else(|| RapportError::NotFound(format!("relationship to {}", entity_id)))?;
            relationship.status = status;
        }
        self.notify(MutationEvent::RelationshipStatusChanged {
            user_id,
            entity_id,
            status,
        })
        .await
    }

    pub async fn set_health_threshold(
        &self,
        user_id: UserId,
        entity_id: EntityId,
        threshold: HealthThreshold,
    ) -> Result<()> {
        {
            let mut state = self.write()?;
            let relationship = state
                .relationships
                .get_mut(&(user_id, entity_id))
                .ok_or_else(|| RapportError::NotFound(format!("relationship to {}", entity_id)))?;
            relationship.health_threshold_days = Some(threshold.days());
        }
        self.notify(MutationEvent::HealthThresholdChanged { user_id, entity_id })
            .await
    }

    /// Log an interaction and advance the entity's `last_interaction_at`
    pub async fn record_interaction(
        &self,
        user_id: UserId,
        entity_id: EntityId,
        occurred_at: DateTime<Utc>,
    ) -> Result<()> {
        {
            let mut state = self.write()?;
            let entity = state.owned_entity_mut(user_id, entity_id)?;
            if entity.last_interaction_at.map_or(true, |at| at < occurred_at) {
                entity.last_interaction_at = Some(occurred_at);
            }
            state.interactions.push(InteractionRecord {
                user_id,
                occurred_at,
            });
        }
        self.notify(MutationEvent::InteractionRecorded { user_id, entity_id })
            .await
    }

    pub fn complete_reminder(&self, user_id: UserId, completed_at: DateTime<Utc>) -> Result<()> {
        self.write()?
            .completed_reminders
            .push((user_id, completed_at));
        Ok(())
    }

    pub fn insert_group(&self, group: Group) -> Result<GroupId> {
        let id = group.id;
        self.write()?.groups.insert(id, group);
        Ok(id)
    }

    pub fn add_group_member(&self, group_id: GroupId, entity_id: EntityId) -> Result<()> {
        let mut state = self.write()?;
        if !state.groups.contains_key(&group_id) {
            return Err(RapportError::NotFound(format!("group {}", group_id)));
        }
        state
            .group_members
            .entry(group_id)
            .or_default()
            .insert(entity_id);
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for InMemoryStore {
    async fn list_active_relationships(
        &self,
        user_id: UserId,
    ) -> Result<Vec<(Relationship, Entity)>> {
        let state = self.read()?;
        let rows: Vec<_> = state
            .relationships
            .values()
            .filter(|r| r.user_id == user_id && r.status == RelationshipStatus::Active)
            .filter_map(|r| {
                state
                    .entities
                    .get(&r.entity_id)
                    .filter(|e| !e.archived)
                    .map(|e| (r.clone(), e.clone()))
            })
            .collect();
        debug!(user_id = %user_id, count = rows.len(), "Listed active relationships");
        Ok(rows)
    }

    async fn count_entities(&self, user_id: UserId, filter: &EntityFilter) -> Result<usize> {
        let state = self.read()?;
        Ok(state
            .entities
            .values()
            .filter(|e| e.owner_id == user_id && filter.matches(e))
            .count())
    }

    async fn count_interactions(&self, user_id: UserId, range: &DateRange) -> Result<usize> {
        let state = self.read()?;
        Ok(state
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id && range.contains(i.occurred_at))
            .count())
    }

    async fn count_completed_reminders(
        &self,
        user_id: UserId,
        range: &DateRange,
    ) -> Result<usize> {
        let state = self.read()?;
        Ok(state
            .completed_reminders
            .iter()
            .filter(|(owner, at)| *owner == user_id && range.contains(*at))
            .count())
    }

    async fn list_entity_profiles(&self, user_id: UserId) -> Result<Vec<EntityProfile>> {
        let state = self.read()?;
        let mut profiles: Vec<_> = state
            .entities
            .values()
            .filter(|e| e.owner_id == user_id)
            .map(|e| EntityProfile {
                entity: e.clone(),
                tags: state
                    .tags
                    .get(&e.id)
                    .map(|tags| tags.iter().cloned().collect())
                    .unwrap_or_default(),
                relationship: state.relationships.get(&(user_id, e.id)).cloned(),
            })
            .collect();
        profiles.sort_by(|a, b| a.entity.id.cmp(&b.entity.id));
        Ok(profiles)
    }

    async fn get_group(&self, user_id: UserId, group_id: GroupId) -> Result<Group> {
        let state = self.read()?;
        state
            .groups
            .get(&group_id)
            .filter(|g| g.owner_id == user_id)
            .cloned()
            .ok_or_else(|| RapportError::NotFound(format!("group {}", group_id)))
    }

    async fn list_group_member_ids(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Vec<EntityId>> {
        let state = self.read()?;
        if !state
            .groups
            .get(&group_id)
            .is_some_and(|g| g.owner_id == user_id)
        {
            return Err(RapportError::NotFound(format!("group {}", group_id)));
        }
        Ok(state
            .group_members
            .get(&group_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|id| state.entities.contains_key(id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
