//! Smart-group cache invalidation
//!
//! Collaborators that mutate entities, tags, relationships or interactions
//! call into [`CacheInvalidator`] before returning to their own callers, so the
//! next cached membership read for that user recomputes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{user_pattern, MembershipCache};
use crate::error::{RapportError, Result};
use crate::types::{EntityId, RelationshipStatus, UserId};

/// Mutation reported by a data collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum MutationEvent {
    EntityCreated {
        user_id: UserId,
        entity_id: EntityId,
    },
    EntityUpdated {
        user_id: UserId,
        entity_id: EntityId,
    },
    EntityDeleted {
        user_id: UserId,
        entity_id: EntityId,
    },
    TagAdded {
        user_id: UserId,
        entity_id: EntityId,
        tag: String,
    },
    TagRemoved {
        user_id: UserId,
        entity_id: EntityId,
        tag: String,
    },
    RelationshipStatusChanged {
        user_id: UserId,
        entity_id: EntityId,
        status: RelationshipStatus,
    },
    /// Also covers the entity's `last_interaction_at` moving forward
    InteractionRecorded {
        user_id: UserId,
        entity_id: EntityId,
    },
    HealthThresholdChanged {
        user_id: UserId,
        entity_id: EntityId,
    },
}

impl MutationEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            MutationEvent::EntityCreated { user_id, .. }
            | MutationEvent::EntityUpdated { user_id, .. }
            | MutationEvent::EntityDeleted { user_id, .. }
            | MutationEvent::TagAdded { user_id, .. }
            | MutationEvent::TagRemoved { user_id, .. }
            | MutationEvent::RelationshipStatusChanged { user_id, .. }
            | MutationEvent::InteractionRecorded { user_id, .. }
            | MutationEvent::HealthThresholdChanged { user_id, .. } => *user_id,
        }
    }

    /// Whether the event can change the outcome of any rule
    pub fn invalidates_smart_groups(&self) -> bool {
        // No rule reads health thresholds.
        !matches!(self, MutationEvent::HealthThresholdChanged { .. })
    }
}

/// Evicts a user's cached smart-group memberships
pub struct CacheInvalidator {
    cache: Arc<dyn MembershipCache>,
    timeout: Duration,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn MembershipCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Evict every cached membership set of the user
    ///
    /// Returns once the eviction has completed. A failed or timed-out
    /// eviction is reported as `DataAccess`, since the caller would
    /// otherwise serve stale members.
    pub async fn invalidate_smart_groups_for_user(&self, user_id: UserId) -> Result<usize> {
        let pattern = user_pattern(user_id);
        match tokio::time::timeout(self.timeout, self.cache.delete_matching(&pattern)).await {
            Ok(Ok(evicted)) => {
                debug!(user_id = %user_id, evicted, "Invalidated smart group cache");
                Ok(evicted)
            }
            Ok(Err(e)) => {
                warn!(user_id = %user_id, "Smart group invalidation failed: {}", e);
                Err(RapportError::DataAccess(format!(
                    "smart group invalidation failed: {}",
                    e
                )))
            }
            Err(_) => {
                warn!(user_id = %user_id, "Smart group invalidation timed out");
                Err(RapportError::DataAccess(
                    "smart group invalidation timed out".to_string(),
                ))
            }
        }
    }

    /// Apply the invalidation policy for one mutation
    pub async fn handle(&self, event: &MutationEvent) -> Result<usize> {
        if !event.invalidates_smart_groups() {
            debug!(?event, "Mutation does not affect smart groups");
            return Ok(0);
        }
        let evicted = self.invalidate_smart_groups_for_user(event.user_id()).await?;
        if evicted > 0 {
            info!(user_id = %event.user_id(), evicted, "Evicted smart group memberships");
        }
        Ok(evicted)
    }
}
