//! Smart-group membership evaluation
//!
//! Membership is computed from the group's rules against the owner's entity
//! graph, either on every call ([`MembershipStrategy::Lazy`]) or through the
//! membership cache ([`MembershipStrategy::Cached`]). The cache is an
//! optimization only: any cache error, timeout or undecodable payload falls
//! back to a live computation.
//!
//! A miss records the user's cache epoch before computing and only stores the
//! result if the epoch is unchanged afterwards. An invalidation that lands
//! while the store is being read evicts the epoch too, so the older member
//! set is never written back over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::rules::SmartGroupRules;
use crate::cache::{epoch_key, membership_key, MembershipCache};
use crate::clock::Clock;
use crate::config::SmartGroupConfig;
use crate::error::Result;
use crate::storage::RelationshipStore;
use crate::types::{EntityId, Group, GroupId, UserId};

/// How membership is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStrategy {
    /// Recompute on every call
    Lazy,
    /// Serve from cache, recomputing and storing on miss
    #[default]
    Cached,
}

/// Member set of one group at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartGroupMembership {
    pub group_id: GroupId,
    pub member_ids: BTreeSet<EntityId>,
    pub computed_at: DateTime<Utc>,
}

impl SmartGroupMembership {
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.member_ids.contains(id)
    }
}

/// Members as shown to a user; rule problems are flagged, never hidden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembersView {
    pub group_id: GroupId,
    pub members: Vec<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_error: Option<String>,
}

pub struct SmartGroupEvaluator {
    store: Arc<dyn RelationshipStore>,
    cache: Arc<dyn MembershipCache>,
    clock: Arc<dyn Clock>,
    config: SmartGroupConfig,
}

impl SmartGroupEvaluator {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        cache: Arc<dyn MembershipCache>,
        clock: Arc<dyn Clock>,
        config: SmartGroupConfig,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            config,
        }
    }

    /// Members using the configured default strategy
    pub async fn members(&self, group: &Group) -> Result<SmartGroupMembership> {
        self.get_members(group, self.config.default_strategy).await
    }

    /// Members of a group
    ///
    /// Manual groups return their explicit members. Smart groups have their
    /// rules validated first, so invalid rules fail even when a cached set exists.
    pub async fn get_members(
        &self,
        group: &Group,
        strategy: MembershipStrategy,
    ) -> Result<SmartGroupMembership> {
        if !group.is_smart {
            return self.manual_members(group).await;
        }

        let rules = SmartGroupRules::for_group(group)?;
        match strategy {
            MembershipStrategy::Lazy => self.compute(group, &rules).await,
            MembershipStrategy::Cached => self.cached(group, &rules).await,
        }
    }

    /// Load the group, then resolve its members
    pub async fn get_members_for(
        &self,
        user_id: UserId,
        group_id: GroupId,
        strategy: MembershipStrategy,
    ) -> Result<SmartGroupMembership> {
        let group = self.store.get_group(user_id, group_id).await?;
        self.get_members(&group, strategy).await
    }

    /// Members for display, turning rule errors into a flagged empty list
    pub async fn members_view(
        &self,
        group: &Group,
        strategy: MembershipStrategy,
    ) -> Result<GroupMembersView> {
        match self.get_members(group, strategy).await {
            Ok(membership) => Ok(GroupMembersView {
                group_id: group.id,
                members: membership.member_ids.into_iter().collect(),
                configuration_error: None,
            }),
            Err(e) if e.is_configuration() => {
                warn!(group_id = %group.id, "Smart group rules are invalid: {}", e);
                Ok(GroupMembersView {
                    group_id: group.id,
                    members: Vec::new(),
                    configuration_error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn manual_members(&self, group: &Group) -> Result<SmartGroupMembership> {
        let ids = self
            .store
            .list_group_member_ids(group.owner_id, group.id)
            .await?;
        Ok(SmartGroupMembership {
            group_id: group.id,
            member_ids: ids.into_iter().collect(),
            computed_at: self.clock.now(),
        })
    }

    async fn compute(
        &self,
        group: &Group,
        rules: &SmartGroupRules,
    ) -> Result<SmartGroupMembership> {
        let now = self.clock.now();
        let entities = self
            .store
            .query_entities_by_predicate(group.owner_id, rules, now)
            .await?;

        let membership = SmartGroupMembership {
            group_id: group.id,
            member_ids: entities
                .iter()
                .filter(|e| !e.archived)
                .map(|e| e.id)
                .collect(),
            computed_at: now,
        };
        debug!(
            group_id = %group.id,
            members = membership.len(),
            "Computed smart group membership"
        );
        Ok(membership)
    }

    async fn cached(
        &self,
        group: &Group,
        rules: &SmartGroupRules,
    ) -> Result<SmartGroupMembership> {
        let key = membership_key(group.owner_id, group.id);

        if let Some(bytes) = self.with_timeout("get", self.cache.get(&key)).await.flatten() {
            match serde_json::from_slice::<SmartGroupMembership>(&bytes) {
                Ok(membership) if membership.group_id == group.id => {
                    debug!(group_id = %group.id, "Smart group cache hit");
                    return Ok(membership);
                }
                Ok(_) => warn!(%key, "Cached membership belongs to another group"),
                Err(e) => warn!(%key, "Discarding undecodable cached membership: {}", e),
            }
        } else {
            debug!(group_id = %group.id, "Smart group cache miss");
        }

        let epoch = self.current_epoch(group.owner_id).await;
        let membership = self.compute(group, rules).await?;

        let Some(epoch) = epoch else {
            return Ok(membership);
        };
        if self.read_epoch(group.owner_id).await.as_deref() != Some(epoch.as_slice()) {
            debug!(group_id = %group.id, "Memberships invalidated during computation, not caching");
            return Ok(membership);
        }

        match serde_json::to_vec(&membership) {
            Ok(bytes) => {
                self.with_timeout(
                    "set",
                    self.cache.set(&key, bytes, self.config.cache_ttl()),
                )
                .await;
            }
            Err(e) => warn!(%key, "Could not encode membership for caching: {}", e),
        }
        Ok(membership)
    }

    async fn read_epoch(&self, user_id: UserId) -> Option<Vec<u8>> {
        let key = epoch_key(user_id);
        self.with_timeout("get", self.cache.get(&key)).await.flatten()
    }

    /// The user's epoch token, starting a new epoch when none is cached
    ///
    /// `None` means the cache could not be used and nothing should be stored.
    async fn current_epoch(&self, user_id: UserId) -> Option<Vec<u8>> {
        if let Some(epoch) = self.read_epoch(user_id).await {
            return Some(epoch);
        }

        let token = Uuid::new_v4().as_bytes().to_vec();
        let key = epoch_key(user_id);
        self.with_timeout(
            "set",
            self.cache.set(&key, token.clone(), self.config.cache_ttl()),
        )
        .await
        .map(|_| token)
    }

    /// Run a cache call under the configured timeout, failing open
    async fn with_timeout<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.config.cache_timeout(), call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(operation, "Membership cache unavailable, falling back: {}", e);
                None
            }
            Err(_) => {
                warn!(operation, "Membership cache timed out, falling back");
                None
            }
        }
    }
}
