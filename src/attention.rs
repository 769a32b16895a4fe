//! Needs-attention aggregation
//!
//! Scores every active relationship of a user and surfaces the ones that are
//! no longer healthy, worst first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{AttentionConfig, HealthConfig};
use crate::error::Result;
use crate::health::{average_score, calculate_health_score_at, HealthBreakdown, HealthResult};
use crate::storage::RelationshipStore;
use crate::types::{Entity, Relationship, UserId};

/// One scored relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionItem {
    pub entity: Entity,
    pub relationship: Relationship,
    pub health: HealthResult,
}

/// Payload behind `GET /health/summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total_relationships: usize,
    pub breakdown: HealthBreakdown,
    pub average_health_score: f64,
    pub needs_attention: Vec<AttentionItem>,
}

pub struct AttentionAggregator {
    store: Arc<dyn RelationshipStore>,
    clock: Arc<dyn Clock>,
    health: HealthConfig,
    attention: AttentionConfig,
}

impl AttentionAggregator {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        clock: Arc<dyn Clock>,
        health: HealthConfig,
        attention: AttentionConfig,
    ) -> Self {
        Self {
            store,
            clock,
            health,
            attention,
        }
    }

    /// Score every active relationship of the user
    pub async fn assess_all(&self, user_id: UserId) -> Result<Vec<AttentionItem>> {
        let now = self.clock.now();
        let rows = self.store.list_active_relationships(user_id).await?;

        Ok(rows
            .into_iter()
            .map(|(relationship, entity)| {
                let threshold = relationship
                    .health_threshold_days
                    .unwrap_or(self.health.default_threshold_days);
                let health = calculate_health_score_at(entity.last_interaction_at, threshold, now);
                AttentionItem {
                    entity,
                    relationship,
                    health,
                }
            })
            .collect())
    }

    /// Relationships needing attention, worst health first
    pub async fn list_entities_needing_attention(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<AttentionItem>> {
        let assessed = self.assess_all(user_id).await?;
        let total = assessed.len();
        let selected = needing_attention(assessed, limit);
        debug!(
            user_id = %user_id,
            total,
            selected = selected.len(),
            "Built needs-attention list"
        );
        Ok(selected)
    }

    pub async fn health_summary(&self, user_id: UserId) -> Result<HealthSummary> {
        let assessed = self.assess_all(user_id).await?;
        let breakdown: HealthBreakdown = assessed.iter().map(|item| &item.health).collect();
        let average_health_score = average_score(assessed.iter().map(|item| &item.health));

        Ok(HealthSummary {
            total_relationships: assessed.len(),
            breakdown,
            average_health_score,
            needs_attention: needing_attention(assessed, Some(self.attention.summary_limit)),
        })
    }
}

/// Keep unhealthy items, rank them and truncate to `limit`
///
/// Ranking: lowest score, then longest silence, then entity name, then id.
pub fn needing_attention(items: Vec<AttentionItem>, limit: Option<usize>) -> Vec<AttentionItem> {
    let mut selected: Vec<_> = items
        .into_iter()
        .filter(|item| item.health.needs_attention)
        .collect();
    selected.sort_by(compare_urgency);
    if let Some(limit) = limit {
        selected.truncate(limit);
    }
    selected
}

fn compare_urgency(a: &AttentionItem, b: &AttentionItem) -> Ordering {
    a.health
        .score
        .cmp(&b.health.score)
        .then_with(|| {
            b.health
                .days_since_interaction
                .cmp(&a.health.days_since_interaction)
        })
        .then_with(|| a.entity.name.cmp(&b.entity.name))
        .then_with(|| a.entity.id.cmp(&b.entity.id))
}
