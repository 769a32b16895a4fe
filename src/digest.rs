//! Weekly relationship digest
//!
//! Read-only aggregation over the past seven days: activity counts, the
//! health breakdown of active relationships, birthday and anniversary
//! highlights, and the most urgent needs-attention entries.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::attention::{needing_attention, AttentionAggregator, AttentionItem};
use crate::clock::Clock;
use crate::config::{AttentionConfig, DigestConfig};
use crate::error::Result;
use crate::health::{average_score, HealthBreakdown};
use crate::storage::RelationshipStore;
use crate::types::{
    DateRange, EntityFilter, EntityId, EntityProfile, RelationshipStatus, UserId,
};

/// Metadata key holding an entity's birthday (`YYYY-MM-DD` or `MM-DD`)
pub const BIRTHDAY_KEY: &str = "birthday";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSummary {
    pub total_entities: usize,
    pub health_breakdown: HealthBreakdown,
    pub interactions_this_week: usize,
    pub average_health_score: f64,
    pub new_entities_this_week: usize,
    pub reminders_completed_this_week: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Highlight {
    Birthday {
        entity_id: EntityId,
        name: String,
        date: NaiveDate,
    },
    /// Yearly anniversary of a relationship's start date
    Milestone {
        entity_id: EntityId,
        name: String,
        years: i32,
        date: NaiveDate,
    },
}

impl Highlight {
    pub fn date(&self) -> NaiveDate {
        match self {
            Highlight::Birthday { date, .. } | Highlight::Milestone { date, .. } => *date,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Highlight::Birthday { name, .. } | Highlight::Milestone { name, .. } => name,
        }
    }
}

/// Payload behind `GET /health/digest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyDigest {
    pub period: DigestPeriod,
    pub summary: DigestSummary,
    pub highlights: Vec<Highlight>,
    pub needs_attention: Vec<AttentionItem>,
    pub generated_at: DateTime<Utc>,
}

pub struct DigestGenerator {
    store: Arc<dyn RelationshipStore>,
    aggregator: Arc<AttentionAggregator>,
    clock: Arc<dyn Clock>,
    attention: AttentionConfig,
    digest: DigestConfig,
}

impl DigestGenerator {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        aggregator: Arc<AttentionAggregator>,
        clock: Arc<dyn Clock>,
        attention: AttentionConfig,
        digest: DigestConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            clock,
            attention,
            digest,
        }
    }

    pub async fn generate_weekly_digest(&self, user_id: UserId) -> Result<WeeklyDigest> {
        let now = self.clock.now();
        let window = DateRange::new(now - Duration::days(self.digest.period_days), now);
        let period = DigestPeriod {
            start: window.start.date_naive(),
            end: window.end.date_naive(),
        };
        debug!(user_id = %user_id, ?period, "Generating weekly digest");

        let active = EntityFilter::active();
        let created = EntityFilter::created_within(window);
        let (total_entities, new_entities, interactions, reminders, profiles, assessed) = tokio::try_join!(
            self.store.count_entities(user_id, &active),
            self.store.count_entities(user_id, &created),
            self.store.count_interactions(user_id, &window),
            self.store.count_completed_reminders(user_id, &window),
            self.store.list_entity_profiles(user_id),
            self.aggregator.assess_all(user_id),
        )?;

        let summary = DigestSummary {
            total_entities,
            health_breakdown: assessed.iter().map(|item| &item.health).collect(),
            interactions_this_week: interactions,
            average_health_score: average_score(assessed.iter().map(|item| &item.health)),
            new_entities_this_week: new_entities,
            reminders_completed_this_week: reminders,
        };
        let highlights = collect_highlights(&profiles, period);
        let needs_attention = needing_attention(assessed, Some(self.attention.digest_limit));

        info!(
            user_id = %user_id,
            interactions,
            highlights = highlights.len(),
            needs_attention = needs_attention.len(),
            "Weekly digest ready"
        );

        Ok(WeeklyDigest {
            period,
            summary,
            highlights,
            needs_attention,
            generated_at: now,
        })
    }
}

/// Birthdays and relationship anniversaries falling in `(start, end]`
pub fn collect_highlights(profiles: &[EntityProfile], period: DigestPeriod) -> Vec<Highlight> {
    let days: Vec<NaiveDate> = period
        .start
        .iter_days()
        .skip(1)
        .take_while(|d| *d <= period.end)
        .collect();

    let mut highlights = Vec::new();
    for profile in profiles.iter().filter(|p| !p.entity.archived) {
        let entity = &profile.entity;

        let birthday = entity
            .metadata
            .get(BIRTHDAY_KEY)
            .and_then(|v| v.as_str())
            .and_then(parse_month_day);
        if let Some((month, day)) = birthday {
            if let Some(date) = days.iter().find(|d| falls_on(month, day, **d)) {
                highlights.push(Highlight::Birthday {
                    entity_id: entity.id,
                    name: entity.name.clone(),
                    date: *date,
                });
            }
        }

        let started = profile
            .relationship
            .as_ref()
            .filter(|r| r.status == RelationshipStatus::Active)
            .and_then(|r| r.started_at);
        if let Some(started) = started {
            let hit = days
                .iter()
                .find(|d| falls_on(started.month(), started.day(), **d))
                .map(|d| (*d, d.year() - started.year()));
            if let Some((date, years)) = hit.filter(|(_, years)| *years >= 1) {
                highlights.push(Highlight::Milestone {
                    entity_id: entity.id,
                    name: entity.name.clone(),
                    years,
                    date,
                });
            }
        }
    }

    highlights.sort_by(|a, b| a.date().cmp(&b.date()).then_with(|| a.name().cmp(b.name())));
    highlights
}

/// Accepts `YYYY-MM-DD` or `MM-DD`
fn parse_month_day(raw: &str) -> Option<(u32, u32)> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some((date.month(), date.day()));
    }

    let (month, day) = raw.split_once('-')?;
    let (month, day) = (month.parse().ok()?, day.parse().ok()?);
    // 2000 is a leap year, so Feb 29 validates
    NaiveDate::from_ymd_opt(2000, month, day).map(|_| (month, day))
}

/// Whether a yearly date lands on `date`; Feb 29 moves to Feb 28 in common years
fn falls_on(month: u32, day: u32, date: NaiveDate) -> bool {
    if date.month() == month && date.day() == day {
        return true;
    }
    month == 2
        && day == 29
        && date.month() == 2
        && date.day() == 28
        && NaiveDate::from_ymd_opt(date.year(), 2, 29).is_none()
}
