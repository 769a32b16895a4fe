//! Relationship health scoring
//!
//! A relationship's health decays from 100 right after an interaction to 0 at
//! its threshold, in two linear segments:
//! - first half of the threshold: 100 → 80 (still healthy)
//! - second half: 80 → 0
//!
//! Past the threshold the score stays clamped at 0. The tiers are
//! `healthy >= 80`, `warning >= 50`, `critical < 50`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MAX_THRESHOLD_DAYS;
use crate::error::{RapportError, Result};

/// Days reported for an entity that has never been interacted with
pub const NEVER_INTERACTED_DAYS: i64 = 999;

/// Lowest score still classified as healthy
pub const HEALTHY_FLOOR: u8 = 80;

/// Lowest score still classified as warning
pub const WARNING_FLOOR: u8 = 50;

/// Fraction of the threshold at which the decay steepens
const KNEE_RATIO: f64 = 0.5;

const SECONDS_PER_DAY: i64 = 86_400;

/// Health tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: u8) -> Self {
        if score >= HEALTHY_FLOOR {
            HealthStatus::Healthy
        } else if score >= WARNING_FLOOR {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived health of one relationship; recomputed on every query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub score: u8,
    pub status: HealthStatus,
    pub needs_attention: bool,
    pub days_since_interaction: i64,
    pub threshold_days: i64,
    /// Negative once the threshold has passed
    pub days_remaining: i64,
}

/// Validated per-relationship threshold (1-365 days)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct HealthThreshold(i64);

impl HealthThreshold {
    pub fn new(days: i64) -> Result<Self> {
        if (1..=MAX_THRESHOLD_DAYS).contains(&days) {
            Ok(Self(days))
        } else {
            Err(RapportError::InvalidSettings(format!(
                "health threshold must be between 1 and {} days, got {}",
                MAX_THRESHOLD_DAYS, days
            )))
        }
    }

    pub fn days(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for HealthThreshold {
    type Error = RapportError;

    fn try_from(days: i64) -> Result<Self> {
        Self::new(days)
    }
}

impl From<HealthThreshold> for i64 {
    fn from(threshold: HealthThreshold) -> Self {
        threshold.0
    }
}

/// Score a relationship against the system clock
pub fn calculate_health_score(
    last_interaction_at: Option<DateTime<Utc>>,
    threshold_days: i64,
) -> HealthResult {
    calculate_health_score_at(last_interaction_at, threshold_days, Utc::now())
}

/// Score a relationship as of `now`
///
/// Total over every input: a missing interaction reports
/// [`NEVER_INTERACTED_DAYS`], a future interaction counts as today, and the
/// threshold is clamped to `1..=MAX_THRESHOLD_DAYS`, which keeps a missing
/// interaction critical.
pub fn calculate_health_score_at(
    last_interaction_at: Option<DateTime<Utc>>,
    threshold_days: i64,
    now: DateTime<Utc>,
) -> HealthResult {
    let clamped = threshold_days.clamp(1, MAX_THRESHOLD_DAYS);
    if clamped != threshold_days {
        warn!(threshold_days, clamped, "Health threshold out of range, clamping");
    }
    let threshold_days = clamped;

    let days_since_interaction = days_since(last_interaction_at, now);
    let score = decay_score(days_since_interaction, threshold_days);
    let status = HealthStatus::from_score(score);

    HealthResult {
        score,
        status,
        needs_attention: status != HealthStatus::Healthy,
        days_since_interaction,
        threshold_days,
        days_remaining: threshold_days - days_since_interaction,
    }
}

/// Whole days elapsed, truncating partial days
fn days_since(last_interaction_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match last_interaction_at {
        None => NEVER_INTERACTED_DAYS,
        Some(at) => {
            let seconds = now.signed_duration_since(at).num_seconds();
            (seconds / SECONDS_PER_DAY).max(0)
        }
    }
}

fn decay_score(days: i64, threshold_days: i64) -> u8 {
    let ratio = days as f64 / threshold_days as f64;
    let healthy_floor = f64::from(HEALTHY_FLOOR);

    let raw = if ratio <= KNEE_RATIO {
        100.0 - (100.0 - healthy_floor) * (ratio / KNEE_RATIO)
    } else {
        healthy_floor * (1.0 - ratio) / (1.0 - KNEE_RATIO)
    };

    raw.round().clamp(0.0, 100.0) as u8
}

/// Tally of health tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBreakdown {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

impl HealthBreakdown {
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Warning => self.warning += 1,
            HealthStatus::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical
    }
}

impl<'a> FromIterator<&'a HealthResult> for HealthBreakdown {
    fn from_iter<I: IntoIterator<Item = &'a HealthResult>>(iter: I) -> Self {
        let mut breakdown = HealthBreakdown::default();
        for result in iter {
            breakdown.record(result.status);
        }
        breakdown
    }
}

/// Mean score rounded to one decimal; 0 for an empty set
pub fn average_score<'a>(results: impl IntoIterator<Item = &'a HealthResult>) -> f64 {
    let (sum, count) = results
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), r| (sum + u64::from(r.score), count + 1));

    if count == 0 {
        return 0.0;
    }

    let mean = sum as f64 / count as f64;
    (mean * 10.0).round() / 10.0
}
