//! Rapport - Relationship Health & Smart Group Engine
//!
//! The computational core of a personal relationship manager:
//! - Decaying health scores per relationship, relative to a per-relationship threshold
//! - Needs-attention lists and health summaries
//! - Weekly digests with activity counts and birthday/anniversary highlights
//! - Rule-based ("smart") group membership, live or cached
//! - Explicit cache invalidation driven by data mutations
//!
//! # Architecture
//!
//! - **Types**: read-only views of entities, relationships and groups
//! - **Storage**: the query contract data collaborators implement
//! - **Cache**: the key-value contract for membership sets
//! - **Health / Attention / Digest**: scoring and aggregation
//! - **Smart groups / Invalidation**: rule evaluation and cache discipline
//!
//! # Example
//!
//! ```ignore
//! use rapport_core::{RapportConfig, RapportEngine, InMemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> rapport_core::Result<()> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let engine = RapportEngine::with_in_memory_cache(RapportConfig::default(), store)?;
//!
//!     let summary = engine.health_summary(user_id).await?;
//!     let digest = engine.weekly_digest(user_id).await?;
//!     Ok(())
//! }
//! ```

pub mod attention;
pub mod cache;
pub mod clock;
pub mod config;
pub mod digest;
pub mod engine;
pub mod error;
pub mod health;
pub mod invalidation;
pub mod smart_group;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use attention::{AttentionAggregator, AttentionItem, HealthSummary};
pub use cache::{InMemoryCache, MembershipCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::RapportConfig;
pub use digest::{DigestGenerator, Highlight, WeeklyDigest};
pub use engine::RapportEngine;
pub use error::{RapportError, Result};
pub use health::{
    calculate_health_score, calculate_health_score_at, HealthBreakdown, HealthResult,
    HealthStatus, HealthThreshold,
};
pub use invalidation::{CacheInvalidator, MutationEvent};
pub use smart_group::{
    GroupMembersView, MembershipStrategy, SmartGroupEvaluator, SmartGroupMembership,
    SmartGroupRules,
};
pub use storage::{InMemoryStore, RelationshipStore};
pub use types::{
    DateRange, Entity, EntityFilter, EntityId, EntityProfile, EntityType, Group, GroupId,
    Relationship, RelationshipStatus, UserId,
};
