//! Core data types for the Rapport engine
//!
//! These are read-only views over records owned by the entity, tag, group and
//! relationship collaborators. The engine never persists them; it only reads
//! them through [`crate::storage::RelationshipStore`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RapportError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an ID from a string
            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Owner of entities, relationships and groups
    UserId
);
id_type!(
    /// Tracked person, organization or thing
    EntityId
);
id_type!(
    /// Manual or smart group
    GroupId
);
id_type!(
    /// A user's connection to one entity
    RelationshipId
);

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Service,
    Thing,
    Animal,
    Abstract,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Service => "service",
            EntityType::Thing => "thing",
            EntityType::Animal => "animal",
            EntityType::Abstract => "abstract",
        }
    }
}

impl FromStr for EntityType {
    type Err = RapportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" => Ok(EntityType::Person),
            "organization" => Ok(EntityType::Organization),
            "service" => Ok(EntityType::Service),
            "thing" => Ok(EntityType::Thing),
            "animal" => Ok(EntityType::Animal),
            "abstract" => Ok(EntityType::Abstract),
            other => Err(RapportError::Configuration(format!(
                "unknown entity type '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Active,
    Inactive,
    Archived,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Inactive => "inactive",
            RelationshipStatus::Archived => "archived",
        }
    }
}

impl FromStr for RelationshipStatus {
    type Err = RapportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(RelationshipStatus::Active),
            "inactive" => Ok(RelationshipStatus::Inactive),
            "archived" => Ok(RelationshipStatus::Archived),
            other => Err(RapportError::Configuration(format!(
                "unknown relationship status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked entity as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub owner_id: UserId,
    pub entity_type: EntityType,
    pub name: String,

    /// Updated by the interactions collaborator whenever an interaction is logged
    pub last_interaction_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub archived: bool,

    /// Free-form metadata; `birthday` is read for digest highlights
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(owner_id: UserId, entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            owner_id,
            entity_type,
            name: name.into(),
            last_interaction_at: None,
            archived: false,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_last_interaction(mut self, at: DateTime<Utc>) -> Self {
        self.last_interaction_at = Some(at);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

/// A user's connection to a single entity
///
/// At most one relationship exists per (user, entity) pair; the relationship
/// collaborator enforces this with a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub user_id: UserId,
    pub entity_id: EntityId,
    pub relationship_type: String,

    /// 1-10 as entered by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<u8>,

    pub status: RelationshipStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<NaiveDate>,

    /// Days of silence tolerated before the relationship turns critical.
    /// `None` falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_threshold_days: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Relationship {
    pub fn new(user_id: UserId, entity_id: EntityId, relationship_type: impl Into<String>) -> Self {
        Self {
            id: RelationshipId::new(),
            user_id,
            entity_id,
            relationship_type: relationship_type.into(),
            strength: None,
            status: RelationshipStatus::Active,
            started_at: None,
            health_threshold_days: None,
            notes: None,
        }
    }

    pub fn with_threshold(mut self, days: i64) -> Self {
        self.health_threshold_days = Some(days);
        self
    }

    pub fn with_status(mut self, status: RelationshipStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_started_at(mut self, date: NaiveDate) -> Self {
        self.started_at = Some(date);
        self
    }
}

/// Group of entities; smart groups carry a declarative rule map
///
/// Rules are kept exactly as stored so that a malformed value can be reported
/// when the group is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub is_smart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<serde_json::Value>,
}

impl Group {
    pub fn manual(owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            owner_id,
            name: name.into(),
            is_smart: false,
            rules: None,
        }
    }

    /// Build a smart group from its stored rules; `null` means no rules
    pub fn smart(owner_id: UserId, name: impl Into<String>, rules: serde_json::Value) -> Self {
        Self {
            id: GroupId::new(),
            owner_id,
            name: name.into(),
            is_smart: true,
            rules: (!rules.is_null()).then_some(rules),
        }
    }
}

/// Everything rule evaluation needs to know about one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub entity: Entity,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

/// Half-open instant range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Filters for counting entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFilter {
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_within: Option<DateRange>,
}

impl EntityFilter {
    /// Non-archived entities only
    pub fn active() -> Self {
        Self::default()
    }

    pub fn created_within(range: DateRange) -> Self {
        Self {
            created_within: Some(range),
            ..Self::default()
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if entity.archived && !self.include_archived {
            return false;
        }
        if let Some(entity_type) = self.entity_type {
            if entity.entity_type != entity_type {
                return false;
            }
        }
        match self.created_within {
            Some(range) => range.contains(entity.created_at),
            None => true,
        }
    }
}
