//! Typed smart-group rules
//!
//! Groups store their rules as a JSON object. It is parsed once into a list of
//! [`RulePredicate`]s that are ANDed together. Recognised keys:
//!
//! | key | value |
//! |---|---|
//! | `type` | entity type, or list of types |
//! | `tags` | list of tag names; any one must be present |
//! | `relationship_status` | `active`, `inactive` or `archived` |
//! | `relationship_type` | relationship type name |
//! | `last_interaction_days` | integer from 1 to 36500; never-contacted entities match |
//!
//! Unknown keys are skipped so newer clients can store rules older engines do
//! not understand yet. A rule map that yields no predicate is rejected.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{RapportError, Result};
use crate::types::{EntityProfile, EntityType, Group, RelationshipStatus};

pub const RULE_TYPE: &str = "type";
pub const RULE_TAGS: &str = "tags";
pub const RULE_RELATIONSHIP_STATUS: &str = "relationship_status";
pub const RULE_RELATIONSHIP_TYPE: &str = "relationship_type";
pub const RULE_LAST_INTERACTION_DAYS: &str = "last_interaction_days";

/// Largest accepted `last_interaction_days` (about a century)
pub const MAX_LAST_INTERACTION_DAYS: i64 = 36_500;

/// Single membership condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePredicate {
    /// Entity type is one of these
    EntityTypes(Vec<EntityType>),
    /// Entity carries at least one of these tags (lowercased)
    Tags(Vec<String>),
    RelationshipStatus(RelationshipStatus),
    RelationshipType(String),
    /// No interaction for at least this many days, or never
    LastInteractionDays(i64),
}

impl RulePredicate {
    pub fn matches(&self, profile: &EntityProfile, now: DateTime<Utc>) -> bool {
        match self {
            RulePredicate::EntityTypes(types) => types.contains(&profile.entity.entity_type),
            RulePredicate::Tags(wanted) => profile
                .tags
                .iter()
                .any(|tag| wanted.contains(&tag.to_lowercase())),
            RulePredicate::RelationshipStatus(status) => profile
                .relationship
                .as_ref()
                .is_some_and(|r| r.status == *status),
            RulePredicate::RelationshipType(kind) => profile
                .relationship
                .as_ref()
                .is_some_and(|r| r.relationship_type.eq_ignore_ascii_case(kind)),
            RulePredicate::LastInteractionDays(days) => {
                // An unrepresentable cutoff lies before every dated interaction
                let cutoff = Duration::try_days(*days).and_then(|d| now.checked_sub_signed(d));
                match (profile.entity.last_interaction_at, cutoff) {
                    (None, _) => true,
                    (Some(at), Some(cutoff)) => at <= cutoff,
                    (Some(_), None) => false,
                }
            }
        }
    }
}

/// Validated conjunction of predicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartGroupRules {
    predicates: Vec<RulePredicate>,
}

impl SmartGroupRules {
    pub fn new(predicates: Vec<RulePredicate>) -> Result<Self> {
        if predicates.is_empty() {
            return Err(RapportError::Configuration(
                "smart group rules must contain at least one predicate".to_string(),
            ));
        }
        Ok(Self { predicates })
    }

    /// Rules of a smart group, re-validated before evaluation
    pub fn for_group(group: &Group) -> Result<Self> {
        if !group.is_smart {
            return Err(RapportError::Configuration(format!(
                "group {} is not a smart group",
                group.id
            )));
        }
        match &group.rules {
            Some(Value::Object(map)) if !map.is_empty() => Self::from_map(map),
            None | Some(Value::Object(_)) => Err(RapportError::Configuration(format!(
                "smart group {} has no rules",
                group.id
            ))),
            Some(other) => Err(RapportError::Configuration(format!(
                "smart group {} rules must be an object, got {}",
                group.id,
                json_kind(other)
            ))),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut predicates = Vec::new();

        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            let predicate = match key.as_str() {
                RULE_TYPE => parse_types(value)?,
                RULE_TAGS => parse_tags(value)?,
                RULE_RELATIONSHIP_STATUS => {
                    RulePredicate::RelationshipStatus(
                        expect_str(key, value)?.parse::<RelationshipStatus>()?,
                    )
                }
                RULE_RELATIONSHIP_TYPE => {
                    let kind = expect_str(key, value)?.trim();
                    if kind.is_empty() {
                        return Err(RapportError::Configuration(
                            "relationship_type must not be blank".to_string(),
                        ));
                    }
                    RulePredicate::RelationshipType(kind.to_string())
                }
                RULE_LAST_INTERACTION_DAYS => parse_days(value)?,
                unknown => {
                    warn!(rule = unknown, "Ignoring unknown smart group rule");
                    continue;
                }
            };
            predicates.push(predicate);
        }

        Self::new(predicates)
    }

    pub fn predicates(&self) -> &[RulePredicate] {
        &self.predicates
    }

    /// Archived entities never match
    pub fn matches(&self, profile: &EntityProfile, now: DateTime<Utc>) -> bool {
        !profile.entity.archived && self.predicates.iter().all(|p| p.matches(profile, now))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| RapportError::Configuration(format!("{} must be a string", key)))
}

fn parse_types(value: &Value) -> Result<RulePredicate> {
    let parsed = match value {
        Value::String(s) => vec![s.parse::<EntityType>()?],
        Value::Array(items) => items
            .iter()
            .map(|item| expect_str(RULE_TYPE, item)?.parse::<EntityType>())
            .collect::<Result<Vec<_>>>()?,
        _ => {
            return Err(RapportError::Configuration(
                "type must be a string or a list of strings".to_string(),
            ))
        }
    };
    let mut types = Vec::with_capacity(parsed.len());
    for entity_type in parsed {
        if !types.contains(&entity_type) {
            types.push(entity_type);
        }
    }
    if types.is_empty() {
        return Err(RapportError::Configuration(
            "type list must not be empty".to_string(),
        ));
    }
    Ok(RulePredicate::EntityTypes(types))
}

fn parse_tags(value: &Value) -> Result<RulePredicate> {
    let items = value
        .as_array()
        .ok_or_else(|| RapportError::Configuration("tags must be a list".to_string()))?;

    let mut tags = Vec::with_capacity(items.len());
    for item in items {
        let tag = expect_str(RULE_TAGS, item)?.trim().to_lowercase();
        if tag.is_empty() {
            return Err(RapportError::Configuration(
                "tags must not contain blank names".to_string(),
            ));
        }
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    if tags.is_empty() {
        return Err(RapportError::Configuration(
            "tags list must not be empty".to_string(),
        ));
    }
    Ok(RulePredicate::Tags(tags))
}

fn parse_days(value: &Value) -> Result<RulePredicate> {
    match value.as_i64() {
        Some(days) if (1..=MAX_LAST_INTERACTION_DAYS).contains(&days) => {
            Ok(RulePredicate::LastInteractionDays(days))
        }
        _ => Err(RapportError::Configuration(format!(
            "last_interaction_days must be an integer between 1 and {}",
            MAX_LAST_INTERACTION_DAYS
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, Relationship, UserId};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn rules(value: Value) -> Result<SmartGroupRules> {
        match value {
            Value::Object(map) => SmartGroupRules::from_map(&map),
            _ => panic!("rules fixture must be an object"),
        }
    }

    fn profile(entity_type: EntityType, tags: &[&str]) -> EntityProfile {
        let user = UserId::new();
        let entity = Entity::new(user, entity_type, "Someone");
        let relationship = Relationship::new(user, entity.id, "friend");
        EntityProfile {
            entity,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            relationship: Some(relationship),
        }
    }

    #[test]
    fn test_parse_all_keys() {
        let parsed = rules(json!({
            "type": "person",
            "tags": ["VIP", "family", "vip"],
            "relationship_status": "active",
            "relationship_type": "friend",
            "last_interaction_days": 30
        }))
        .unwrap();

        assert_eq!(parsed.predicates().len(), 5);
        assert!(parsed
            .predicates()
            .contains(&RulePredicate::Tags(vec!["vip".into(), "family".into()])));
        assert!(parsed
            .predicates()
            .contains(&RulePredicate::LastInteractionDays(30)));
    }

    #[test]
    fn test_empty_rules_rejected() {
        let err = rules(json!({})).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_only_unknown_keys_rejected() {
        let err = rules(json!({"favourite_colour": "blue"})).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_keys_ignored_alongside_known() {
        let parsed = rules(json!({"type": "animal", "future_rule": 7})).unwrap();
        assert_eq!(
            parsed.predicates(),
            &[RulePredicate::EntityTypes(vec![EntityType::Animal])]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for bad in [
            json!({"tags": "vip"}),
            json!({"tags": []}),
            json!({"tags": [1, 2]}),
            json!({"type": "robot"}),
            json!({"type": 3}),
            json!({"relationship_status": "paused"}),
            json!({"relationship_type": "  "}),
            json!({"last_interaction_days": 0}),
            json!({"last_interaction_days": "30"}),
            json!({"last_interaction_days": 2.5}),
            json!({"last_interaction_days": 36_501}),
            json!({"last_interaction_days": 1_000_000_000i64}),
            json!({"last_interaction_days": i64::MAX}),
        ] {
            let err = rules(bad.clone()).unwrap_err();
            assert!(err.is_configuration(), "expected configuration error for {}", bad);
        }
    }

    #[test]
    fn test_null_values_impose_no_filter() {
        let parsed = rules(json!({"type": "person", "tags": null})).unwrap();
        assert_eq!(parsed.predicates().len(), 1);
    }

    #[test]
    fn test_for_group_requires_smart_rules() {
        let owner = UserId::new();
        assert!(SmartGroupRules::for_group(&Group::manual(owner, "Manual")).is_err());
        assert!(SmartGroupRules::for_group(&Group::smart(owner, "Empty", json!({}))).is_err());
        assert!(SmartGroupRules::for_group(&Group::smart(owner, "Ok", json!({"type": "thing"}))).is_ok());
    }

    #[test]
    fn test_non_object_rules_report_their_shape() {
        let owner = UserId::new();
        for (rules, kind) in [
            (json!(["type", "person"]), "a list"),
            (json!("type=person"), "a string"),
            (json!(42), "a number"),
        ] {
            let group = Group::smart(owner, "Odd", rules);
            let err = SmartGroupRules::for_group(&group).unwrap_err();
            assert!(err.is_configuration());
            assert!(err.to_string().contains("rules must be an object"));
            assert!(err.to_string().contains(kind));
        }

        let group = Group::smart(owner, "Null", Value::Null);
        let err = SmartGroupRules::for_group(&group).unwrap_err();
        assert!(err.to_string().contains("has no rules"));
    }

    #[test]
    fn test_tags_match_any_case_insensitive() {
        let parsed = rules(json!({"tags": ["vip", "board"]})).unwrap();
        assert!(parsed.matches(&profile(EntityType::Person, &["VIP"]), now()));
        assert!(parsed.matches(&profile(EntityType::Person, &["board", "x"]), now()));
        assert!(!parsed.matches(&profile(EntityType::Person, &["other"]), now()));
        assert!(!parsed.matches(&profile(EntityType::Person, &[]), now()));
    }

    #[test]
    fn test_conjunction() {
        let parsed = rules(json!({"type": ["person", "animal"], "tags": ["pet"]})).unwrap();
        assert!(parsed.matches(&profile(EntityType::Animal, &["pet"]), now()));
        assert!(!parsed.matches(&profile(EntityType::Animal, &[]), now()));
        assert!(!parsed.matches(&profile(EntityType::Organization, &["pet"]), now()));
    }

    #[test]
    fn test_last_interaction_days_treats_never_as_stale() {
        let parsed = rules(json!({"last_interaction_days": 30})).unwrap();

        let never = profile(EntityType::Person, &[]);
        assert!(parsed.matches(&never, now()));

        let mut exactly = profile(EntityType::Person, &[]);
        exactly.entity.last_interaction_at = Some(now() - Duration::days(30));
        assert!(parsed.matches(&exactly, now()));

        let mut recent = profile(EntityType::Person, &[]);
        recent.entity.last_interaction_at = Some(now() - Duration::days(29));
        assert!(!parsed.matches(&recent, now()));
    }

    #[test]
    fn test_last_interaction_days_upper_bound() {
        let parsed =
            rules(json!({"last_interaction_days": MAX_LAST_INTERACTION_DAYS})).unwrap();
        assert!(parsed.matches(&profile(EntityType::Person, &[]), now()));

        let mut dated = profile(EntityType::Person, &[]);
        dated.entity.last_interaction_at = Some(now() - Duration::days(400));
        assert!(!parsed.matches(&dated, now()));
    }

    #[test]
    fn test_unrepresentable_cutoff_matches_only_never_contacted() {
        let predicate = RulePredicate::LastInteractionDays(i64::MAX);
        assert!(predicate.matches(&profile(EntityType::Person, &[]), now()));

        let mut dated = profile(EntityType::Person, &[]);
        dated.entity.last_interaction_at = Some(now() - Duration::days(10_000));
        assert!(!predicate.matches(&dated, now()));
    }

    #[test]
    fn test_relationship_predicates_need_relationship() {
        let parsed = rules(json!({"relationship_status": "active"})).unwrap();
        let mut orphan = profile(EntityType::Person, &[]);
        assert!(parsed.matches(&orphan, now()));
        orphan.relationship = None;
        assert!(!parsed.matches(&orphan, now()));

        let parsed = rules(json!({"relationship_type": "Friend"})).unwrap();
        assert!(parsed.matches(&profile(EntityType::Person, &[]), now()));
    }

    #[test]
    fn test_archived_entities_never_match() {
        let parsed = rules(json!({"type": "person"})).unwrap();
        let mut archived = profile(EntityType::Person, &[]);
        archived.entity.archived = true;
        assert!(!parsed.matches(&archived, now()));
    }
}
