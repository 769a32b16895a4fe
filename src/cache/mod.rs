//! Key-value cache used for smart-group membership sets
//!
//! The engine only needs `get`, `set` with a TTL, and pattern eviction, so any
//! shared cache can sit behind [`MembershipCache`]. [`InMemoryCache`] is the
//! in-process implementation.

pub mod memory;

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;

use crate::error::{RapportError, Result};
use crate::types::{GroupId, UserId};

pub use memory::InMemoryCache;

const KEY_PREFIX: &str = "smart_group";

/// Generic cache contract; errors surface as `DataAccess`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove every key matching a glob pattern, returning how many went
    async fn delete_matching(&self, pattern: &str) -> Result<usize>;
}

/// Cache key for one group's member set, scoped to its owner
pub fn membership_key(user_id: UserId, group_id: GroupId) -> String {
    format!("{}:{}:{}:members", KEY_PREFIX, user_id, group_id)
}

/// Per-user token that changes whenever the user's memberships are evicted
///
/// It shares the user's key prefix, so [`user_pattern`] evicts it along with
/// the member sets.
pub fn epoch_key(user_id: UserId) -> String {
    format!("{}:{}:epoch", KEY_PREFIX, user_id)
}

/// Pattern covering every membership entry of one user
pub fn user_pattern(user_id: UserId) -> String {
    format!("{}:{}:*", KEY_PREFIX, user_id)
}

/// Compiled glob where `*` matches any run of characters
#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| RapportError::Other(format!("invalid key pattern: {}", e)))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
