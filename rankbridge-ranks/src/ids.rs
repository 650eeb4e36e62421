// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

/// Storage key of a rank definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RankId(i64);

impl RankId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RankId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RankId {
    type Err = ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.parse()?))
    }
}

/// Numeric storage key of an identity, as used in rank assignments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(i64);

impl IdentityId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid rank id '{value}' in list: {source}")]
pub struct ParseRankIdListError {
    value: String,
    #[source]
    source: ParseIntError,
}

/// Ordered list of rank ids with a compact textual form.
///
/// ```
/// # use rankbridge_ranks::{RankId, RankIdList};
/// let list: RankIdList = "4:1:9".parse().unwrap();
/// assert_eq!(list.to_string(), "4:1:9");
/// assert_eq!(list.iter().next(), Some(&RankId::new(4)));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankIdList(Vec<RankId>);

impl RankIdList {
    const SEPARATOR: char = ':';

    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankId> {
        self.0.iter()
    }

    pub fn contains(&self, id: RankId) -> bool {
        self.0.contains(&id)
    }

    pub fn push(&mut self, id: RankId) {
        self.0.push(id);
    }

    /// Removes every occurrence of the id, returns `true` if it was present.
    pub fn remove(&mut self, id: RankId) -> bool {
        let before = self.0.len();
        self.0.retain(|item| *item != id);
        self.0.len() < before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<RankId>> for RankIdList {
    fn from(value: Vec<RankId>) -> Self {
        Self(value)
    }
}

impl FromIterator<RankId> for RankIdList {
    fn from_iter<T: IntoIterator<Item = RankId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RankIdList {
    type Item = &'a RankId;
    type IntoIter = std::slice::Iter<'a, RankId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RankIdList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, id) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "{}", Self::SEPARATOR)?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl FromStr for RankIdList {
    type Err = ParseRankIdListError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Ok(Self::default());
        }

        value
            .split(Self::SEPARATOR)
            .map(|item| {
                item.trim().parse().map_err(|source| ParseRankIdListError {
                    value: item.to_string(),
                    source,
                })
            })
            .collect()
    }
}
