//! Static partitioning of the backlog across worker processes

use std::fmt;

use thiserror::Error;

use crate::types::WorkItem;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    #[error("total shards must be at least 1")]
    NoShards,
    #[error("shard id {shard_id} is out of range for {total_shards} shards")]
    OutOfRange { shard_id: u32, total_shards: u32 },
}

/// Shard `shard_id` of `total_shards`. Always valid once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    shard_id: u32,
    total_shards: u32,
}

impl ShardSpec {
    pub fn new(shard_id: u32, total_shards: u32) -> Result<Self, ShardError> {
        if total_shards == 0 {
            return Err(ShardError::NoShards);
        }
        if shard_id >= total_shards {
            return Err(ShardError::OutOfRange {
                shard_id,
                total_shards,
            });
        }
        Ok(Self {
            shard_id,
            total_shards,
        })
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn total_shards(&self) -> u32 {
        self.total_shards
    }

    pub fn contains(&self, row_id: i64) -> bool {
        row_id.rem_euclid(i64::from(self.total_shards)) == i64::from(self.shard_id)
    }
}

impl Default for ShardSpec {
    fn default() -> Self {
        Self {
            shard_id: 0,
            total_shards: 1,
        }
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard_id, self.total_shards)
    }
}

/// Keep the items whose row id falls in `shard`
pub fn partition(items: Vec<WorkItem>, shard: &ShardSpec) -> Vec<WorkItem> {
    items
        .into_iter()
        .filter(|item| shard.contains(item.source_row_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InfoHash;
    use assert_matches::assert_matches;

    fn item(row_id: i64) -> WorkItem {
        WorkItem {
            info_hash: InfoHash::parse(&format!("{:040x}", row_id.unsigned_abs())).unwrap(),
            title: String::new(),
            size_scraped: 0,
            runtime_minutes: 0,
            source_row_id: row_id,
            tmdb_id: None,
        }
    }

    #[test]
    fn test_rejects_invalid_shard() {
        assert_matches!(ShardSpec::new(0, 0), Err(ShardError::NoShards));
        assert_matches!(
            ShardSpec::new(3, 3),
            Err(ShardError::OutOfRange { shard_id: 3, total_shards: 3 })
        );
        assert!(ShardSpec::new(2, 3).is_ok());
    }

    #[test]
    fn test_single_shard_keeps_everything() {
        let items: Vec<_> = (1..=10).map(item).collect();
        assert_eq!(partition(items, &ShardSpec::default()).len(), 10);
    }

    #[test]
    fn test_shards_cover_backlog_exactly_once() {
        let row_ids: Vec<i64> = (1..=200).chain([-7, 0, i64::MAX]).collect();

        for total in 1..=7 {
            let mut seen: Vec<i64> = Vec::new();
            for shard_id in 0..total {
                let shard = ShardSpec::new(shard_id, total).unwrap();
                let items = row_ids.iter().copied().map(item).collect();
                seen.extend(partition(items, &shard).iter().map(|i| i.source_row_id));
            }
            seen.sort_unstable();
            let mut expected = row_ids.clone();
            expected.sort_unstable();
            assert_eq!(seen, expected, "total_shards = {}", total);
        }
    }

    #[test]
    fn test_negative_row_ids_use_euclidean_remainder() {
        let shard = ShardSpec::new(2, 3).unwrap();
        assert!(shard.contains(-1));
        assert!(!shard.contains(-2));
    }
}
