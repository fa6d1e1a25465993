use alloc::string::String;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::record_path;
use crate::cloud::{ChildSummary, CloudError, Database};

/// Which record goes when the root is full
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionOrder {
    /// First key in the listing as the server serialised it
    #[default]
    FirstSerialized,
    /// Lexicographically smallest key, i.e. the oldest timestamp
    OldestTimestamp,
}

impl EvictionOrder {
    /// Parse the build-time setting (`first` / `oldest`, case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("first") || name.eq_ignore_ascii_case("FirstSerialized") {
            Some(Self::FirstSerialized)
        } else if name.eq_ignore_ascii_case("oldest")
            || name.eq_ignore_ascii_case("OldestTimestamp")
        {
            Some(Self::OldestTimestamp)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    BelowThreshold { count: usize },
    Pruned { key: String, count: usize },
}

/// Keeps the record count under a fixed capacity, one deletion per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPruner {
    threshold: usize,
    order: EvictionOrder,
}

impl CapacityPruner {
    pub const fn new(threshold: usize, order: EvictionOrder) -> Self {
        Self { threshold, order }
    }

    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Key to evict, if the listing is at or above the threshold
    pub fn select<'a>(&self, summary: &'a ChildSummary) -> Option<&'a str> {
        if summary.count == 0 || summary.count < self.threshold {
            return None;
        }
        let key = match self.order {
            EvictionOrder::FirstSerialized => &summary.first_key,
            EvictionOrder::OldestTimestamp => &summary.smallest_key,
        };
        key.as_deref()
    }

    /// Count the records under `root` and delete one if the root is full.
    pub async fn run<D: Database>(
        &self,
        db: &mut D,
        root: &str,
    ) -> Result<PruneOutcome, CloudError> {
        let summary = db.children(root).await?;

        if summary.count == 0 || summary.count < self.threshold {
            return Ok(PruneOutcome::BelowThreshold {
                count: summary.count,
            });
        }

        let Some(key) = self.select(&summary) else {
            warn!("{} records stored but no usable key to prune", summary.count);
            return Err(CloudError::MalformedBody);
        };

        db.delete(&record_path(root, key)).await?;
        info!(
            "Pruned {} ({} records, threshold {})",
            key, summary.count, self.threshold
        );
        Ok(PruneOutcome::Pruned {
            key: String::from(key),
            count: summary.count,
        })
    }
}

impl Default for CapacityPruner {
    fn default() -> Self {
        Self::new(super::DEFAULT_CAPACITY, EvictionOrder::default())
    }
}
