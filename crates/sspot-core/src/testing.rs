//! In-memory stand-ins for the bus, database and clock used by unit tests

use alloc::collections::{BTreeSet, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;

use crate::cloud::{ChildSummary, CloudError, Database};
use crate::modbus::{REQUEST_LEN, RESPONSE_LEN};
use crate::sensors::{SensorBus, TransportError};
use crate::time::{Clock, DateTime};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Children(String),
    Delete(String),
    Set(String, f32),
}

/// Flat path -> number store with insertion-ordered children
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    pub ready: bool,
    pub values: Vec<(String, f32)>,
    pub calls: Vec<Call>,
    pub fail_children: bool,
    /// `set_number` fails for paths ending in this field name
    pub fail_field: Option<&'static str>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Database with one `Moisture` value per key under `root`
    pub fn with_records(root: &str, keys: &[&str]) -> Self {
        let mut db = Self::new();
        for key in keys {
            db.values
                .push((alloc::format!("{}/{}/Moisture", root, key), 1.0));
        }
        db
    }

    /// Immediate child keys of `root`, in insertion order
    pub fn record_keys(&self, root: &str) -> Vec<String> {
        let prefix = alloc::format!("{}/", root.trim_end_matches('/'));
        let mut seen = BTreeSet::new();
        let mut keys: Vec<String> = Vec::new();
        for (path, _) in &self.values {
            let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            let key = rest.split('/').next().unwrap_or_default();
            if seen.insert(key) {
                keys.push(String::from(key));
            }
        }
        keys
    }

    pub fn value(&self, path: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, value)| *value)
    }

    pub fn writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Set(..)))
            .count()
    }
}

impl Database for MemoryDatabase {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn children(&mut self, path: &str) -> Result<ChildSummary, CloudError> {
        self.calls.push(Call::Children(String::from(path)));
        if self.fail_children {
            return Err(CloudError::Status(500));
        }
        let keys = self.record_keys(path);
        Ok(ChildSummary {
            count: keys.len(),
            first_key: keys.first().cloned(),
            smallest_key: keys.iter().min().cloned(),
        })
    }

    async fn delete(&mut self, path: &str) -> Result<(), CloudError> {
        self.calls.push(Call::Delete(String::from(path)));
        let nested = alloc::format!("{}/", path);
        self.values
            .retain(|(p, _)| p != path && !p.starts_with(nested.as_str()));
        Ok(())
    }

    async fn set_number(&mut self, path: &str, value: f32) -> Result<(), CloudError> {
        self.calls.push(Call::Set(String::from(path), value));
        if self.fail_field.is_some_and(|field| path.ends_with(field)) {
            return Err(CloudError::Status(500));
        }
        match self.values.iter_mut().find(|(p, _)| p == path) {
            Some(entry) => entry.1 = value,
            None => self.values.push((String::from(path), value)),
        }
        Ok(())
    }
}

/// Returns queued responses in order; `Timeout` once exhausted
#[derive(Debug, Default)]
pub struct ScriptedBus {
    pub responses: VecDeque<Result<[u8; RESPONSE_LEN], TransportError>>,
    pub requests: usize,
}

impl ScriptedBus {
    pub fn new(responses: &[Result<[u8; RESPONSE_LEN], TransportError>]) -> Self {
        Self {
            responses: responses.iter().copied().collect(),
            requests: 0,
        }
    }
}

impl SensorBus for ScriptedBus {
    async fn transact(
        &mut self,
        _request: &[u8; REQUEST_LEN],
    ) -> Result<[u8; RESPONSE_LEN], TransportError> {
        self.requests += 1;
        self.responses
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout))
    }
}

pub struct FixedClock {
    pub now: DateTime,
    pub synchronized: bool,
}

impl FixedClock {
    pub fn at(epoch_secs: i64) -> Self {
        Self {
            now: DateTime::from_epoch_secs(epoch_secs),
            synchronized: true,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime {
        self.now
    }

    fn is_synchronized(&self) -> bool {
        self.synchronized
    }
}
