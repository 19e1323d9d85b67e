use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    pub file_name: String,
    pub tarball: String,
}

/// Registry-compatible descriptor for one package and all of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub display_name: String,
    pub source_id: String,
    /// Sorted oldest to newest.
    pub versions: Vec<PackageVersion>,
    pub unity: String,
    pub frameworks: Vec<String>,
}

impl PackageEntry {
    pub fn latest_version(&self) -> Option<&str> {
        self.versions.last().map(|v| v.version.as_str())
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v.version == version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    packages: BTreeMap<String, PackageEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: PackageEntry) {
        self.packages.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PackageEntry> {
        self.packages.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageEntry> {
        self.packages.values()
    }

    pub fn version_count(&self) -> usize {
        self.packages.values().map(|p| p.versions.len()).sum()
    }
}

/// One fully constructed catalog. Never mutated once handed to the
/// [`CacheHolder`](crate::core::store::CacheHolder).
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub catalog: Catalog,
    /// Set by the builder; a snapshot with errors is never published.
    pub has_errors: bool,
    pub built_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(catalog: Catalog, has_errors: bool) -> Self {
        Self {
            catalog,
            has_errors,
            built_at: Utc::now(),
        }
    }

    pub fn failed() -> Self {
        Self::new(Catalog::new(), true)
    }

    pub fn is_publishable(&self) -> bool {
        !self.has_errors
    }
}

/// `(current, total)` counters of the in-flight build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub current: u32,
    pub total: u32,
}

impl ProgressState {
    pub fn new(current: u32, total: u32) -> Self {
        Self { current, total }
    }

    pub(crate) fn pack(self) -> u64 {
        (u64::from(self.current) << 32) | u64::from(self.total)
    }

    pub(crate) fn unpack(word: u64) -> Self {
        Self {
            current: (word >> 32) as u32,
            total: word as u32,
        }
    }

    pub fn is_known(&self) -> bool {
        self.total > 0
    }

    pub fn is_complete(&self) -> bool {
        self.is_known() && self.current >= self.total
    }

    pub fn fraction(&self) -> Option<f64> {
        if !self.is_known() {
            return None;
        }
        Some((f64::from(self.current) / f64::from(self.total)).min(1.0))
    }
}

/// What a single refresh cycle did with its candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Published { generation: u64, packages: usize },
    Discarded,
    Failed(String),
    Abandoned,
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Discarded | CycleOutcome::Failed(_))
    }
}
