use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::metadata::{GemMetadata, PackageIdentity};

/// One stored gem as seen by the index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexEntry {
    #[serde(flatten)]
    pub metadata: GemMetadata,
    pub size: u64,
}

/// Snapshot of every stored gem, split into release and prerelease sets.
///
/// Entries are ordered by name, then version, then platform, which is also
/// the order the marshalled index files are written in.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RepositoryIndex {
    release: Vec<IndexEntry>,
    prerelease: Vec<IndexEntry>,
}

impl RepositoryIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        let (mut prerelease, mut release): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| entry.metadata.is_prerelease());
        release.sort_by(compare_entries);
        prerelease.sort_by(compare_entries);

        Self {
            release,
            prerelease,
        }
    }

    pub fn len(&self) -> usize {
        self.release.len() + self.prerelease.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn release(&self) -> &[IndexEntry] {
        &self.release
    }

    pub fn prerelease(&self) -> &[IndexEntry] {
        &self.prerelease
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.release.iter().chain(self.prerelease.iter())
    }

    /// Newest release of each (name, platform) pair.
    pub fn latest_release(&self) -> Vec<&IndexEntry> {
        let mut latest: BTreeMap<(&str, &str), &IndexEntry> = BTreeMap::new();
        for entry in &self.release {
            let key = (entry.metadata.name.as_str(), entry.metadata.platform.as_str());
            match latest.get(&key) {
                Some(current) if current.metadata.version >= entry.metadata.version => {}
                _ => {
                    latest.insert(key, entry);
                }
            }
        }

        latest.into_values().collect()
    }

    /// Every stored version of `name`, newest first.
    pub fn search(&self, name: &str) -> Vec<&IndexEntry> {
        let mut found: Vec<&IndexEntry> = self
            .entries()
            .filter(|entry| entry.metadata.name == name)
            .collect();
        found.sort_by(|a, b| compare_entries(b, a));

        found
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.entries()
            .any(|entry| entry.metadata.identity() == *identity)
    }
}

fn compare_entries(a: &IndexEntry, b: &IndexEntry) -> std::cmp::Ordering {
    a.metadata
        .name
        .cmp(&b.metadata.name)
        .then_with(|| a.metadata.version.cmp(&b.metadata.version))
        .then_with(|| a.metadata.platform.cmp(&b.metadata.platform))
}
