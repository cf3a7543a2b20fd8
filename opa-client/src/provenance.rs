//! Agent build and bundle metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Build metadata reported by the agent when `provenance=true` is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    version: String,
    build_commit: String,
    build_timestamp: String,
    build_hostname: String,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        serialize_with = "serialize_bundles",
        deserialize_with = "deserialize_bundles"
    )]
    bundles: BTreeMap<String, Bundle>,
}

impl Provenance {
    /// Returns the agent version (e.g. `0.15.1`).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the commit the agent was built from.
    #[must_use]
    pub fn build_commit(&self) -> &str {
        &self.build_commit
    }

    /// Returns the build timestamp as reported by the agent.
    #[must_use]
    pub fn build_timestamp(&self) -> &str {
        &self.build_timestamp
    }

    /// Returns the hostname of the build machine.
    #[must_use]
    pub fn build_hostname(&self) -> &str {
        &self.build_hostname
    }

    /// Returns the bundles loaded by the agent, keyed by bundle name.
    #[must_use]
    pub fn bundles(&self) -> &BTreeMap<String, Bundle> {
        &self.bundles
    }

    /// Looks up a loaded bundle by name.
    #[must_use]
    pub fn bundle(&self, name: &str) -> Option<&Bundle> {
        self.bundles.get(name)
    }
}

/// Bundle loaded by the agent, together with its active revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    name: String,
    revision: String,
}

impl Bundle {
    /// Creates a bundle descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: revision.into(),
        }
    }

    /// Returns the bundle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the active revision of the bundle.
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

// The wire form carries the name as the map key only.
#[derive(Serialize, Deserialize)]
struct BundleRevision {
    revision: String,
}

fn deserialize_bundles<'de, D>(deserializer: D) -> Result<BTreeMap<String, Bundle>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = BTreeMap::<String, BundleRevision>::deserialize(deserializer)?;
    Ok(wire
        .into_iter()
        .map(|(name, bundle)| {
            let bundle = Bundle::new(name.clone(), bundle.revision);
            (name, bundle)
        })
        .collect())
}

fn serialize_bundles<S>(bundles: &BTreeMap<String, Bundle>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(bundles.iter().map(|(name, bundle)| {
        (
            name,
            BundleRevision {
                revision: bundle.revision.clone(),
            },
        )
    }))
}
