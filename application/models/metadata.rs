//! Metadata extracted from an uploaded gem's specification.
use serde::{Deserialize, Serialize};
use time::macros::date;
use time::Date;

use crate::models::version::GemVersion;

pub const DEFAULT_PLATFORM: &str = "ruby";

time::serde::format_description!(gem_date, Date, "[year]-[month]-[day]");

/// The date RubyGems stamps on specifications built for reproducibility.
pub const DEFAULT_GEM_DATE: Date = date!(1980 - 01 - 02);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Runtime,
    Development,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Requirement {
    pub op: String,
    pub version: GemVersion,
}

impl Requirement {
    pub fn any() -> Self {
        Self {
            op: ">=".to_string(),
            version: GemVersion::zero(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Dependency {
    pub name: String,
    pub requirements: Vec<Requirement>,
    pub kind: DependencyKind,
}

/// Canonical identity of a stored gem. Two uploads with the same identity
/// map to the same file and the second one is refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageIdentity {
    pub name: String,
    pub version: GemVersion,
    pub platform: String,
}

impl PackageIdentity {
    pub fn full_name(&self) -> String {
        if self.platform == DEFAULT_PLATFORM {
            format!("{}-{}", self.name, self.version)
        } else {
            format!("{}-{}-{}", self.name, self.version, self.platform)
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.gem", self.full_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct GemMetadata {
    pub name: String,
    pub version: GemVersion,
    pub platform: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
    pub homepage: Option<String>,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(with = "gem_date")]
    pub date: Date,
    #[serde(default)]
    pub required_ruby_version: Vec<Requirement>,
    #[serde(default)]
    pub required_rubygems_version: Vec<Requirement>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    pub rubygems_version: Option<String>,
    pub specification_version: Option<i64>,
}

impl GemMetadata {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            name: self.name.clone(),
            version: self.version.clone(),
            platform: self.platform.clone(),
        }
    }

    pub fn full_name(&self) -> String {
        self.identity().full_name()
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }
}
