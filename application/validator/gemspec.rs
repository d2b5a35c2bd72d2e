use std::io::Read;

use flate2::read::GzDecoder;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use time::macros::format_description;
use time::Date;

use super::{ValidationError, ValidationResult};
use crate::models::metadata::{
    Dependency, DependencyKind, GemMetadata, Requirement, DEFAULT_GEM_DATE, DEFAULT_PLATFORM,
};
use crate::models::version::GemVersion;

const MAX_SPEC_SIZE: u64 = 16 * 1024 * 1024;

/// A YAML scalar read back as text, whatever type the emitter gave it.
#[derive(Debug)]
struct Scalar(String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::Bool(b) => Ok(Self(b.to_string())),
            other => Err(D::Error::custom(format!("expected a scalar, got {other:?}"))),
        }
    }
}

/// Fields such as `email` may be a single string or a list.
#[derive(Debug, Default)]
struct OneOrMany(Vec<String>);

impl<'de> Deserialize<'de> for OneOrMany {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = match Value::deserialize(deserializer)? {
            Value::Null => vec![],
            Value::Sequence(seq) => seq
                .into_iter()
                .filter_map(|value| match value {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Value::String(s) => vec![s],
            other => return Err(D::Error::custom(format!("expected a list, got {other:?}"))),
        };

        Ok(Self(values))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Object { version: Scalar },
    Plain(Scalar),
}

impl RawVersion {
    fn parse(&self) -> ValidationResult<GemVersion> {
        let raw = match self {
            RawVersion::Object { version } => &version.0,
            RawVersion::Plain(version) => &version.0,
        };
        GemVersion::parse(raw).map_err(|err| ValidationError::CorruptPackage(err.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRequirement {
    requirements: Vec<(Scalar, RawVersion)>,
}

impl RawRequirement {
    fn parse(&self) -> ValidationResult<Vec<Requirement>> {
        self.requirements
            .iter()
            .map(|(op, version)| {
                Ok(Requirement {
                    op: op.0.clone(),
                    version: version.parse()?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    name: Scalar,
    requirement: Option<RawRequirement>,
    version_requirements: Option<RawRequirement>,
    #[serde(rename = "type")]
    kind: Option<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSpecification {
    name: Option<Scalar>,
    version: Option<RawVersion>,
    platform: Option<Scalar>,
    summary: Option<Scalar>,
    description: Option<Scalar>,
    authors: OneOrMany,
    email: OneOrMany,
    homepage: Option<Scalar>,
    licenses: OneOrMany,
    date: Option<Scalar>,
    required_ruby_version: Option<RawRequirement>,
    required_rubygems_version: Option<RawRequirement>,
    dependencies: Vec<RawDependency>,
    rubygems_version: Option<Scalar>,
    specification_version: Option<i64>,
}

/// Drop Ruby object tags (`!ruby/object:Gem::Version` and friends) so the
/// document can be read as plain mappings.
pub(super) fn strip_tags(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => strip_tags(tagged.value),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(strip_tags).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| (strip_tags(key), strip_tags(value)))
                .collect(),
        ),
        other => other,
    }
}

pub(super) fn parse_metadata(metadata_gz: &[u8]) -> ValidationResult<GemMetadata> {
    let mut yaml = String::new();
    GzDecoder::new(metadata_gz)
        .take(MAX_SPEC_SIZE)
        .read_to_string(&mut yaml)
        .map_err(|err| ValidationError::CorruptPackage(format!("unreadable metadata.gz: {err}")))?;

    let value: Value = serde_yaml::from_str(&yaml)
        .map_err(|err| ValidationError::CorruptPackage(format!("invalid gemspec: {err}")))?;
    let raw: RawSpecification = serde_yaml::from_value(strip_tags(value))
        .map_err(|err| ValidationError::CorruptPackage(format!("invalid gemspec: {err}")))?;

    raw.into_metadata()
}

fn corrupt(message: impl Into<String>) -> ValidationError {
    ValidationError::CorruptPackage(message.into())
}

/// Names end up as file names, so they may not be empty or hidden.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        && name.bytes().any(|b| b.is_ascii_alphabetic())
}

fn parse_date(raw: &str) -> Option<Date> {
    let day = raw.get(..10)?;
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

impl RawSpecification {
    fn into_metadata(self) -> ValidationResult<GemMetadata> {
        let name = self.name.ok_or_else(|| corrupt("gemspec has no name"))?.0;
        if !is_valid_name(&name) {
            return Err(corrupt(format!("invalid gem name {name:?}")));
        }
        let version = self
            .version
            .ok_or_else(|| corrupt("gemspec has no version"))?
            .parse()?;

        let platform = self
            .platform
            .map(|p| p.0)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());
        if !is_valid_name(&platform) {
            return Err(corrupt(format!("invalid platform {platform:?}")));
        }

        let dependencies = self
            .dependencies
            .into_iter()
            .map(|dep| {
                let requirement = dep.requirement.or(dep.version_requirements);
                let requirements = match requirement {
                    Some(requirement) => requirement.parse()?,
                    None => vec![Requirement::any()],
                };
                let kind = match dep.kind.as_ref().map(|k| k.0.trim_start_matches(':')) {
                    Some("development") => DependencyKind::Development,
                    _ => DependencyKind::Runtime,
                };
                Ok(Dependency {
                    name: dep.name.0,
                    requirements,
                    kind,
                })
            })
            .collect::<ValidationResult<Vec<_>>>()?;

        let optional_requirement = |requirement: Option<RawRequirement>| match requirement {
            Some(requirement) => requirement.parse(),
            None => Ok(vec![]),
        };

        Ok(GemMetadata {
            name,
            version,
            platform,
            summary: self.summary.map(|s| s.0),
            description: self.description.map(|s| s.0),
            authors: self.authors.0,
            email: self.email.0,
            homepage: self.homepage.map(|s| s.0).filter(|h| !h.is_empty()),
            licenses: self.licenses.0,
            date: self
                .date
                .and_then(|d| parse_date(&d.0))
                .unwrap_or(DEFAULT_GEM_DATE),
            required_ruby_version: optional_requirement(self.required_ruby_version)?,
            required_rubygems_version: optional_requirement(self.required_rubygems_version)?,
            dependencies,
            rubygems_version: self.rubygems_version.map(|s| s.0),
            specification_version: self.specification_version,
        })
    }
}
