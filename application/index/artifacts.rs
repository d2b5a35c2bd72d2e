//! Encoding of the files `gem` clients fetch from a repository.
use std::io::Write;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use super::marshal::{MarshalWriter, MARSHAL_VERSION};
use super::IndexResult;
use crate::models::index::{IndexEntry, RepositoryIndex};
use crate::models::metadata::{Dependency, DependencyKind, GemMetadata, Requirement};
use crate::models::version::GemVersion;

pub(super) const QUICK_DIR: &str = "quick/Marshal.4.8";

/// RubyGems' current specification format.
const SPECIFICATION_VERSION: i32 = 4;
const DEFAULT_RUBYGEMS_VERSION: &str = "3.5.3";

pub(super) struct Artifact {
    pub key: String,
    pub data: Vec<u8>,
}

/// The root index files: the three spec lists in plain and gzipped form, and
/// the YAML listing in plain and deflated form.
pub(super) fn index_files(index: &RepositoryIndex) -> IndexResult<Vec<Artifact>> {
    let lists = [
        ("specs", index.release().iter().collect::<Vec<_>>()),
        ("latest_specs", index.latest_release()),
        ("prerelease_specs", index.prerelease().iter().collect::<Vec<_>>()),
    ];

    let mut artifacts = Vec::with_capacity(8);
    for (name, entries) in lists {
        let data = spec_list(&entries);
        artifacts.push(Artifact {
            key: format!("{name}.{MARSHAL_VERSION}.gz"),
            data: gzip(&data)?,
        });
        artifacts.push(Artifact {
            key: format!("{name}.{MARSHAL_VERSION}"),
            data,
        });
    }

    let metadata: Vec<&GemMetadata> = index.entries().map(|entry| &entry.metadata).collect();
    let yaml = serde_yaml::to_string(&metadata)?.into_bytes();
    artifacts.push(Artifact {
        key: "yaml.Z".to_string(),
        data: deflate(&yaml)?,
    });
    artifacts.push(Artifact {
        key: "yaml".to_string(),
        data: yaml,
    });

    Ok(artifacts)
}

/// `quick/Marshal.4.8/<full name>.gemspec.rz` for one gem.
pub(super) fn quick_spec(metadata: &GemMetadata) -> IndexResult<Artifact> {
    Ok(Artifact {
        key: quick_spec_key(&metadata.full_name()),
        data: deflate(&specification(metadata))?,
    })
}

pub(super) fn quick_spec_key(full_name: &str) -> String {
    format!("{QUICK_DIR}/{full_name}.gemspec.rz")
}

/// An array of `[name, Gem::Version, platform]` tuples.
fn spec_list(entries: &[&IndexEntry]) -> Vec<u8> {
    let mut w = MarshalWriter::new();
    w.array(entries, |w, entry| {
        w.array_header(3);
        w.string(&entry.metadata.name);
        version(w, &entry.metadata.version);
        w.string(&entry.metadata.platform);
    });
    w.into_bytes()
}

fn version(w: &mut MarshalWriter, version: &GemVersion) {
    w.user_marshal("Gem::Version");
    w.string_array(&[version.to_string()]);
}

fn requirement(w: &mut MarshalWriter, requirements: &[Requirement]) {
    let any = [Requirement::any()];
    let requirements = if requirements.is_empty() {
        &any[..]
    } else {
        requirements
    };

    w.user_marshal("Gem::Requirement");
    w.array_header(1);
    w.array(requirements, |w, requirement| {
        w.array_header(2);
        w.string(&requirement.op);
        version(w, &requirement.version);
    });
}

fn dependency(w: &mut MarshalWriter, dependency: &Dependency) {
    w.object("Gem::Dependency", 4);
    w.symbol("@name");
    w.string(&dependency.name);
    w.symbol("@requirement");
    requirement(w, &dependency.requirements);
    w.symbol("@type");
    w.symbol(match dependency.kind {
        DependencyKind::Runtime => "runtime",
        DependencyKind::Development => "development",
    });
    w.symbol("@prerelease");
    w.bool(false);
}

/// A full `Gem::Specification` in the form its `_dump` produces: a nested
/// Marshal stream holding a fixed-order array of fields.
fn specification(metadata: &GemMetadata) -> Vec<u8> {
    let mut w = MarshalWriter::new();
    w.array_header(19);
    w.string(
        metadata
            .rubygems_version
            .as_deref()
            .unwrap_or(DEFAULT_RUBYGEMS_VERSION),
    );
    w.integer(
        metadata
            .specification_version
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(SPECIFICATION_VERSION),
    );
    w.string(&metadata.name);
    version(&mut w, &metadata.version);
    w.utc_date(metadata.date);
    w.optional_string(metadata.summary.as_deref());
    requirement(&mut w, &metadata.required_ruby_version);
    requirement(&mut w, &metadata.required_rubygems_version);
    w.string(&metadata.platform);
    w.array(&metadata.dependencies, dependency);
    // rubyforge_project
    w.string("");
    w.string_array(&metadata.email);
    w.string_array(&metadata.authors);
    w.optional_string(metadata.description.as_deref());
    w.optional_string(metadata.homepage.as_deref());
    // has_rdoc
    w.bool(true);
    w.string(&metadata.platform);
    w.string_array(&metadata.licenses);
    // metadata
    w.hash_header(0);

    let mut outer = MarshalWriter::new();
    outer.user_dump("Gem::Specification", &w.into_bytes());
    outer.into_bytes()
}

fn gzip(data: &[u8]) -> IndexResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn deflate(data: &[u8]) -> IndexResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::{GzDecoder, ZlibDecoder};

    use super::*;
    use crate::models::metadata::DEFAULT_GEM_DATE;

    fn metadata(name: &str, version: &str) -> GemMetadata {
        GemMetadata {
            name: name.to_string(),
            version: GemVersion::parse(version).unwrap(),
            platform: "ruby".to_string(),
            summary: Some("summary".to_string()),
            description: None,
            authors: vec!["Jay Random".to_string()],
            email: vec![],
            homepage: None,
            licenses: vec!["MIT".to_string()],
            date: DEFAULT_GEM_DATE,
            required_ruby_version: vec![],
            required_rubygems_version: vec![],
            dependencies: vec![Dependency {
                name: "rake".to_string(),
                requirements: vec![],
                kind: DependencyKind::Development,
            }],
            rubygems_version: None,
            specification_version: None,
        }
    }

    fn index(gems: &[(&str, &str)]) -> RepositoryIndex {
        RepositoryIndex::new(
            gems.iter()
                .map(|(name, version)| IndexEntry {
                    metadata: metadata(name, version),
                    size: 1,
                })
                .collect(),
        )
    }

    #[test]
    fn test_empty_spec_list() {
        assert_eq!(spec_list(&[]), b"\x04\x08[\x00");
    }

    #[test]
    fn test_spec_list_tuple_layout() {
        let index = index(&[("ab", "1")]);
        let entries: Vec<_> = index.release().iter().collect();

        let mut expected = b"\x04\x08[\x06[\x08".to_vec();
        expected.extend_from_slice(b"I\"\x07ab\x06:\x06ET");
        expected.extend_from_slice(b"U:\x11Gem::Version[\x06I\"\x061\x06;\x00T");
        expected.extend_from_slice(b"I\"\x09ruby\x06;\x00T");
        assert_eq!(spec_list(&entries), expected);
    }

    #[test]
    fn test_index_files_split_release_and_prerelease() {
        let index = index(&[("widget", "1.0.0"), ("widget", "1.1.0"), ("widget", "2.0.0.rc1")]);
        let files = index_files(&index).unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "specs.4.8.gz",
                "specs.4.8",
                "latest_specs.4.8.gz",
                "latest_specs.4.8",
                "prerelease_specs.4.8.gz",
                "prerelease_specs.4.8",
                "yaml.Z",
                "yaml",
            ]
        );

        let file = |key: &str| &files.iter().find(|f| f.key == key).unwrap().data;
        assert_eq!(&file("specs.4.8")[..3], b"\x04\x08[");
        assert_eq!(file("specs.4.8")[3], 2 + 5);
        assert_eq!(file("latest_specs.4.8")[3], 1 + 5);
        assert_eq!(file("prerelease_specs.4.8")[3], 1 + 5);

        let mut unzipped = Vec::new();
        GzDecoder::new(file("specs.4.8.gz").as_slice())
            .read_to_end(&mut unzipped)
            .unwrap();
        assert_eq!(&unzipped, file("specs.4.8"));

        let yaml = String::from_utf8(file("yaml").clone()).unwrap();
        assert!(yaml.contains("name: widget"));
        assert!(yaml.contains("2.0.0.rc1"));
    }

    #[test]
    fn test_quick_spec_is_deflated_specification_dump() {
        let artifact = quick_spec(&metadata("widget", "0.1.0")).unwrap();
        assert_eq!(artifact.key, "quick/Marshal.4.8/widget-0.1.0.gemspec.rz");

        let mut dumped = Vec::new();
        ZlibDecoder::new(artifact.data.as_slice())
            .read_to_end(&mut dumped)
            .unwrap();
        assert!(dumped.starts_with(b"\x04\x08u:\x17Gem::Specification"));

        // the nested stream is the 19-field array
        let inner_start = dumped
            .windows(4)
            .position(|w| w == b"\x04\x08[\x18")
            .unwrap();
        assert!(inner_start > 0);
        let inner = &dumped[inner_start..];
        assert!(inner.windows(6).any(|w| w == b"widget"));
        assert!(inner.windows(15).any(|w| w == b"Gem::Dependency"));
        assert!(inner.windows(11).any(|w| w == b"development"));
    }
}
