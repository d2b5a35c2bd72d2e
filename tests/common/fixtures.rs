use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub struct GemFixture {
    name: String,
    version: String,
    platform: String,
    summary: String,
    tamper_checksum: bool,
}

impl GemFixture {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            platform: "ruby".to_string(),
            summary: format!("The {name} gem"),
            tamper_checksum: false,
        }
    }

    pub fn platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    /// Record a checksum that does not match `data.tar.gz`.
    pub fn with_bad_checksum(mut self) -> Self {
        self.tamper_checksum = true;
        self
    }

    pub fn file_name(&self) -> String {
        if self.platform == "ruby" {
            format!("{}-{}.gem", self.name, self.version)
        } else {
            format!("{}-{}-{}.gem", self.name, self.version, self.platform)
        }
    }

    fn gemspec(&self) -> String {
        format!(
            r#"--- !ruby/object:Gem::Specification
name: {name}
version: !ruby/object:Gem::Version
  version: {version}
platform: {platform}
authors:
- Jay Random
date: 2024-03-01 00:00:00.000000000 Z
dependencies:
- !ruby/object:Gem::Dependency
  name: json
  requirement: !ruby/object:Gem::Requirement
    requirements:
    - - "~>"
      - !ruby/object:Gem::Version
        version: '2.7'
  type: :runtime
  prerelease: false
summary: "{summary}"
licenses:
- MIT
rubygems_version: 3.5.3
specification_version: 4
"#,
            name = self.name,
            version = self.version,
            platform = self.platform,
            summary = self.summary,
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let metadata = gzip(self.gemspec().as_bytes());
        let data = gzip(format!("lib/{}.rb", self.name).as_bytes());
        let data_digest = if self.tamper_checksum {
            hex::encode(Sha256::digest(b"something else"))
        } else {
            hex::encode(Sha256::digest(&data))
        };
        let checksums = format!(
            "---\nSHA256:\n  metadata.gz: {}\n  data.tar.gz: {}\n",
            hex::encode(Sha256::digest(&metadata)),
            data_digest,
        );

        tar_with(&[
            ("metadata.gz", &metadata),
            ("data.tar.gz", &data),
            ("checksums.yaml.gz", &gzip(checksums.as_bytes())),
        ])
    }
}

pub fn tar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o444);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gem(name: &str, version: &str) -> Vec<u8> {
    GemFixture::new(name, version).build()
}
