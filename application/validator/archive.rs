use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256, Sha512};

use super::gemspec::strip_tags;
use super::{ValidationError, ValidationResult};

const METADATA_ENTRY: &str = "metadata.gz";
const DATA_ENTRY: &str = "data.tar.gz";
const CHECKSUMS_ENTRY: &str = "checksums.yaml.gz";

/// Upper bound for the small entries that are held in memory.
const MAX_METADATA_SIZE: u64 = 16 * 1024 * 1024;

pub(super) struct GemContents {
    pub metadata_gz: Vec<u8>,
    checksums_gz: Option<Vec<u8>>,
    digests: HashMap<String, EntryDigests>,
}

struct EntryDigests {
    sha256: String,
    sha512: String,
}

#[derive(Default)]
struct DigestWriter {
    sha256: Sha256,
    sha512: Sha512,
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sha256.update(buf);
        self.sha512.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DigestWriter {
    fn update_from(&mut self, data: &[u8]) {
        self.sha256.update(data);
        self.sha512.update(data);
    }

    fn finish(self) -> EntryDigests {
        EntryDigests {
            sha256: hex::encode(self.sha256.finalize()),
            sha512: hex::encode(self.sha512.finalize()),
        }
    }
}

pub(super) fn read_archive<R: Read>(reader: R) -> ValidationResult<GemContents> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|err| ValidationError::MalformedPackage(err.to_string()))?;

    let mut metadata_gz = None;
    let mut checksums_gz = None;
    let mut digests = HashMap::new();
    let mut seen_entry = false;

    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(err) if !seen_entry => {
                return Err(ValidationError::MalformedPackage(format!(
                    "not a tar archive: {err}"
                )))
            }
            Err(err) => {
                return Err(ValidationError::CorruptPackage(format!(
                    "truncated archive: {err}"
                )))
            }
        };
        seen_entry = true;

        let path = entry
            .path()
            .map_err(|err| ValidationError::CorruptPackage(err.to_string()))?
            .to_string_lossy()
            .into_owned();

        let mut digest = DigestWriter::default();
        match path.as_str() {
            METADATA_ENTRY | CHECKSUMS_ENTRY => {
                let data = read_bounded(&mut entry, &path)?;
                digest.update_from(&data);
                if path == METADATA_ENTRY {
                    metadata_gz = Some(data);
                } else {
                    checksums_gz = Some(data);
                }
            }
            _ => {
                io::copy(&mut entry, &mut digest).map_err(|err| {
                    ValidationError::CorruptPackage(format!("failed to read {path}: {err}"))
                })?;
            }
        }
        digests.insert(path, digest.finish());
    }

    let metadata_gz = metadata_gz.ok_or_else(|| {
        ValidationError::MalformedPackage(format!("archive has no {METADATA_ENTRY}"))
    })?;
    if !digests.contains_key(DATA_ENTRY) {
        return Err(ValidationError::CorruptPackage(format!(
            "archive has no {DATA_ENTRY}"
        )));
    }

    Ok(GemContents {
        metadata_gz,
        checksums_gz,
        digests,
    })
}

fn read_bounded<R: Read>(reader: R, path: &str) -> ValidationResult<Vec<u8>> {
    let mut data = Vec::new();
    reader
        .take(MAX_METADATA_SIZE + 1)
        .read_to_end(&mut data)
        .map_err(|err| ValidationError::CorruptPackage(format!("failed to read {path}: {err}")))?;
    if data.len() as u64 > MAX_METADATA_SIZE {
        return Err(ValidationError::CorruptPackage(format!("{path} is too large")));
    }

    Ok(data)
}

impl GemContents {
    /// Check every digest listed in `checksums.yaml.gz` against the entries
    /// actually present. Algorithms other than SHA256/SHA512 are skipped.
    pub fn verify_checksums(&self) -> ValidationResult<()> {
        let Some(checksums_gz) = &self.checksums_gz else {
            return Ok(());
        };

        let mut yaml = String::new();
        GzDecoder::new(checksums_gz.as_slice())
            .take(MAX_METADATA_SIZE)
            .read_to_string(&mut yaml)
            .map_err(|err| {
                ValidationError::CorruptPackage(format!("unreadable {CHECKSUMS_ENTRY}: {err}"))
            })?;
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).map_err(|err| {
            ValidationError::CorruptPackage(format!("invalid {CHECKSUMS_ENTRY}: {err}"))
        })?;
        let checksums: BTreeMap<String, BTreeMap<String, String>> =
            serde_yaml::from_value(strip_tags(value)).map_err(|err| {
                ValidationError::CorruptPackage(format!("invalid {CHECKSUMS_ENTRY}: {err}"))
            })?;

        for (algorithm, files) in &checksums {
            for (file, expected) in files {
                let Some(digests) = self.digests.get(file) else {
                    return Err(ValidationError::CorruptPackage(format!(
                        "checksum listed for missing entry {file}"
                    )));
                };
                let actual = match algorithm.as_str() {
                    "SHA256" => &digests.sha256,
                    "SHA512" => &digests.sha512,
                    _ => continue,
                };
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(ValidationError::CorruptPackage(format!(
                        "{algorithm} checksum mismatch for {file}"
                    )));
                }
            }
        }

        Ok(())
    }
}
