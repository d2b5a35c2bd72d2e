//! Gem version strings and their RubyGems ordering.
//!
//! A version is a dotted sequence of segments. Each dotted piece is further
//! split on digit/letter boundaries, so `1.0.0.beta2` becomes
//! `[1, 0, 0, "beta", 2]`. Numeric segments compare numerically, a text
//! segment sorts before a numeric one, and missing trailing segments count as
//! zero (`1.0 == 1`). Any letter marks the version as a prerelease.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed version number string {0:?}")]
pub struct InvalidVersion(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Number(u64),
    Text(String),
}

#[derive(Clone, Debug)]
pub struct GemVersion {
    normalized: String,
    segments: Vec<Segment>,
}

impl GemVersion {
    pub fn parse(input: &str) -> Result<Self, InvalidVersion> {
        let trimmed = input.trim();
        let invalid = || InvalidVersion(input.to_string());

        let (release, pre) = match trimmed.split_once('-') {
            Some((release, pre)) => (release, Some(pre)),
            None => (trimmed, None),
        };

        let mut pieces = release.split('.');
        let first = pieces.next().ok_or_else(invalid)?;
        if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        for piece in pieces {
            if piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(invalid());
            }
        }
        if let Some(pre) = pre {
            for piece in pre.split('.') {
                if piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                {
                    return Err(invalid());
                }
            }
        }

        let normalized = trimmed.replace('-', ".pre.");
        let segments = split_segments(&normalized).ok_or_else(invalid)?;

        Ok(Self {
            normalized,
            segments,
        })
    }

    /// `0`, the lowest release version.
    pub fn zero() -> Self {
        Self {
            normalized: "0".to_string(),
            segments: vec![Segment::Number(0)],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn is_prerelease(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Text(_)))
    }

    /// A spelling shared by all versions that compare equal: segments joined
    /// by `.` with trailing zeros dropped, so `1.0.0` and `1` both give `1`.
    pub fn canonical(&self) -> String {
        let mut segments = self.segments.as_slice();
        while let [rest @ .., Segment::Number(0)] = segments {
            segments = rest;
        }
        if segments.is_empty() {
            return "0".to_string();
        }

        segments
            .iter()
            .map(|segment| match segment {
                Segment::Number(n) => n.to_string(),
                Segment::Text(text) => text.clone(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn split_segments(normalized: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let mut flush = |current: &mut String, is_digit: bool| -> Option<()> {
        if current.is_empty() {
            return Some(());
        }
        let segment = if is_digit {
            Segment::Number(current.parse().ok()?)
        } else {
            Segment::Text(std::mem::take(current))
        };
        current.clear();
        segments.push(segment);
        Some(())
    };

    for ch in normalized.chars() {
        if ch == '.' {
            flush(&mut current, current_is_digit)?;
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            flush(&mut current, current_is_digit)?;
        }
        current_is_digit = is_digit;
        current.push(ch);
    }
    flush(&mut current, current_is_digit)?;

    Some(segments)
}

impl Ord for GemVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        const ZERO: Segment = Segment::Number(0);
        let len = self.segments.len().max(other.segments.len());

        for idx in 0..len {
            let lhs = self.segments.get(idx).unwrap_or(&ZERO);
            let rhs = other.segments.get(idx).unwrap_or(&ZERO);
            let ordering = match (lhs, rhs) {
                (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
                (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
                (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
                (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

impl PartialOrd for GemVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GemVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GemVersion {}

impl fmt::Display for GemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl FromStr for GemVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for GemVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized)
    }
}

impl<'de> Deserialize<'de> for GemVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}
