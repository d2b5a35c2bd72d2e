//! HTML views of the repository index.
use std::fmt::Write;
use std::sync::Arc;

use crate::models::index::{IndexEntry, RepositoryIndex};

const KILOBYTE: f64 = 1024.0;
const MEGABYTE: f64 = KILOBYTE * 1024.0;
const GIGABYTE: f64 = MEGABYTE * 1024.0;

/// Turns index snapshots into pages for browsers.
pub trait IndexRenderer: Send + Sync {
    /// A complete page, layout included.
    fn page(&self, index: &RepositoryIndex) -> String;

    /// Just the gem listing, for embedding in an existing page.
    fn fragment(&self, index: &RepositoryIndex) -> String;

    /// Every stored version of a single gem.
    fn details(&self, name: &str, entries: &[&IndexEntry]) -> String;
}

pub type DynIndexRenderer = Arc<dyn IndexRenderer>;

/// Minimal built-in pages with no external templates.
#[derive(Clone, Debug)]
pub struct HtmlRenderer {
    title: String,
}

impl HtmlRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    fn layout(&self, title: &str, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<h1>{}</h1>\n{}</body>\n</html>\n",
            escape(title),
            escape(title),
            body
        )
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new("gemvault")
    }
}

impl IndexRenderer for HtmlRenderer {
    fn page(&self, index: &RepositoryIndex) -> String {
        self.layout(&self.title, &self.fragment(index))
    }

    fn fragment(&self, index: &RepositoryIndex) -> String {
        if index.is_empty() {
            return concat!(
                "<p class=\"empty\">No gems are published in this repository yet.</p>\n",
                "<p>Upload one with <code>gem push --host &lt;this server&gt; your.gem</code>.</p>\n"
            )
            .to_string();
        }

        let mut html = String::new();
        if !index.release().is_empty() {
            html.push_str("<h2>Released gems</h2>\n");
            html.push_str(&gem_table(index.release()));
        }
        if !index.prerelease().is_empty() {
            html.push_str("<h2>Prerelease gems</h2>\n");
            html.push_str(&gem_table(index.prerelease()));
        }

        html
    }

    fn details(&self, name: &str, entries: &[&IndexEntry]) -> String {
        self.layout(name, &gem_table(entries.iter().copied()))
    }
}

fn gem_table<'a>(entries: impl IntoIterator<Item = &'a IndexEntry>) -> String {
    let mut html = String::from(
        "<table>\n<tr><th>Name</th><th>Version</th><th>Platform</th><th>Summary</th><th>Size</th></tr>\n",
    );
    for entry in entries {
        let metadata = &entry.metadata;
        let _ = writeln!(
            html,
            "<tr><td><a href=\"/details/{name}\">{name}</a></td><td><a href=\"/gems/{file}\">{version}</a></td><td>{platform}</td><td>{summary}</td><td>{size}</td></tr>",
            name = escape(&metadata.name),
            file = escape(&metadata.identity().file_name()),
            version = escape(&metadata.version.to_string()),
            platform = escape(&metadata.platform),
            summary = escape(metadata.summary.as_deref().unwrap_or("")),
            size = byte_suffix(entry.size),
        );
    }
    html.push_str("</table>\n");

    html
}

/// Human-readable size: `1.5M`, `12.0K`, `512b`.
pub fn byte_suffix(bytes: u64) -> String {
    let value = bytes as f64;
    if value >= GIGABYTE {
        format!("{:.1}G", value / GIGABYTE)
    } else if value >= MEGABYTE {
        format!("{:.1}M", value / MEGABYTE)
    } else if value >= KILOBYTE {
        format!("{:.1}K", value / KILOBYTE)
    } else {
        format!("{bytes}b")
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
