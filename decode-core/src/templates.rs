//! Template Substitution - Placeholders, Text Fragments, Rendering
//!
//! Generated markup carries `{{ASSET_ID_<name>}}` image placeholders and
//! human-visible text. Users override either; rendering applies the
//! overrides to a copy and leaves the stored artifact untouched.
//!
//! Unmatched overrides are silent no-ops. Markup may change between
//! generations and stale keys simply stop matching.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::markup::{escape_text, Document};

pub const PLACEHOLDER_PREFIX: &str = "ASSET_ID_";

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{ASSET_ID_([^}]+)\}\}").expect("placeholder pattern is valid")
});

/// A distinct `{{ASSET_ID_<name>}}` marker found in markup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub token: String,
    pub name: String,
}

impl Placeholder {
    /// Accepts `{{ASSET_ID_X}}`, `ASSET_ID_X` or a bare `X`
    pub fn normalize(key: &str) -> String {
        let key = key.trim();
        if key.starts_with("{{") && key.ends_with("}}") {
            key.to_string()
        } else if key.starts_with(PLACEHOLDER_PREFIX) {
            format!("{{{{{}}}}}", key)
        } else {
            format!("{{{{{}{}}}}}", PLACEHOLDER_PREFIX, key)
        }
    }
}

/// Placeholder-image service used for tokens with no override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackImage {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_foreground")]
    pub foreground: String,
}

fn default_host() -> String { "placehold.co".to_string() }
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_background() -> String { "1e293b".to_string() }
fn default_foreground() -> String { "6366f1".to_string() }

impl Default for FallbackImage {
    fn default() -> Self {
        Self {
            host: default_host(),
            width: default_width(),
            height: default_height(),
            background: default_background(),
            foreground: default_foreground(),
        }
    }
}

impl FallbackImage {
    pub fn url_for(&self, name: &str) -> String {
        format!(
            "https://{}/{}x{}/{}/{}?text={}",
            self.host,
            self.width,
            self.height,
            self.background,
            self.foreground,
            urlencoding::encode(name)
        )
    }
}

/// Caller-owned override state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// Placeholder token -> image URL
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    /// Original trimmed text -> replacement
    #[serde(default)]
    pub text: BTreeMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_asset(&mut self, token: &str, url: impl Into<String>) {
        self.assets.insert(Placeholder::normalize(token), url.into());
    }

    pub fn set_text(&mut self, original: &str, replacement: impl Into<String>) {
        self.text.insert(original.trim().to_string(), replacement.into());
    }

    pub fn clear(&mut self) {
        self.assets.clear();
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.text.is_empty()
    }
}

/// Distinct placeholders in first-seen order
pub fn list_placeholders(markup: &str) -> Vec<Placeholder> {
    let mut seen = HashSet::new();
    PLACEHOLDER_RE
        .captures_iter(markup)
        .filter(|caps| seen.insert(caps[0].to_string()))
        .map(|caps| Placeholder {
            token: caps[0].to_string(),
            name: caps[1].to_string(),
        })
        .collect()
}

/// Distinct trimmed text leaves longer than one character, in first-seen order
pub fn list_text_fragments(markup: &str) -> Vec<String> {
    let doc = Document::parse(markup);
    let mut seen = HashSet::new();
    let mut fragments = Vec::new();
    for leaf in doc.text_leaves() {
        let text = leaf.text();
        let trimmed = text.trim();
        if trimmed.chars().count() > 1 && seen.insert(trimmed.to_string()) {
            fragments.push(trimmed.to_string());
        }
    }
    fragments
}

/// Applies overrides to markup. Pure: equal inputs give equal output.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    fallback: FallbackImage,
}

impl Renderer {
    pub fn new(fallback: FallbackImage) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> &FallbackImage {
        &self.fallback
    }

    pub fn render_with(&self, markup: &str, overrides: &Overrides) -> String {
        self.render(markup, &overrides.assets, &overrides.text)
    }

    pub fn render(
        &self,
        markup: &str,
        asset_overrides: &BTreeMap<String, String>,
        text_overrides: &BTreeMap<String, String>,
    ) -> String {
        // Tokens are bracketed, so a literal match of the whole token can
        // never hit a longer token that shares its prefix.
        let mut document = markup.to_string();
        for (key, url) in asset_overrides {
            let token = Placeholder::normalize(key);
            document = document.replace(&token, url);
        }

        let document = PLACEHOLDER_RE
            .replace_all(&document, |caps: &Captures| self.fallback.url_for(&caps[1]))
            .into_owned();

        if text_overrides.is_empty() {
            return document;
        }
        apply_text_overrides(&document, text_overrides)
    }
}

fn apply_text_overrides(document: &str, text_overrides: &BTreeMap<String, String>) -> String {
    let doc = Document::parse(document);
    let edits: Vec<_> = doc
        .text_leaves()
        .into_iter()
        .filter_map(|leaf| {
            let text = leaf.text();
            let key = text.trim();
            if key.is_empty() {
                return None;
            }
            let replacement = text_overrides.get(key)?;
            Some((
                leaf.span.clone(),
                format!(
                    "{}{}{}",
                    leaf.leading_whitespace(),
                    escape_text(replacement),
                    leaf.trailing_whitespace()
                ),
            ))
        })
        .collect();
    debug!(edits = edits.len(), overrides = text_overrides.len(), "applying text overrides");
    doc.splice(edits)
}
