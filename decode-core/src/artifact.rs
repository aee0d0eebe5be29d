//! Artifact - Generated Markup, Style and Script
//!
//! Field names on the wire follow the generator's reply shape
//! (`html`, `css`, `javascript`).

use serde::{Deserialize, Serialize};

use crate::hashing::compute_content_hash;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "html")]
    pub markup: String,
    #[serde(rename = "css", default)]
    pub style: String,
    #[serde(rename = "javascript", default)]
    pub script: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPart {
    Markup,
    Style,
    Script,
}

impl ArtifactPart {
    pub const ALL: [ArtifactPart; 3] = [ArtifactPart::Markup, ArtifactPart::Style, ArtifactPart::Script];

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactPart::Markup => "html",
            ArtifactPart::Style => "css",
            ArtifactPart::Script => "js",
        }
    }
}

impl Artifact {
    pub fn new(
        markup: impl Into<String>,
        style: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            style: style.into(),
            script: script.into(),
        }
    }

    pub fn part(&self, part: ArtifactPart) -> &str {
        match part {
            ArtifactPart::Markup => &self.markup,
            ArtifactPart::Style => &self.style,
            ArtifactPart::Script => &self.script,
        }
    }

    /// Replace one blob wholesale
    pub fn with_part(&self, part: ArtifactPart, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        let value = value.into();
        match part {
            ArtifactPart::Markup => next.markup = value,
            ArtifactPart::Style => next.style = value,
            ArtifactPart::Script => next.script = value,
        }
        next
    }

    /// Content hash over the JSON wire form
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        compute_content_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let artifact: Artifact =
            serde_json::from_str(r#"{"html":"<section></section>","css":"<style></style>"}"#).unwrap();
        assert_eq!(artifact.markup, "<section></section>");
        assert_eq!(artifact.script, "");

        let json = serde_json::to_value(&artifact).unwrap();
        assert!(json.get("javascript").is_some());
    }

    #[test]
    fn test_with_part_leaves_original() {
        let original = Artifact::new("<p>a</p>", "", "");
        let edited = original.with_part(ArtifactPart::Markup, "<p>b</p>");
        assert_eq!(original.markup, "<p>a</p>");
        assert_eq!(edited.part(ArtifactPart::Markup), "<p>b</p>");
        assert_ne!(original.fingerprint().unwrap(), edited.fingerprint().unwrap());
    }
}
