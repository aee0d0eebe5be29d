//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations. Errors block; warnings are recorded.
//! Uploads are checked before the optimizer runs. Generated artifacts are
//! checked against the generator contract (section root, wrapped style and
//! script blocks) and only ever warn.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::markup::Document;
use crate::optimizer::PSD_SIGNATURE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<ValidationViolation>) -> Self {
        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        Self { valid, violations }
    }

    pub fn has_errors(&self) -> bool {
        !self.valid
    }

    /// "rule: message" for every violation, joined
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule<T: ?Sized> {
    fn name(&self) -> &'static str;
    fn validate(&self, subject: &T) -> Vec<ValidationViolation>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_accepted_formats")]
    pub accepted_formats: Vec<String>,
}

fn default_max_file_size_mb() -> u64 { 100 }
fn default_accepted_formats() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp", "psd"].iter().map(|s| s.to_string()).collect()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            accepted_formats: default_accepted_formats(),
        }
    }
}

/// What is known about an uploaded file before decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInput {
    #[serde(default)]
    pub file_name: Option<String>,
    pub size_bytes: u64,
    /// Format recognized from the leading bytes
    #[serde(default)]
    pub detected_format: Option<String>,
}

impl UploadInput {
    pub fn from_bytes(file_name: Option<&str>, bytes: &[u8]) -> Self {
        let detected_format = if bytes.starts_with(PSD_SIGNATURE) {
            Some("psd".to_string())
        } else {
            image::guess_format(bytes)
                .ok()
                .and_then(|format| format.extensions_str().first().copied())
                .map(str::to_string)
        };
        Self {
            file_name: file_name.map(str::to_string),
            size_bytes: bytes.len() as u64,
            detected_format,
        }
    }

    fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }
}

// --- Upload Rules ---

pub struct AcceptedFormatRule {
    accepted: Vec<String>,
}

impl ValidationRule<UploadInput> for AcceptedFormatRule {
    fn name(&self) -> &'static str { "accepted_format" }

    fn validate(&self, input: &UploadInput) -> Vec<ValidationViolation> {
        let actual = input.detected_format.clone().or_else(|| input.extension());
        let accepted = actual
            .as_deref()
            .map_or(false, |fmt| self.accepted.iter().any(|a| same_format(a, fmt)));
        if accepted && input.detected_format.is_some() {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: "Unsupported image type".to_string(),
            expected: Some(self.accepted.join(", ")),
            actual: Some(actual.unwrap_or_else(|| "unknown".to_string())),
            remediation: vec!["Upload a PNG, JPG, WEBP or PSD file".to_string()],
        }]
    }
}

/// `jpg` and `jpeg` name the same format
fn same_format(a: &str, b: &str) -> bool {
    let canonical = |s: &str| {
        let lower = s.trim().trim_start_matches('.').to_ascii_lowercase();
        if lower == "jpeg" { "jpg".to_string() } else { lower }
    };
    canonical(a) == canonical(b)
}

pub struct FileSizeRule {
    max_bytes: u64,
}

impl ValidationRule<UploadInput> for FileSizeRule {
    fn name(&self) -> &'static str { "file_size" }

    fn validate(&self, input: &UploadInput) -> Vec<ValidationViolation> {
        if input.size_bytes <= self.max_bytes {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: "File too large".to_string(),
            expected: Some(format!("<= {} bytes", self.max_bytes)),
            actual: Some(format!("{} bytes", input.size_bytes)),
            remediation: vec!["Export the design at a smaller size".to_string()],
        }]
    }
}

// --- Artifact Rules ---

pub struct SectionRootRule;

impl ValidationRule<Artifact> for SectionRootRule {
    fn name(&self) -> &'static str { "section_root" }

    fn validate(&self, artifact: &Artifact) -> Vec<ValidationViolation> {
        let doc = Document::parse(&artifact.markup);
        let root = doc.root_element();
        let tag = root.and_then(|n| n.tag());
        let has_class = root
            .and_then(|n| n.attribute("class"))
            .map_or(false, |c| !c.trim().is_empty());

        if tag == Some("section") && has_class {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Warning,
            message: "Markup should start with a classed <section>".to_string(),
            expected: Some("<section class=\"...\">".to_string()),
            actual: Some(tag.map_or_else(|| "no element".to_string(), |t| format!("<{}>", t))),
            remediation: vec!["Regenerate or wrap the markup in a uniquely classed section".to_string()],
        }]
    }
}

/// Non-empty style/script blobs must be wrapped in their tags
pub struct WrappedBlockRule;

impl ValidationRule<Artifact> for WrappedBlockRule {
    fn name(&self) -> &'static str { "wrapped_block" }

    fn validate(&self, artifact: &Artifact) -> Vec<ValidationViolation> {
        let mut violations = vec![];
        for (blob, tag) in [(&artifact.style, "style"), (&artifact.script, "script")] {
            let trimmed = blob.trim();
            if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with(&format!("<{}", tag)) {
                continue;
            }
            violations.push(ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: format!("{} block is not wrapped in <{}> tags", tag, tag),
                expected: Some(format!("<{}>...</{}>", tag, tag)),
                actual: Some(trimmed.chars().take(24).collect()),
                remediation: vec![format!("Wrap the {} in <{}> tags", tag, tag)],
            });
        }
        violations
    }
}

/// Validator orchestrates rules for one subject type
pub struct Validator<T: ?Sized> {
    rules: Vec<Box<dyn ValidationRule<T>>>,
}

impl<T: ?Sized> Validator<T> {
    pub fn new(rules: Vec<Box<dyn ValidationRule<T>>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, subject: &T) -> ValidationResult {
        let violations = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(subject))
            .collect();
        ValidationResult::from_violations(violations)
    }
}

impl Validator<UploadInput> {
    pub fn for_uploads(config: &UploadConfig) -> Self {
        Self::new(vec![
            Box::new(AcceptedFormatRule {
                accepted: config.accepted_formats.clone(),
            }),
            Box::new(FileSizeRule {
                max_bytes: config.max_file_size_mb * 1024 * 1024,
            }),
        ])
    }
}

impl Validator<Artifact> {
    pub fn for_artifacts() -> Self {
        Self::new(vec![Box::new(SectionRootRule), Box::new(WrappedBlockRule)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_png_upload_accepted() {
        let input = UploadInput::from_bytes(Some("design.png"), PNG_MAGIC);
        assert_eq!(input.detected_format.as_deref(), Some("png"));
        let result = Validator::for_uploads(&UploadConfig::default()).validate(&input);
        assert!(result.valid, "{}", result.summary());
    }

    #[test]
    fn test_unknown_content_rejected_even_with_good_extension() {
        let input = UploadInput::from_bytes(Some("design.png"), b"plain text");
        let result = Validator::for_uploads(&UploadConfig::default()).validate(&input);
        assert!(!result.valid);
        assert_eq!(result.violations[0].rule, "accepted_format");
        assert_eq!(result.violations[0].actual.as_deref(), Some("png"));
    }

    #[test]
    fn test_psd_upload_detected_and_accepted() {
        let input = UploadInput::from_bytes(Some("mockup.PSD"), b"8BPS\x00\x01\x00\x00");
        assert_eq!(input.detected_format.as_deref(), Some("psd"));
        assert!(Validator::for_uploads(&UploadConfig::default()).validate(&input).valid);
    }

    #[test]
    fn test_jpeg_alias_accepted() {
        let config = UploadConfig {
            accepted_formats: vec!["jpeg".to_string()],
            ..UploadConfig::default()
        };
        let input = UploadInput::from_bytes(Some("photo.jpeg"), &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0]);
        assert_eq!(input.detected_format.as_deref(), Some("jpg"));
        assert!(Validator::for_uploads(&config).validate(&input).valid);
    }

    #[test]
    fn test_gif_rejected_by_default() {
        let input = UploadInput::from_bytes(Some("anim.gif"), b"GIF89a\x01\x00\x01\x00");
        assert!(!Validator::for_uploads(&UploadConfig::default()).validate(&input).valid);
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let config = UploadConfig {
            max_file_size_mb: 0,
            ..UploadConfig::default()
        };
        let input = UploadInput::from_bytes(None, PNG_MAGIC);
        let result = Validator::for_uploads(&config).validate(&input);
        assert!(result.has_errors());
        assert!(result.summary().contains("file_size"));
    }

    #[test]
    fn test_artifact_contract_warnings_do_not_block() {
        let artifact = Artifact::new("<div>loose</div>", ".a{}", "<script></script>");
        let result = Validator::for_artifacts().validate(&artifact);
        assert!(result.valid);
        let rules: Vec<_> = result.violations.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(rules, vec!["section_root", "wrapped_block"]);
    }

    #[test]
    fn test_conforming_artifact_is_clean() {
        let artifact = Artifact::new(
            "<!-- generated -->\n<section class=\"section-x\"><p>Hi</p></section>",
            "<style>.section-x p{}</style>",
            "",
        );
        assert!(Validator::for_artifacts().validate(&artifact).violations.is_empty());
    }
}
