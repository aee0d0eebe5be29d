//! Session - Upload, Generate, Customize, Save
//!
//! Owns the caller-side state that the engines themselves never hold: the
//! active artifact, override maps, the id being edited, section name and
//! typography. A failed generation never touches history.

use base64::Engine;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactPart};
use crate::config::StudioConfig;
use crate::generation::{CodeGenerator, GenerationError, GenerationRequest};
use crate::history::{EntryDraft, HistoryEntry, HistoryError, PersistentHistory, DEFAULT_TYPOGRAPHY};
use crate::optimizer::{ImageOptimizer, OptimizeError};
use crate::preview::{export_bundle, preview_document, slugify, ExportBundle};
use crate::templates::{list_placeholders, list_text_fragments, Overrides, Placeholder, Renderer};
use crate::validation::{UploadInput, ValidationResult, Validator};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("No image attached")]
    NoImage,

    #[error("No active artifact")]
    NoArtifact,

    #[error("History entry not found: {0}")]
    EntryNotFound(String),

    #[error("Image could not be processed: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// The design image currently driving generation
#[derive(Debug, Clone)]
struct SourceImage {
    bytes: Vec<u8>,
}

pub struct Session<G: CodeGenerator> {
    generator: G,
    optimizer: ImageOptimizer,
    renderer: Renderer,
    upload_validator: Validator<UploadInput>,
    artifact_validator: Validator<Artifact>,
    history: PersistentHistory,

    source: Option<SourceImage>,
    active: Option<Artifact>,
    overrides: Overrides,
    editing_id: Option<String>,
    section_name: String,
    guidance: String,
    typography: String,
}

impl<G: CodeGenerator> Session<G> {
    pub fn new(config: &StudioConfig, generator: G, history: PersistentHistory) -> Self {
        Self {
            generator,
            optimizer: ImageOptimizer::new(config.optimizer.clone()),
            renderer: Renderer::new(config.placeholder.clone()),
            upload_validator: Validator::for_uploads(&config.upload),
            artifact_validator: Validator::for_artifacts(),
            history,
            source: None,
            active: None,
            overrides: Overrides::new(),
            editing_id: None,
            section_name: String::new(),
            guidance: String::new(),
            typography: DEFAULT_TYPOGRAPHY.to_string(),
        }
    }

    // --- Inputs ---

    /// Validate and keep an uploaded design image
    pub fn attach_image(
        &mut self,
        file_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<ValidationResult, SessionError> {
        let input = UploadInput::from_bytes(file_name, &bytes);
        let result = self.upload_validator.validate(&input);
        if !result.valid {
            return Err(SessionError::UploadRejected(result.summary()));
        }
        self.source = Some(SourceImage { bytes });
        Ok(result)
    }

    pub fn set_section_name(&mut self, name: impl Into<String>) {
        self.section_name = name.into();
    }

    pub fn set_guidance(&mut self, guidance: impl Into<String>) {
        self.guidance = guidance.into();
    }

    /// Add a line to the guidance
    pub fn append_guidance(&mut self, text: &str) {
        if self.guidance.is_empty() {
            self.guidance = text.to_string();
        } else {
            self.guidance = format!("{}\n{}", self.guidance, text);
        }
    }

    pub fn set_typography(&mut self, typography: impl Into<String>) {
        self.typography = typography.into();
    }

    pub fn set_asset(&mut self, token: &str, url: impl Into<String>) {
        self.overrides.set_asset(token, url);
    }

    pub fn set_text(&mut self, original: &str, replacement: impl Into<String>) {
        self.overrides.set_text(original, replacement);
    }

    /// Replace one part of the active artifact by hand. Not saved until the next generation.
    pub fn edit_part(&mut self, part: ArtifactPart, value: impl Into<String>) -> Result<(), SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoArtifact)?;
        self.active = Some(active.with_part(part, value));
        Ok(())
    }

    // --- Generation ---

    /// Optimize the attached image, call the generator and save the result.
    ///
    /// With `refine` the active artifact is sent along for modification.
    /// Saving goes to the entry being edited, if any.
    pub fn generate(&mut self, refine: bool) -> Result<&HistoryEntry, SessionError> {
        let source = self.source.as_ref().ok_or(SessionError::NoImage)?;
        let payload = self.optimizer.optimize(&source.bytes)?;

        let request = GenerationRequest {
            image_payload: payload.data_url(),
            guidance: self.guidance.clone(),
            previous: if refine { self.active.clone() } else { None },
        };
        let artifact = self.generator.generate(&request).map_err(|e| {
            warn!(error = %e, "generation failed, history untouched");
            e
        })?;

        let contract = self.artifact_validator.validate(&artifact);
        if !contract.violations.is_empty() {
            warn!(violations = %contract.summary(), "artifact deviates from generator contract");
        }

        let draft = EntryDraft {
            display_name: self.display_name(),
            artifact: artifact.clone(),
            thumbnail: payload.data_url(),
            typography: self.typography.clone(),
        };

        let editing_id = self.editing_id.clone();
        let entry = self.history.upsert(draft, editing_id.as_deref())?;
        info!(id = %entry.id, refine, "generation saved");
        self.active = Some(artifact);
        self.editing_id = Some(entry.id.clone());
        self.section_name = entry.display_name.clone();
        Ok(entry)
    }

    fn display_name(&self) -> String {
        let name = self.section_name.trim();
        if name.is_empty() {
            format!("Section {}", self.history.len() + 1)
        } else {
            name.to_string()
        }
    }

    // --- History ---

    /// Make a saved entry active. Overrides start empty.
    pub fn load(&mut self, id: &str) -> Result<(), SessionError> {
        let entry = self
            .history
            .get(id)
            .ok_or_else(|| SessionError::EntryNotFound(id.to_string()))?
            .clone();

        self.source = decode_data_url(&entry.thumbnail).map(|bytes| SourceImage { bytes });
        self.active = Some(entry.artifact);
        self.section_name = entry.display_name;
        self.typography = entry.typography;
        self.editing_id = Some(entry.id);
        self.overrides.clear();
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<&[HistoryEntry], SessionError> {
        if self.editing_id.as_deref() == Some(id) {
            self.editing_id = None;
        }
        Ok(self.history.remove(id)?)
    }

    /// Back to a blank slate. History is kept.
    pub fn reset(&mut self) {
        self.source = None;
        self.active = None;
        self.overrides.clear();
        self.editing_id = None;
        self.section_name.clear();
        self.guidance.clear();
    }

    // --- Views ---

    pub fn history(&self) -> &[HistoryEntry] {
        self.history.all()
    }

    pub fn active(&self) -> Option<&Artifact> {
        self.active.as_ref()
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn placeholders(&self) -> Vec<Placeholder> {
        self.active
            .as_ref()
            .map(|a| list_placeholders(&a.markup))
            .unwrap_or_default()
    }

    pub fn text_fragments(&self) -> Vec<String> {
        self.active
            .as_ref()
            .map(|a| list_text_fragments(&a.markup))
            .unwrap_or_default()
    }

    pub fn rendered_markup(&self) -> Result<String, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoArtifact)?;
        Ok(self.renderer.render_with(&active.markup, &self.overrides))
    }

    pub fn preview(&self) -> Result<String, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoArtifact)?;
        let rendered = self.rendered_markup()?;
        Ok(preview_document(active, &rendered, &self.typography))
    }

    pub fn export(&self) -> Result<ExportBundle, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoArtifact)?;
        let rendered = self.rendered_markup()?;
        let basename = slugify(&self.display_name());
        Ok(export_bundle(active, &rendered, &self.typography, &basename))
    }
}

/// Bytes of a base64 `data:` URL; `None` for links or bad encoding
fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (header, data) = url.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage};

    use crate::history::HistoryBackend;

    /// Replays canned replies and records requests
    struct ScriptedGenerator {
        replies: RefCell<Vec<Result<Artifact, GenerationError>>>,
        requests: RefCell<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<Artifact, GenerationError>>) -> Self {
            Self {
                replies: RefCell::new(replies),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl CodeGenerator for ScriptedGenerator {
        fn generate(&self, request: &GenerationRequest) -> Result<Artifact, GenerationError> {
            self.requests.borrow_mut().push(request.clone());
            self.replies.borrow_mut().remove(0)
        }
    }

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, image::Rgb([10, 120, 200])));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn artifact(title: &str) -> Artifact {
        Artifact::new(
            format!("<section class=\"s\"><h2>{}</h2><img src=\"{{{{ASSET_ID_HERO}}}}\"></section>", title),
            "<style>.s h2{}</style>",
            "",
        )
    }

    fn session(replies: Vec<Result<Artifact, GenerationError>>) -> Session<ScriptedGenerator> {
        Session::new(
            &StudioConfig::default(),
            ScriptedGenerator::new(replies),
            PersistentHistory::in_memory(50),
        )
    }

    #[test]
    fn test_generate_saves_and_tracks_editing_id() {
        let mut s = session(vec![Ok(artifact("One")), Ok(artifact("Two"))]);
        s.attach_image(Some("design.png"), png()).unwrap();

        let first_id = s.generate(false).unwrap().id.clone();
        assert_eq!(s.history()[0].display_name, "Section 1");
        assert!(s.history()[0].thumbnail.starts_with("data:image/jpeg;base64,"));
        assert_eq!(s.editing_id(), Some(first_id.as_str()));

        let second = s.generate(true).unwrap();
        assert_eq!(second.id, first_id);
        assert_eq!(s.history().len(), 1);
        assert!(s.history()[0].artifact.markup.contains("Two"));

        let requests = s.generator.requests.borrow();
        assert!(requests[0].previous.is_none());
        assert!(requests[1].previous.as_ref().unwrap().markup.contains("One"));
    }

    #[test]
    fn test_failed_generation_does_not_upsert() {
        let mut s = session(vec![Err(GenerationError::EmptyResponse)]);
        s.attach_image(None, png()).unwrap();
        let err = s.generate(false).unwrap_err();
        assert!(matches!(err, SessionError::Generation(_)));
        assert!(s.history().is_empty());
        assert!(s.active().is_none());
    }

    struct FullDisk;

    impl HistoryBackend for FullDisk {
        fn load(&self) -> Result<Option<String>, HistoryError> {
            Ok(None)
        }

        fn save(&mut self, _serialized: &str) -> Result<(), HistoryError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
    }

    #[test]
    fn test_failed_save_keeps_session_consistent() {
        let history = PersistentHistory::open(Box::new(FullDisk), 50).unwrap();
        let generator = ScriptedGenerator::new(vec![Ok(artifact("One")), Ok(artifact("Two"))]);
        let mut s = Session::new(&StudioConfig::default(), generator, history);
        s.attach_image(None, png()).unwrap();

        assert!(matches!(s.generate(false), Err(SessionError::History(_))));
        assert!(matches!(s.generate(true), Err(SessionError::History(_))));
        assert!(s.history().is_empty());
        assert!(s.editing_id().is_none());
        assert!(s.active().is_none());
    }

    #[test]
    fn test_generate_without_image() {
        let mut s = session(vec![]);
        assert!(matches!(s.generate(false), Err(SessionError::NoImage)));
    }

    #[test]
    fn test_rejected_upload() {
        let mut s = session(vec![]);
        let err = s.attach_image(Some("notes.txt"), b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, SessionError::UploadRejected(_)));
    }

    #[test]
    fn test_load_restores_entry_and_clears_overrides() {
        let mut s = session(vec![Ok(artifact("Saved"))]);
        s.attach_image(None, png()).unwrap();
        s.set_section_name("Hero");
        s.set_typography("Poppins");
        let id = s.generate(false).unwrap().id.clone();

        s.reset();
        s.set_text("Saved", "Edited");
        assert!(s.active().is_none());

        s.load(&id).unwrap();
        assert!(s.overrides().is_empty());
        assert_eq!(s.editing_id(), Some(id.as_str()));
        assert_eq!(s.text_fragments(), vec!["Saved"]);
        assert!(s.preview().unwrap().contains("family=Poppins"));
        // the thumbnail doubles as the source image for refinement
        assert!(s.source.is_some());
    }

    #[test]
    fn test_render_views_apply_overrides() {
        let mut s = session(vec![Ok(artifact("Title"))]);
        s.attach_image(None, png()).unwrap();
        s.generate(false).unwrap();

        assert_eq!(s.placeholders()[0].token, "{{ASSET_ID_HERO}}");
        s.set_asset("HERO", "https://img.test/h.png");
        s.set_text("Title", "New Title");
        let rendered = s.rendered_markup().unwrap();
        assert!(rendered.contains("<h2>New Title</h2>"));
        assert!(rendered.contains("https://img.test/h.png"));
        assert!(s.active().unwrap().markup.contains("{{ASSET_ID_HERO}}"));

        let bundle = s.export().unwrap();
        assert_eq!(bundle.file(ArtifactPart::Markup).unwrap().filename, "section-1.html");
    }

    #[test]
    fn test_delete_active_entry_clears_editing_id() {
        let mut s = session(vec![Ok(artifact("A"))]);
        s.attach_image(None, png()).unwrap();
        let id = s.generate(false).unwrap().id.clone();
        assert!(s.delete(&id).unwrap().is_empty());
        assert!(s.editing_id().is_none());
        assert!(s.delete("missing").unwrap().is_empty());
    }

    #[test]
    fn test_append_guidance() {
        let mut s = session(vec![]);
        s.append_guidance("first");
        s.append_guidance("second");
        assert_eq!(s.guidance, "first\nsecond");
    }

    #[test]
    fn test_edit_part_requires_artifact() {
        let mut s = session(vec![]);
        assert!(matches!(s.edit_part(ArtifactPart::Style, ""), Err(SessionError::NoArtifact)));
    }
}
