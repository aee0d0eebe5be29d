//! Decode Core - Design to Code Customization Engine
//!
//! # Components
//! 1. Template substitution: placeholders and text overrides over generated markup
//! 2. Image payload optimizer: size-bounded JPEG for the generator
//! 3. Artifact history: bounded, newest-first, edit-in-place versions
//!
//! The generator itself is an opaque collaborator behind [`CodeGenerator`].

pub mod artifact;
pub mod config;
pub mod generation;
pub mod hashing;
pub mod history;
pub mod markup;
pub mod optimizer;
pub mod preview;
pub mod session;
pub mod templates;
pub mod validation;

pub use artifact::{Artifact, ArtifactPart};
pub use config::StudioConfig;
pub use generation::{CodeGenerator, GenerationError, GenerationRequest, HttpGenerator};
pub use hashing::{compute_content_hash, sha256_hex};
pub use history::{EntryDraft, HistoryEntry, HistoryStore, PersistentHistory};
pub use optimizer::{ImageOptimizer, OptimizeError, OptimizedImage, OptimizerConfig};
pub use session::{Session, SessionError};
pub use templates::{list_placeholders, list_text_fragments, Overrides, Placeholder, Renderer};
pub use validation::{ValidationResult, ValidationViolation, ViolationSeverity};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
