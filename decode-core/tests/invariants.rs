//! Contract Invariant Tests
//!
//! Guarantees that hold across modules: rendering, payload sizing, history.

use std::collections::BTreeMap;
use std::io::Cursor;

use decode_core::history::JsonFileBackend;
use decode_core::{
    Artifact, CodeGenerator, EntryDraft, GenerationError, GenerationRequest, HistoryStore,
    ImageOptimizer, OptimizerConfig, PersistentHistory, Renderer, Session, SessionError,
    StudioConfig,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

fn draft(name: &str) -> EntryDraft {
    EntryDraft {
        display_name: name.to_string(),
        artifact: Artifact::new(format!("<section><h2>{}</h2></section>", name), "", ""),
        thumbnail: String::new(),
        typography: "Inter".to_string(),
    }
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height).write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Always fails, as an unreachable generator would
struct DownGenerator;

impl CodeGenerator for DownGenerator {
    fn generate(&self, _request: &GenerationRequest) -> Result<Artifact, GenerationError> {
        Err(GenerationError::Transport("connection refused".to_string()))
    }
}

// --- Substitution ---

#[test]
fn invariant_render_is_deterministic() {
    let renderer = Renderer::default();
    let markup = r#"<section><h2> Title </h2><img src="{{ASSET_ID_A}}"><img src="{{ASSET_ID_B}}"></section>"#;
    let mut assets = BTreeMap::new();
    assets.insert("{{ASSET_ID_A}}".to_string(), "https://cdn.example/a.png".to_string());
    let mut text = BTreeMap::new();
    text.insert("Title".to_string(), "Headline".to_string());

    let first = renderer.render(markup, &assets, &text);
    let second = renderer.render(markup, &assets, &text);
    assert_eq!(first, second);
}

#[test]
fn invariant_no_unresolved_token_survives_render() {
    let renderer = Renderer::default();
    let markup = r#"<div><img src="{{ASSET_ID_HERO}}"><img src="{{ASSET_ID_LOGO_DARK}}"></div>"#;
    let out = renderer.render(markup, &BTreeMap::new(), &BTreeMap::new());

    assert!(!out.contains("{{ASSET_ID_"));
    assert!(out.contains("text=HERO"));
    assert!(out.contains("text=LOGO_DARK"));
}

#[test]
fn invariant_token_override_never_touches_longer_token() {
    let renderer = Renderer::default();
    let markup = r#"<img src="{{ASSET_ID_A}}"><img src="{{ASSET_ID_AB}}">"#;
    let mut assets = BTreeMap::new();
    assets.insert("{{ASSET_ID_A}}".to_string(), "https://cdn.example/a.png".to_string());

    let out = renderer.render(markup, &assets, &BTreeMap::new());
    assert!(out.contains(r#"<img src="https://cdn.example/a.png">"#));
    assert!(out.contains("text=AB"));
    assert!(!out.contains("a.pngB"));
}

#[test]
fn invariant_text_override_keeps_surrounding_whitespace() {
    let renderer = Renderer::default();
    let markup = "<p>\n    Learn more\n  </p>";
    let mut text = BTreeMap::new();
    text.insert("Learn more".to_string(), "Read on".to_string());

    let out = renderer.render(markup, &BTreeMap::new(), &text);
    assert_eq!(out, "<p>\n    Read on\n  </p>");
}

// --- Payload ---

#[test]
fn invariant_payload_never_upscales_and_respects_caps() {
    let optimizer = ImageOptimizer::default();
    let payload = optimizer.optimize_image(&gradient(3000, 4000)).unwrap();

    assert!(payload.width <= 3000 && payload.height <= 4000);
    assert!(payload.width <= 1600);
    assert!(payload.height <= 4096);
    assert!((payload.width as u64) * (payload.height as u64) <= 4_000_000);
    assert!(payload.within_budget);
    assert!(payload.size_bytes <= 3 * 1024 * 1024);
}

#[test]
fn invariant_small_image_keeps_native_size() {
    let payload = ImageOptimizer::default().optimize(&png_bytes(120, 80)).unwrap();
    assert_eq!((payload.width, payload.height), (120, 80));
}

#[test]
fn invariant_payload_is_soft_bounded() {
    let optimizer = ImageOptimizer::new(OptimizerConfig {
        byte_budget: 64,
        ..OptimizerConfig::default()
    });
    let payload = optimizer.optimize_image(&gradient(400, 300)).unwrap();

    // Best effort result is still returned and flagged
    assert!(!payload.bytes.is_empty());
    assert_eq!(payload.within_budget, payload.size_bytes <= 64);
    assert!(payload.width <= 400 && payload.height <= 300);
}

// --- History ---

#[test]
fn invariant_capacity_drops_oldest() {
    let capacity = 5;
    let mut store = HistoryStore::new(capacity);
    for i in 0..=capacity {
        store.upsert_at(draft(&format!("e{}", i)), None, i as i64);
    }

    let names: Vec<_> = store.all().iter().map(|e| e.display_name.as_str()).collect();
    assert_eq!(names, vec!["e5", "e4", "e3", "e2", "e1"]);
}

#[test]
fn invariant_default_store_holds_fifty() {
    let mut store = HistoryStore::default();
    for i in 0..=50 {
        store.upsert_at(draft(&format!("e{}", i)), None, i as i64);
    }

    let entries = store.all();
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0].display_name, "e50");
    assert_eq!(entries[49].display_name, "e1");
    assert!(entries.iter().all(|e| e.display_name != "e0"));
}

#[test]
fn invariant_edit_in_place_keeps_single_entry_at_front() {
    let mut store = HistoryStore::new(50);
    store.upsert_at(draft("a"), None, 1);
    store.upsert_at(draft("b"), None, 2);
    store.upsert_at(draft("c"), None, 3);
    let target = store.all()[2].id.clone();

    let entries = store.upsert_at(draft("a2"), Some(&target), 4);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].id, target);
    assert_eq!(entries[0].display_name, "a2");
    assert_eq!(entries.iter().filter(|e| e.id == target).count(), 1);
}

#[test]
fn invariant_removing_unknown_id_is_noop() {
    let mut store = HistoryStore::new(50);
    store.upsert_at(draft("a"), None, 1);
    store.upsert_at(draft("b"), None, 2);
    let before = store.all().to_vec();

    assert_eq!(store.remove("no-such-id"), before.as_slice());
}

#[test]
fn invariant_failed_generation_leaves_history_untouched() {
    let mut session = Session::new(
        &StudioConfig::default(),
        DownGenerator,
        PersistentHistory::in_memory(50),
    );
    session.attach_image(Some("design.png"), png_bytes(64, 48)).unwrap();

    let result = session.generate(false);
    assert!(matches!(result, Err(SessionError::Generation(_))));
    assert!(session.history().is_empty());
    assert!(session.editing_id().is_none());
    assert!(session.active().is_none());
}

#[test]
fn invariant_persisted_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let saved_id = {
        let mut history = PersistentHistory::open(Box::new(JsonFileBackend::new(&path)), 50).unwrap();
        history.upsert(draft("first"), None).unwrap();
        history.upsert(draft("second"), None).unwrap().id.clone()
    };

    let reopened = PersistentHistory::open(Box::new(JsonFileBackend::new(&path)), 50).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.all()[0].id, saved_id);
    assert_eq!(reopened.all()[1].display_name, "first");
}
