//! Preview & Export - Standalone Page and Per-Part Files
//!
//! The preview page wraps rendered markup with the libraries the generator
//! assumes (Bootstrap 5, Font Awesome, Slick, jQuery) and the chosen font.
//! Exports are the three parts as files, each with a SHA-256 hash.

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactPart};
use crate::hashing::sha256_hex;

pub const MAX_SECTION_WIDTH_PX: u32 = 1350;

pub fn google_font_url(typography: &str) -> String {
    format!(
        "https://fonts.googleapis.com/css2?family={}:wght@300;400;500;600;700;800&display=swap",
        typography.trim().replace(' ', "+")
    )
}

/// Full HTML page for viewing an artifact outside the app
pub fn preview_document(artifact: &Artifact, rendered_markup: &str, typography: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css" rel="stylesheet">
  <link href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css" rel="stylesheet">
  <link href="{font_url}" rel="stylesheet">
  <link rel="stylesheet" type="text/css" href="https://cdn.jsdelivr.net/npm/slick-carousel@1.8.1/slick/slick.css">
  <link rel="stylesheet" type="text/css" href="https://cdn.jsdelivr.net/npm/slick-carousel@1.8.1/slick/slick-theme.css">
  <style>
    body {{ padding: 40px; background-color: #f8fafc; display: flex; justify-content: center; margin: 0; }}
    .preview-container {{ width: 100%; max-width: {width}px; font-family: '{font}', sans-serif; }}
    .container {{ margin-right: auto; margin-left: auto; padding-left: 15px; padding-right: 15px; max-width: {width}px; }}
    @media (max-width: 768px) {{
      body {{ padding: 10px; }}
      .preview-container, .container {{ max-width: 100%; }}
    }}
  </style>
  {style}
</head>
<body>
  <div class="preview-container">{markup}</div>
  <script src="https://code.jquery.com/jquery-3.6.0.min.js"></script>
  <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js"></script>
  <script type="text/javascript" src="https://cdn.jsdelivr.net/npm/slick-carousel@1.8.1/slick/slick.min.js"></script>
  {script}
</body>
</html>"#,
        font_url = google_font_url(typography),
        font = typography,
        width = MAX_SECTION_WIDTH_PX,
        style = artifact.style,
        markup = rendered_markup,
        script = artifact.script,
    )
}

/// Style blob with the section wrapper rule added before the first `</style>`
pub fn style_with_typography(style: &str, typography: &str) -> String {
    let rule = format!(
        "  .section-wrapper {{ font-family: '{}', sans-serif; max-width: {}px; margin: 0 auto; }}\n",
        typography, MAX_SECTION_WIDTH_PX
    );
    match style.find("</style>") {
        Some(index) => format!("{}{}{}", &style[..index], rule, &style[index..]),
        None if style.trim().is_empty() => format!("<style>\n{}</style>", rule),
        None => format!("{}\n{}", style, rule),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedFile {
    pub part: ArtifactPart,
    pub filename: String,
    pub content: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub files: Vec<ExportedFile>,
}

impl ExportBundle {
    pub fn file(&self, part: ArtifactPart) -> Option<&ExportedFile> {
        self.files.iter().find(|f| f.part == part)
    }
}

/// The code a user copies out: rendered markup, style with typography, script
pub fn export_bundle(
    artifact: &Artifact,
    rendered_markup: &str,
    typography: &str,
    basename: &str,
) -> ExportBundle {
    let files = ArtifactPart::ALL
        .iter()
        .map(|&part| {
            let content = match part {
                ArtifactPart::Markup => rendered_markup.to_string(),
                ArtifactPart::Style => style_with_typography(&artifact.style, typography),
                ArtifactPart::Script => artifact.script.clone(),
            };
            ExportedFile {
                part,
                filename: format!("{}.{}", basename, part.extension()),
                hash: sha256_hex(content.as_bytes()),
                content,
            }
        })
        .collect();
    ExportBundle { files }
}

/// File-system friendly name derived from a display name
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { "section".to_string() } else { slug }
}
