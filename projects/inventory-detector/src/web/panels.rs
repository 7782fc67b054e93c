use crate::pipeline::surface::{ImageSource, PresentationSurface};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// URL prefix under which the engine output root is served.
pub const ARTIFACT_ROUTE: &str = "/artifacts";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Panel {
    Image { caption: String, src: String },
    Text { text: String },
    Error { message: String },
}

/// Surface that records panels in order for the dashboard to render.
#[derive(Debug)]
pub struct PanelSurface {
    artifact_root: PathBuf,
    panels: Vec<Panel>,
}

impl PanelSurface {
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            panels: Vec::new(),
        }
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn into_panels(self) -> Vec<Panel> {
        self.panels
    }
}

impl PresentationSurface for PanelSurface {
    fn show_image(&mut self, image: ImageSource, caption: &str) {
        let src = match image {
            ImageSource::Bytes { mime, data } => {
                format!("data:{};base64,{}", mime, STANDARD.encode(data))
            }
            ImageSource::Path(path) => match artifact_url(&self.artifact_root, &path) {
                Some(url) => url,
                None => {
                    tracing::warn!("Refusing to expose {:?} outside the artifact root", path);
                    self.show_error(&format!("{} is not available", caption));
                    return;
                }
            },
        };
        self.panels.push(Panel::Image {
            caption: caption.to_string(),
            src,
        });
    }

    fn show_text(&mut self, text: &str) {
        self.panels.push(Panel::Text {
            text: text.to_string(),
        });
    }

    fn show_error(&mut self, message: &str) {
        self.panels.push(Panel::Error {
            message: message.to_string(),
        });
    }
}

/// Map a file under `root` to its URL on the artifact route.
pub fn artifact_url(root: &Path, path: &Path) -> Option<String> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let relative = path.strip_prefix(&root).ok()?;

    let mut url = String::from(ARTIFACT_ROUTE);
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                url.push('/');
                url.push_str(part.to_str()?);
            }
            _ => return None,
        }
    }
    if url.len() == ARTIFACT_ROUTE.len() {
        return None;
    }
    Some(url)
}
