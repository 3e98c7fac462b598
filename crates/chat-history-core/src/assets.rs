//! Read-only lookup of image files that accompany image messages.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

const FALLBACK_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp"];
const THUMB_SUFFIX: &str = "_thumb";

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct AssetPaths {
    pub image_path: Option<String>,
    pub image_thumb_path: Option<String>,
}

impl AssetPaths {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_path.is_none() && self.image_thumb_path.is_none()
    }
}

/// Probes one account's image directory for `<id><ext>` and `<id>_thumb<ext>`.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    images_dir: PathBuf,
    display_base: Option<PathBuf>,
}

impl AssetResolver {
    #[must_use]
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self { images_dir: images_dir.into(), display_base: None }
    }

    /// Render found paths relative to `base` when they live under it.
    #[must_use]
    pub fn with_display_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.display_base = Some(base.into());
        self
    }

    #[must_use]
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Find the primary image and thumbnail for `identifier`; first match wins
    /// per category and a miss leaves the field empty.
    #[must_use]
    pub fn resolve(&self, identifier: &str, mime_type: Option<&str>) -> AssetPaths {
        if !is_safe_identifier(identifier) || !self.images_dir.is_dir() {
            return AssetPaths::default();
        }

        let extensions = candidate_extensions(mime_type);
        let mut image = extensions
            .iter()
            .map(|ext| self.images_dir.join(format!("{identifier}{ext}")))
            .find(|path| path.is_file());
        let mut thumb = extensions
            .iter()
            .map(|ext| self.images_dir.join(format!("{identifier}{THUMB_SUFFIX}{ext}")))
            .find(|path| path.is_file());

        if image.is_none() || thumb.is_none() {
            for path in self.prefixed_entries(identifier) {
                let name = path.file_name().map(|name| name.to_string_lossy().into_owned());
                let is_thumb = name.is_some_and(|name| name.contains(THUMB_SUFFIX));
                if is_thumb {
                    if thumb.is_none() {
                        thumb = Some(path);
                    }
                } else if image.is_none() && path.is_file() {
                    image = Some(path);
                }
            }
        }

        AssetPaths {
            image_path: image.map(|path| self.display(&path)),
            image_thumb_path: thumb.map(|path| self.display(&path)),
        }
    }

    fn prefixed_entries(&self, identifier: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.images_dir) else {
            return Vec::new();
        };
        let mut paths = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(identifier))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    fn display(&self, path: &Path) -> String {
        let shown = self
            .display_base
            .as_deref()
            .and_then(|base| path.strip_prefix(base).ok())
            .unwrap_or(path);
        shown.to_string_lossy().into_owned()
    }
}

fn candidate_extensions(mime_type: Option<&str>) -> Vec<String> {
    let mut extensions: Vec<String> = Vec::new();
    if let Some((_, subtype)) = mime_type.and_then(|mime| mime.rsplit_once('/')) {
        if !subtype.is_empty() {
            extensions.push(format!(".{}", subtype.to_ascii_lowercase()));
        }
    }
    for ext in FALLBACK_EXTENSIONS {
        if !extensions.iter().any(|seen| seen == ext) {
            extensions.push(ext.to_string());
        }
    }
    extensions
}

fn is_safe_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.contains(['/', '\\'])
        && !identifier.contains("..")
}
