use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::{ImageReader, RgbaImage};
use thiserror::Error;

/// Decoded tileset image shared by every tile of the tileset.
pub type TileImage = Arc<RgbaImage>;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },
    #[error("asset not found: {0}")]
    NotFound(PathBuf),
}

/// Where tileset descriptions and images come from.
///
/// Implementations are shared with the background level loader, hence
/// `Send + Sync`.
pub trait AssetSource: Send + Sync {
    fn read_text(&self, path: &Path) -> Result<String, AssetError>;
    fn load_image(&self, path: &Path) -> Result<RgbaImage, AssetError>;
}

/// Reads assets relative to a root directory on disk.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl AssetSource for FsAssetSource {
    fn read_text(&self, path: &Path) -> Result<String, AssetError> {
        let full = self.resolve(path);
        std::fs::read_to_string(&full).map_err(|source| AssetError::Io { path: full, source })
    }

    fn load_image(&self, path: &Path) -> Result<RgbaImage, AssetError> {
        let full = self.resolve(path);
        let reader = ImageReader::open(&full).map_err(|source| AssetError::Io {
            path: full.clone(),
            source,
        })?;
        let decoded = reader.decode().map_err(|source| AssetError::Decode {
            path: full.clone(),
            source,
        })?;
        Ok(decoded.to_rgba8())
    }
}

/// In-memory assets keyed by normalized path. Used by tests and by
/// embedders that ship levels inside the binary.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    texts: HashMap<PathBuf, String>,
    images: HashMap<PathBuf, RgbaImage>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.texts
            .insert(normalize_asset_path(path.as_ref()), text.into());
        self
    }

    pub fn with_image(mut self, path: impl AsRef<Path>, image: RgbaImage) -> Self {
        self.images.insert(normalize_asset_path(path.as_ref()), image);
        self
    }
}

impl AssetSource for MemoryAssetSource {
    fn read_text(&self, path: &Path) -> Result<String, AssetError> {
        let key = normalize_asset_path(path);
        self.texts
            .get(&key)
            .cloned()
            .ok_or(AssetError::NotFound(key))
    }

    fn load_image(&self, path: &Path) -> Result<RgbaImage, AssetError> {
        let key = normalize_asset_path(path);
        self.images
            .get(&key)
            .cloned()
            .ok_or(AssetError::NotFound(key))
    }
}

/// Lexically resolves `.` and `..` so that `levels/../tilesets/a.json`
/// and `tilesets/a.json` name the same asset.
pub fn normalize_asset_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path of an asset referenced from `referrer` (e.g. a tileset image named
/// inside a tileset description).
pub fn sibling_asset_path(referrer: &Path, relative: &str) -> PathBuf {
    let base = referrer.parent().unwrap_or_else(|| Path::new(""));
    normalize_asset_path(&base.join(relative))
}
