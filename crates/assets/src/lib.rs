//! Read-only asset table: shader sources, meshes and images resolved by name.
//!
//! The table is filled once at load time and then handed to the renderer,
//! which resolves every name it needs exactly once. Nothing downstream keeps
//! string keys around.
//!
//! Decoding model files is outside this crate; meshes come from the built-in
//! generators. Images may be replaced from a directory of PNG/JPEG/BMP files.

mod image_data;
mod mesh;

pub use image_data::ImageData;
pub use mesh::{MeshData, Vertex};

use std::collections::BTreeMap;
use std::path::Path;

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image of {width}x{height} does not fit in memory")]
    Dimensions { width: u32, height: u32 },
    #[error("{kind} asset not found: {name}")]
    NotFound { kind: &'static str, name: String },
}

/// Name-keyed storage for everything the scene needs before upload.
#[derive(Debug, Clone, Default)]
pub struct AssetTable {
    shaders: BTreeMap<String, String>,
    meshes: BTreeMap<String, MeshData>,
    images: BTreeMap<String, ImageData>,
}

/// Image extensions tried, in order, by [`AssetTable::load_images_from_dir`].
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Procedural meshes and textures for the reference track.
    ///
    /// Shader sources are backend specific and must be inserted separately.
    pub fn builtin() -> Result<Self, AssetError> {
        let mut table = Self::new();
        table.insert_mesh("ground", MeshData::plane([0.0, 0.0], [500.0, 500.0]));
        table.insert_mesh("hero", MeshData::cube());
        table.insert_mesh("obstacle", MeshData::cube());
        table.insert_mesh("finish", MeshData::plane([0.0, 0.0], [1.0, 1.0]));

        table.insert_image(
            "ground",
            ImageData::checker(64, 4, [214, 196, 150, 255], [190, 170, 122, 255])?,
        );
        table.insert_image(
            "hero",
            ImageData::checker(32, 2, [200, 40, 40, 255], [150, 20, 20, 255])?,
        );
        table.insert_image(
            "obstacle",
            ImageData::checker(32, 4, [240, 140, 20, 255], [30, 30, 30, 255])?,
        );
        table.insert_image(
            "finish",
            ImageData::checker(64, 8, [255, 255, 255, 255], [0, 0, 0, 255])?,
        );
        Ok(table)
    }

    pub fn insert_shader(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.shaders.insert(name.into(), source.into());
    }

    pub fn insert_mesh(&mut self, name: impl Into<String>, mesh: MeshData) {
        self.meshes.insert(name.into(), mesh);
    }

    pub fn insert_image(&mut self, name: impl Into<String>, image: ImageData) {
        self.images.insert(name.into(), image);
    }

    pub fn shader(&self, name: &str) -> Result<&str, AssetError> {
        self.shaders
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| not_found("shader", name))
    }

    pub fn mesh(&self, name: &str) -> Result<&MeshData, AssetError> {
        self.meshes.get(name).ok_or_else(|| not_found("mesh", name))
    }

    pub fn image(&self, name: &str) -> Result<&ImageData, AssetError> {
        self.images.get(name).ok_or_else(|| not_found("image", name))
    }

    /// Number of registered assets of all kinds.
    pub fn len(&self) -> usize {
        self.shaders.len() + self.meshes.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace registered images with files named `<name>.<ext>` in `dir`.
    ///
    /// Names without a matching file keep their current image. Returns the
    /// names that were replaced.
    pub fn load_images_from_dir(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>, AssetError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AssetError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            )));
        }

        let mut replaced = Vec::new();
        let names: Vec<String> = self.images.keys().cloned().collect();
        for name in names {
            let Some(path) = IMAGE_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{name}.{ext}")))
                .find(|p| p.is_file())
            else {
                continue;
            };
            let image = ImageData::open(&path)?;
            tracing::debug!(%name, path = %path.display(), "loaded image override");
            self.images.insert(name.clone(), image);
            replaced.push(name);
        }
        Ok(replaced)
    }
}

fn not_found(kind: &'static str, name: &str) -> AssetError {
    AssetError::NotFound {
        kind,
        name: name.to_string(),
    }
}
