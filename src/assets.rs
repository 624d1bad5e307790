// Asset resolution
//
// Assets are addressed by a namespaced identifier and live under
// <root>/<namespace>/assets/<kind dir>/<name><kind ext>.

use crate::error::RendererError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Namespaced asset name, written `namespace:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Identifier {
    namespace: String,
    name: String,
}

impl Identifier {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for Identifier {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(RendererError::InvalidIdentifier(s.to_string())),
        }
    }
}

impl TryFrom<String> for Identifier {
    type Error = RendererError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Shader,
    // Resolvable, but nothing loads textures yet
    #[allow(dead_code)]
    Texture,
}

impl AssetKind {
    fn directory(self) -> &'static str {
        match self {
            AssetKind::Shader => "shaders",
            AssetKind::Texture => "textures",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            AssetKind::Shader => "glsl",
            AssetKind::Texture => "png",
        }
    }
}

/// Filesystem-backed asset lookup rooted at a single directory.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve_path(&self, id: &Identifier, kind: AssetKind) -> PathBuf {
        self.root
            .join(id.namespace())
            .join("assets")
            .join(kind.directory())
            .join(format!("{}.{}", id.name(), kind.extension()))
    }

    pub fn read_bytes(&self, id: &Identifier, kind: AssetKind) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve_path(id, kind);
        if !path.is_file() {
            return Err(RendererError::AssetNotFound(path).into());
        }

        log::debug!("Reading {:?} asset {} from {:?}", kind, id, path);
        let bytes = std::fs::read(&path)?;
        Ok(bytes)
    }
}
