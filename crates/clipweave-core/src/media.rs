use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// What kind of samples a media asset provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

/// An imported source file. Assets are never mutated by editing; clips
/// reference them by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAsset {
    pub id: Uuid,
    pub name: String,
    pub kind: MediaKind,
    /// Opaque handle handed to the media I/O layer (usually a file path).
    pub source: PathBuf,
    /// Duration reported by the probe. Images report zero.
    pub duration_hint: Duration,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub has_audio: bool,
}

impl MediaAsset {
    pub fn new(name: impl Into<String>, kind: MediaKind, source: PathBuf, duration_hint: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            source,
            duration_hint,
            width: None,
            height: None,
            fps: None,
            has_audio: kind == MediaKind::Audio,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    /// Pixel dimensions, if the asset is visual and was probed.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    pub fn is_visual(&self) -> bool {
        matches!(self.kind, MediaKind::Video | MediaKind::Image)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SourceLibrary {
    assets: Vec<MediaAsset>,
}

impl SourceLibrary {
    pub fn new() -> Self {
        Self { assets: Vec::new() }
    }

    pub fn import(&mut self, asset: MediaAsset) -> Uuid {
        let id = asset.id;
        self.assets.push(asset);
        id
    }

    pub fn remove(&mut self, id: Uuid) -> Result<MediaAsset> {
        let idx = self
            .assets
            .iter()
            .position(|a| a.id == id)
            .ok_or(CoreError::AssetNotFound(id))?;
        Ok(self.assets.remove(idx))
    }

    pub fn get(&self, id: Uuid) -> Option<&MediaAsset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn assets(&self) -> &[MediaAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
