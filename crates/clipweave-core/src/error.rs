use thiserror::Error;
use uuid::Uuid;

use crate::timeline::{TimelinePosition, TrackKind};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid timeline state: {reason}")]
    InvalidTimelineState { reason: String },

    #[error("clip not found: {0}")]
    ClipNotFound(Uuid),

    #[error("track not found: {0}")]
    TrackNotFound(Uuid),

    #[error("media asset not found: {0}")]
    AssetNotFound(Uuid),

    #[error("text overlay not found: {0}")]
    OverlayNotFound(Uuid),

    #[error("transition not found: {0}")]
    TransitionNotFound(Uuid),

    #[error("track {0} is locked")]
    TrackLocked(Uuid),

    #[error("clip kind does not belong on a {track_kind:?} track")]
    TrackKindMismatch { track_kind: TrackKind },

    #[error("clip overlap detected at timeline position {position:?}")]
    ClipOverlap { position: TimelinePosition },

    #[error("trim leaves no visible length: trim_start {trim_start:?} + trim_end {trim_end:?} >= duration {duration:?}")]
    InvalidTrim {
        trim_start: std::time::Duration,
        trim_end: std::time::Duration,
        duration: std::time::Duration,
    },

    #[error("split position {position:?} is outside clip bounds")]
    SplitOutsideClip { position: TimelinePosition },

    #[error("clip {0} cannot have its audio detached")]
    NotDetachable(Uuid),

    #[error("clip {0} has both crop and transform set")]
    CropTransformConflict(Uuid),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidTimelineState {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
