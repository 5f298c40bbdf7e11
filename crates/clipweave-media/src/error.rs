use clipweave_core::error::CoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    InvalidTimeline(#[from] CoreError),

    #[error("failed to decode media for clip {clip_id}: {message}")]
    MediaDecodeFailure { clip_id: Uuid, message: String },

    #[error("export cancelled")]
    Cancelled,

    #[error(
        "audio block is {found_rate} Hz/{found_channels}ch, output is {expected_rate} Hz/{expected_channels}ch"
    )]
    IncompatibleAudioConfiguration {
        expected_rate: u32,
        expected_channels: u16,
        found_rate: u32,
        found_channels: u16,
    },

    #[error("muxer produced no output")]
    EncoderFinalizeFailure,

    #[error("failed to open media: {0}")]
    OpenFailed(String),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("no audio stream found")]
    NoAudioStream,

    #[error("decoder error: {0}")]
    DecoderError(String),

    #[error("seek error: {0}")]
    SeekError(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("text rendering error: {0}")]
    Text(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub(crate) fn decode_failure(clip_id: Uuid, err: impl std::fmt::Display) -> Self {
        Self::MediaDecodeFailure {
            clip_id,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
