pub mod audio;
pub mod decoder;
pub mod encoder;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod progress;
pub mod renderer;
pub mod text;

pub use error::{MediaError, Result};
pub use renderer::{CancellationToken, ExportJob, ExportOutput, render_timeline};
