pub mod commands;
pub mod effects;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod media;
pub mod overlay;
pub mod pipeline;
pub mod preview;
pub mod resolver;
pub mod settings;
pub mod timeline;
pub mod transition;
