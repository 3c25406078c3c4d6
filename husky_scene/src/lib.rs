#![forbid(unsafe_code)]

pub mod metadata;
pub mod scene_file;

pub use metadata::SceneMetadata;
pub use scene_file::{ParseError, SceneFile, SceneRecord};
