//! Calluna is an experimental skeletal animation library. It loads a
//! hierarchical mesh from an interchange format, builds a skinning
//! capable bone hierarchy, and evaluates time varying bone transforms
//! every frame, including crossfade blending between named clips.
//!
//! The renderer is an external collaborator. Calluna produces flat
//! vertex attribute streams, a per frame skin matrix array, and a world
//! transform per submesh, and expects them to be read only after
//! `Model::update` has returned for the frame.
pub mod ca_error;
pub mod model;
pub mod scene_import;
pub mod trs;
pub mod types;
pub mod vertex;

// Re-exports
pub use {
    ca_error::CaError,
    model::{FrameData, Model, SubmeshDraw},
    scene_import::{ImportOptions, SceneData, SceneFormat},
    types::{BoundingBox, DEFAULT_TICKS_PER_SECOND, MAX_WEIGHTS},
};
