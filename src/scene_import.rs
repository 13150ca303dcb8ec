pub mod gltf_file;
mod types;

// Re-exports
pub use types::{
    AnimationFile, ImportError, ImportOptions, ModelManifest, SceneBone,
    SceneClip, SceneData, SceneFormat, SceneMesh, SceneMeshTrack, SceneNode,
    SceneTrack, VertexWeight,
};

use crate::ca_error::CaError;
use log::info;
use std::{fs, path::Path};

/// Loads a scene from a file. Currently everything is attempted as glTF;
/// other interchange formats arrive through `SceneData` built by an
/// external importer.
///
/// # Errors
/// May return `CaError`
pub fn load(
    path: &Path,
    options: &ImportOptions,
) -> Result<SceneData, CaError> {
    gltf_file::load(path, options)
}

/// Loads a model manifest from a YAML file
///
/// # Errors
/// May return `CaError`
pub fn load_manifest(path: &Path) -> Result<ModelManifest, CaError> {
    let text = fs::read_to_string(path)?;
    let manifest: ModelManifest = serde_yaml::from_str(&text)?;
    if manifest.filename.is_empty() {
        return Err(CaError::InvalidFile);
    }
    info!(
        "Manifest {:?}: model={}, animation files={}",
        path,
        manifest.filename,
        manifest.animations.len()
    );
    Ok(manifest)
}
