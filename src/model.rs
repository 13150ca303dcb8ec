pub mod animation;
pub mod controller;
pub mod data;
pub mod mesh;
pub mod node;
pub mod repair;

// Re-exports
pub use {
    animation::{AnimationClip, MeshKey, NodeTrack, QuatKey, VectorKey},
    controller::{Controller, Playback},
    data::{Bone, ModelData},
    mesh::Mesh,
    node::{Node, NodeTree},
};

use crate::{
    ca_error::CaError,
    scene_import::{self, ImportOptions, SceneData},
    types::BoundingBox,
    vertex::{Attributes, Position},
};
use log::{info, warn};
use nalgebra_glm as glm;
use std::path::Path;

/// Everything the renderer needs to draw one submesh
#[derive(Clone, Copy, Debug)]
pub struct SubmeshDraw {
    pub world: glm::Mat4,
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub material_id: Option<usize>,
}

/// Borrowed view of the per frame output. Valid only after `update` has
/// returned for the frame; the arrays are fully overwritten by the next
/// update.
pub struct FrameData<'a> {
    pub positions: &'a [Position],
    pub attributes: &'a [Attributes],
    pub indices: &'a [u32],
    pub skin_matrices: &'a [glm::Mat4],
    pub draws: Vec<SubmeshDraw>,
}

/// Top level façade owning the storage, the node tree and the playback
/// state for one model. Everything is built once at load time; the per
/// frame arrays are overwritten by each `update`.
#[derive(Default)]
pub struct Model {
    data: ModelData,
    tree: NodeTree,
    controller: Controller,
    loaded: bool,
    repair_pending: bool,
    seconds: f32,
    prev_root: Option<glm::Vec3>,
    distance: f32,
    render_warned: bool,
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a model from a scene file. On failure the model stays not
    /// loaded and rendering skips it.
    ///
    /// # Errors
    /// May return `CaError`
    pub fn load(
        &mut self,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<(), CaError> {
        let scene = scene_import::load(path, options)?;
        self.load_scene(&scene)
    }

    /// Builds the model from an already imported scene
    ///
    /// # Errors
    /// May return `CaError`
    pub fn load_scene(&mut self, scene: &SceneData) -> Result<(), CaError> {
        let tree = NodeTree::from_scene(scene)?;
        let data = ModelData::from_scene(scene, &tree)?;
        self.controller = Controller::new(&tree, &data);
        self.tree = tree;
        self.data = data;
        self.loaded = true;
        self.repair_pending = scene.format.needs_root_repair();
        self.seconds = 0.0f32;
        self.prev_root = None;
        self.distance = 0.0f32;
        self.render_warned = false;
        info!(
            "Loaded model: {} nodes, {} meshes, {} bone slots, {} clips",
            self.tree.len(),
            self.data.meshes.len(),
            self.data.bones.len(),
            self.data.clips.len(),
        );
        Ok(())
    }

    /// Loads a model and its external animation files as described by a
    /// YAML manifest
    ///
    /// # Errors
    /// May return `CaError`
    pub fn load_manifest(&mut self, path: &Path) -> Result<(), CaError> {
        let manifest = scene_import::load_manifest(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        self.load(&base.join(&manifest.filename), &manifest.options)?;
        for af in &manifest.animations {
            self.merge_animations(
                &base.join(&af.filename),
                &manifest.options,
                af.name.as_deref(),
            )?;
        }
        if let Some(start) = &manifest.start_clip {
            self.set_animation_by_name(start, 0.0f32);
        }
        Ok(())
    }

    /// Merges the clips of an external animation file into this model.
    /// Clips are keyed by `name` (suffixed when the file holds several)
    /// or by the filename stem.
    ///
    /// # Errors
    /// May return `CaError`
    pub fn merge_animations(
        &mut self,
        path: &Path,
        options: &ImportOptions,
        name: Option<&str>,
    ) -> Result<(), CaError> {
        if !self.loaded {
            return Err(CaError::NotLoaded);
        }
        let clips = scene_import::gltf_file::load_animations(path, options)?;
        let stem = path
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        let count = clips.len();
        for (i, mut sc) in clips.into_iter().enumerate() {
            let key = name.map_or_else(|| stem.clone(), ToString::to_string);
            sc.name = if count > 1 {
                format!("{key}.{i}")
            } else {
                key
            };
            let clip = AnimationClip::from_scene(&sc, |node| {
                self.tree.bind_pose(node).unwrap_or_default()
            });
            self.data.register_clip(clip);
        }
        info!("Merged {count} clips from {path:?}");
        Ok(())
    }

    /// Advances the animation clock and recomputes every per frame
    /// transform array. Call once per frame before the renderer reads the
    /// output.
    pub fn update(&mut self, seconds: f32) {
        if !self.loaded {
            return;
        }
        self.seconds = seconds;
        self.controller.update(&mut self.data, &self.tree, seconds);
        self.tree.propagate(&mut self.data);
        if self.repair_pending {
            self.data.root_correction = repair::root_correction(&self.data);
            self.repair_pending = false;
        }
        self.track_distance();
    }

    /// Accumulates how far the root node has travelled in world space
    fn track_distance(&mut self) {
        let w = &self.data.node_worlds[0];
        let root = glm::vec3(w[(0, 3)], w[(1, 3)], w[(2, 3)]);
        if let Some(prev) = self.prev_root {
            self.distance += glm::distance(&prev, &root);
        }
        self.prev_root = Some(root);
    }

    /// The per frame output for the renderer, or `None` (with a one time
    /// log) when the model is not loaded
    pub fn render(&mut self) -> Option<FrameData<'_>> {
        if !self.loaded {
            if !self.render_warned {
                warn!("render skipped: model is not loaded");
                self.render_warned = true;
            }
            return None;
        }
        let draws = self
            .data
            .meshes
            .iter()
            .filter(|m| m.visible)
            .map(|m| SubmeshDraw {
                world: self.data.node_worlds[m.node],
                first_index: m.first_index,
                index_count: m.index_count,
                vertex_offset: m.vertex_offset,
                material_id: m.material_id,
            })
            .collect();
        Some(FrameData {
            positions: &self.data.buffers.positions,
            attributes: &self.data.buffers.attributes,
            indices: &self.data.buffers.indices,
            skin_matrices: &self.data.skin_matrices,
            draws,
        })
    }

    /// Starts a crossfade toward the clip with this index. Unknown ids
    /// are reported and ignored.
    pub fn set_animation(&mut self, index: usize, transition_seconds: f32) {
        if !self.loaded {
            warn!("set_animation on a model that is not loaded");
            return;
        }
        self.controller.set_animation(
            &self.data,
            &self.tree,
            index,
            transition_seconds,
            self.seconds,
        );
    }

    /// Starts a crossfade toward the clip with this name. Unknown names
    /// are reported and ignored.
    pub fn set_animation_by_name(
        &mut self,
        name: &str,
        transition_seconds: f32,
    ) {
        if let Some(index) = self.data.find_clip(name) {
            self.set_animation(index, transition_seconds);
        } else {
            warn!("unknown clip name {name}");
        }
    }

    /// Crossfades to the next clip in load order, wrapping at the end
    pub fn next_animation(&mut self, transition_seconds: f32) {
        let count = self.data.clips.len();
        if count == 0 {
            warn!("next_animation with no clips loaded");
            return;
        }
        let next = (self.controller.current_clip() + 1) % count;
        self.set_animation(next, transition_seconds);
    }

    /// World space distance the root node has travelled since loading
    #[must_use]
    pub const fn distance_travelled(&self) -> f32 {
        self.distance
    }

    /// Shows or hides a submesh by name. Unknown names are reported and
    /// ignored.
    pub fn set_mesh_visible(&mut self, name: &str, visible: bool) {
        if let Some(index) = self.data.mesh_index(name) {
            self.data.meshes[index].visible = visible;
        } else {
            warn!("unknown mesh name {name}");
        }
    }

    #[must_use]
    pub const fn bounding_box(&self) -> BoundingBox {
        self.data.bounds
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub const fn playback(&self) -> &Playback {
        &self.controller.state
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.data.clips.len()
    }

    #[must_use]
    pub fn clip_names(&self) -> Vec<&str> {
        self.data.clips.iter().map(|c| c.name.as_str()).collect()
    }

    /// Last evaluated local transform per node, for skeleton debug
    /// rendering
    #[must_use]
    pub fn local_transforms(&self) -> &[glm::Mat4] {
        &self.data.node_locals
    }

    /// World transform per node
    #[must_use]
    pub fn world_transforms(&self) -> &[glm::Mat4] {
        &self.data.node_worlds
    }

    /// Computed skin matrix per bone slot
    #[must_use]
    pub fn skin_matrices(&self) -> &[glm::Mat4] {
        &self.data.skin_matrices
    }
}
