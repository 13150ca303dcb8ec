use super::{animation::AnimationClip, mesh::Mesh, node::NodeTree};
use crate::{
    scene_import::{ImportError, SceneData, SceneMesh},
    types::{BoundingBox, MAX_WEIGHTS, WEIGHT_SUM_EPSILON},
    vertex::{Attributes, Buffers, Position},
};
use ahash::HashMap;
use itertools::Itertools;
use log::{error, warn};
use nalgebra_glm as glm;
use smallvec::SmallVec;

/// A bone slot: a flat array entry used to deform mesh vertices. The name
/// ties it to a node; the offset matrix moves a rest position into bone
/// space. One name may own several slots when independent submeshes
/// reference a same-named bone, each with its own offset matrix.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub offset: glm::Mat4,
}

/// Shared storage for everything one loaded model owns: the vertex
/// streams, submeshes, bone slots, per frame transform arrays, animation
/// clips and the name lookup tables. The per frame arrays are fully
/// overwritten by each update before the renderer reads them.
#[derive(Default)]
pub struct ModelData {
    pub buffers: Buffers,
    pub meshes: Vec<Mesh>,
    mesh_lookup: HashMap<String, usize>,
    pub bones: Vec<Bone>,
    /// Computed world space skin matrix per bone slot, parallel to `bones`
    pub skin_matrices: Vec<glm::Mat4>,
    bone_slots: HashMap<String, SmallVec<[usize; 2]>>,
    /// Last evaluated local transform per node, consumed by skeleton
    /// debug rendering
    pub node_locals: Vec<glm::Mat4>,
    /// World transform per node, consumed as the submesh world transform
    pub node_worlds: Vec<glm::Mat4>,
    pub clips: Vec<AnimationClip>,
    clip_lookup: HashMap<String, usize>,
    /// Correction applied to every skin matrix, identity unless the
    /// majority rotation repair pass has run
    pub root_correction: glm::Mat4,
    pub bounds: BoundingBox,
}

impl ModelData {
    /// Builds the storage from the interchange shape: fills the vertex
    /// streams, accumulates bone influences per vertex, checks the weight
    /// sum invariant and registers the clips.
    ///
    /// # Errors
    /// May return `ImportError`
    #[allow(clippy::too_many_lines)]
    pub fn from_scene(
        scene: &SceneData,
        tree: &NodeTree,
    ) -> Result<Self, ImportError> {
        let mut data = Self {
            node_locals: vec![glm::Mat4::identity(); tree.len()],
            node_worlds: vec![glm::Mat4::identity(); tree.len()],
            root_correction: glm::Mat4::identity(),
            ..Self::default()
        };

        // Owning node per mesh, for the submesh world transform
        let mut owners: Vec<Option<usize>> = vec![None; scene.meshes.len()];
        for i in 0..tree.len() {
            for &m in &tree.node(i).meshes {
                owners[m] = Some(i);
            }
        }

        let mut first_index = 0u32;
        let mut vertex_offset = 0u32;
        for (mi, sm) in scene.meshes.iter().enumerate() {
            let vert_count = sm.positions.len();
            data.append_vertices(sm, vert_count)?;

            // Bone slots and per vertex influences
            for sb in &sm.bones {
                let slot = data.bones.len();
                let slot_id = u32::try_from(slot)
                    .map_err(|_| ImportError::General)?;
                data.bones.push(Bone {
                    name: sb.name.clone(),
                    offset: sb.offset,
                });
                data.bone_slots
                    .entry(sb.name.clone())
                    .or_default()
                    .push(slot);
                for w in &sb.weights {
                    let v = w.vertex as usize;
                    if v >= vert_count {
                        return Err(ImportError::VertexIndexRange(v));
                    }
                    let global = vertex_offset as usize + v;
                    add_influence(
                        &mut data.buffers.attributes[global],
                        slot_id,
                        w.weight,
                        global,
                    )?;
                }
            }

            // Indices are kept mesh local; the submesh carries the offset
            for &i in &sm.indices {
                if i as usize >= vert_count {
                    return Err(ImportError::IndexRange(mi));
                }
                data.buffers.indices.push(i);
            }

            let index_count = u32::try_from(sm.indices.len())
                .map_err(|_| ImportError::General)?;
            let vertex_count = u32::try_from(vert_count)
                .map_err(|_| ImportError::General)?;
            let owner = owners[mi].unwrap_or_else(|| {
                warn!("mesh {} is not owned by any node", sm.name);
                0
            });
            if data
                .mesh_lookup
                .insert(sm.name.clone(), data.meshes.len())
                .is_some()
            {
                warn!("duplicate mesh name {}", sm.name);
            }
            data.meshes.push(Mesh {
                name: sm.name.clone(),
                first_index,
                index_count,
                vertex_offset,
                vertex_count,
                material_id: sm.material_id,
                node: owner,
                visible: true,
            });
            first_index += index_count;
            vertex_offset += vertex_count;
        }

        data.skin_matrices =
            vec![glm::Mat4::identity(); data.bones.len()];
        data.validate_weights()?;

        for sc in &scene.clips {
            let clip = AnimationClip::from_scene(sc, |name| {
                tree.bind_pose(name).unwrap_or_default()
            });
            data.register_clip(clip);
        }

        data.reset_locals_to_bind(tree);
        Ok(data)
    }

    /// Appends one mesh's vertices to the shared streams
    fn append_vertices(
        &mut self,
        sm: &SceneMesh,
        vert_count: usize,
    ) -> Result<(), ImportError> {
        let normals = if sm.normals.is_empty() {
            calculate_normals(&sm.indices, &sm.positions)
        } else if sm.normals.len() == vert_count {
            sm.normals.clone()
        } else {
            return Err(ImportError::NoNormals);
        };
        if !sm.colours.is_empty() && sm.colours.len() != vert_count {
            return Err(ImportError::CountMismatch);
        }
        if !sm.tex_coords.is_empty() && sm.tex_coords.len() != vert_count {
            return Err(ImportError::CountMismatch);
        }

        for i in 0..vert_count {
            let p = sm.positions[i];
            self.bounds.include(&glm::vec3(p[0], p[1], p[2]));
            self.buffers.positions.push(Position { position: p });
            self.buffers.attributes.push(Attributes {
                normal: normals[i],
                colour: sm.colours.get(i).copied().unwrap_or_default(),
                tex_coord: sm.tex_coords.get(i).copied().unwrap_or_default(),
                ..Attributes::default()
            });
        }
        Ok(())
    }

    /// Confirms that every vertex's accumulated weights sum to ~1.0
    /// (weighted) or ~0.0 (static). A violation means malformed authored
    /// content, so the load fails.
    fn validate_weights(&self) -> Result<(), ImportError> {
        for (i, a) in self.buffers.attributes.iter().enumerate() {
            let sum: f32 = a.bone_weights.iter().sum();
            if (sum - 1.0f32).abs() > WEIGHT_SUM_EPSILON
                && sum.abs() > WEIGHT_SUM_EPSILON
            {
                error!("vertex {i} weight sum {sum} is invalid");
                return Err(ImportError::BadWeightSum(i));
            }
        }
        Ok(())
    }

    /// Registers a clip under its name, returning its index. A repeated
    /// name replaces the lookup entry but keeps the older clip reachable
    /// by index.
    pub fn register_clip(&mut self, clip: AnimationClip) -> usize {
        let index = self.clips.len();
        if self
            .clip_lookup
            .insert(clip.name.clone(), index)
            .is_some()
        {
            warn!("duplicate clip name {}", clip.name);
        }
        self.clips.push(clip);
        index
    }

    #[must_use]
    pub fn find_clip(&self, name: &str) -> Option<usize> {
        self.clip_lookup.get(name).copied()
    }

    #[must_use]
    pub fn mesh_index(&self, name: &str) -> Option<usize> {
        self.mesh_lookup.get(name).copied()
    }

    #[must_use]
    pub fn slots_for(&self, bone_name: &str) -> Option<&[usize]> {
        self.bone_slots.get(bone_name).map(SmallVec::as_slice)
    }

    /// Writes the skin matrix for every bone slot carrying this name:
    /// `skin = correction * world * offset`
    pub(crate) fn write_skin_matrices(
        &mut self,
        node_name: &str,
        world: &glm::Mat4,
    ) {
        let Self {
            bone_slots,
            skin_matrices,
            bones,
            root_correction,
            ..
        } = self;
        if let Some(slots) = bone_slots.get(node_name) {
            for &slot in slots {
                skin_matrices[slot] =
                    *root_correction * world * bones[slot].offset;
            }
        }
    }

    /// Fills the per node local transforms with the bind pose
    pub fn reset_locals_to_bind(&mut self, tree: &NodeTree) {
        for i in 0..tree.len() {
            self.node_locals[i] = tree.node(i).local_bind;
        }
    }
}

fn add_influence(
    attr: &mut Attributes,
    slot_id: u32,
    weight: f32,
    vertex: usize,
) -> Result<(), ImportError> {
    for k in 0..MAX_WEIGHTS {
        if attr.bone_weights[k] == 0.0f32 {
            attr.bone_ids[k] = slot_id;
            attr.bone_weights[k] = weight;
            return Ok(());
        }
    }
    error!("vertex {vertex} has too many bone influences");
    Err(ImportError::TooManyWeights(vertex))
}

/// Calculates vertex normals from the faces for meshes that arrive
/// without them. Face normals are left unnormalized while accumulating so
/// larger faces weigh more, which is not necessarily correct but maybe it
/// is good enough.
fn calculate_normals(
    indices: &[u32],
    positions: &[[f32; 3]],
) -> Vec<[f32; 3]> {
    let mut normals = vec![glm::Vec3::zeros(); positions.len()];
    for (i0, i1, i2) in indices.iter().tuples() {
        let v0: glm::Vec3 = positions[*i0 as usize].into();
        let v1: glm::Vec3 = positions[*i1 as usize].into();
        let v2: glm::Vec3 = positions[*i2 as usize].into();
        let face = glm::cross(&(v0 - v1), &(v1 - v2));
        normals[*i0 as usize] += face;
        normals[*i1 as usize] += face;
        normals[*i2 as usize] += face;
    }
    normals
        .into_iter()
        .map(|n| {
            if glm::length(&n) > 0.0f32 {
                glm::normalize(&n).into()
            } else {
                [0.0f32, 0.0f32, 0.0f32]
            }
        })
        .collect()
}
