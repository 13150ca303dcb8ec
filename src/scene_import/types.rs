use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

/// Interchange formats the scene import layer understands. The model layer
/// only ever sees a `SceneData` so this mostly exists to gate format
/// specific post processing.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SceneFormat {
    #[default]
    Gltf,
    Collada,
}

impl SceneFormat {
    /// Collada exports often lack a usable root transform for skinning, so
    /// scenes in that format request the majority rotation repair pass.
    #[must_use]
    pub const fn needs_root_repair(self) -> bool {
        matches!(self, Self::Collada)
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct ImportOptions {
    pub scale: f32,
    pub swizzle: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scale: 1.0f32,
            swizzle: true,
        }
    }
}

/// One external animation file to merge into a loaded model. Without an
/// explicit name the clips are keyed by the filename stem.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct AnimationFile {
    pub filename: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Describes a model together with its external animation files. Usually
/// deserialized from a YAML file living next to the assets.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct ModelManifest {
    pub filename: String,
    #[serde(default)]
    pub options: ImportOptions,
    #[serde(default)]
    pub animations: Vec<AnimationFile>,
    #[serde(default)]
    pub start_clip: Option<String>,
}

/// Flat description of an imported scene. This is the only shape the model
/// layer consumes; importer internals stay behind it. Node index 0 is the
/// root and child/parent references are indices into `nodes`.
#[derive(Clone, Debug, Default)]
pub struct SceneData {
    pub format: SceneFormat,
    pub nodes: Vec<SceneNode>,
    pub meshes: Vec<SceneMesh>,
    pub clips: Vec<SceneClip>,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Bind pose transform relative to the parent
    pub transform: glm::Mat4,
    /// Indices into `SceneData::meshes` for meshes owned by this node
    pub meshes: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct SceneMesh {
    pub name: String,
    pub material_id: Option<usize>,
    pub positions: Vec<[f32; 3]>,
    /// May be empty, in which case normals are calculated from the faces
    pub normals: Vec<[f32; 3]>,
    /// May be empty for meshes without vertex colours
    pub colours: Vec<[f32; 3]>,
    /// May be empty for meshes without UVs
    pub tex_coords: Vec<[f32; 2]>,
    /// Triangle list, relative to this mesh's own vertices
    pub indices: Vec<u32>,
    pub bones: Vec<SceneBone>,
}

#[derive(Clone, Debug)]
pub struct SceneBone {
    pub name: String,
    /// Offset (inverse bind) matrix
    pub offset: glm::Mat4,
    pub weights: Vec<VertexWeight>,
}

#[derive(Clone, Copy, Debug)]
pub struct VertexWeight {
    /// Index into the owning mesh's vertices
    pub vertex: u32,
    pub weight: f32,
}

/// A named clip. Key times and the duration are in clip native ticks. A
/// tick rate of 0.0 means the format did not declare one and the default
/// rate applies.
#[derive(Clone, Debug)]
pub struct SceneClip {
    pub name: String,
    pub duration: f32,
    pub ticks_per_second: f32,
    pub tracks: Vec<SceneTrack>,
    pub mesh_tracks: Vec<SceneMeshTrack>,
}

/// Keyframe samples for one node. The three lists are independent and may
/// have different lengths. Empty lists are filled in from the node's bind
/// pose when the clip is registered with a model.
#[derive(Clone, Debug, Default)]
pub struct SceneTrack {
    pub node_name: String,
    pub scale_keys: Vec<(f32, [f32; 3])>,
    /// Quaternion samples as (x, y, z, w)
    pub rotation_keys: Vec<(f32, [f32; 4])>,
    pub translation_keys: Vec<(f32, [f32; 3])>,
}

/// Mesh level key list, e.g. frame selection for a mesh that swaps
/// geometry over time. Carried through to the clip for the renderer side.
#[derive(Clone, Debug)]
pub struct SceneMeshTrack {
    pub mesh_name: String,
    pub keys: Vec<(f32, u32)>,
}

/// Errors specific to importing data. `CaError` has a `From` trait to
/// handle these.
#[derive(Debug)]
pub enum ImportError {
    General,
    NoTriangles,
    NoIndices,
    NoPositions,
    NoNormals,
    NoWeights,
    NoInverseBind,
    CountMismatch,
    SparseMesh,
    SparseAnimation,
    CubicSpline,
    NoSampler,
    NoRootNode,
    NodeIndexRange(usize),
    MeshIndexRange(usize),
    JointIndexRange(usize),
    VertexIndexRange(usize),
    IndexRange(usize),
    TooManyWeights(usize),
    BadWeightSum(usize),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general import error"),
            Self::NoTriangles => {
                write!(f, "only triangulated meshes are supported")
            }
            Self::NoIndices => {
                write!(f, "only indexed meshes are supported")
            }
            Self::NoPositions => {
                write!(f, "vertex positions are required")
            }
            Self::NoNormals => {
                write!(f, "vertex normals must match the position count")
            }
            Self::NoWeights => {
                write!(f, "vertex weights are required for a skinned mesh")
            }
            Self::NoInverseBind => {
                write!(
                    f,
                    "inverse bind matrices are required for a skinned mesh"
                )
            }
            Self::CountMismatch => {
                write!(f, "there is a mismatch in the count of vertices")
            }
            Self::SparseMesh => {
                write!(f, "sparse mesh data is not supported")
            }
            Self::SparseAnimation => {
                write!(f, "sparse animation data is not supported")
            }
            Self::CubicSpline => {
                write!(f, "cubic spline animation is not supported")
            }
            Self::NoSampler => {
                write!(f, "a sampler is required for animation")
            }
            Self::NoRootNode => write!(f, "the scene has no root node"),
            Self::NodeIndexRange(a) => {
                write!(f, "node {a} references an out of range node")
            }
            Self::MeshIndexRange(a) => {
                write!(f, "node {a} references an out of range mesh")
            }
            Self::JointIndexRange(a) => {
                write!(f, "vertex {a} references an out of range joint")
            }
            Self::VertexIndexRange(a) => {
                write!(f, "bone weight references out of range vertex {a}")
            }
            Self::IndexRange(a) => {
                write!(f, "mesh {a} has an out of range triangle index")
            }
            Self::TooManyWeights(a) => {
                write!(f, "vertex {a} has more than 4 bone influences")
            }
            Self::BadWeightSum(a) => {
                write!(f, "vertex {a} has weights that sum to neither 1 nor 0")
            }
        }
    }
}
