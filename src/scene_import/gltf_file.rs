// Some code inspired by
// https://github.com/KhronosGroup/glTF-Tutorials/

use super::types::{
    ImportError, ImportOptions, SceneBone, SceneClip, SceneData, SceneFormat,
    SceneMesh, SceneNode, SceneTrack, VertexWeight,
};
use crate::{
    ca_error::CaError,
    trs::Trs,
    types::DEFAULT_TICKS_PER_SECOND,
};
use ahash::{HashMap, HashMapExt};
use gltf::{
    accessor::Dimensions,
    animation::util::ReadOutputs,
    buffer::{self, Data},
    mesh::util::{ReadIndices, ReadNormals, ReadPositions},
    mesh::Mode,
    Document, Gltf, Node, Primitive, Semantic,
};
use log::{error, info, warn};
use nalgebra_glm as glm;
use std::{fs, io, path::Path};

/// Per vertex joint influences as read from the file, kept mesh local
/// until the skin that owns them is known
type JointData = Vec<([u16; 4], [f32; 4])>;

// Validate a glTF primitive for compatibility. Returns index and vertex
// count.
fn validate(p: &Primitive) -> Result<(usize, usize), ImportError> {
    // Mesh must be made of indexed triangles
    if p.mode() != Mode::Triangles {
        error!("Not a triangle mesh");
        return Err(ImportError::NoTriangles);
    }
    let indices = p.indices().ok_or(ImportError::NoIndices)?;
    let idx_count = indices.count();

    // Positions are required
    let positions =
        p.get(&Semantic::Positions).ok_or(ImportError::NoPositions)?;
    let vert_count = positions.count();

    // Normals are required. There must be the same number of normals as
    // there are positions.
    let normals = p.get(&Semantic::Normals).ok_or(ImportError::NoNormals)?;
    if normals.count() != vert_count {
        return Err(ImportError::NoNormals);
    }

    // Texture coordinates (UVs) are optional, but if they are provided they
    // must be in Vec2 and the same number as there are positions
    if let Some(uv) = p.get(&Semantic::TexCoords(0)) {
        if uv.count() != vert_count || uv.dimensions() != Dimensions::Vec2 {
            return Err(ImportError::CountMismatch);
        }
    }

    // Joint data is optional, but if it is provided there must be both
    // indices and weights and the same number as there are positions
    let joint_option = p.get(&Semantic::Joints(0));
    if let Some(ref joints) = joint_option {
        if joints.count() != vert_count {
            return Err(ImportError::CountMismatch);
        }
        let weights =
            p.get(&Semantic::Weights(0)).ok_or(ImportError::NoWeights)?;
        if weights.count() != vert_count {
            return Err(ImportError::CountMismatch);
        }
    }

    // A little info
    info!(
        "Submesh={}, Index count={}, Vertex count={}, Has joints={}",
        p.index(),
        idx_count,
        vert_count,
        joint_option.is_some(),
    );

    Ok((idx_count, vert_count))
}

fn load_impl<P>(path: P) -> Result<(Document, Vec<buffer::Data>), CaError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let base = path.parent().unwrap_or_else(|| Path::new("./"));
    let file = fs::File::open(path).map_err(CaError::StdIoError)?;
    let reader = io::BufReader::new(file);
    let gltf = Gltf::from_reader(reader)
        .map_err(|e| CaError::GltfError(Box::new(e)))?;
    let buffers = gltf::import_buffers(&gltf.document, Some(base), gltf.blob)
        .map_err(|e| CaError::GltfError(Box::new(e)))?;

    info!(
        "{:?}, base path={:?}, buffer count={}",
        path,
        base,
        buffers.len(),
    );

    Ok((gltf.document, buffers))
}

fn node_name(node: &Node) -> String {
    node.name()
        .map_or_else(|| format!("node.{}", node.index()), ToString::to_string)
}

/// Swizzles a quaternion from Y axis up to Z axis up
fn quat_swizzle(q: &glm::Quat) -> glm::Quat {
    glm::quat(q.i, -q.k, q.j, q.w)
}

/// Swizzles a vector from Y axis up to Z axis up
fn vec_swizzle(v: &glm::Vec3) -> glm::Vec3 {
    glm::vec3(v.x, -v.z, v.y)
}

/// Change of basis matrix matching `vec_swizzle`
fn swizzle_matrix() -> glm::Mat4 {
    glm::Mat4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Applies axis swizzle and import scale to an offset (inverse bind) matrix
fn prep_offset(m: &glm::Mat4, options: &ImportOptions) -> glm::Mat4 {
    let mut out = if options.swizzle {
        let p = swizzle_matrix();
        p * m * p.transpose()
    } else {
        *m
    };
    out[(0, 3)] *= options.scale;
    out[(1, 3)] *= options.scale;
    out[(2, 3)] *= options.scale;
    out
}

/// Builds a node's bind pose local transform from the decomposed glTF data
fn local_transform(
    t: [f32; 3],
    r: [f32; 4],
    s: [f32; 3],
    options: &ImportOptions,
) -> glm::Mat4 {
    let translation: glm::Vec3 = t.into();
    let rotation: glm::Quat = r.into();
    let scale: glm::Vec3 = s.into();
    let trs = if options.swizzle {
        Trs::new(
            vec_swizzle(&translation) * options.scale,
            quat_swizzle(&rotation),
            glm::vec3(scale.x, scale.z, scale.y),
        )
    } else {
        Trs::new(translation * options.scale, rotation, scale)
    };
    trs.to_matrix()
}

/// Collects every document node into a flat arena. Index 0 is a synthetic
/// root so that files with several scene roots still produce one tree;
/// glTF node `i` lands at arena index `i + 1`.
fn load_nodes(document: &Document, options: &ImportOptions) -> Vec<SceneNode> {
    let mut nodes = Vec::with_capacity(document.nodes().len() + 1);
    nodes.push(SceneNode {
        name: "scene".to_owned(),
        parent: None,
        children: Vec::new(),
        transform: glm::Mat4::identity(),
        meshes: Vec::new(),
    });
    for node in document.nodes() {
        let (t, r, s) = node.transform().decomposed();
        nodes.push(SceneNode {
            name: node_name(&node),
            parent: None,
            children: node.children().map(|c| c.index() + 1).collect(),
            transform: local_transform(t, r, s, options),
            meshes: Vec::new(),
        });
    }

    // Parent links from the children lists
    for i in 0..nodes.len() {
        let children = nodes[i].children.clone();
        for c in children {
            nodes[c].parent = Some(i);
        }
    }

    // Anything still without a parent hangs off the synthetic root
    for i in 1..nodes.len() {
        if nodes[i].parent.is_none() {
            nodes[i].parent = Some(0);
            nodes[0].children.push(i);
        }
    }
    nodes
}

/// Reads every mesh primitive into a `SceneMesh`. Also returns the map
/// from glTF mesh index to the produced scene mesh indices, and the raw
/// per vertex joint influences for `load_skins` to regroup.
#[allow(clippy::type_complexity)]
fn load_meshes(
    document: &Document,
    buffers: &[Data],
    options: &ImportOptions,
) -> Result<(Vec<SceneMesh>, Vec<Vec<usize>>, Vec<Option<JointData>>), CaError>
{
    let scale = options.scale;
    let mut meshes = Vec::new();
    let mut mesh_map = Vec::with_capacity(document.meshes().len());
    let mut joint_data = Vec::new();

    for m in document.meshes() {
        let base_name = m
            .name()
            .map_or_else(|| format!("mesh.{}", m.index()), ToString::to_string);
        let primitive_count = m.primitives().len();
        let mut produced = Vec::new();

        for p in m.primitives() {
            let (idx_count, vert_count) = validate(&p)?;
            let reader = p.reader(|x| Some(&buffers[x.index()]));

            let idx_data = reader.read_indices().ok_or(ImportError::NoIndices)?;
            let indices: Vec<u32> = match idx_data {
                ReadIndices::U8(it) => it.map(u32::from).collect(),
                ReadIndices::U16(it) => it.map(u32::from).collect(),
                ReadIndices::U32(it) => it.collect(),
            };
            if indices.len() != idx_count {
                return Err(ImportError::CountMismatch.into());
            }

            let pos_data =
                reader.read_positions().ok_or(ImportError::NoPositions)?;
            let ReadPositions::Standard(it) = pos_data else {
                warn!("Unsupported sparse position format");
                return Err(ImportError::SparseMesh.into());
            };
            let positions: Vec<[f32; 3]> = if options.swizzle {
                it.map(|p| [p[0] * scale, -p[2] * scale, p[1] * scale])
                    .collect()
            } else {
                it.map(|p| [p[0] * scale, p[1] * scale, p[2] * scale])
                    .collect()
            };
            if positions.len() != vert_count {
                error!(
                    "Vertex count mismatch {} != {}",
                    vert_count,
                    positions.len()
                );
                return Err(ImportError::CountMismatch.into());
            }

            let norm_data =
                reader.read_normals().ok_or(ImportError::NoNormals)?;
            let ReadNormals::Standard(it) = norm_data else {
                warn!("Unsupported sparse normal format");
                return Err(ImportError::SparseMesh.into());
            };
            let normals: Vec<[f32; 3]> = if options.swizzle {
                it.map(|n| [n[0], -n[2], n[1]]).collect()
            } else {
                it.collect()
            };

            let tex_coords: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map_or_else(Vec::new, |uv| uv.into_f32().collect());

            let colours: Vec<[f32; 3]> = reader
                .read_colors(0)
                .map_or_else(Vec::new, |c| c.into_rgb_f32().collect());

            // Joint influences are stashed to the side until the skins are
            // walked, since the skin lives on the node, not the mesh
            let influences = if let Some(joints) = reader.read_joints(0) {
                let weights = reader
                    .read_weights(0)
                    .ok_or(ImportError::NoWeights)?
                    .into_f32();
                Some(joints.into_u16().zip(weights).collect::<JointData>())
            } else {
                None
            };

            let name = if primitive_count > 1 {
                format!("{base_name}.{}", p.index())
            } else {
                base_name.clone()
            };
            produced.push(meshes.len());
            joint_data.push(influences);
            meshes.push(SceneMesh {
                name,
                material_id: p.material().index(),
                positions,
                normals,
                colours,
                tex_coords,
                indices,
                bones: Vec::new(),
            });
        }
        mesh_map.push(produced);
    }

    Ok((meshes, mesh_map, joint_data))
}

/// Regroups the per vertex joint influences into per bone weight lists on
/// the meshes each skinned node owns
fn load_skins(
    document: &Document,
    buffers: &[Data],
    options: &ImportOptions,
    meshes: &mut [SceneMesh],
    mesh_map: &[Vec<usize>],
    joint_data: &[Option<JointData>],
) -> Result<(), CaError> {
    for node in document.nodes() {
        let (Some(mesh), Some(skin)) = (node.mesh(), node.skin()) else {
            continue;
        };
        let reader = skin.reader(|x| Some(&buffers[x.index()]));
        let Some(ibm_iter) = reader.read_inverse_bind_matrices() else {
            error!("Missing inverse bind matrices");
            return Err(ImportError::NoInverseBind.into());
        };
        let joints: Vec<(String, glm::Mat4)> = ibm_iter
            .zip(skin.joints())
            .map(|(ibm, j)| (node_name(&j), prep_offset(&ibm.into(), options)))
            .collect();

        for &scene_mesh in &mesh_map[mesh.index()] {
            let Some(jw) = &joint_data[scene_mesh] else {
                continue;
            };
            if !meshes[scene_mesh].bones.is_empty() {
                warn!(
                    "mesh {} is skinned by more than one node, keeping first",
                    meshes[scene_mesh].name
                );
                continue;
            }
            let mut bones: Vec<SceneBone> = joints
                .iter()
                .map(|(name, offset)| SceneBone {
                    name: name.clone(),
                    offset: *offset,
                    weights: Vec::new(),
                })
                .collect();
            for (v, (ids, ws)) in jw.iter().enumerate() {
                let vertex = u32::try_from(v)
                    .map_err(|_| ImportError::VertexIndexRange(v))?;
                for k in 0..4 {
                    let weight = ws[k];
                    if weight > 0.0 {
                        let j = ids[k] as usize;
                        if j >= bones.len() {
                            return Err(ImportError::JointIndexRange(v).into());
                        }
                        bones[j].weights.push(VertexWeight { vertex, weight });
                    }
                }
            }
            // Unreferenced joints would make empty slots; drop them
            bones.retain(|b| !b.weights.is_empty());
            meshes[scene_mesh].bones = bones;
        }
    }
    Ok(())
}

fn load_clips(
    document: &Document,
    buffers: &[Data],
    options: &ImportOptions,
) -> Result<Vec<SceneClip>, CaError> {
    use gltf::accessor::Iter;

    let mut ret = Vec::new();
    for animation in document.animations() {
        let mut tracks = HashMap::<String, SceneTrack>::new();
        let mut duration = 0.0f32;

        for channel in animation.channels() {
            let target = channel.target().node();
            let name = node_name(&target);
            if channel.sampler().interpolation()
                == gltf::animation::Interpolation::CubicSpline
            {
                error!("Cubic spline animation is not supported");
                return Err(ImportError::CubicSpline.into());
            }
            let reader = channel.reader(|x| Some(&buffers[x.index()]));
            let times: Vec<f32> = if let Some(inputs) = reader.read_inputs() {
                match inputs {
                    Iter::Standard(times) => times
                        .map(|t| t * DEFAULT_TICKS_PER_SECOND)
                        .collect(),
                    Iter::Sparse(_) => {
                        error!("Unsupported sparse animation format");
                        return Err(ImportError::SparseAnimation.into());
                    }
                }
            } else {
                error!("Animation does not contain a sampler");
                return Err(ImportError::NoSampler.into());
            };
            if let Some(last) = times.last() {
                duration = duration.max(*last);
            }

            let track = tracks.entry(name.clone()).or_insert_with(|| {
                SceneTrack {
                    node_name: name,
                    ..SceneTrack::default()
                }
            });
            let Some(outputs) = reader.read_outputs() else {
                error!("Animation does not contain a sampler output");
                return Err(ImportError::NoSampler.into());
            };
            match outputs {
                ReadOutputs::Rotations(x) => {
                    for (time, q) in times.iter().zip(x.into_f32()) {
                        let data = if options.swizzle {
                            [q[0], -q[2], q[1], q[3]]
                        } else {
                            q
                        };
                        track.rotation_keys.push((*time, data));
                    }
                }
                ReadOutputs::Translations(x) => {
                    let scale = options.scale;
                    for (time, t) in times.iter().zip(x) {
                        let data = if options.swizzle {
                            [t[0] * scale, -t[2] * scale, t[1] * scale]
                        } else {
                            [t[0] * scale, t[1] * scale, t[2] * scale]
                        };
                        track.translation_keys.push((*time, data));
                    }
                }
                ReadOutputs::Scales(x) => {
                    for (time, s) in times.iter().zip(x) {
                        let data = if options.swizzle {
                            [s[0], s[2], s[1]]
                        } else {
                            s
                        };
                        track.scale_keys.push((*time, data));
                    }
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    warn!(
                        "animation {} morph target weights ignored",
                        animation.index()
                    );
                }
            }
        }

        let name = animation.name().map_or_else(
            || format!("animation.{}", animation.index()),
            ToString::to_string,
        );
        ret.push(SceneClip {
            name,
            duration,
            // glTF key times are seconds. They were converted to ticks at
            // the default rate above, so no further rate applies.
            ticks_per_second: 0.0,
            tracks: tracks.into_values().collect(),
            mesh_tracks: Vec::new(),
        });
    }
    Ok(ret)
}

/// Load a glTF file into the flat scene shape. Only a limited subset of
/// glTF functionality is supported. glTF defines +Y up, +Z forward, so
/// `swizzle` converts to Z axis up unless disabled.
///
/// # Errors
/// May return `CaError`
pub fn load(
    path: &Path,
    options: &ImportOptions,
) -> Result<SceneData, CaError> {
    let (document, buffers) = load_impl(path)?;

    let mut nodes = load_nodes(&document, options);
    let (mut meshes, mesh_map, joint_data) =
        load_meshes(&document, &buffers, options)?;

    // Attach meshes to the nodes that instance them
    for node in document.nodes() {
        if let Some(mesh) = node.mesh() {
            nodes[node.index() + 1].meshes = mesh_map[mesh.index()].clone();
        }
    }

    load_skins(
        &document, &buffers, options, &mut meshes, &mesh_map, &joint_data,
    )?;
    let clips = load_clips(&document, &buffers, options)?;

    Ok(SceneData {
        format: SceneFormat::Gltf,
        nodes,
        meshes,
        clips,
    })
}

/// Loads only the animation clips from a glTF file, for merging into an
/// already loaded model
///
/// # Errors
/// May return `CaError`
pub fn load_animations(
    path: &Path,
    options: &ImportOptions,
) -> Result<Vec<SceneClip>, CaError> {
    let (document, buffers) = load_impl(path)?;
    load_clips(&document, &buffers, options)
}
