use super::data::ModelData;
use crate::{
    scene_import::{ImportError, SceneData},
    trs::{self, Trs},
};
use ahash::{HashMap, HashMapExt};
use nalgebra_glm as glm;

/// A tree node holding a bind pose local transform, child nodes and owned
/// meshes. Nodes live in an arena and refer to each other by index so the
/// tree has no ownership cycles.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub local_bind: glm::Mat4,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub meshes: Vec<usize>,
}

/// The node arena for one model. Index 0 is the root.
#[derive(Clone, Debug, Default)]
pub struct NodeTree {
    nodes: Vec<Node>,
    lookup: HashMap<String, usize>,
}

impl NodeTree {
    /// Builds the arena from the interchange shape, validating that all
    /// child and mesh references are in range
    ///
    /// # Errors
    /// May return `ImportError`
    pub fn from_scene(scene: &SceneData) -> Result<Self, ImportError> {
        if scene.nodes.is_empty() {
            return Err(ImportError::NoRootNode);
        }
        let mut nodes = Vec::with_capacity(scene.nodes.len());
        let mut lookup = HashMap::with_capacity(scene.nodes.len());
        for (i, sn) in scene.nodes.iter().enumerate() {
            for &c in &sn.children {
                if c >= scene.nodes.len() {
                    return Err(ImportError::NodeIndexRange(i));
                }
            }
            for &m in &sn.meshes {
                if m >= scene.meshes.len() {
                    return Err(ImportError::MeshIndexRange(i));
                }
            }
            lookup.insert(sn.name.clone(), i);
            nodes.push(Node {
                name: sn.name.clone(),
                local_bind: sn.transform,
                parent: sn.parent,
                children: sn.children.clone(),
                meshes: sn.meshes.clone(),
            });
        }
        Ok(Self { nodes, lookup })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Decomposed bind pose of a node, by name
    #[must_use]
    pub fn bind_pose(&self, name: &str) -> Option<Trs> {
        self.index_of(name)
            .map(|i| trs::decompose(&self.nodes[i].local_bind))
    }

    /// Walks the tree composing each node's current local transform (from
    /// `ModelData::node_locals`, written beforehand by the playback layer)
    /// with its parent's world transform. Writes the world transform per
    /// node and the skin matrix for every bone slot named like the node.
    pub fn propagate(&self, data: &mut ModelData) {
        if !self.nodes.is_empty() {
            self.walk(data, 0, &glm::Mat4::identity());
        }
    }

    fn walk(
        &self,
        data: &mut ModelData,
        index: usize,
        parent_world: &glm::Mat4,
    ) {
        let node = &self.nodes[index];
        let world = parent_world * data.node_locals[index];
        data.node_worlds[index] = world;
        data.write_skin_matrices(&node.name, &world);
        for &child in &node.children {
            self.walk(data, child, &world);
        }
    }
}
