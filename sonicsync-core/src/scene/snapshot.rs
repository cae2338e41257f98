//! In-memory scene snapshot with resolved world transforms.

use crate::error::{Result, SonicSyncError};
use crate::math::Mat4;
use crate::scene::{NodeHandle, SceneQuery};

#[derive(Debug, Clone)]
struct SceneNode {
    name: String,
    parent: Option<u32>,
    children: Vec<u32>,
    local: Mat4,
    world: Mat4,
}

/// Immutable view of a scene hierarchy for one frame.
///
/// Built by [`SceneSnapshotBuilder::build`]. World transforms are computed once at
/// build time (`parent.world * local`), so queries are plain lookups.
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    nodes: Vec<SceneNode>,
    roots: Vec<u32>,
}

impl SceneSnapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.node(handle)?.parent.map(NodeHandle)
    }

    pub fn local_transform(&self, handle: NodeHandle) -> Option<Mat4> {
        self.node(handle).map(|node| node.local)
    }

    fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(handle.0 as usize)
    }

    fn find_in_subtree(&self, index: u32, name: &str) -> Option<u32> {
        let node = &self.nodes[index as usize];
        if node.name == name {
            return Some(index);
        }
        node.children
            .iter()
            .find_map(|&child| self.find_in_subtree(child, name))
    }
}

impl SceneQuery for SceneSnapshot {
    fn find_node(&self, name: &str) -> Option<NodeHandle> {
        self.roots
            .iter()
            .find_map(|&root| self.find_in_subtree(root, name))
            .map(NodeHandle)
    }

    fn node_name(&self, handle: NodeHandle) -> Option<&str> {
        self.node(handle).map(|node| node.name.as_str())
    }

    fn world_transform(&self, handle: NodeHandle) -> Option<Mat4> {
        self.node(handle).map(|node| node.world)
    }
}

/// Mutable scene description that produces [`SceneSnapshot`]s.
///
/// Keep one builder around, update local transforms as things move, and call
/// [`build`](Self::build) once per frame.
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshotBuilder {
    nodes: Vec<SceneNode>,
    roots: Vec<u32>,
}

impl SceneSnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with no parent.
    pub fn add_root(&mut self, name: impl Into<String>, local: Mat4) -> NodeHandle {
        let index = self.push(name.into(), None, local);
        self.roots.push(index);
        NodeHandle(index)
    }

    /// Adds a node under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` was not produced by this builder.
    pub fn add_child(
        &mut self,
        parent: NodeHandle,
        name: impl Into<String>,
        local: Mat4,
    ) -> Result<NodeHandle> {
        if parent.0 as usize >= self.nodes.len() {
            return Err(SonicSyncError::Configuration(format!(
                "parent {} does not exist",
                parent
            )));
        }
        let index = self.push(name.into(), Some(parent.0), local);
        self.nodes[parent.0 as usize].children.push(index);
        Ok(NodeHandle(index))
    }

    /// Replaces a node's transform relative to its parent.
    pub fn set_local_transform(&mut self, handle: NodeHandle, local: Mat4) -> Result<()> {
        let node = self.nodes.get_mut(handle.0 as usize).ok_or_else(|| {
            SonicSyncError::Configuration(format!("node {} does not exist", handle))
        })?;
        node.local = local;
        Ok(())
    }

    /// Resolves world transforms and freezes the current hierarchy.
    pub fn build(&self) -> SceneSnapshot {
        let mut nodes = self.nodes.clone();
        // Parents always precede their children in the arena.
        for index in 0..nodes.len() {
            let world = match nodes[index].parent {
                Some(parent) => nodes[parent as usize].world * nodes[index].local,
                None => nodes[index].local,
            };
            nodes[index].world = world;
        }

        SceneSnapshot {
            nodes,
            roots: self.roots.clone(),
        }
    }

    fn push(&mut self, name: String, parent: Option<u32>, local: Mat4) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(SceneNode {
            name,
            parent,
            children: Vec::new(),
            local,
            world: local,
        });
        index
    }
}
