//! Read-only scene access for pose extraction.
//!
//! The sync pipeline never owns or mutates the scene. Each frame the host hands it
//! something implementing [`SceneQuery`], typically a snapshot taken after animation
//! and physics have settled for that frame.
//!
//! # Overview
//!
//! 1. **SceneQuery** - Trait the host's scene graph implements
//! 2. **NodeHandle** - Cheap handle a node name resolves to
//! 3. **SceneSnapshot** - In-memory implementation with resolved world transforms
//!
//! # Example
//!
//! ```
//! use sonicsync_core::math::{Mat4, Vec3};
//! use sonicsync_core::scene::{SceneQuery, SceneSnapshotBuilder};
//!
//! let mut builder = SceneSnapshotBuilder::new();
//! let rig = builder.add_root("rig", Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
//! builder.add_child(rig, "camera", Mat4::IDENTITY)?;
//! let scene = builder.build();
//!
//! let camera = scene.find_node("camera").unwrap();
//! assert_eq!(
//!     scene.world_transform(camera).unwrap().w_axis.truncate(),
//!     Vec3::new(0.0, 1.0, 0.0)
//! );
//! # Ok::<(), sonicsync_core::SonicSyncError>(())
//! ```

pub mod snapshot;

pub use snapshot::{SceneSnapshot, SceneSnapshotBuilder};

use crate::math::Mat4;

/// Opaque reference to a node inside one scene.
///
/// Handles are only meaningful for the scene that produced them. A scene may reuse
/// a handle for a different node after it changes, so callers caching handles should
/// confirm the name with [`SceneQuery::node_name`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub(crate) u32);

impl NodeHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeHandle({})", self.0)
    }
}

/// Queries the sync pipeline needs from a scene graph.
///
/// # Thread Safety
///
/// Implementations are only read from the render thread during `on_frame`, so no
/// `Sync` bound is required.
pub trait SceneQuery {
    /// Recursively searches the scene for a node with this exact name.
    ///
    /// If several nodes share the name, the first one in depth-first pre-order wins.
    fn find_node(&self, name: &str) -> Option<NodeHandle>;

    /// Name of the node behind `handle`, or `None` if the handle is not valid here.
    fn node_name(&self, handle: NodeHandle) -> Option<&str>;

    /// World-space transform of the node, already resolved for this frame.
    fn world_transform(&self, handle: NodeHandle) -> Option<Mat4>;
}
