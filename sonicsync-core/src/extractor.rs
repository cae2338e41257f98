//! Scene transforms to [`Pose3D`].

use crate::config::AxisConvention;
use crate::math::{Mat4, Pose3D};
use crate::scene::{NodeHandle, SceneQuery};

/// Decomposes a world transform into position, forward and up.
///
/// Position is the translation column. Up is the second column of the rotation
/// part, forward the third (negated for [`AxisConvention::NegativeZForward`]).
/// Columns are used as stored: scaled or sheared transforms produce non-unit,
/// non-orthogonal vectors, which are left for the sink to deal with.
pub fn pose_from_transform(transform: &Mat4, convention: AxisConvention) -> Pose3D {
    let position = transform.w_axis.truncate();
    let up = transform.y_axis.truncate();
    let z = transform.z_axis.truncate();
    let forward = match convention {
        AxisConvention::NegativeZForward => -z,
        AxisConvention::PositiveZForward => z,
    };
    Pose3D::new(position, forward, up)
}

/// Looks up a node by name on `scene` and extracts its pose.
pub fn extract_pose<S: SceneQuery + ?Sized>(
    scene: &S,
    name: &str,
    convention: AxisConvention,
) -> Option<Pose3D> {
    let handle = scene.find_node(name)?;
    scene
        .world_transform(handle)
        .map(|transform| pose_from_transform(&transform, convention))
}

/// A node name plus the handle it last resolved to.
#[derive(Debug, Clone)]
struct NodeBinding {
    name: String,
    handle: Option<NodeHandle>,
}

impl NodeBinding {
    fn new(name: String) -> Self {
        Self { name, handle: None }
    }

    /// Returns a handle valid for `scene`, re-resolving by name when the cached one
    /// points elsewhere (or nowhere).
    fn resolve<S: SceneQuery + ?Sized>(&mut self, scene: &S) -> Option<NodeHandle> {
        if let Some(handle) = self.handle {
            if scene.node_name(handle) == Some(self.name.as_str()) {
                return Some(handle);
            }
            log::debug!("Cached {} for '{}' is stale, re-resolving", handle, self.name);
        }
        self.handle = scene.find_node(&self.name);
        self.handle
    }
}

/// Extracts listener and emitter poses from scene snapshots.
///
/// Names are resolved to [`NodeHandle`]s once and cached; each frame the cached
/// handle is checked against the node's name and re-resolved only if it no longer
/// matches. Extraction only reads the scene.
#[derive(Debug, Clone)]
pub struct PoseExtractor {
    convention: AxisConvention,
    listener: NodeBinding,
    emitters: Vec<NodeBinding>,
}

impl PoseExtractor {
    pub fn new(
        listener_node: impl Into<String>,
        emitter_nodes: impl IntoIterator<Item = String>,
        convention: AxisConvention,
    ) -> Self {
        Self {
            convention,
            listener: NodeBinding::new(listener_node.into()),
            emitters: emitter_nodes.into_iter().map(NodeBinding::new).collect(),
        }
    }

    pub fn convention(&self) -> AxisConvention {
        self.convention
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    /// Resolves every binding against `scene` ahead of the first frame.
    ///
    /// Returns how many of the bound nodes were found.
    pub fn prime<S: SceneQuery + ?Sized>(&mut self, scene: &S) -> usize {
        let listener = usize::from(self.listener.resolve(scene).is_some());
        self.emitters
            .iter_mut()
            .filter_map(|binding| binding.resolve(scene))
            .count()
            + listener
    }

    /// Forgets every cached handle.
    pub fn reset(&mut self) {
        self.listener.handle = None;
        for binding in &mut self.emitters {
            binding.handle = None;
        }
    }

    pub fn extract_listener<S: SceneQuery + ?Sized>(&mut self, scene: &S) -> Option<Pose3D> {
        Self::extract_binding(&mut self.listener, scene, self.convention)
    }

    /// Pose of the emitter bound at `index` (binding order).
    pub fn extract_emitter<S: SceneQuery + ?Sized>(
        &mut self,
        scene: &S,
        index: usize,
    ) -> Option<Pose3D> {
        let convention = self.convention;
        let binding = self.emitters.get_mut(index)?;
        Self::extract_binding(binding, scene, convention)
    }

    fn extract_binding<S: SceneQuery + ?Sized>(
        binding: &mut NodeBinding,
        scene: &S,
        convention: AxisConvention,
    ) -> Option<Pose3D> {
        let handle = binding.resolve(scene)?;
        let transform = scene.world_transform(handle)?;
        Some(pose_from_transform(&transform, convention))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};
    use crate::scene::SceneSnapshotBuilder;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_pure_translation_is_bit_exact() {
        let position = Vec3::new(0.1, -7.25, 1e-3);
        let pose = pose_from_transform(
            &Mat4::from_translation(position),
            AxisConvention::NegativeZForward,
        );
        assert_eq!(
            pose.position().to_array().map(f32::to_bits),
            position.to_array().map(f32::to_bits)
        );
    }

    #[test]
    fn test_identity_orientation() {
        let pose = pose_from_transform(&Mat4::IDENTITY, AxisConvention::NegativeZForward);
        assert_eq!(pose.forward(), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(pose.up(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(pose.forward().length(), 1.0);
        assert_eq!(pose.up().length(), 1.0);
        assert_eq!(pose.forward().dot(pose.up()), 0.0);

        let raw = pose_from_transform(&Mat4::IDENTITY, AxisConvention::PositiveZForward);
        assert_eq!(raw.forward(), Vec3::Z);
    }

    #[test]
    fn test_rotated_camera_faces_rotated_direction() {
        // Yaw left by 90 degrees: -Z turns into -X.
        let transform = Mat4::from_quat(Quat::from_rotation_y(FRAC_PI_2));
        let pose = pose_from_transform(&transform, AxisConvention::NegativeZForward);
        assert!(pose.forward().abs_diff_eq(Vec3::NEG_X, 1e-6));
        assert!(pose.up().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_scaled_transform_passes_through() {
        let transform = Mat4::from_scale(Vec3::splat(2.0));
        let pose = pose_from_transform(&transform, AxisConvention::NegativeZForward);
        assert_eq!(pose.forward(), Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(pose.up(), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_missing_node_yields_nothing() {
        let scene = SceneSnapshotBuilder::new().build();
        assert!(extract_pose(&scene, "camera", AxisConvention::default()).is_none());

        let mut extractor =
            PoseExtractor::new("camera", vec!["src".to_string()], AxisConvention::default());
        assert!(extractor.extract_listener(&scene).is_none());
        assert!(extractor.extract_emitter(&scene, 0).is_none());
        assert!(extractor.extract_emitter(&scene, 5).is_none());
        assert_eq!(extractor.prime(&scene), 0);
    }

    #[test]
    fn test_cached_handle_re_resolves_after_scene_change() {
        let mut first = SceneSnapshotBuilder::new();
        first.add_root("camera", Mat4::from_translation(Vec3::X));
        first.add_root("src", Mat4::IDENTITY);

        let mut extractor =
            PoseExtractor::new("camera", vec!["src".to_string()], AxisConvention::default());
        assert_eq!(extractor.prime(&first.build()), 2);

        // Same names, different arena order: the cached handles now point at the
        // wrong nodes and must be looked up again.
        let mut second = SceneSnapshotBuilder::new();
        second.add_root("src", Mat4::from_translation(Vec3::Z));
        second.add_root("camera", Mat4::from_translation(Vec3::Y));
        let scene = second.build();

        assert_eq!(extractor.extract_listener(&scene).unwrap().position(), Vec3::Y);
        assert_eq!(extractor.extract_emitter(&scene, 0).unwrap().position(), Vec3::Z);
    }

    #[test]
    fn test_nested_emitter_world_position() {
        let mut builder = SceneSnapshotBuilder::new();
        let rig = builder.add_root("rig", Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        builder
            .add_child(rig, "src", Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        let scene = builder.build();

        let pose = extract_pose(&scene, "src", AxisConvention::default()).unwrap();
        assert_eq!(pose.position(), Vec3::new(5.0, 0.0, 0.0));
    }
}
