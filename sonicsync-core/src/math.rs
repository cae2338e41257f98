//! Math types for SonicSync

pub use glam::{Mat4, Quat, Vec3};

/// Listener-style orientation: a forward and an up vector that always travel together.
///
/// Spatial audio engines need both vectors at once to build their listener frame, so
/// there is no way to update one without the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub forward: Vec3,
    pub up: Vec3,
}

impl Orientation {
    /// Facing -Z with +Y up.
    pub const IDENTITY: Self = Self {
        forward: Vec3::NEG_Z,
        up: Vec3::Y,
    };

    pub fn new(forward: Vec3, up: Vec3) -> Self {
        Self { forward, up }
    }

    /// Right vector of the listener frame (`forward x up`).
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up)
    }

    /// Normalizes both vectors. A vector that cannot be normalized (zero length,
    /// non-finite) is returned unchanged.
    pub fn renormalized(&self) -> Self {
        Self {
            forward: self.forward.try_normalize().unwrap_or(self.forward),
            up: self.up.try_normalize().unwrap_or(self.up),
        }
    }

    /// Exact comparison on the underlying bit patterns.
    pub fn bits_eq(&self, other: &Self) -> bool {
        vec3_bits_eq(self.forward, other.forward) && vec3_bits_eq(self.up, other.up)
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Yaw/pitch/roll orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AngularOrientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Placement and facing of an object in world space.
///
/// Immutable once built. `forward` and `up` are expected to be unit length and
/// orthogonal, but nothing here enforces it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3D {
    position: Vec3,
    orientation: Orientation,
}

impl Pose3D {
    pub fn new(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        Self {
            position,
            orientation: Orientation::new(forward, up),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Orientation::IDENTITY,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation.forward
    }

    pub fn up(&self) -> Vec3 {
        self.orientation.up
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

impl Default for Pose3D {
    fn default() -> Self {
        Self::from_position(Vec3::ZERO)
    }
}

pub(crate) fn vec3_bits_eq(a: Vec3, b: Vec3) -> bool {
    a.to_array().map(f32::to_bits) == b.to_array().map(f32::to_bits)
}
