pub mod input;
pub mod runtime;
pub mod session;

pub use input::{Action, ActionEvent, ActionInput, ActionKind, PoseOracle, SimulatedPoseOracle};
pub use runtime::{DisplayRuntime, LayerRecord, NullDisplayRuntime};
pub use session::RuntimeSession;

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const fn ordered() -> [Side; 2] {
        [Side::Left, Side::Right]
    }

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }
}

/// Reference space a runtime pose query is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceSpace {
    View,
    Stage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackedLimb {
    LeftHand,
    RightHand,
}

impl TrackedLimb {
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Left => TrackedLimb::LeftHand,
            Side::Right => TrackedLimb::RightHand,
        }
    }
}

/// Rigid transform in runtime (y-up, meters) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Applies the player scale to the translation. Orientation is unaffected.
    pub fn scaled(self, scale: f32) -> Self {
        Self {
            position: self.position * scale,
            orientation: self.orientation,
        }
    }

    pub fn unscaled(self, scale: f32) -> Self {
        if scale == 0.0 {
            return self;
        }
        Self {
            position: self.position / scale,
            orientation: self.orientation,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Half-angles in radians; left and down are negative for a centered view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl FieldOfView {
    pub fn symmetric(horizontal_degrees: f32, vertical_degrees: f32) -> Self {
        let half_h = horizontal_degrees.to_radians() * 0.5;
        let half_v = vertical_degrees.to_radians() * 0.5;
        Self {
            angle_left: -half_h,
            angle_right: half_h,
            angle_up: half_v,
            angle_down: -half_v,
        }
    }

    /// Asymmetric OpenGL-style projection. A far plane at or before the near
    /// plane produces an infinite projection.
    pub fn perspective_matrix(&self, near: f32, far: f32) -> Mat4 {
        let tan_left = self.angle_left.tan();
        let tan_right = self.angle_right.tan();
        let tan_down = self.angle_down.tan();
        let tan_up = self.angle_up.tan();

        let tan_width = tan_right - tan_left;
        let tan_height = tan_up - tan_down;
        let offset = near;

        let (depth_scale, depth_offset) = if far <= near {
            (-1.0, -(near + offset))
        } else {
            (
                -(far + offset) / (far - near),
                -(far * (near + offset)) / (far - near),
            )
        };

        Mat4::from_cols_array(&[
            2.0 / tan_width,
            0.0,
            0.0,
            0.0,
            0.0,
            2.0 / tan_height,
            0.0,
            0.0,
            (tan_right + tan_left) / tan_width,
            (tan_up + tan_down) / tan_height,
            depth_scale,
            -1.0,
            0.0,
            0.0,
            depth_offset,
            0.0,
        ])
    }
}

impl Default for FieldOfView {
    fn default() -> Self {
        Self::symmetric(90.0, 90.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct View {
    pub pose: Pose,
    pub fov: FieldOfView,
}

/// Every pose predicted for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseSet {
    pub head: Pose,
    /// View-space pose and field of view per side.
    pub view: [View; 2],
    /// Stage-space eye pose per side.
    pub eye: [Pose; 2],
    pub hands: [Pose; 2],
}

impl PoseSet {
    pub fn view(&self, side: Side) -> &View {
        &self.view[side.index()]
    }

    pub fn eye(&self, side: Side) -> Pose {
        self.eye[side.index()]
    }

    pub fn hand(&self, side: Side) -> Pose {
        self.hands[side.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceHandle {
    pub id: u64,
    pub size: [u32; 2],
}

#[derive(Debug, Error)]
#[error("{reason}")]
pub struct VrError {
    reason: String,
}

impl VrError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type VrResult<T> = Result<T, VrError>;

/// Converts a runtime (y-up) position into renderer (z-up) coordinates.
pub fn to_world_position(position: Vec3) -> Vec3 {
    Vec3::new(position.x, position.z, -position.y)
}

pub fn to_world_orientation(orientation: Quat) -> Quat {
    Quat::from_xyzw(orientation.x, orientation.z, -orientation.y, orientation.w)
}

/// Yaw and pitch of a runtime orientation about the renderer's z-up axes.
pub fn yaw_pitch(orientation: Quat) -> (f32, f32) {
    let (yaw, pitch, _roll) = to_world_orientation(orientation).to_euler(EulerRot::ZXY);
    (yaw, pitch)
}
