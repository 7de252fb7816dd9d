//! Translate / rotate / scale gizmo driven from the render thread.
//!
//! Callers arm the tool for one camera and viewport region. While armed,
//! the render thread draws the handles of the current operation, picks a
//! handle on left press with the same color-id pass the scene uses, and
//! accumulates mouse motion along the picked axis until release.

use super::camera::Camera;
use super::pick::{PickBuffer, PickId, ViewportRegion};
use super::{draw_flat, set_camera_uniforms};
use crate::environment::{Environment, GpuHandle};
use crate::error::{GraphicsError, Result};
use crate::types::{geometry, Mesh};
use glam::{Mat3, Mat4, Vec2, Vec3};
use parking_lot::Mutex;
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

/// Handle size relative to the camera distance, keeps the gizmo at a
/// roughly constant size on screen.
const HANDLE_SCALE: f32 = 0.15;

const AXIS_COLORS: [Vec3; 3] = [
    Vec3::new(1.0, 0.31, 0.31),
    Vec3::new(0.31, 1.0, 0.31),
    Vec3::new(0.31, 0.63, 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    Rotate,
    #[default]
    Translate,
    Scale,
}

impl Operation {
    pub fn from_index(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Rotate),
            1 => Some(Self::Translate),
            2 => Some(Self::Scale),
            _ => None,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Self::Rotate => 0,
            Self::Translate => 1,
            Self::Scale => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    #[default]
    None,
    X,
    Y,
    Z,
}

impl Axis {
    const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn from_index(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::X),
            2 => Some(Self::Y),
            3 => Some(Self::Z),
            _ => None,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Self::None => 0,
            Self::X => 1,
            Self::Y => 2,
            Self::Z => 3,
        }
    }

    pub fn direction(self) -> Vec3 {
        match self {
            Self::None => Vec3::ZERO,
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
        }
    }
}

struct ToolState {
    operation: Operation,
    axis: Axis,
    target: Option<(Arc<Camera>, ViewportRegion)>,
    rings: [Arc<Mesh>; 3],
    arrows: [Arc<Mesh>; 3],
    /// Replaced handle meshes waiting for the render thread to free them.
    retired: Vec<Arc<Mesh>>,
    position: Vec3,
    drag: f64,
    /// Part of `drag` already handed out by `take_drag_delta`.
    applied: f64,
    pressed: bool,
    last_mouse: Option<Vec2>,
}

impl ToolState {
    fn handles(&self) -> &[Arc<Mesh>; 3] {
        match self.operation {
            Operation::Rotate => &self.rings,
            Operation::Translate | Operation::Scale => &self.arrows,
        }
    }
}

pub struct ManipulationTool {
    state: Mutex<ToolState>,
}

impl ManipulationTool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ToolState {
                operation: Operation::default(),
                axis: Axis::None,
                target: None,
                rings: default_rings(),
                arrows: default_arrows(),
                retired: Vec::new(),
                position: Vec3::ZERO,
                drag: 0.0,
                applied: 0.0,
                pressed: false,
                last_mouse: None,
            }),
        }
    }

    /// Replaces the rotation handles, ordered X, Y, Z.
    pub fn set_rings(&self, meshes: Vec<Arc<Mesh>>) -> Result<()> {
        let meshes = exactly_three("rings", meshes)?;
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.rings, meshes);
        state.retired.extend(previous);
        Ok(())
    }

    /// Replaces the translate and scale handles, ordered X, Y, Z.
    pub fn set_arrows(&self, meshes: Vec<Arc<Mesh>>) -> Result<()> {
        let meshes = exactly_three("arrows", meshes)?;
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.arrows, meshes);
        state.retired.extend(previous);
        Ok(())
    }

    /// Arms the tool for `camera` shown in `region`. False if already armed.
    pub fn require(&self, camera: Arc<Camera>, region: ViewportRegion) -> bool {
        let mut state = self.state.lock();
        if state.target.is_some() {
            log::error!("{}", GraphicsError::AlreadyArmed);
            return false;
        }
        state.target = Some((camera, region));
        state.axis = Axis::None;
        state.drag = 0.0;
        state.applied = 0.0;
        state.pressed = false;
        state.last_mouse = None;
        true
    }

    /// Disarms the tool. False if it was not armed.
    pub fn clear(&self) -> bool {
        let mut state = self.state.lock();
        if state.target.take().is_none() {
            return false;
        }
        state.axis = Axis::None;
        state.pressed = false;
        state.last_mouse = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().target.is_some()
    }

    pub fn disable_axis(&self) {
        self.state.lock().axis = Axis::None;
    }

    pub fn active_axis(&self) -> Axis {
        self.state.lock().axis
    }

    /// Mouse travel along the picked axis since arming, in window pixels.
    pub fn drag(&self) -> f64 {
        self.state.lock().drag
    }

    /// Drag not yet consumed by a previous call, in window pixels. Each
    /// pixel of travel is returned once, and a press on a new handle
    /// starts from zero.
    pub fn take_drag_delta(&self) -> f64 {
        let mut state = self.state.lock();
        let delta = state.drag - state.applied;
        state.applied = state.drag;
        delta
    }

    pub fn operation(&self) -> Operation {
        self.state.lock().operation
    }

    pub fn set_operation(&self, operation: Operation) {
        self.state.lock().operation = operation;
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().position
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.lock().position = position;
    }

    pub(crate) fn update_resources(&self, env: &mut dyn Environment) -> Result<()> {
        let mut state = self.state.lock();
        for mesh in state.retired.drain(..) {
            mesh.free_gpu(env)?;
        }
        for mesh in state.rings.iter().chain(state.arrows.iter()) {
            mesh.calculate(env)?;
        }
        Ok(())
    }

    /// Runs one frame of input handling. `left_down` is the current state
    /// of the left mouse button, `mouse` the window cursor position.
    pub(crate) fn process(
        &self,
        env: &mut dyn Environment,
        pick: &mut PickBuffer,
        flat_program: GpuHandle,
        mouse: Vec2,
        left_down: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let Some((camera, region)) = state.target.clone() else {
            return Ok(());
        };

        if !left_down {
            if state.pressed {
                state.pressed = false;
                state.axis = Axis::None;
                state.last_mouse = None;
            }
            return Ok(());
        }

        if !state.pressed {
            state.pressed = true;
            state.last_mouse = Some(mouse);
            state.applied = state.drag;
            let frame = camera.size();
            let Some(pixel) = region.to_frame_pixel(mouse, frame) else {
                return Ok(());
            };
            pick.begin(env, frame)?;
            let model = handle_model(&camera, state.position);
            env.use_shader(flat_program);
            set_camera_uniforms(env, flat_program, &camera);
            for (index, mesh) in state.handles().iter().enumerate() {
                let id = PickId::from_index(index).unwrap_or(PickId::NONE);
                draw_flat(env, flat_program, &mesh.gpu(), model, id.to_color());
            }
            let picked = pick.read(env, pixel);
            state.axis = picked
                .index()
                .and_then(|i| Axis::ALL.get(i).copied())
                .unwrap_or(Axis::None);
            if state.axis != Axis::None {
                log::debug!("manipulation tool picked axis {:?}", state.axis);
            }
            return Ok(());
        }

        let last = state.last_mouse.replace(mouse).unwrap_or(mouse);
        if state.axis == Axis::None {
            return Ok(());
        }
        let frame = camera.size();
        let origin = camera.world_to_screen_point(state.position);
        let tip = camera.world_to_screen_point(state.position + state.axis.direction());
        if let (Some(origin), Some(tip)) = (origin, tip) {
            let origin = region.from_frame_point(origin, frame);
            let tip = region.from_frame_point(tip, frame);
            let dir = (tip - origin).normalize_or_zero();
            state.drag += f64::from((mouse - last).dot(dir));
        }
        Ok(())
    }

    /// Draws the current operation's handles into the bound target when
    /// the tool is armed for `camera`.
    pub(crate) fn draw(&self, env: &mut dyn Environment, flat_program: GpuHandle, camera: &Arc<Camera>) {
        let state = self.state.lock();
        let Some((target, _)) = &state.target else {
            return;
        };
        if !Arc::ptr_eq(target, camera) {
            return;
        }
        let model = handle_model(camera, state.position);
        env.use_shader(flat_program);
        set_camera_uniforms(env, flat_program, camera);
        for (axis, mesh) in state.handles().iter().enumerate() {
            let mut color = AXIS_COLORS[axis];
            if Axis::ALL[axis] == state.axis {
                color = Vec3::new(1.0, 0.9, 0.2);
            }
            draw_flat(env, flat_program, &mesh.gpu(), model, color);
        }
    }

    pub(crate) fn free_all(&self, env: &mut dyn Environment) {
        let mut state = self.state.lock();
        let state = &mut *state;
        for mesh in state
            .retired
            .drain(..)
            .chain(state.rings.iter().cloned())
            .chain(state.arrows.iter().cloned())
        {
            if let Err(err) = mesh.free_gpu(env) {
                log::warn!("manipulation tool mesh {} not freed: {err}", mesh.name());
            }
        }
        state.target = None;
        state.axis = Axis::None;
    }
}

impl Default for ManipulationTool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManipulationTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManipulationTool")
            .field("operation", &state.operation)
            .field("axis", &state.axis)
            .field("armed", &state.target.is_some())
            .field("drag", &state.drag)
            .finish()
    }
}

fn handle_model(camera: &Camera, position: Vec3) -> Mat4 {
    let scale = (camera.position().distance(position) * HANDLE_SCALE).max(1e-3);
    Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(scale))
}

fn exactly_three(what: &str, meshes: Vec<Arc<Mesh>>) -> Result<[Arc<Mesh>; 3]> {
    let count = meshes.len();
    <[Arc<Mesh>; 3]>::try_from(meshes).map_err(|_| {
        let err = GraphicsError::InvalidArgument(format!(
            "manipulation tool {what} need exactly 3 meshes, got {count}"
        ));
        log::error!("{err}");
        err
    })
}

fn default_rings() -> [Arc<Mesh>; 3] {
    let ring = |name: &str, rotation: Mat3| {
        Mesh::new(name, geometry::create_ring(1.1, 0.04, 64, rotation))
    };
    [
        ring("ring_x", Mat3::from_rotation_y(FRAC_PI_2)),
        ring("ring_y", Mat3::from_rotation_x(-FRAC_PI_2)),
        ring("ring_z", Mat3::IDENTITY),
    ]
}

fn default_arrows() -> [Arc<Mesh>; 3] {
    let arrow = geometry::create_arrow(1.0, 0.03);
    [
        Mesh::new("arrow_x", arrow.clone()),
        Mesh::new("arrow_y", arrow.clone().transformed(Mat3::from_rotation_z(FRAC_PI_2))),
        Mesh::new("arrow_z", arrow.transformed(Mat3::from_rotation_y(-FRAC_PI_2))),
    ]
}
