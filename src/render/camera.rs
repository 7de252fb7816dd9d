use super::post_processing::PostProcessing;
use crate::environment::Environment;
use crate::error::{GraphicsError, Result};
use glam::{Mat4, UVec2, Vec2, Vec3};
use parking_lot::{Condvar, Mutex};
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_CAMERA_ID: AtomicU64 = AtomicU64::new(1);

/// Pitch stays just short of straight up or down so the basis never flips.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.001;

/// Free-fly camera placement: a position plus yaw and pitch in radians.
/// Yaw zero looks down +X, yaw -PI/2 looks down -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransform {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for CameraTransform {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            yaw: -FRAC_PI_2,
            pitch: 0.0,
        }
    }
}

impl CameraTransform {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut transform = Self {
            position,
            yaw,
            pitch,
        };
        transform.wrap_angles();
        transform
    }

    /// `(forward, right, up)`, all unit length.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let forward = Vec3::new(cos_yaw * cos_pitch, sin_pitch, sin_yaw * cos_pitch);
        let right = Vec3::new(-sin_yaw, 0.0, cos_yaw);
        let up = right.cross(forward).normalize_or_zero();
        (forward, right, up)
    }

    pub fn forward(&self) -> Vec3 {
        self.basis().0
    }

    pub fn look_at(&mut self, target: Vec3) {
        let dir = (target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.yaw = dir.z.atan2(dir.x);
        self.pitch = dir.y.clamp(-1.0, 1.0).asin();
        self.wrap_angles();
    }

    pub fn nudge(&mut self, yaw_delta: f32, pitch_delta: f32, zoom_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch += pitch_delta;
        self.wrap_angles();
        if zoom_delta != 0.0 {
            self.position += self.forward() * zoom_delta;
        }
    }

    /// Rotates around `pivot`, keeping the distance to it.
    pub fn orbit_around(&mut self, pivot: Vec3, yaw_delta: f32, pitch_delta: f32) {
        let distance = self.position.distance(pivot).max(0.05);
        self.yaw += yaw_delta;
        self.pitch += pitch_delta;
        self.wrap_angles();
        self.position = pivot - self.forward() * distance;
    }

    /// Moves on the ground plane relative to yaw, `up` along world Y.
    pub fn move_horizontal(&mut self, right: f32, up: f32, forward: f32) {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let forward_dir = Vec3::new(cos_yaw, 0.0, sin_yaw);
        let right_dir = Vec3::new(-sin_yaw, 0.0, cos_yaw);
        self.position += right_dir * right + Vec3::Y * up + forward_dir * forward;
    }

    pub fn view_matrix(&self) -> Mat4 {
        let (forward, _, up) = self.basis();
        Mat4::look_to_rh(self.position, forward, up)
    }

    fn wrap_angles(&mut self) {
        if self.yaw.is_finite() {
            self.yaw = (self.yaw + PI).rem_euclid(TAU) - PI;
        }
        if self.pitch.is_finite() {
            self.pitch = self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Default)]
struct FrameState {
    /// Zero follows the window size.
    requested: UVec2,
    calculated: UVec2,
    rendered: UVec2,
    resize_pending: bool,
    destroyed: bool,
}

/// A view into the scene with its own post-processing chain.
///
/// Shared as `Arc<Camera>` between the caller and the window. No GPU
/// resource exists until the render thread integrates the camera.
pub struct Camera {
    id: u64,
    post_processing: PostProcessing,
    transform: Mutex<CameraTransform>,
    projection: Mutex<Projection>,
    frame: Mutex<FrameState>,
    frame_changed: Condvar,
    direct_output: AtomicBool,
}

impl Camera {
    pub fn new(count_hdr_buffers: u32) -> Result<Arc<Self>> {
        if count_hdr_buffers == 0 {
            let err = GraphicsError::InvalidArgument(
                "camera needs at least one HDR buffer".to_string(),
            );
            log::error!("{err}");
            return Err(err);
        }
        Ok(Arc::new(Self {
            id: NEXT_CAMERA_ID.fetch_add(1, Ordering::Relaxed),
            post_processing: PostProcessing::new(count_hdr_buffers),
            transform: Mutex::new(CameraTransform::default()),
            projection: Mutex::new(Projection::default()),
            frame: Mutex::new(FrameState::default()),
            frame_changed: Condvar::new(),
            direct_output: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn post_processing(&self) -> &PostProcessing {
        &self.post_processing
    }

    /// Takes effect at the next frame.
    pub fn set_frame_size(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            let err = GraphicsError::ZeroSize {
                what: "camera frame",
                width,
                height,
            };
            log::error!("{err}");
            return Err(err);
        }
        let mut frame = self.frame.lock();
        let size = UVec2::new(width, height);
        if frame.requested != size {
            frame.requested = size;
            frame.resize_pending = true;
        }
        Ok(())
    }

    /// Requested frame size, or the last calculated one when the camera
    /// follows the window.
    pub fn size(&self) -> UVec2 {
        let frame = self.frame.lock();
        if frame.requested != UVec2::ZERO {
            frame.requested
        } else {
            frame.calculated
        }
    }

    /// Explicit frame size, `None` while the camera follows the window.
    pub fn requested_size(&self) -> Option<UVec2> {
        let requested = self.frame.lock().requested;
        (requested != UVec2::ZERO).then_some(requested)
    }

    pub fn set_direct_output(&self, value: bool) {
        self.direct_output.store(value, Ordering::SeqCst);
    }

    pub fn is_direct_output(&self) -> bool {
        self.direct_output.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.frame.lock().destroyed
    }

    /// Blocks until the post-processing buffers exist.
    pub fn wait_calculate(&self, timeout: Duration) -> Result<()> {
        self.wait_until(timeout, "camera buffers", |frame| {
            frame.calculated != UVec2::ZERO
        })
    }

    /// Blocks until a frame was rendered at the current frame size.
    pub fn wait_buffers_calculate(&self, timeout: Duration) -> Result<()> {
        self.wait_until(timeout, "camera frame", |frame| {
            !frame.resize_pending && frame.rendered != UVec2::ZERO
        })
    }

    fn wait_until(
        &self,
        timeout: Duration,
        what: &'static str,
        ready: impl Fn(&FrameState) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut frame = self.frame.lock();
        loop {
            if ready(&frame) {
                return Ok(());
            }
            if frame.destroyed {
                return Err(GraphicsError::Lifecycle(format!(
                    "camera {} was destroyed while waiting for {what}",
                    self.id
                )));
            }
            if self.frame_changed.wait_until(&mut frame, deadline).timed_out() {
                return Err(GraphicsError::Timeout(timeout, what));
            }
        }
    }

    pub fn transform(&self) -> CameraTransform {
        *self.transform.lock()
    }

    pub fn set_transform(&self, transform: CameraTransform) {
        *self.transform.lock() = transform;
    }

    pub fn position(&self) -> Vec3 {
        self.transform.lock().position
    }

    pub fn set_position(&self, position: Vec3) {
        self.transform.lock().position = position;
    }

    pub fn look_at(&self, target: Vec3) {
        self.transform.lock().look_at(target);
    }

    pub fn nudge(&self, yaw_delta: f32, pitch_delta: f32, zoom_delta: f32) {
        self.transform.lock().nudge(yaw_delta, pitch_delta, zoom_delta);
    }

    pub fn orbit_around(&self, pivot: Vec3, yaw_delta: f32, pitch_delta: f32) {
        self.transform
            .lock()
            .orbit_around(pivot, yaw_delta, pitch_delta);
    }

    pub fn move_horizontal(&self, right: f32, up: f32, forward: f32) {
        self.transform.lock().move_horizontal(right, up, forward);
    }

    pub fn projection(&self) -> Projection {
        *self.projection.lock()
    }

    pub fn set_projection(&self, projection: Projection) {
        *self.projection.lock() = projection;
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.lock().view_matrix()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let size = self.size().max(UVec2::ONE).as_vec2();
        let projection = self.projection();
        Mat4::perspective_rh_gl(projection.fov_y, size.x / size.y, projection.near, projection.far)
    }

    /// Pixel position of `point` in the camera frame, top-left origin.
    /// `None` when the point is behind the camera or the size is unknown.
    pub fn world_to_screen_point(&self, point: Vec3) -> Option<Vec2> {
        let size = self.size();
        if size == UVec2::ZERO {
            return None;
        }
        let clip = self.projection_matrix() * self.view_matrix() * point.extend(1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let size = size.as_vec2();
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * size.x,
            (1.0 - ndc.y) * 0.5 * size.y,
        ))
    }

    /// Creates or resizes the post-processing chain for this frame and
    /// returns the size it was built at.
    pub(crate) fn prepare(&self, env: &mut dyn Environment, window_size: UVec2) -> Result<UVec2> {
        let target = {
            let frame = self.frame.lock();
            if frame.requested != UVec2::ZERO {
                frame.requested
            } else {
                window_size
            }
        };
        if !self.post_processing.is_calculated() || self.post_processing.size() != target {
            self.post_processing.calculate(env, target)?;
            log::debug!("camera {} buffers at {}x{}", self.id, target.x, target.y);
        }
        let mut frame = self.frame.lock();
        frame.calculated = target;
        self.frame_changed.notify_all();
        Ok(target)
    }

    pub(crate) fn finish_frame(&self, size: UVec2) {
        let mut frame = self.frame.lock();
        frame.rendered = size;
        if frame.requested == UVec2::ZERO || frame.requested == size {
            frame.resize_pending = false;
        }
        self.frame_changed.notify_all();
    }

    /// Releases the GPU side and wakes every waiter.
    pub(crate) fn free_gpu(&self, env: &mut dyn Environment) {
        self.post_processing.free(env);
        let mut frame = self.frame.lock();
        frame.calculated = UVec2::ZERO;
        frame.rendered = UVec2::ZERO;
        frame.destroyed = true;
        self.frame_changed.notify_all();
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("direct_output", &self.is_direct_output())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::HeadlessEnvironment;

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, 1e-4)
    }

    #[test]
    fn needs_at_least_one_hdr_buffer() {
        assert!(Camera::new(0).is_err());
        let camera = Camera::new(2).unwrap();
        assert_eq!(camera.post_processing().hdr_buffer_count(), 2);
        assert!(!camera.post_processing().is_calculated());
    }

    #[test]
    fn zero_frame_size_is_rejected() {
        let camera = Camera::new(1).unwrap();
        camera.set_frame_size(640, 480).unwrap();
        assert!(matches!(
            camera.set_frame_size(0, 480),
            Err(GraphicsError::ZeroSize { .. })
        ));
        assert_eq!(camera.size(), UVec2::new(640, 480));
    }

    #[test]
    fn default_transform_looks_down_negative_z() {
        let transform = CameraTransform::default();
        assert!(approx(transform.forward(), Vec3::NEG_Z));
        let (_, right, up) = transform.basis();
        assert!(approx(right, Vec3::X));
        assert!(approx(up, Vec3::Y));
    }

    #[test]
    fn look_at_points_forward_at_the_target() {
        let mut transform = CameraTransform::new(Vec3::new(3.0, 2.0, 1.0), 0.0, 0.0);
        transform.look_at(Vec3::ZERO);
        let expected = (Vec3::ZERO - transform.position).normalize();
        assert!(approx(transform.forward(), expected));
    }

    #[test]
    fn orbit_keeps_distance_to_the_pivot() {
        let mut transform = CameraTransform::default();
        let pivot = Vec3::new(0.0, 0.0, -1.0);
        let before = transform.position.distance(pivot);
        transform.orbit_around(pivot, 0.7, 0.2);
        assert!((transform.position.distance(pivot) - before).abs() < 1e-4);
        assert!(transform.yaw.is_finite() && transform.pitch.is_finite());
    }

    #[test]
    fn nudge_wraps_yaw_and_clamps_pitch() {
        let mut transform = CameraTransform::default();
        transform.nudge(10.0 * TAU, 5.0, 0.0);
        assert!(transform.yaw >= -PI && transform.yaw <= PI);
        assert!(transform.pitch <= PITCH_LIMIT);
    }

    #[test]
    fn move_horizontal_ignores_pitch() {
        let mut transform = CameraTransform::new(Vec3::ZERO, 0.0, 0.5);
        transform.move_horizontal(0.0, 0.0, 2.0);
        assert!(approx(transform.position, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn world_to_screen_uses_top_left_origin() {
        let camera = Camera::new(1).unwrap();
        camera.set_frame_size(200, 100).unwrap();
        let center = camera.world_to_screen_point(Vec3::ZERO).unwrap();
        assert!(center.abs_diff_eq(Vec2::new(100.0, 50.0), 1e-3));

        let above = camera.world_to_screen_point(Vec3::new(0.0, 1.0, 0.0)).unwrap();
        assert!(above.y < center.y);
        assert!(camera.world_to_screen_point(Vec3::new(0.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn waits_resolve_once_the_render_thread_reports() {
        let camera = Camera::new(2).unwrap();
        assert!(matches!(
            camera.wait_calculate(Duration::from_millis(5)),
            Err(GraphicsError::Timeout(..))
        ));

        let render = {
            let camera = camera.clone();
            std::thread::spawn(move || {
                let mut env = HeadlessEnvironment::new();
                let size = camera.prepare(&mut env, UVec2::new(320, 240)).unwrap();
                camera.finish_frame(size);
                env
            })
        };
        camera.wait_calculate(Duration::from_secs(5)).unwrap();
        let mut env = render.join().unwrap();
        camera.wait_buffers_calculate(Duration::ZERO).unwrap();
        camera.free_gpu(&mut env);
        assert!(camera.is_destroyed());
        assert!(camera.wait_buffers_calculate(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn resize_is_pending_until_rendered() {
        let mut env = HeadlessEnvironment::new();
        let camera = Camera::new(1).unwrap();
        let size = camera.prepare(&mut env, UVec2::new(64, 64)).unwrap();
        camera.finish_frame(size);
        camera.wait_buffers_calculate(Duration::ZERO).unwrap();

        camera.set_frame_size(32, 16).unwrap();
        assert!(camera.wait_buffers_calculate(Duration::from_millis(1)).is_err());
        let size = camera.prepare(&mut env, UVec2::new(64, 64)).unwrap();
        assert_eq!(size, UVec2::new(32, 16));
        assert_eq!(camera.post_processing().size(), UVec2::new(32, 16));
        camera.finish_frame(size);
        camera.wait_buffers_calculate(Duration::ZERO).unwrap();
        camera.free_gpu(&mut env);
    }
}
