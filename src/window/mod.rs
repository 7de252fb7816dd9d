//! The native window and its render thread.
//!
//! A window goes Create → Init → Run → Close → Free. Every call outside
//! that order fails with [`GraphicsError::Lifecycle`] and changes nothing.
//! Caller threads only enqueue work (cameras, commands, pick requests);
//! the render thread applies it at the next frame boundary.

mod aimed;
mod cameras;
mod canvas;
mod commands;
mod render_thread;

pub use canvas::{Canvas, GuiFrame};
pub use commands::WindowCommand;

use crate::config::WindowConfig;
use crate::environment::{EnvironmentHandle, WinEvent};
use crate::error::{GraphicsError, Result};
use crate::render::{Camera, Render, ViewportRegion};
use crate::types::Mesh;
use aimed::AimSlot;
use cameras::CameraQueues;
use glam::{IVec2, UVec2, Vec2};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct WindowFlags {
    is_create: AtomicBool,
    is_init: AtomicBool,
    is_run: AtomicBool,
    is_close: AtomicBool,
    is_free: AtomicBool,
    has_errors: AtomicBool,
    is_env_init: AtomicBool,
    is_window_close: AtomicBool,
    is_window_focus: AtomicBool,
}

fn flag(value: &AtomicBool) -> bool {
    value.load(Ordering::SeqCst)
}

fn raise(value: &AtomicBool) {
    value.store(true, Ordering::SeqCst);
}

/// Event-driven state, written by the win-event callback and consumed at
/// the frame boundary.
#[derive(Debug, Default)]
struct InputState {
    left_down: bool,
    right_down: bool,
}

/// Values the render thread publishes for caller threads.
#[derive(Debug, Default, Clone, Copy)]
struct Cached {
    window_size: UVec2,
    position: IVec2,
    mouse: Vec2,
    fullscreen: bool,
    fps: f32,
}

#[derive(Debug, Default)]
struct FrameCounter {
    frames: u64,
    finished: bool,
}

pub struct Window {
    config: WindowConfig,
    env: EnvironmentHandle,
    render: Arc<Render>,
    flags: WindowFlags,
    gui_enabled: AtomicBool,
    cameras: Mutex<CameraQueues>,
    aimed: AimSlot,
    commands: Mutex<VecDeque<WindowCommand>>,
    canvas: Mutex<Option<Box<dyn Canvas>>>,
    input: Mutex<InputState>,
    cached: Mutex<Cached>,
    frames: Mutex<FrameCounter>,
    frame_done: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Window {
    pub fn new(env: EnvironmentHandle, config: WindowConfig) -> Arc<Self> {
        let render = Render::new();
        render.set_grid_enabled(config.grid_enabled);
        render.set_clear_color(config.clear_color.into());
        Arc::new(Self {
            gui_enabled: AtomicBool::new(config.gui_enabled),
            cached: Mutex::new(Cached {
                window_size: config.format.size(),
                fullscreen: config.fullscreen,
                ..Cached::default()
            }),
            config,
            env,
            render: Arc::new(render),
            flags: WindowFlags::default(),
            cameras: Mutex::new(CameraQueues::default()),
            aimed: AimSlot::default(),
            commands: Mutex::new(VecDeque::new()),
            canvas: Mutex::new(None),
            input: Mutex::new(InputState::default()),
            frames: Mutex::new(FrameCounter::default()),
            frame_done: Condvar::new(),
            thread: Mutex::new(None),
        })
    }

    fn lifecycle_error(&self, what: String) -> GraphicsError {
        let err = GraphicsError::Lifecycle(what);
        log::error!("{err}");
        err
    }

    /// Validates the configuration.
    pub fn create(&self) -> Result<()> {
        if flag(&self.flags.is_create) {
            return Err(self.lifecycle_error("window is already created".to_string()));
        }
        if !self.config.format.is_valid() {
            let size = self.config.format.size();
            let err = GraphicsError::ZeroSize {
                what: "window format",
                width: size.x,
                height: size.y,
            };
            log::error!("{err}");
            return Err(err);
        }
        if self.config.title.trim().is_empty() {
            let err = GraphicsError::InvalidArgument("window title is empty".to_string());
            log::error!("{err}");
            return Err(err);
        }
        raise(&self.flags.is_create);
        Ok(())
    }

    /// Installs the win-event callback.
    pub fn init(self: &Arc<Self>) -> Result<()> {
        if !flag(&self.flags.is_create) || flag(&self.flags.is_init) {
            return Err(self.lifecycle_error("init needs a created, uninitialised window".to_string()));
        }
        let weak: Weak<Window> = Arc::downgrade(self);
        let replaced = self.env.events().set_callback(Box::new(move |event| {
            if let Some(window) = weak.upgrade() {
                window.on_event(event);
            }
        }));
        if replaced {
            log::warn!("window replaced an existing win-event callback");
        }
        raise(&self.flags.is_init);
        Ok(())
    }

    /// Starts the render thread and waits for the window and GPU context
    /// to come up, at most `init_timeout`.
    pub fn run(self: &Arc<Self>) -> Result<()> {
        if !flag(&self.flags.is_init) || flag(&self.flags.is_run) || flag(&self.flags.is_close) {
            return Err(self.lifecycle_error("run needs an initialised window that never ran".to_string()));
        }
        let (ready_tx, ready_rx) = mpsc::channel();
        let window = self.clone();
        let handle = std::thread::Builder::new()
            .name("render".to_string())
            .spawn(move || render_thread::run(window, ready_tx))?;

        match ready_rx.recv_timeout(self.config.init_timeout()) {
            Ok(Ok(())) => {
                *self.thread.lock() = Some(handle);
                raise(&self.flags.is_run);
                log::info!("window \"{}\" is running", self.config.title);
                Ok(())
            }
            Ok(Err(err)) => {
                raise(&self.flags.has_errors);
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                raise(&self.flags.has_errors);
                raise(&self.flags.is_close);
                // the thread tears down on its own once the backend returns
                *self.thread.lock() = Some(handle);
                let err = GraphicsError::Timeout(self.config.init_timeout(), "window initialisation");
                log::error!("{err}");
                Err(err)
            }
        }
    }

    /// Stops the render loop and waits for it to release every GPU object.
    pub fn close(&self) -> Result<()> {
        if !flag(&self.flags.is_run) || flag(&self.flags.is_close) {
            return Err(self.lifecycle_error("close needs a running window".to_string()));
        }
        raise(&self.flags.is_close);
        self.aimed.close();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                raise(&self.flags.has_errors);
                log::error!("render thread panicked");
            }
        }
        log::info!("window \"{}\" closed", self.config.title);
        Ok(())
    }

    /// Drops every camera reference. The window must be closed, or never
    /// have run.
    pub fn free(&self) -> Result<()> {
        if !flag(&self.flags.is_create) || flag(&self.flags.is_free) {
            return Err(self.lifecycle_error("free needs a created window that is not freed".to_string()));
        }
        if flag(&self.flags.is_run) && !flag(&self.flags.is_close) {
            return Err(self.lifecycle_error("close the window before freeing it".to_string()));
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!("render thread of \"{}\" is still starting, detaching it", self.config.title);
            }
        }
        self.cameras.lock().clear();
        self.canvas.lock().take();
        if flag(&self.flags.is_init) {
            self.env.events().clear_callback();
        }
        raise(&self.flags.is_free);
        Ok(())
    }

    pub fn is_create(&self) -> bool {
        flag(&self.flags.is_create)
    }

    pub fn is_init(&self) -> bool {
        flag(&self.flags.is_init)
    }

    pub fn is_run(&self) -> bool {
        flag(&self.flags.is_run)
    }

    pub fn is_close(&self) -> bool {
        flag(&self.flags.is_close)
    }

    pub fn is_free(&self) -> bool {
        flag(&self.flags.is_free)
    }

    pub fn has_errors(&self) -> bool {
        flag(&self.flags.has_errors)
    }

    pub fn is_env_init(&self) -> bool {
        flag(&self.flags.is_env_init)
    }

    /// True once the user asked the OS to close the window.
    pub fn is_window_close(&self) -> bool {
        flag(&self.flags.is_window_close)
    }

    pub fn is_window_focus(&self) -> bool {
        flag(&self.flags.is_window_focus)
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn environment(&self) -> &EnvironmentHandle {
        &self.env
    }

    pub fn render(&self) -> &Arc<Render> {
        &self.render
    }

    /// Queues `camera` for the next frame boundary.
    pub fn add_camera(&self, camera: Arc<Camera>) -> Result<()> {
        self.cameras.lock().add(camera)
    }

    /// Queues `camera` for teardown. A camera both added and destroyed
    /// before the boundary is never activated.
    pub fn destroy_camera(&self, camera: Option<&Arc<Camera>>) -> Result<()> {
        self.cameras.lock().destroy(camera)
    }

    pub fn active_cameras(&self) -> Vec<Arc<Camera>> {
        self.cameras.lock().active()
    }

    /// Cameras that would be active after the next boundary.
    pub fn surviving_cameras(&self) -> Vec<Arc<Camera>> {
        self.cameras.lock().surviving()
    }

    /// `(active, pending add, pending destroy)` counts.
    pub fn camera_counts(&self) -> (usize, usize, usize) {
        self.cameras.lock().counts()
    }

    /// Asks the render thread for the mesh under the cursor in `camera`'s
    /// image shown at `region`. False if a request is already outstanding
    /// or the window is closing.
    pub fn require_aimed_mesh(&self, camera: Arc<Camera>, region: ViewportRegion) -> bool {
        if flag(&self.flags.is_close) {
            return false;
        }
        self.aimed.require(camera, region)
    }

    pub fn is_aimed_mesh_pending(&self) -> bool {
        self.aimed.is_outstanding()
    }

    pub fn pop_aimed_mesh(&self) -> Option<Arc<Mesh>> {
        self.aimed.pop()
    }

    pub fn wait_aimed_mesh(&self, timeout: Duration) -> Result<Option<Arc<Mesh>>> {
        self.aimed.wait(timeout)
    }

    /// False if a canvas is already installed.
    pub fn set_canvas(&self, canvas: Box<dyn Canvas>) -> bool {
        let mut slot = self.canvas.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(canvas);
        true
    }

    pub fn remove_canvas(&self) -> Option<Box<dyn Canvas>> {
        self.canvas.lock().take()
    }

    pub fn set_gui_enabled(&self, value: bool) {
        self.gui_enabled.store(value, Ordering::SeqCst);
    }

    pub fn is_gui_enabled(&self) -> bool {
        self.gui_enabled.load(Ordering::SeqCst)
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            let err = GraphicsError::ZeroSize {
                what: "window",
                width,
                height,
            };
            log::error!("{err}");
            return Err(err);
        }
        self.push_command(WindowCommand::Resize(UVec2::new(width, height)));
        Ok(())
    }

    pub fn move_to(&self, x: i32, y: i32) {
        self.push_command(WindowCommand::Move(IVec2::new(x, y)));
    }

    pub fn centralize_window(&self) {
        self.push_command(WindowCommand::CentralizeWindow);
    }

    pub fn centralize_cursor(&self) {
        self.push_command(WindowCommand::CentralizeCursor);
    }

    pub fn set_fullscreen(&self, value: bool) {
        self.push_command(WindowCommand::SetFullScreen(value));
    }

    fn push_command(&self, command: WindowCommand) {
        self.commands.lock().push_back(command);
    }

    pub fn is_fullscreen(&self) -> bool {
        self.cached.lock().fullscreen
    }

    pub fn window_size(&self) -> UVec2 {
        self.cached.lock().window_size
    }

    pub fn window_position(&self) -> IVec2 {
        self.cached.lock().position
    }

    /// Cursor position in window pixels as of the last frame.
    pub fn mouse_position(&self) -> Vec2 {
        self.cached.lock().mouse
    }

    /// Cursor position in screen pixels as of the last frame.
    pub fn global_mouse_position(&self) -> Vec2 {
        let cached = self.cached.lock();
        cached.position.as_vec2() + cached.mouse
    }

    pub fn is_left_mouse_down(&self) -> bool {
        self.input.lock().left_down
    }

    pub fn is_right_mouse_down(&self) -> bool {
        self.input.lock().right_down
    }

    pub fn fps(&self) -> f32 {
        self.cached.lock().fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.lock().frames
    }

    /// Blocks until `count` whole frames ran after this call.
    pub fn wait_frames(&self, count: u64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock();
        let target = frames.frames + count;
        while frames.frames < target {
            if frames.finished {
                return Err(GraphicsError::Lifecycle(
                    "render thread stopped before the frames ran".to_string(),
                ));
            }
            if self.frame_done.wait_until(&mut frames, deadline).timed_out() {
                return Err(GraphicsError::Timeout(timeout, "window frames"));
            }
        }
        Ok(())
    }

    fn on_event(&self, event: WinEvent) {
        match event {
            WinEvent::Close => raise(&self.flags.is_window_close),
            WinEvent::Focus(focused) => self.flags.is_window_focus.store(focused, Ordering::SeqCst),
            WinEvent::Resize { width, height } => {
                log::debug!("window resized to {width}x{height}");
                self.cached.lock().window_size = UVec2::new(width, height);
            }
            WinEvent::Move { x, y } => self.cached.lock().position = IVec2::new(x, y),
            WinEvent::LeftClick { pressed } => self.input.lock().left_down = pressed,
            WinEvent::RightClick { pressed } => self.input.lock().right_down = pressed,
            WinEvent::Scroll { .. } => {}
        }
    }

    fn should_stop(&self) -> bool {
        flag(&self.flags.is_close) || flag(&self.flags.is_window_close)
    }

    fn finish_frame(&self) {
        self.frames.lock().frames += 1;
        self.frame_done.notify_all();
    }

    fn mark_thread_finished(&self) {
        self.frames.lock().finished = true;
        self.frame_done.notify_all();
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if flag(&self.flags.is_create) && !flag(&self.flags.is_free) {
            log::warn!("window \"{}\" dropped without free", self.config.title);
        }
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("title", &self.config.title)
            .field("env", &self.env.name())
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowFormat;
    use crate::environment::{HeadlessControl, HeadlessEnvironment};
    use crate::types::{geometry, Mesh};
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(10);

    fn config() -> WindowConfig {
        WindowConfig {
            title: "test".to_string(),
            format: WindowFormat::Custom {
                width: 200,
                height: 200,
            },
            vsync: false,
            ..WindowConfig::default()
        }
    }

    fn window() -> (Arc<Window>, Arc<HeadlessControl>) {
        crate::logging::init_for_tests();
        let env = HeadlessEnvironment::new();
        let control = env.control();
        (Window::new(EnvironmentHandle::new(env), config()), control)
    }

    fn initialised() -> (Arc<Window>, Arc<HeadlessControl>) {
        let (window, control) = window();
        window.create().unwrap();
        window.init().unwrap();
        (window, control)
    }

    fn running() -> (Arc<Window>, Arc<HeadlessControl>) {
        let (window, control) = initialised();
        window.run().unwrap();
        (window, control)
    }

    fn shut_down(window: &Window) {
        window.close().unwrap();
        window.free().unwrap();
    }

    #[test]
    fn phases_must_run_in_order() {
        let (window, _control) = window();
        assert!(matches!(window.init(), Err(GraphicsError::Lifecycle(_))));
        assert!(window.run().is_err());
        assert!(window.close().is_err());
        assert!(window.free().is_err());
        window.create().unwrap();
        assert!(window.create().is_err());
        assert!(window.run().is_err());
        window.init().unwrap();
        assert!(window.close().is_err());
        assert!(!window.is_run());
        window.free().unwrap();
        assert!(window.free().is_err());
    }

    #[test]
    fn zero_sized_format_is_rejected() {
        let env = EnvironmentHandle::new(HeadlessEnvironment::new());
        let config = WindowConfig {
            format: WindowFormat::Custom {
                width: 0,
                height: 10,
            },
            ..config()
        };
        let window = Window::new(env, config);
        assert!(matches!(window.create(), Err(GraphicsError::ZeroSize { .. })));
        assert!(!window.is_create());
    }

    #[test]
    fn context_failure_is_reported_by_run() {
        let (window, control) = initialised();
        control.set_fail_context_creation(true);
        assert!(matches!(window.run(), Err(GraphicsError::ContextCreation(_))));
        assert!(window.has_errors());
        assert!(!window.is_run());
        assert!(!window.is_env_init());
        window.free().unwrap();
    }

    #[test]
    fn run_returns_at_init_timeout_while_the_backend_stalls() {
        crate::logging::init_for_tests();
        let env = HeadlessEnvironment::new();
        let control = env.control();
        control.set_make_window_delay(Duration::from_millis(600));
        let config = WindowConfig {
            init_timeout_ms: 50,
            ..config()
        };
        let window = Window::new(EnvironmentHandle::new(env), config);
        window.create().unwrap();
        window.init().unwrap();

        let started = Instant::now();
        assert!(matches!(window.run(), Err(GraphicsError::Timeout(..))));
        assert!(started.elapsed() < Duration::from_millis(400), "{:?}", started.elapsed());
        assert!(window.has_errors());
        assert!(window.is_close());
        assert!(!window.is_run());

        // the late render thread sees the close flag and tears down alone
        let deadline = Instant::now() + WAIT;
        while !window.thread.lock().as_ref().is_some_and(|h| h.is_finished()) {
            assert!(Instant::now() < deadline, "render thread never finished");
            std::thread::sleep(Duration::from_millis(10));
        }
        window.free().unwrap();
        assert!(window.thread.lock().is_none());
    }

    #[test]
    fn added_camera_is_active_after_a_frame() {
        let (window, _control) = running();
        assert!(window.is_env_init());
        let camera = Camera::new(2).unwrap();
        window.add_camera(camera.clone()).unwrap();
        window.wait_frames(2, WAIT).unwrap();

        let active = window.active_cameras();
        assert_eq!(active.len(), 1);
        assert!(Arc::ptr_eq(&active[0], &camera));
        let post = camera.post_processing();
        assert_ne!(post.final_texture_id(), 0);
        assert_ne!(post.colored_image(), 0);
        assert_ne!(post.bloom_mask(), 0);
        assert_eq!(post.size(), UVec2::new(200, 200));
        camera.wait_buffers_calculate(WAIT).unwrap();
        assert!(!window.has_errors());
        shut_down(&window);
    }

    #[test]
    fn destroying_nothing_leaves_collections_alone() {
        let (window, _control) = running();
        window.add_camera(Camera::new(1).unwrap()).unwrap();
        window.wait_frames(2, WAIT).unwrap();
        let before = window.camera_counts();
        assert!(matches!(
            window.destroy_camera(None),
            Err(GraphicsError::NullHandle(_))
        ));
        assert_eq!(window.camera_counts(), before);
        shut_down(&window);
    }

    #[test]
    fn camera_destroyed_before_the_boundary_never_activates() {
        let (window, _control) = initialised();
        let first = Camera::new(1).unwrap();
        let second = Camera::new(1).unwrap();
        window.add_camera(first.clone()).unwrap();
        window.destroy_camera(Some(&first)).unwrap();
        window.destroy_camera(Some(&second)).unwrap();
        window.add_camera(second.clone()).unwrap();
        assert_eq!(window.camera_counts(), (0, 2, 2));

        window.run().unwrap();
        window.wait_frames(2, WAIT).unwrap();
        assert!(window.active_cameras().is_empty());
        assert!(first.is_destroyed() && second.is_destroyed());
        assert_eq!(first.post_processing().final_texture_id(), 0);
        shut_down(&window);
    }

    #[test]
    fn aimed_mesh_is_the_one_under_the_cursor() {
        let (window, control) = running();
        let cube = Mesh::new("cube", geometry::create_cube());
        window.render().register_mesh(cube.clone()).unwrap();
        let camera = Camera::new(1).unwrap();
        camera.set_frame_size(200, 200).unwrap();
        window.add_camera(camera.clone()).unwrap();
        let region = ViewportRegion::full(UVec2::new(200, 200));

        control.set_mouse_position(glam::Vec2::new(100.0, 100.0));
        assert!(window.require_aimed_mesh(camera.clone(), region));
        let hit = window.wait_aimed_mesh(WAIT).unwrap();
        assert!(Arc::ptr_eq(&hit.unwrap(), &cube));

        control.set_mouse_position(glam::Vec2::new(5.0, 5.0));
        assert!(window.require_aimed_mesh(camera.clone(), region));
        assert!(window.wait_aimed_mesh(WAIT).unwrap().is_none());
        assert!(window.pop_aimed_mesh().is_none());

        shut_down(&window);
        assert!(!window.require_aimed_mesh(camera, region));
    }

    #[test]
    fn concurrent_aim_requests_have_one_winner() {
        let (window, _control) = initialised();
        let camera = Camera::new(1).unwrap();
        let region = ViewportRegion::full(UVec2::new(200, 200));
        let results: Vec<bool> = (0..2)
            .map(|_| {
                let (window, camera) = (window.clone(), camera.clone());
                std::thread::spawn(move || window.require_aimed_mesh(camera, region))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert_eq!(results.iter().filter(|&&won| won).count(), 1);
        window.free().unwrap();
    }

    #[test]
    fn events_and_commands_apply_at_the_frame_boundary() {
        let (window, control) = running();
        control.push_event(WinEvent::Focus(true));
        control.push_event(WinEvent::Move { x: 30, y: 40 });
        window.resize(320, 240).unwrap();
        assert!(window.resize(0, 240).is_err());
        window.wait_frames(2, WAIT).unwrap();
        assert!(window.is_window_focus());
        assert_eq!(window.window_size(), UVec2::new(320, 240));
        assert_eq!(window.window_position(), IVec2::new(30, 40));

        window.set_fullscreen(true);
        window.wait_frames(2, WAIT).unwrap();
        assert!(window.is_fullscreen());
        shut_down(&window);
    }

    #[test]
    fn os_resize_reaches_cached_size_and_window_sized_cameras() {
        let (window, control) = running();
        let camera = Camera::new(1).unwrap();
        window.add_camera(camera.clone()).unwrap();
        window.wait_frames(2, WAIT).unwrap();
        assert_eq!(camera.post_processing().size(), UVec2::new(200, 200));

        control.push_event(WinEvent::Resize { width: 300, height: 150 });
        window.wait_frames(2, WAIT).unwrap();
        assert_eq!(window.window_size(), UVec2::new(300, 150));
        assert_eq!(camera.post_processing().size(), UVec2::new(300, 150));
        shut_down(&window);
    }

    #[test]
    fn os_close_stops_the_loop() {
        let (window, control) = running();
        control.push_event(WinEvent::Close);
        let err = window.wait_frames(1_000_000, WAIT).unwrap_err();
        assert!(matches!(err, GraphicsError::Lifecycle(_)));
        assert!(window.is_window_close());
        shut_down(&window);
    }

    #[test]
    fn canvas_is_drawn_every_gui_frame() {
        let (window, _control) = running();
        let draws = Arc::new(AtomicUsize::new(0));
        let counter = draws.clone();
        assert!(window.set_canvas(Box::new(move |frame: &GuiFrame<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(frame.ctx.screen_rect().width() > 0.0);
        })));
        assert!(!window.set_canvas(Box::new(|_: &GuiFrame<'_>| {})));
        window.wait_frames(2, WAIT).unwrap();
        assert!(draws.load(Ordering::SeqCst) >= 1);

        window.set_gui_enabled(false);
        window.wait_frames(1, WAIT).unwrap();
        let seen = draws.load(Ordering::SeqCst);
        window.wait_frames(2, WAIT).unwrap();
        assert_eq!(draws.load(Ordering::SeqCst), seen);
        assert!(window.remove_canvas().is_some());
        shut_down(&window);
    }

    #[test]
    fn close_releases_every_gpu_object() {
        let (window, control) = running();
        window.add_camera(Camera::new(3).unwrap()).unwrap();
        window
            .render()
            .register_mesh(Mesh::new("cube", geometry::create_cube()))
            .unwrap();
        window.wait_frames(2, WAIT).unwrap();
        assert!(control.live_framebuffers() > 0);
        assert!(window.free().is_err());

        window.close().unwrap();
        assert_eq!(control.live_framebuffers(), 0);
        assert_eq!(control.live_textures(), 0);
        assert_eq!(control.live_meshes(), 0);
        assert!(window.close().is_err());
        window.free().unwrap();
        assert_eq!(window.camera_counts(), (0, 0, 0));
    }
}
