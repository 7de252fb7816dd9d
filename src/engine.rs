//! Top-level runtime: one window, the shared scene and the mesh library.

use crate::config::WindowConfig;
use crate::environment::{EnvironmentHandle, EnvironmentRegistry};
use crate::error::{GraphicsError, Result};
use crate::render::{Camera, Render};
use crate::scene::{Scene, UsePoints};
use crate::types::MeshLibrary;
use crate::ui::SCENE_WAIT;
use crate::window::Window;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct Engine {
    env: EnvironmentHandle,
    config: WindowConfig,
    window: Mutex<Arc<Window>>,
    scene: Arc<UsePoints<Scene>>,
    library: Arc<MeshLibrary>,
    reloads: AtomicU32,
}

impl Engine {
    pub fn new(env: EnvironmentHandle, config: WindowConfig, scene: Scene) -> Arc<Self> {
        Arc::new(Self {
            window: Mutex::new(Window::new(env.clone(), config.clone())),
            env,
            config,
            scene: Arc::new(UsePoints::new(scene)),
            library: Arc::new(MeshLibrary::with_primitives()),
            reloads: AtomicU32::new(0),
        })
    }

    /// Builds the engine on the process-wide environment.
    pub fn from_registry(config: WindowConfig, scene: Scene) -> Result<Arc<Self>> {
        let env = EnvironmentRegistry::global()
            .get()
            .ok_or(GraphicsError::EnvironmentNotSet)?;
        Ok(Self::new(env, config, scene))
    }

    pub fn window(&self) -> Arc<Window> {
        self.window.lock().clone()
    }

    pub fn render(&self) -> Arc<Render> {
        self.window().render().clone()
    }

    pub fn scene(&self) -> &Arc<UsePoints<Scene>> {
        &self.scene
    }

    pub fn library(&self) -> &Arc<MeshLibrary> {
        &self.library
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn environment(&self) -> &EnvironmentHandle {
        &self.env
    }

    pub fn reload_count(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        let window = self.window();
        window.is_run() && !window.is_close()
    }

    /// Brings the window up and binds the scene's meshes to its render.
    pub fn start(&self) -> Result<()> {
        let window = self.window();
        bring_up(&window)?;
        self.bind_scene(window.render())?;
        log::info!("engine started on {}", self.env.name());
        Ok(())
    }

    /// Tears the window down and builds a fresh one with the same
    /// configuration. The scene is rebound to the new render, the canvas
    /// and GUI flag move over, and every active or pending-add camera not
    /// queued for destruction is replaced by a new camera with the same
    /// settings. Returns the replacements in order.
    pub fn reload(&self) -> Result<Vec<Arc<Camera>>> {
        let old = self.window();
        if !old.is_run() {
            let err = GraphicsError::Lifecycle("reload needs a started engine".to_string());
            log::error!("{err}");
            return Err(err);
        }
        log::info!("reloading engine");
        let cameras = old.surviving_cameras();
        let canvas = old.remove_canvas();
        let gui_enabled = old.is_gui_enabled();
        if !old.is_close() {
            old.close()?;
        }
        old.free()?;
        self.scene.write_for(SCENE_WAIT)?.unbind_all();

        let window = Window::new(self.env.clone(), self.config.clone());
        *self.window.lock() = window.clone();
        bring_up(&window)?;
        window.set_gui_enabled(gui_enabled);
        if let Some(canvas) = canvas {
            window.set_canvas(canvas);
        }

        let mut replacements = Vec::with_capacity(cameras.len());
        for camera in &cameras {
            let replacement = Camera::new(camera.post_processing().hdr_buffer_count())?;
            replacement.set_transform(camera.transform());
            replacement.set_projection(camera.projection());
            replacement.set_direct_output(camera.is_direct_output());
            replacement
                .post_processing()
                .set_settings(camera.post_processing().settings());
            if let Some(size) = camera.requested_size() {
                replacement.set_frame_size(size.x, size.y)?;
            }
            window.add_camera(replacement.clone())?;
            replacements.push(replacement);
        }

        self.bind_scene(window.render())?;
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(replacements)
    }

    /// Closes and frees the window.
    pub fn stop(&self) -> Result<()> {
        let window = self.window();
        if window.is_run() && !window.is_close() {
            window.close()?;
        }
        if window.is_create() && !window.is_free() {
            window.free()?;
        }
        log::info!("engine stopped");
        Ok(())
    }

    fn bind_scene(&self, render: &Render) -> Result<()> {
        let mut scene = self.scene.write_for(SCENE_WAIT)?;
        scene.instantiate(&self.library, render)?;
        Ok(())
    }
}

fn bring_up(window: &Arc<Window>) -> Result<()> {
    window.create()?;
    window.init()?;
    if let Err(err) = window.run() {
        let _ = window.free();
        return Err(err);
    }
    Ok(())
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("env", &self.env.name())
            .field("window", &self.config.title)
            .field("reloads", &self.reload_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowFormat;
    use crate::environment::{HeadlessControl, HeadlessEnvironment};
    use crate::scene::SceneState;
    use glam::{UVec2, Vec3};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn engine() -> (Arc<Engine>, Arc<HeadlessControl>) {
        crate::logging::init_for_tests();
        let env = HeadlessEnvironment::new();
        let control = env.control();
        let mut state = SceneState::new("engine");
        state.add_mesh("left", "cube", 0, Vec3::new(-1.5, 0.0, 0.0)).unwrap();
        state.add_mesh("right", "cube", 0, Vec3::new(1.5, 0.0, 0.0)).unwrap();
        let config = WindowConfig {
            title: "engine".to_string(),
            format: WindowFormat::Custom {
                width: 160,
                height: 120,
            },
            vsync: false,
            ..WindowConfig::default()
        };
        (
            Engine::new(EnvironmentHandle::new(env), config, Scene::new(state)),
            control,
        )
    }

    #[test]
    fn start_binds_the_scene_to_the_render() {
        let (engine, _control) = engine();
        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.render().mesh_count(), 2);
        engine.window().wait_frames(2, WAIT).unwrap();
        assert!(engine.render().meshes().iter().all(|mesh| mesh.is_calculated()));
        engine.stop().unwrap();
        assert!(!engine.is_running());
    }

    #[test]
    fn reload_needs_a_started_engine() {
        let (engine, _control) = engine();
        assert!(matches!(engine.reload(), Err(GraphicsError::Lifecycle(_))));
    }

    #[test]
    fn reload_rebuilds_window_scene_and_cameras() {
        let (engine, control) = engine();
        engine.start().unwrap();
        let first_window = engine.window();
        let camera = Camera::new(2).unwrap();
        camera.set_frame_size(64, 32).unwrap();
        camera.set_direct_output(true);
        camera.post_processing().set_bloom_amount(4);
        first_window.add_camera(camera.clone()).unwrap();
        first_window.wait_frames(2, WAIT).unwrap();
        let old_meshes = engine.render().meshes();

        let replacements = engine.reload().unwrap();
        assert_eq!(engine.reload_count(), 1);
        assert!(first_window.is_free());
        assert!(camera.is_destroyed());
        assert!(old_meshes.iter().all(|mesh| !mesh.is_calculated()));

        assert_eq!(replacements.len(), 1);
        let replacement = &replacements[0];
        assert_eq!(replacement.requested_size(), Some(UVec2::new(64, 32)));
        assert!(replacement.is_direct_output());
        assert_eq!(replacement.post_processing().settings().bloom_amount, 4);

        let window = engine.window();
        assert!(!Arc::ptr_eq(&window, &first_window));
        window.wait_frames(2, WAIT).unwrap();
        assert_eq!(window.active_cameras().len(), 1);
        replacement.wait_buffers_calculate(WAIT).unwrap();
        assert_eq!(engine.render().mesh_count(), 2);
        let scene = engine.scene().read_for(WAIT).unwrap();
        assert_eq!(scene.runtime.mesh_count(), 2);
        drop(scene);

        engine.stop().unwrap();
        assert_eq!(control.live_framebuffers(), 0);
        assert_eq!(control.live_meshes(), 0);
    }

    #[test]
    fn reload_carries_cameras_added_before_the_boundary() {
        let (engine, _control) = engine();
        engine.start().unwrap();
        let window = engine.window();
        let kept = Camera::new(1).unwrap();
        let dropped = Camera::new(1).unwrap();
        kept.set_frame_size(48, 24).unwrap();
        window.add_camera(kept.clone()).unwrap();
        window.add_camera(dropped.clone()).unwrap();
        window.destroy_camera(Some(&dropped)).unwrap();

        let replacements = engine.reload().unwrap();
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].requested_size(), Some(UVec2::new(48, 24)));
        engine.window().wait_frames(2, WAIT).unwrap();
        assert_eq!(engine.window().active_cameras().len(), 1);
        engine.stop().unwrap();
    }
}
