//! Engine demo: a small scene, one camera and the editor windows.
//!
//! Usage: `engine-graphics [config.json]`. Runs headless unless built with
//! the `opengl` feature, in which case it opens a native window and runs
//! until it is closed.

use engine_graphics::environment::EnvironmentHandle;
use engine_graphics::scene::SceneState;
use engine_graphics::ui::{self, SCENE_WAIT};
use engine_graphics::{Camera, Engine, EnvironmentRegistry, GuiFrame, Result, Scene, WindowConfig};
use glam::Vec3;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[cfg(not(feature = "opengl"))]
const HEADLESS_FRAMES: u64 = 120;

fn main() {
    engine_graphics::logging::init();
    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => WindowConfig::load(Path::new(&path))?,
        None => WindowConfig::default(),
    };

    EnvironmentRegistry::global().set(environment());

    let engine = Engine::from_registry(config, Scene::new(demo_scene()?))?;
    engine.start()?;

    let window = engine.window();
    let camera = Camera::new(engine.config().default_hdr_buffers)?;
    camera.set_position(Vec3::new(4.0, 3.0, 6.0));
    camera.look_at(Vec3::ZERO);
    camera.post_processing().set_bloom(true);
    window.add_camera(camera.clone())?;

    {
        let camera = camera.clone();
        let scene = engine.scene().clone();
        window.set_canvas(Box::new(move |frame: &GuiFrame<'_>| {
            let pp = camera.post_processing();
            let size = pp.size().as_vec2();
            ui::texture_panel(frame.ctx, None, size, frame.texture_id(pp.final_texture_id()), true);
            if let Err(err) = ui::hierarchy_window(frame.ctx, &scene) {
                log::warn!("hierarchy: {err}");
            }
            if let Err(err) = ui::inspector_window(frame.ctx, &scene) {
                log::warn!("inspector: {err}");
            }
        }));
    }

    drive(&engine, &camera)?;

    log::info!(
        "\n{}",
        ui::scene_summary(&engine.scene().read_for(SCENE_WAIT)?.state)
    );
    engine.stop()
}

fn demo_scene() -> Result<SceneState> {
    let mut state = SceneState::new("demo");
    state.add_mesh("floor", "plane", 0, Vec3::ZERO)?;
    state.add_mesh("cube", "cube", 0, Vec3::new(0.0, 0.5, 0.0))?;
    state.add_mesh("marker", "quad", 0, Vec3::new(2.0, 1.0, -1.0))?;
    Ok(state)
}

#[cfg(not(feature = "opengl"))]
fn environment() -> EnvironmentHandle {
    EnvironmentHandle::new(engine_graphics::HeadlessEnvironment::new())
}

#[cfg(feature = "opengl")]
fn environment() -> EnvironmentHandle {
    EnvironmentHandle::new(engine_graphics::environment::opengl::OpenGlEnvironment::new())
}

#[cfg(not(feature = "opengl"))]
fn drive(engine: &Arc<Engine>, camera: &Arc<Camera>) -> Result<()> {
    let window = engine.window();
    for _ in 0..HEADLESS_FRAMES / 4 {
        camera.orbit_around(Vec3::ZERO, 0.05, 0.0);
        window.wait_frames(4, Duration::from_secs(5))?;
    }
    log::info!(
        "rendered {} frames at {:.1} fps",
        window.frame_count(),
        window.fps()
    );
    Ok(())
}

#[cfg(feature = "opengl")]
fn drive(engine: &Arc<Engine>, camera: &Arc<Camera>) -> Result<()> {
    let window = engine.window();
    let mut last_mouse: Option<glam::Vec2> = None;
    while !window.is_window_close() && engine.is_running() {
        let mouse = window.mouse_position();
        if window.is_right_mouse_down() {
            if let Some(last) = last_mouse {
                let delta = mouse - last;
                camera.orbit_around(Vec3::ZERO, -delta.x * 0.005, -delta.y * 0.005);
            }
            last_mouse = Some(mouse);
        } else {
            last_mouse = None;
        }
        std::thread::sleep(Duration::from_millis(16));
    }
    Ok(())
}
