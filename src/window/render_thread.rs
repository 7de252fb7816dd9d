use super::canvas::GuiFrame;
use super::Window;
use crate::environment::{Environment, WindowSpec};
use crate::error::Result;
use crate::timing::FrameTiming;
use glam::Vec4;
use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc};
use std::time::Instant;

pub(super) fn run(window: Arc<Window>, ready: mpsc::Sender<Result<()>>) {
    let init = {
        let mut env = window.env.lock();
        let result = init_context(&window, &mut **env);
        if let Err(err) = &result {
            log::error!("window \"{}\" failed to start: {err}", window.config.title);
            window.render.free_all(&mut **env);
            if env.is_window_open() {
                env.close_window();
            }
        }
        result
    };
    let started = init.is_ok();
    // run() may have timed out and dropped the receiver
    let _ = ready.send(init);
    if !started {
        window.mark_thread_finished();
        return;
    }

    let mut timing = FrameTiming::new();
    while !window.should_stop() {
        let mut env = window.env.lock();
        frame(&window, &mut **env, &mut timing);
        if !env.is_window_open() {
            break;
        }
    }

    teardown(&window, &mut **window.env.lock());
    window.mark_thread_finished();
}

fn init_context(window: &Window, env: &mut dyn Environment) -> Result<()> {
    let config = &window.config;
    env.pre_init(config.samples)?;
    env.make_window(&WindowSpec {
        title: config.title.clone(),
        size: config.format.size(),
        fullscreen: config.fullscreen,
    })?;
    env.set_context_current()?;
    env.init(config.swap_interval())?;
    env.post_init()?;
    window.flags.is_env_init.store(true, Ordering::SeqCst);
    env.init_gui()?;
    window.render.init_gpu(env)?;
    publish_window_state(window, env);
    log::info!(
        "{} context ready: {} / {} / {}",
        env.name(),
        env.vendor(),
        env.renderer(),
        env.version()
    );
    Ok(())
}

fn publish_window_state(window: &Window, env: &dyn Environment) {
    let mut cached = window.cached.lock();
    cached.window_size = env.window_size();
    cached.position = env.window_position();
    cached.fullscreen = env.is_fullscreen();
    cached.mouse = env.mouse_position();
}

fn frame(window: &Window, env: &mut dyn Environment, timing: &mut FrameTiming) {
    if let Some(fps) = timing.update(Instant::now()) {
        window.cached.lock().fps = fps;
        env.set_window_title(&format!("{} - {fps:.0} fps", window.config.title));
    }

    let hub = window.env.events().clone();
    env.poll_events(&hub);

    let left_down = window.input.lock().left_down;
    let commands: Vec<_> = window.commands.lock().drain(..).collect();
    for command in commands {
        command.apply(env);
    }
    publish_window_state(window, env);

    let (destroyed, active) = {
        let mut cameras = window.cameras.lock();
        let destroyed = cameras.drain();
        (destroyed, cameras.active())
    };
    for camera in destroyed {
        camera.free_gpu(env);
        log::debug!("camera {} destroyed", camera.id());
    }

    window.render.update_resources(env);

    if let Some((camera, region)) = window.aimed.take_request() {
        let mouse = env.mouse_position();
        let picked = match region.to_frame_pixel(mouse, camera.size()) {
            Some(pixel) => window.render.pick(env, &camera, pixel).unwrap_or_else(|err| {
                log::error!("aimed mesh pick failed: {err}");
                None
            }),
            None => None,
        };
        window.aimed.publish(picked);
    }

    let mouse = env.mouse_position();
    if let Err(err) = window.render.process_tool(env, mouse, left_down) {
        log::error!("manipulation tool failed: {err}");
    }

    let window_size = env.window_size();
    env.bind_framebuffer(0);
    env.set_viewport(window_size);
    env.clear_buffers(Vec4::from(window.config.clear_color));
    for camera in &active {
        if let Err(err) = window.render.render_camera(env, camera, window_size) {
            log::error!("camera {} failed to render: {err}", camera.id());
            window.flags.has_errors.store(true, Ordering::SeqCst);
        }
    }
    env.bind_framebuffer(0);
    env.set_viewport(window_size);

    if window.is_gui_enabled() {
        if let Some(ctx) = env.begin_gui() {
            if let Some(canvas) = window.canvas.lock().as_mut() {
                canvas.draw(&GuiFrame::new(&ctx, &*env));
            }
            env.end_gui();
        }
    }

    env.swap_buffers();
    window.finish_frame();
}

fn teardown(window: &Window, env: &mut dyn Environment) {
    window.aimed.close();
    let cameras = window.cameras.lock().take_all();
    for camera in cameras {
        camera.free_gpu(env);
    }
    window.render.free_all(env);
    env.stop_gui();
    env.close_window();
    log::debug!("render thread for \"{}\" finished", window.config.title);
}
