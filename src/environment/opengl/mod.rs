//! Native window with an OpenGL 3.3 core context.
//!
//! Built on winit for the window and events, glutin for the context and
//! glow for GL calls. The event loop, window and context are created on
//! the render thread by `make_window` and stay bound to it.

mod gui;
mod handles;
mod native;

use super::{
    check_framebuffer_size, ColorFormat, Environment, EventHub, GpuHandle, GpuMesh,
    HdrFramebuffer, PingPongFramebuffers, ShaderSource, SingleFramebuffer, TextureFilter,
    Uniform, Vertex, WinEvent, WindowSpec,
};
use crate::error::{GraphicsError, Result};
use glam::{IVec2, UVec2, Vec2, Vec4};
use glow::{HasContext, PixelPackData, PixelUnpackData};
use gui::{GuiHost, GuiPainter};
use native::{EventCollector, NativeWindow, ThreadBound};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::EventLoop;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::Fullscreen;

const QUAD_VERTICES: [f32; 24] = [
    -1.0, 1.0, 0.0, 1.0, //
    -1.0, -1.0, 0.0, 0.0, //
    1.0, -1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 0.0, //
    1.0, 1.0, 1.0, 1.0,
];

const SKYBOX_EXTENT: f32 = 10.0;

#[rustfmt::skip]
const SKYBOX_VERTICES: [f32; 108] = [
    -1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,   1.0,  1.0, -1.0,  -1.0,  1.0, -1.0,
    -1.0, -1.0,  1.0,  -1.0, -1.0, -1.0,  -1.0,  1.0, -1.0,
    -1.0,  1.0, -1.0,  -1.0,  1.0,  1.0,  -1.0, -1.0,  1.0,
     1.0, -1.0, -1.0,   1.0, -1.0,  1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,   1.0,  1.0, -1.0,   1.0, -1.0, -1.0,
    -1.0, -1.0,  1.0,  -1.0,  1.0,  1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,   1.0, -1.0,  1.0,  -1.0, -1.0,  1.0,
    -1.0,  1.0, -1.0,   1.0,  1.0, -1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,  -1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,
    -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,   1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,
];

/// Everything that only exists while a native window is open.
struct Live {
    native: NativeWindow,
    gl: Option<glow::Context>,
    gui: Option<(GuiHost, GuiPainter)>,
    gui_frame_open: bool,
}

/// OpenGL backend. Construct it anywhere, then hand it to a window; all
/// native work happens on that window's render thread.
pub struct OpenGlEnvironment {
    event_loop: Option<ThreadBound<EventLoop<()>>>,
    live: Option<ThreadBound<Live>>,
    samples: u32,
    cursor: Vec2,
    close_requested: bool,
    current_program: GpuHandle,
    bound_fbo: GpuHandle,
    uniforms: HashMap<GpuHandle, HashMap<String, Option<glow::UniformLocation>>>,
    meshes: HashSet<GpuHandle>,
    textures: HashSet<GpuHandle>,
}

impl OpenGlEnvironment {
    pub fn new() -> Self {
        Self {
            event_loop: None,
            live: None,
            samples: 0,
            cursor: Vec2::ZERO,
            close_requested: false,
            current_program: 0,
            bound_fbo: 0,
            uniforms: HashMap::new(),
            meshes: HashSet::new(),
            textures: HashSet::new(),
        }
    }

    fn live(&self) -> Option<&Live> {
        self.live.as_ref().and_then(|live| live.get().ok())
    }

    fn live_mut(&mut self) -> Option<&mut Live> {
        self.live.as_mut().and_then(|live| live.get_mut().ok())
    }

    /// The GL context, if current on this thread.
    fn gl(&self) -> Option<&glow::Context> {
        self.live().and_then(|live| live.gl.as_ref())
    }

    fn require_gl(&self) -> Result<&glow::Context> {
        self.gl()
            .ok_or_else(|| GraphicsError::Backend("no current GL context".to_string()))
    }

    fn uniform_location(&mut self, program: GpuHandle, name: &str) -> Option<glow::UniformLocation> {
        if let Some(location) = self.uniforms.get(&program).and_then(|names| names.get(name)) {
            return location.clone();
        }
        let location = {
            let gl = self.gl()?;
            let handle = handles::program(program)?;
            unsafe { gl.get_uniform_location(handle, name) }
        };
        self.uniforms
            .entry(program)
            .or_default()
            .insert(name.to_string(), location.clone());
        location
    }

    fn translate(&mut self, event: &WindowEvent) -> Option<WinEvent> {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.close_requested = true;
                Some(WinEvent::Close)
            }
            WindowEvent::Resized(size) => {
                if let Some(live) = self.live() {
                    live.native.resize_surface(size.width, size.height);
                }
                Some(WinEvent::Resize {
                    width: size.width,
                    height: size.height,
                })
            }
            WindowEvent::Moved(position) => Some(WinEvent::Move {
                x: position.x,
                y: position.y,
            }),
            WindowEvent::Focused(focused) => Some(WinEvent::Focus(*focused)),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                None
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = *state == ElementState::Pressed;
                match button {
                    MouseButton::Left => Some(WinEvent::LeftClick { pressed }),
                    MouseButton::Right => Some(WinEvent::RightClick { pressed }),
                    _ => None,
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (x, y) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (f64::from(*x), f64::from(*y)),
                    MouseScrollDelta::PixelDelta(p) => (p.x, p.y),
                };
                Some(WinEvent::Scroll { x, y })
            }
            _ => None,
        }
    }

    fn color_texture(gl: &glow::Context, size: UVec2, format: ColorFormat) -> Result<glow::Texture> {
        let (internal, ty) = match format {
            ColorFormat::Rgba16F => (glow::RGBA16F, glow::FLOAT),
            ColorFormat::Rgba8 => (glow::RGBA8, glow::UNSIGNED_BYTE),
        };
        let filter = match format {
            ColorFormat::Rgba16F => glow::LINEAR,
            ColorFormat::Rgba8 => glow::NEAREST,
        };
        unsafe {
            let texture = gl.create_texture().map_err(GraphicsError::Backend)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            Self::storage(gl, size, internal, ty);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            Ok(texture)
        }
    }

    /// (Re)allocates storage for the bound 2D texture.
    unsafe fn storage(gl: &glow::Context, size: UVec2, internal: u32, ty: u32) {
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            internal as i32,
            size.x as i32,
            size.y as i32,
            0,
            glow::RGBA,
            ty,
            PixelUnpackData::Slice(None),
        );
    }

    fn check_complete(gl: &glow::Context, what: &'static str) -> Result<()> {
        let status = unsafe { gl.check_framebuffer_status(glow::FRAMEBUFFER) };
        unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
        if status != glow::FRAMEBUFFER_COMPLETE {
            let err = GraphicsError::FramebufferIncomplete { what, status };
            log::error!("{err}");
            return Err(err);
        }
        Ok(())
    }

    fn depth_renderbuffer(gl: &glow::Context, rbo: glow::Renderbuffer, size: UVec2) {
        unsafe {
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(rbo));
            gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH24_STENCIL8,
                size.x as i32,
                size.y as i32,
            );
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(rbo),
            );
        }
    }

    fn upload_vertices(&mut self, floats: &[f32], layout: &[i32]) -> Result<GpuMesh> {
        let gl = self.require_gl()?;
        let stride: i32 = layout.iter().sum::<i32>() * 4;
        let bytes: Vec<u8> = floats.iter().flat_map(|f| f.to_ne_bytes()).collect();
        let mesh = unsafe {
            let vao = gl.create_vertex_array().map_err(GraphicsError::Backend)?;
            let vbo = gl.create_buffer().map_err(GraphicsError::Backend)?;
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW);
            let mut offset = 0;
            for (location, &size) in layout.iter().enumerate() {
                gl.enable_vertex_attrib_array(location as u32);
                gl.vertex_attrib_pointer_f32(location as u32, size, glow::FLOAT, false, stride, offset);
                offset += size * 4;
            }
            gl.bind_vertex_array(None);
            GpuMesh {
                vao: vao.0.get(),
                vbo: vbo.0.get(),
                ibo: 0,
                index_count: (floats.len() as i32 / (stride / 4)) as u32,
            }
        };
        self.meshes.insert(mesh.vao);
        Ok(mesh)
    }
}

impl Default for OpenGlEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for OpenGlEnvironment {
    fn name(&self) -> &'static str {
        "opengl"
    }

    fn pre_init(&mut self, samples: u32) -> Result<()> {
        self.samples = samples;
        Ok(())
    }

    fn make_window(&mut self, spec: &WindowSpec) -> Result<()> {
        check_framebuffer_size("window", spec.size)?;
        if self.live.is_some() {
            return Err(GraphicsError::Lifecycle("native window already exists".to_string()));
        }
        match self.event_loop.as_mut() {
            // SAFETY: the window that used this loop joined its render
            // thread before releasing the environment.
            Some(event_loop) => unsafe { event_loop.adopt() },
            None => self.event_loop = Some(ThreadBound::new(native::create_event_loop()?)),
        }
        let event_loop = self
            .event_loop
            .as_ref()
            .ok_or_else(|| GraphicsError::ContextCreation("no event loop".to_string()))?;
        let native = NativeWindow::create(event_loop.get()?, spec, self.samples)?;
        log::info!(
            "opened \"{}\" {}x{} ({} samples)",
            spec.title,
            spec.size.x,
            spec.size.y,
            native.samples
        );
        self.close_requested = false;
        self.live = Some(ThreadBound::new(Live {
            native,
            gl: None,
            gui: None,
            gui_frame_open: false,
        }));
        Ok(())
    }

    fn set_context_current(&mut self) -> Result<()> {
        let live = self
            .live_mut()
            .ok_or_else(|| GraphicsError::ContextCreation("no window to bind a context to".to_string()))?;
        live.native.make_current()?;
        if live.gl.is_none() {
            live.gl = Some(live.native.load_gl());
        }
        Ok(())
    }

    fn init(&mut self, swap_interval: u32) -> Result<()> {
        let live = self
            .live()
            .ok_or_else(|| GraphicsError::ContextCreation("no window".to_string()))?;
        if live.gl.is_none() {
            return Err(GraphicsError::ContextCreation("context is not current".to_string()));
        }
        live.native.set_swap_interval(swap_interval);
        Ok(())
    }

    fn post_init(&mut self) -> Result<()> {
        let gl = self.require_gl()?;
        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LESS);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.enable(glow::TEXTURE_CUBE_MAP_SEAMLESS);
            if self.samples > 0 {
                gl.enable(glow::MULTISAMPLE);
            }
        }
        Ok(())
    }

    fn is_window_open(&self) -> bool {
        self.live().is_some() && !self.close_requested
    }

    fn close_window(&mut self) {
        if let Some(mut live) = self.live.take() {
            if let Ok(live) = live.get_mut() {
                if let (Some((_, painter)), Some(gl)) = (live.gui.take(), live.gl.as_ref()) {
                    painter.destroy(gl);
                }
            }
        }
        self.uniforms.clear();
        self.current_program = 0;
        self.bound_fbo = 0;
        if !self.meshes.is_empty() || !self.textures.is_empty() {
            log::warn!(
                "closing the GL context with {} meshes and {} textures still alive",
                self.meshes.len(),
                self.textures.len()
            );
            self.meshes.clear();
            self.textures.clear();
        }
    }

    fn poll_events(&mut self, hub: &EventHub) {
        let Some(event_loop) = self.event_loop.as_mut().and_then(|l| l.get_mut().ok()) else {
            return;
        };
        let mut collector = EventCollector::default();
        if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), &mut collector) {
            log::info!("event loop exited with code {code}");
            collector.events.push(WindowEvent::CloseRequested);
        }

        for event in collector.events {
            if let Some(live) = self.live.as_mut().and_then(|l| l.get_mut().ok()) {
                if let Some((host, _)) = live.gui.as_mut() {
                    host.on_window_event(&live.native.window, &event);
                }
            }
            if let Some(event) = self.translate(&event) {
                hub.dispatch(event);
            }
        }
    }

    fn window_size(&self) -> UVec2 {
        self.live()
            .map(|live| {
                let size = live.native.window.inner_size();
                UVec2::new(size.width, size.height)
            })
            .unwrap_or(UVec2::ZERO)
    }

    fn set_window_size(&mut self, size: UVec2) {
        if let Some(live) = self.live() {
            let _ = live
                .native
                .window
                .request_inner_size(PhysicalSize::new(size.x, size.y));
            live.native.resize_surface(size.x, size.y);
        }
    }

    fn window_position(&self) -> IVec2 {
        self.live()
            .and_then(|live| live.native.window.outer_position().ok())
            .map_or(IVec2::ZERO, |p| IVec2::new(p.x, p.y))
    }

    fn set_window_position(&mut self, position: IVec2) {
        if let Some(live) = self.live() {
            live.native
                .window
                .set_outer_position(PhysicalPosition::new(position.x, position.y));
        }
    }

    fn screen_size(&self) -> UVec2 {
        self.live()
            .and_then(|live| live.native.window.current_monitor())
            .map(|monitor| {
                let size = monitor.size();
                UVec2::new(size.width, size.height)
            })
            .unwrap_or_else(|| self.window_size())
    }

    fn set_window_title(&mut self, title: &str) {
        if let Some(live) = self.live() {
            live.native.window.set_title(title);
        }
    }

    fn mouse_position(&self) -> Vec2 {
        self.cursor
    }

    fn set_cursor_position(&mut self, position: Vec2) {
        if let Some(live) = self.live() {
            let target = PhysicalPosition::new(f64::from(position.x), f64::from(position.y));
            if let Err(err) = live.native.window.set_cursor_position(target) {
                log::warn!("cursor could not be moved: {err}");
                return;
            }
        }
        self.cursor = position;
    }

    fn is_fullscreen(&self) -> bool {
        self.live()
            .is_some_and(|live| live.native.window.fullscreen().is_some())
    }

    fn set_fullscreen(&mut self, value: bool) {
        if let Some(live) = self.live() {
            live.native
                .window
                .set_fullscreen(value.then_some(Fullscreen::Borderless(None)));
        }
    }

    fn vendor(&self) -> String {
        self.gl()
            .map(|gl| unsafe { gl.get_parameter_string(glow::VENDOR) })
            .unwrap_or_default()
    }

    fn renderer(&self) -> String {
        self.gl()
            .map(|gl| unsafe { gl.get_parameter_string(glow::RENDERER) })
            .unwrap_or_default()
    }

    fn version(&self) -> String {
        self.gl()
            .map(|gl| unsafe { gl.get_parameter_string(glow::VERSION) })
            .unwrap_or_default()
    }

    fn set_depth_test_enabled(&mut self, enabled: bool) {
        if let Some(gl) = self.gl() {
            unsafe {
                if enabled {
                    gl.enable(glow::DEPTH_TEST);
                } else {
                    gl.disable(glow::DEPTH_TEST);
                }
            }
        }
    }

    fn set_viewport(&mut self, size: UVec2) {
        if let Some(gl) = self.gl() {
            let size = size.max(UVec2::ONE);
            unsafe { gl.viewport(0, 0, size.x as i32, size.y as i32) };
        }
    }

    fn clear_buffers(&mut self, color: Vec4) {
        if let Some(gl) = self.gl() {
            unsafe {
                gl.clear_color(color.x, color.y, color.z, color.w);
                gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT);
            }
        }
    }

    fn clear_color_buffers(&mut self, color: Vec4) {
        if let Some(gl) = self.gl() {
            unsafe {
                gl.clear_color(color.x, color.y, color.z, color.w);
                gl.clear(glow::COLOR_BUFFER_BIT);
            }
        }
    }

    fn swap_buffers(&mut self) {
        if let Some(live) = self.live() {
            live.native.swap_buffers();
        }
    }

    fn read_pixel(&mut self, fbo: GpuHandle, position: UVec2) -> [u8; 4] {
        let mut pixel = [0u8; 4];
        let restore = self.bound_fbo;
        let Some(gl) = self.gl() else {
            return pixel;
        };
        unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, handles::framebuffer(fbo));
            gl.read_buffer(if fbo == 0 { glow::BACK } else { glow::COLOR_ATTACHMENT0 });
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            gl.read_pixels(
                position.x as i32,
                position.y as i32,
                1,
                1,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelPackData::Slice(Some(&mut pixel[..])),
            );
            gl.bind_framebuffer(glow::FRAMEBUFFER, handles::framebuffer(restore));
        }
        pixel
    }

    fn compile_shader(&mut self, source: &ShaderSource) -> Result<GpuHandle> {
        let gl = self.require_gl()?;
        let program = handles::link_program(gl, source.name, source.vertex, source.fragment)?;
        Ok(program.0.get())
    }

    fn delete_shader(&mut self, program: GpuHandle) {
        self.uniforms.remove(&program);
        if self.current_program == program {
            self.current_program = 0;
        }
        if let (Some(gl), Some(program)) = (self.gl(), handles::program(program)) {
            unsafe { gl.delete_program(program) };
        }
    }

    fn use_shader(&mut self, program: GpuHandle) {
        self.current_program = program;
        if let Some(gl) = self.gl() {
            unsafe { gl.use_program(handles::program(program)) };
        }
    }

    fn set_uniform(&mut self, program: GpuHandle, name: &str, value: Uniform) {
        let Some(location) = self.uniform_location(program, name) else {
            return;
        };
        let current = self.current_program;
        let Some(gl) = self.gl() else {
            return;
        };
        let location = Some(&location);
        unsafe {
            if current != program {
                gl.use_program(handles::program(program));
            }
            match value {
                Uniform::Bool(v) => gl.uniform_1_i32(location, i32::from(v)),
                Uniform::Int(v) => gl.uniform_1_i32(location, v),
                Uniform::Float(v) => gl.uniform_1_f32(location, v),
                Uniform::Vec2(v) => gl.uniform_2_f32(location, v.x, v.y),
                Uniform::Vec3(v) => gl.uniform_3_f32(location, v.x, v.y, v.z),
                Uniform::Vec4(v) => gl.uniform_4_f32(location, v.x, v.y, v.z, v.w),
                Uniform::IVec2(v) => gl.uniform_2_i32(location, v.x, v.y),
                Uniform::Mat4(m) => gl.uniform_matrix_4_f32_slice(location, false, &m.to_cols_array()),
            }
            if current != program {
                gl.use_program(handles::program(current));
            }
        }
    }

    fn calculate_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<GpuMesh> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(GraphicsError::InvalidArgument("mesh has no geometry".to_string()));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(GraphicsError::OutOfRange {
                what: "vertex index".to_string(),
                requested: *bad as usize,
                available: vertices.len(),
            });
        }
        let floats: Vec<f32> = vertices
            .iter()
            .flat_map(|v| v.position.into_iter().chain(v.normal).chain(v.uv))
            .collect();
        let mut mesh = self.upload_vertices(&floats, &[3, 3, 2])?;
        let gl = self.require_gl()?;
        let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_ne_bytes()).collect();
        unsafe {
            let ibo = gl.create_buffer().map_err(GraphicsError::Backend)?;
            gl.bind_vertex_array(handles::vertex_array(mesh.vao));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ibo));
            gl.buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, &index_bytes, glow::STATIC_DRAW);
            gl.bind_vertex_array(None);
            mesh.ibo = ibo.0.get();
        }
        mesh.index_count = indices.len() as u32;
        Ok(mesh)
    }

    fn calculate_quad(&mut self) -> Result<GpuMesh> {
        self.upload_vertices(&QUAD_VERTICES, &[2, 2])
    }

    fn calculate_skybox(&mut self) -> Result<GpuMesh> {
        self.upload_vertices(&SKYBOX_VERTICES.map(|v| v * SKYBOX_EXTENT), &[3])
    }

    fn calculate_empty_vao(&mut self) -> Result<GpuHandle> {
        let gl = self.require_gl()?;
        let vao = unsafe { gl.create_vertex_array() }.map_err(GraphicsError::Backend)?;
        Ok(vao.0.get())
    }

    fn draw_mesh(&mut self, mesh: &GpuMesh) {
        if let Some(gl) = self.gl() {
            unsafe {
                gl.bind_vertex_array(handles::vertex_array(mesh.vao));
                gl.draw_elements(glow::TRIANGLES, mesh.index_count as i32, glow::UNSIGNED_INT, 0);
                gl.bind_vertex_array(None);
            }
        }
    }

    fn draw_quad(&mut self, quad: &GpuMesh) {
        self.draw_vertices(quad.vao, quad.index_count);
    }

    fn draw_skybox(&mut self, cube: &GpuMesh, cubemap: GpuHandle) {
        if let Some(gl) = self.gl() {
            unsafe {
                gl.depth_func(glow::LEQUAL);
                gl.active_texture(glow::TEXTURE0);
                gl.bind_texture(glow::TEXTURE_CUBE_MAP, handles::texture(cubemap));
                gl.bind_vertex_array(handles::vertex_array(cube.vao));
                gl.draw_arrays(glow::TRIANGLES, 0, cube.index_count as i32);
                gl.bind_vertex_array(None);
                gl.depth_func(glow::LESS);
            }
        }
    }

    fn draw_vertices(&mut self, vao: GpuHandle, vertex_count: u32) {
        if let Some(gl) = self.gl() {
            unsafe {
                gl.bind_vertex_array(handles::vertex_array(vao));
                gl.draw_arrays(glow::TRIANGLES, 0, vertex_count as i32);
                gl.bind_vertex_array(None);
            }
        }
    }

    fn free_mesh(&mut self, mesh: &mut GpuMesh) -> Result<()> {
        if mesh.vao == 0 || !self.meshes.remove(&mesh.vao) {
            let err = GraphicsError::DoubleFree(format!("mesh VAO {}", mesh.vao));
            log::error!("{err}");
            return Err(err);
        }
        if let Some(gl) = self.gl() {
            unsafe {
                for buffer in [mesh.vbo, mesh.ibo].into_iter().filter_map(handles::buffer) {
                    gl.delete_buffer(buffer);
                }
                if let Some(vao) = handles::vertex_array(mesh.vao) {
                    gl.delete_vertex_array(vao);
                }
            }
        }
        *mesh = GpuMesh::default();
        Ok(())
    }

    fn free_vao(&mut self, vao: GpuHandle) {
        if let (Some(gl), Some(vao)) = (self.gl(), handles::vertex_array(vao)) {
            unsafe { gl.delete_vertex_array(vao) };
        }
    }

    fn calculate_texture(
        &mut self,
        size: UVec2,
        rgba: &[u8],
        filter: TextureFilter,
    ) -> Result<GpuHandle> {
        check_framebuffer_size("texture", size)?;
        let expected = size.x as usize * size.y as usize * 4;
        if rgba.len() != expected {
            return Err(GraphicsError::InvalidArgument(format!(
                "texture data is {} bytes, expected {expected}",
                rgba.len()
            )));
        }
        let gl = self.require_gl()?;
        let (min, mag) = match filter {
            TextureFilter::Nearest => (glow::NEAREST, glow::NEAREST),
            TextureFilter::Linear => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
        };
        let texture = unsafe {
            let texture = gl.create_texture().map_err(GraphicsError::Backend)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                size.x as i32,
                size.y as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(rgba)),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, mag as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
            if filter == TextureFilter::Linear {
                gl.generate_mipmap(glow::TEXTURE_2D);
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
            texture.0.get()
        };
        self.textures.insert(texture);
        Ok(texture)
    }

    fn calculate_cubemap(&mut self, face_size: UVec2, faces: [&[u8]; 6]) -> Result<GpuHandle> {
        check_framebuffer_size("cubemap face", face_size)?;
        let expected = face_size.x as usize * face_size.y as usize * 4;
        if let Some(bad) = faces.iter().position(|f| f.len() != expected) {
            return Err(GraphicsError::InvalidArgument(format!(
                "cubemap face {bad} is {} bytes, expected {expected}",
                faces[bad].len()
            )));
        }
        let gl = self.require_gl()?;
        let cubemap = unsafe {
            let texture = gl.create_texture().map_err(GraphicsError::Backend)?;
            gl.bind_texture(glow::TEXTURE_CUBE_MAP, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            for (i, face) in faces.into_iter().enumerate() {
                gl.tex_image_2d(
                    glow::TEXTURE_CUBE_MAP_POSITIVE_X + i as u32,
                    0,
                    glow::RGBA8 as i32,
                    face_size.x as i32,
                    face_size.y as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    PixelUnpackData::Slice(Some(face)),
                );
            }
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_R, glow::CLAMP_TO_EDGE),
            ] {
                gl.tex_parameter_i32(glow::TEXTURE_CUBE_MAP, param, value as i32);
            }
            gl.bind_texture(glow::TEXTURE_CUBE_MAP, None);
            texture.0.get()
        };
        self.textures.insert(cubemap);
        Ok(cubemap)
    }

    fn delete_texture(&mut self, texture: GpuHandle) {
        self.textures.remove(&texture);
        if let (Some(gl), Some(texture)) = (self.gl(), handles::texture(texture)) {
            unsafe { gl.delete_texture(texture) };
        }
    }

    fn free_cubemap(&mut self, cubemap: GpuHandle) {
        self.delete_texture(cubemap);
    }

    fn bind_texture(&mut self, unit: u32, texture: GpuHandle) {
        if let Some(gl) = self.gl() {
            unsafe {
                gl.active_texture(glow::TEXTURE0 + unit);
                gl.bind_texture(glow::TEXTURE_2D, handles::texture(texture));
            }
        }
    }

    fn create_hdr_framebuffer(
        &mut self,
        size: UVec2,
        color_count: u32,
        fb: &mut HdrFramebuffer,
    ) -> Result<()> {
        check_framebuffer_size("HDR framebuffer", size)?;
        if color_count == 0 {
            return Err(GraphicsError::InvalidArgument(
                "HDR framebuffer needs at least one color buffer".to_string(),
            ));
        }
        let gl = self.require_gl()?;
        unsafe {
            if fb.is_new() {
                fb.fbo = gl.create_framebuffer().map_err(GraphicsError::Backend)?.0.get();
                fb.depth_rbo = gl.create_renderbuffer().map_err(GraphicsError::Backend)?.0.get();
                fb.color_buffers = (0..color_count)
                    .map(|_| Self::color_texture(gl, size, ColorFormat::Rgba16F).map(|t| t.0.get()))
                    .collect::<Result<_>>()?;
            } else {
                for &texture in &fb.color_buffers {
                    gl.bind_texture(glow::TEXTURE_2D, handles::texture(texture));
                    Self::storage(gl, size, glow::RGBA16F, glow::FLOAT);
                }
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, handles::framebuffer(fb.fbo));
            let attachments: Vec<u32> = (0..color_count).map(|i| glow::COLOR_ATTACHMENT0 + i).collect();
            for (&attachment, &texture) in attachments.iter().zip(&fb.color_buffers) {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::TEXTURE_2D,
                    handles::texture(texture),
                    0,
                );
            }
            gl.draw_buffers(&attachments);
            if let Some(rbo) = handles::renderbuffer(fb.depth_rbo) {
                Self::depth_renderbuffer(gl, rbo, size);
            }
        }
        Self::check_complete(gl, "HDR")?;
        fb.size = size;
        self.bound_fbo = 0;
        Ok(())
    }

    fn create_ping_pong_framebuffers(
        &mut self,
        size: UVec2,
        fb: &mut PingPongFramebuffers,
    ) -> Result<()> {
        check_framebuffer_size("ping-pong framebuffer", size)?;
        let gl = self.require_gl()?;
        unsafe {
            let fresh = fb.is_new();
            for i in 0..2 {
                if fresh {
                    fb.fbos[i] = gl.create_framebuffer().map_err(GraphicsError::Backend)?.0.get();
                    fb.color_buffers[i] = Self::color_texture(gl, size, ColorFormat::Rgba16F)?.0.get();
                } else {
                    gl.bind_texture(glow::TEXTURE_2D, handles::texture(fb.color_buffers[i]));
                    Self::storage(gl, size, glow::RGBA16F, glow::FLOAT);
                }
                gl.bind_texture(glow::TEXTURE_2D, None);
                gl.bind_framebuffer(glow::FRAMEBUFFER, handles::framebuffer(fb.fbos[i]));
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0,
                    glow::TEXTURE_2D,
                    handles::texture(fb.color_buffers[i]),
                    0,
                );
                Self::check_complete(gl, "ping-pong")?;
            }
        }
        fb.size = size;
        self.bound_fbo = 0;
        Ok(())
    }

    fn create_single_framebuffer(
        &mut self,
        size: UVec2,
        format: ColorFormat,
        fb: &mut SingleFramebuffer,
    ) -> Result<()> {
        check_framebuffer_size("single framebuffer", size)?;
        let gl = self.require_gl()?;
        unsafe {
            if fb.is_new() {
                fb.fbo = gl.create_framebuffer().map_err(GraphicsError::Backend)?.0.get();
                fb.color = Self::color_texture(gl, size, format)?.0.get();
                fb.depth_rbo = gl.create_renderbuffer().map_err(GraphicsError::Backend)?.0.get();
            } else {
                let (internal, ty) = match format {
                    ColorFormat::Rgba16F => (glow::RGBA16F, glow::FLOAT),
                    ColorFormat::Rgba8 => (glow::RGBA8, glow::UNSIGNED_BYTE),
                };
                gl.bind_texture(glow::TEXTURE_2D, handles::texture(fb.color));
                Self::storage(gl, size, internal, ty);
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, handles::framebuffer(fb.fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                handles::texture(fb.color),
                0,
            );
            if let Some(rbo) = handles::renderbuffer(fb.depth_rbo) {
                Self::depth_renderbuffer(gl, rbo, size);
            }
        }
        Self::check_complete(gl, "single")?;
        fb.size = size;
        self.bound_fbo = 0;
        Ok(())
    }

    fn bind_framebuffer(&mut self, fbo: GpuHandle) {
        self.bound_fbo = fbo;
        if let Some(gl) = self.gl() {
            unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, handles::framebuffer(fbo)) };
        }
    }

    fn delete_framebuffer(&mut self, fbo: GpuHandle) {
        if self.bound_fbo == fbo {
            self.bind_framebuffer(0);
        }
        if let (Some(gl), Some(fbo)) = (self.gl(), handles::framebuffer(fbo)) {
            unsafe { gl.delete_framebuffer(fbo) };
        }
    }

    fn delete_renderbuffer(&mut self, rbo: GpuHandle) {
        if let (Some(gl), Some(rbo)) = (self.gl(), handles::renderbuffer(rbo)) {
            unsafe { gl.delete_renderbuffer(rbo) };
        }
    }

    fn init_gui(&mut self) -> Result<()> {
        let live = self
            .live_mut()
            .ok_or_else(|| GraphicsError::Lifecycle("GUI needs an open window".to_string()))?;
        if live.gui.is_some() {
            return Err(GraphicsError::Lifecycle("GUI is already initialised".to_string()));
        }
        let gl = live
            .gl
            .as_ref()
            .ok_or_else(|| GraphicsError::Backend("no current GL context".to_string()))?;
        let painter = GuiPainter::new(gl)?;
        live.gui = Some((GuiHost::new(&live.native.window), painter));
        Ok(())
    }

    fn stop_gui(&mut self) {
        if let Some(live) = self.live_mut() {
            live.gui_frame_open = false;
            if let (Some((_, painter)), Some(gl)) = (live.gui.take(), live.gl.as_ref()) {
                painter.destroy(gl);
            }
        }
    }

    fn begin_gui(&mut self) -> Option<egui::Context> {
        let live = self.live_mut()?;
        let (host, _) = live.gui.as_mut()?;
        let ctx = host.begin(&live.native.window);
        live.gui_frame_open = true;
        Some(ctx)
    }

    fn end_gui(&mut self) {
        let Some(live) = self.live_mut() else {
            return;
        };
        if !live.gui_frame_open {
            return;
        }
        live.gui_frame_open = false;
        let (Some((host, painter)), Some(gl)) = (live.gui.as_mut(), live.gl.as_ref()) else {
            return;
        };
        let frame = host.end(&live.native.window);
        painter.paint(gl, &frame);
        self.bound_fbo = 0;
        self.current_program = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{handles, OpenGlEnvironment};
    use crate::environment::{Environment, GpuMesh, ShaderSource};
    use crate::error::GraphicsError;
    use glam::UVec2;

    #[test]
    fn zero_handles_map_to_none() {
        assert!(handles::texture(0).is_none());
        assert!(handles::framebuffer(0).is_none());
        assert!(handles::vertex_array(0).is_none());
        assert_eq!(handles::program(7).map(|p| p.0.get()), Some(7));
    }

    #[test]
    fn fresh_backend_has_no_window() {
        let env = OpenGlEnvironment::new();
        assert_eq!(env.name(), "opengl");
        assert!(!env.is_window_open());
        assert_eq!(env.window_size(), UVec2::ZERO);
        assert!(env.vendor().is_empty());
    }

    #[test]
    fn gpu_calls_without_context_fail_cleanly() {
        let mut env = OpenGlEnvironment::new();
        let source = ShaderSource {
            name: "noop",
            vertex: "",
            fragment: "",
        };
        assert!(matches!(env.compile_shader(&source), Err(GraphicsError::Backend(_))));
        assert!(matches!(env.calculate_quad(), Err(GraphicsError::Backend(_))));
        assert!(matches!(
            env.create_single_framebuffer(UVec2::new(0, 4), crate::environment::ColorFormat::Rgba8, &mut Default::default()),
            Err(GraphicsError::ZeroSize { .. })
        ));
        assert!(env.begin_gui().is_none());
    }

    #[test]
    fn freeing_an_unknown_mesh_is_a_double_free() {
        let mut env = OpenGlEnvironment::new();
        let mut mesh = GpuMesh::default();
        assert!(matches!(env.free_mesh(&mut mesh), Err(GraphicsError::DoubleFree(_))));
    }
}
