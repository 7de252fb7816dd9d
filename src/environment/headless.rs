//! Display-less backend.
//!
//! Handles come from a counter and framebuffers go through the same
//! validation as on the GPU. Draw calls issued with `draw_mesh` are
//! rasterised as screen-space bounding boxes into the bound framebuffer's
//! draw list, so `read_pixel` answers with the color of the nearest box
//! covering the pixel. That is enough for id picking and gizmo selection.

use super::{
    check_framebuffer_size, ColorFormat, Environment, EventHub, GpuHandle, GpuMesh,
    HdrFramebuffer, PingPongFramebuffers, ShaderSource, SingleFramebuffer, TextureFilter,
    Uniform, Vertex, WinEvent, WindowSpec,
};
use crate::error::{GraphicsError, Result};
use glam::{IVec2, Mat4, UVec2, Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FRAMEBUFFER_INCOMPLETE_ATTACHMENT: u32 = 0x8CD6;

/// Shared knobs and counters for a [`HeadlessEnvironment`] that stays
/// reachable after the backend moved into an `EnvironmentHandle`.
#[derive(Default)]
pub struct HeadlessControl {
    events: Mutex<VecDeque<WinEvent>>,
    mouse: Mutex<Vec2>,
    incomplete_framebuffers: AtomicBool,
    fail_context: AtomicBool,
    make_window_delay: Mutex<Duration>,
    swaps: AtomicU64,
    draw_calls: AtomicU64,
    live_framebuffers: AtomicUsize,
    live_textures: AtomicUsize,
    live_meshes: AtomicUsize,
}

impl HeadlessControl {
    pub fn push_event(&self, event: WinEvent) {
        self.events.lock().push_back(event);
    }

    pub fn set_mouse_position(&self, position: Vec2) {
        *self.mouse.lock() = position;
    }

    /// Makes every following framebuffer completeness check fail.
    pub fn set_incomplete_framebuffers(&self, value: bool) {
        self.incomplete_framebuffers.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_context_creation(&self, value: bool) {
        self.fail_context.store(value, Ordering::SeqCst);
    }

    /// Stalls `make_window` for `delay`, like a slow driver.
    pub fn set_make_window_delay(&self, delay: Duration) {
        *self.make_window_delay.lock() = delay;
    }

    pub fn swaps(&self) -> u64 {
        self.swaps.load(Ordering::SeqCst)
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls.load(Ordering::SeqCst)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.live_framebuffers.load(Ordering::SeqCst)
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.load(Ordering::SeqCst)
    }

    pub fn live_meshes(&self) -> usize {
        self.live_meshes.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct DrawRecord {
    min: UVec2,
    max: UVec2,
    depth: f32,
    color: [u8; 4],
}

#[derive(Debug, Default)]
struct FramebufferState {
    size: UVec2,
    clear_color: [u8; 4],
    draws: Vec<DrawRecord>,
}

pub struct HeadlessEnvironment {
    control: Arc<HeadlessControl>,
    next_handle: GpuHandle,
    window_open: bool,
    context_current: bool,
    initialized: bool,
    samples: u32,
    swap_interval: u32,
    size: UVec2,
    position: IVec2,
    screen: UVec2,
    fullscreen: bool,
    depth_test: bool,
    viewport: UVec2,
    bound_fbo: GpuHandle,
    current_program: GpuHandle,
    programs: HashMap<GpuHandle, HashMap<String, Uniform>>,
    meshes: HashMap<GpuHandle, Vec<Vec3>>,
    vaos: HashSet<GpuHandle>,
    textures: HashSet<GpuHandle>,
    renderbuffers: HashSet<GpuHandle>,
    framebuffers: HashMap<GpuHandle, FramebufferState>,
    gui: Option<egui::Context>,
    gui_frame_open: bool,
}

impl HeadlessEnvironment {
    pub fn new() -> Self {
        Self::with_control(Arc::new(HeadlessControl::default()))
    }

    pub fn with_control(control: Arc<HeadlessControl>) -> Self {
        let mut framebuffers = HashMap::new();
        framebuffers.insert(0, FramebufferState::default());
        Self {
            control,
            next_handle: 1,
            window_open: false,
            context_current: false,
            initialized: false,
            samples: 0,
            swap_interval: 0,
            size: UVec2::ZERO,
            position: IVec2::ZERO,
            screen: UVec2::new(1920, 1080),
            fullscreen: false,
            depth_test: true,
            viewport: UVec2::ONE,
            bound_fbo: 0,
            current_program: 0,
            programs: HashMap::new(),
            meshes: HashMap::new(),
            vaos: HashSet::new(),
            textures: HashSet::new(),
            renderbuffers: HashSet::new(),
            framebuffers,
            gui: None,
            gui_frame_open: false,
        }
    }

    pub fn control(&self) -> Arc<HeadlessControl> {
        self.control.clone()
    }

    fn alloc(&mut self) -> GpuHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn alloc_texture(&mut self) -> GpuHandle {
        let handle = self.alloc();
        self.textures.insert(handle);
        self.control.live_textures.fetch_add(1, Ordering::SeqCst);
        handle
    }

    fn alloc_renderbuffer(&mut self) -> GpuHandle {
        let handle = self.alloc();
        self.renderbuffers.insert(handle);
        handle
    }

    fn alloc_framebuffer(&mut self) -> GpuHandle {
        let handle = self.alloc();
        self.framebuffers.insert(handle, FramebufferState::default());
        self.control.live_framebuffers.fetch_add(1, Ordering::SeqCst);
        handle
    }

    /// Resizes the storage behind `fbo` and runs the completeness check.
    fn finish_framebuffer(&mut self, what: &'static str, fbo: GpuHandle, size: UVec2) -> Result<()> {
        if let Some(state) = self.framebuffers.get_mut(&fbo) {
            state.size = size;
            state.draws.clear();
        }
        self.bound_fbo = 0;
        if self.control.incomplete_framebuffers.load(Ordering::SeqCst) {
            let err = GraphicsError::FramebufferIncomplete {
                what,
                status: FRAMEBUFFER_INCOMPLETE_ATTACHMENT,
            };
            log::error!("{err}");
            return Err(err);
        }
        Ok(())
    }

    fn uniform(&self, name: &str) -> Option<Uniform> {
        self.programs
            .get(&self.current_program)
            .and_then(|uniforms| uniforms.get(name))
            .copied()
    }

    fn uniform_mat4(&self, name: &str) -> Mat4 {
        match self.uniform(name) {
            Some(Uniform::Mat4(m)) => m,
            _ => Mat4::IDENTITY,
        }
    }

    fn uniform_color(&self) -> [u8; 4] {
        let color = match self.uniform("color") {
            Some(Uniform::Vec4(c)) => c,
            Some(Uniform::Vec3(c)) => c.extend(1.0),
            _ => Vec4::ONE,
        };
        color
            .clamp(Vec4::ZERO, Vec4::ONE)
            .to_array()
            .map(|c| (c * 255.0).round() as u8)
    }

    /// Projects the mesh and records its pixel bounding box.
    fn rasterize(&mut self, vao: GpuHandle) {
        let Some(positions) = self.meshes.get(&vao) else {
            return;
        };
        let mvp = self.uniform_mat4("projMat") * self.uniform_mat4("viewMat")
            * self.uniform_mat4("modelMat");

        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        let mut depth = f32::MAX;
        let mut any = false;
        for p in positions {
            let clip = mvp * p.extend(1.0);
            if clip.w <= 1e-6 {
                continue;
            }
            let ndc = clip.truncate() / clip.w;
            min = min.min(ndc.truncate());
            max = max.max(ndc.truncate());
            depth = depth.min(ndc.z);
            any = true;
        }
        if !any || max.x < -1.0 || max.y < -1.0 || min.x > 1.0 || min.y > 1.0 {
            return;
        }

        let viewport = self.viewport.as_vec2();
        let to_pixels = |ndc: Vec2| ((ndc.clamp(Vec2::NEG_ONE, Vec2::ONE) + 1.0) * 0.5) * viewport;
        let px_min = to_pixels(min).floor();
        let px_max = to_pixels(max).ceil().max(px_min + 1.0);
        let record = DrawRecord {
            min: px_min.as_uvec2(),
            max: px_max.as_uvec2(),
            depth,
            color: self.uniform_color(),
        };
        if let Some(state) = self.framebuffers.get_mut(&self.bound_fbo) {
            state.draws.push(record);
        }
    }
}

impl Default for HeadlessEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for HeadlessEnvironment {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn pre_init(&mut self, samples: u32) -> Result<()> {
        self.samples = samples;
        Ok(())
    }

    fn make_window(&mut self, spec: &WindowSpec) -> Result<()> {
        let delay = *self.control.make_window_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.control.fail_context.load(Ordering::SeqCst) {
            return Err(GraphicsError::ContextCreation(
                "headless context creation disabled".to_string(),
            ));
        }
        check_framebuffer_size("window", spec.size)?;
        self.size = if spec.fullscreen { self.screen } else { spec.size };
        self.fullscreen = spec.fullscreen;
        self.viewport = self.size;
        if let Some(state) = self.framebuffers.get_mut(&0) {
            state.size = self.size;
        }
        self.window_open = true;
        log::debug!("headless window \"{}\" {}x{}", spec.title, self.size.x, self.size.y);
        Ok(())
    }

    fn set_context_current(&mut self) -> Result<()> {
        if !self.window_open {
            return Err(GraphicsError::ContextCreation(
                "no window to bind a context to".to_string(),
            ));
        }
        self.context_current = true;
        Ok(())
    }

    fn init(&mut self, swap_interval: u32) -> Result<()> {
        if !self.context_current {
            return Err(GraphicsError::ContextCreation("context is not current".to_string()));
        }
        self.swap_interval = swap_interval;
        self.initialized = true;
        Ok(())
    }

    fn post_init(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(GraphicsError::ContextCreation("init was not called".to_string()));
        }
        self.depth_test = true;
        Ok(())
    }

    fn is_window_open(&self) -> bool {
        self.window_open
    }

    fn close_window(&mut self) {
        self.window_open = false;
        self.context_current = false;
    }

    fn poll_events(&mut self, hub: &EventHub) {
        let events: Vec<WinEvent> = self.control.events.lock().drain(..).collect();
        for event in events {
            match event {
                WinEvent::Resize { width, height } => {
                    self.size = UVec2::new(width, height);
                    if let Some(state) = self.framebuffers.get_mut(&0) {
                        state.size = self.size;
                    }
                }
                WinEvent::Move { x, y } => self.position = IVec2::new(x, y),
                _ => {}
            }
            hub.dispatch(event);
        }
    }

    fn window_size(&self) -> UVec2 {
        self.size
    }

    fn set_window_size(&mut self, size: UVec2) {
        self.size = size;
        if let Some(state) = self.framebuffers.get_mut(&0) {
            state.size = size;
        }
    }

    fn window_position(&self) -> IVec2 {
        self.position
    }

    fn set_window_position(&mut self, position: IVec2) {
        self.position = position;
    }

    fn screen_size(&self) -> UVec2 {
        self.screen
    }

    fn mouse_position(&self) -> Vec2 {
        *self.control.mouse.lock()
    }

    fn set_cursor_position(&mut self, position: Vec2) {
        *self.control.mouse.lock() = position;
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn set_fullscreen(&mut self, value: bool) {
        self.fullscreen = value;
        if value {
            self.position = IVec2::ZERO;
            self.set_window_size(self.screen);
        }
    }

    fn vendor(&self) -> String {
        "engine-graphics".to_string()
    }

    fn renderer(&self) -> String {
        "headless".to_string()
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn set_depth_test_enabled(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_viewport(&mut self, size: UVec2) {
        self.viewport = size.max(UVec2::ONE);
    }

    fn clear_buffers(&mut self, color: Vec4) {
        self.clear_color_buffers(color);
    }

    fn clear_color_buffers(&mut self, color: Vec4) {
        let bytes = color
            .clamp(Vec4::ZERO, Vec4::ONE)
            .to_array()
            .map(|c| (c * 255.0).round() as u8);
        if let Some(state) = self.framebuffers.get_mut(&self.bound_fbo) {
            state.clear_color = bytes;
            state.draws.clear();
        }
    }

    fn swap_buffers(&mut self) {
        self.control.swaps.fetch_add(1, Ordering::SeqCst);
        if self.swap_interval > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn read_pixel(&mut self, fbo: GpuHandle, position: UVec2) -> [u8; 4] {
        let Some(state) = self.framebuffers.get(&fbo) else {
            log::warn!("read_pixel on unknown framebuffer {fbo}");
            return [0; 4];
        };
        let covering = state.draws.iter().filter(|d| {
            position.x >= d.min.x && position.x < d.max.x && position.y >= d.min.y && position.y < d.max.y
        });
        let hit = if self.depth_test {
            covering.fold(None::<&DrawRecord>, |best, d| match best {
                Some(b) if b.depth < d.depth => Some(b),
                _ => Some(d),
            })
        } else {
            covering.last()
        };
        hit.map_or(state.clear_color, |d| d.color)
    }

    fn compile_shader(&mut self, source: &ShaderSource) -> Result<GpuHandle> {
        if source.vertex.trim().is_empty() {
            return Err(GraphicsError::ShaderCompile {
                stage: "vertex",
                log: format!("{}: empty source", source.name),
            });
        }
        if source.fragment.trim().is_empty() {
            return Err(GraphicsError::ShaderCompile {
                stage: "fragment",
                log: format!("{}: empty source", source.name),
            });
        }
        let program = self.alloc();
        self.programs.insert(program, HashMap::new());
        Ok(program)
    }

    fn delete_shader(&mut self, program: GpuHandle) {
        self.programs.remove(&program);
        if self.current_program == program {
            self.current_program = 0;
        }
    }

    fn use_shader(&mut self, program: GpuHandle) {
        self.current_program = program;
    }

    fn set_uniform(&mut self, program: GpuHandle, name: &str, value: Uniform) {
        if let Some(uniforms) = self.programs.get_mut(&program) {
            uniforms.insert(name.to_string(), value);
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
        let vao = self.alloc();
        let vbo = self.alloc();
        let ibo = self.alloc();
        self.vaos.insert(vao);
        self.meshes
            .insert(vao, vertices.iter().map(|v| Vec3::from(v.position)).collect());
        self.control.live_meshes.fetch_add(1, Ordering::SeqCst);
        Ok(GpuMesh {
            vao,
            vbo,
            ibo,
            index_count: indices.len() as u32,
        })
    }

    fn calculate_quad(&mut self) -> Result<GpuMesh> {
        let vao = self.alloc();
        let vbo = self.alloc();
        self.vaos.insert(vao);
        self.control.live_meshes.fetch_add(1, Ordering::SeqCst);
        Ok(GpuMesh {
            vao,
            vbo,
            ibo: 0,
            index_count: 6,
        })
    }

    fn calculate_skybox(&mut self) -> Result<GpuMesh> {
        let vao = self.alloc();
        let vbo = self.alloc();
        self.vaos.insert(vao);
        self.control.live_meshes.fetch_add(1, Ordering::SeqCst);
        Ok(GpuMesh {
            vao,
            vbo,
            ibo: 0,
            index_count: 36,
        })
    }

    fn calculate_empty_vao(&mut self) -> Result<GpuHandle> {
        let vao = self.alloc();
        self.vaos.insert(vao);
        Ok(vao)
    }

    fn draw_mesh(&mut self, mesh: &GpuMesh) {
        self.control.draw_calls.fetch_add(1, Ordering::SeqCst);
        self.rasterize(mesh.vao);
    }

    fn draw_quad(&mut self, _quad: &GpuMesh) {
        self.control.draw_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn draw_skybox(&mut self, _cube: &GpuMesh, _cubemap: GpuHandle) {
        self.control.draw_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn draw_vertices(&mut self, _vao: GpuHandle, _vertex_count: u32) {
        self.control.draw_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn free_mesh(&mut self, mesh: &mut GpuMesh) -> Result<()> {
        if mesh.vao == 0 || !self.vaos.remove(&mesh.vao) {
            let err = GraphicsError::DoubleFree(format!("mesh VAO {}", mesh.vao));
            log::error!("{err}");
            return Err(err);
        }
        self.meshes.remove(&mesh.vao);
        self.control.live_meshes.fetch_sub(1, Ordering::SeqCst);
        *mesh = GpuMesh::default();
        Ok(())
    }

    fn free_vao(&mut self, vao: GpuHandle) {
        self.vaos.remove(&vao);
    }

    fn calculate_texture(
        &mut self,
        size: UVec2,
        rgba: &[u8],
        _filter: TextureFilter,
    ) -> Result<GpuHandle> {
        check_framebuffer_size("texture", size)?;
        let expected = size.x as usize * size.y as usize * 4;
        if rgba.len() != expected {
            return Err(GraphicsError::InvalidArgument(format!(
                "texture data is {} bytes, expected {expected}",
                rgba.len()
            )));
        }
        Ok(self.alloc_texture())
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
        Ok(self.alloc_texture())
    }

    fn delete_texture(&mut self, texture: GpuHandle) {
        if self.textures.remove(&texture) {
            self.control.live_textures.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn free_cubemap(&mut self, cubemap: GpuHandle) {
        self.delete_texture(cubemap);
    }

    fn bind_texture(&mut self, _unit: u32, _texture: GpuHandle) {}

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
        if fb.is_new() {
            fb.fbo = self.alloc_framebuffer();
            fb.depth_rbo = self.alloc_renderbuffer();
            fb.color_buffers = (0..color_count).map(|_| self.alloc_texture()).collect();
        }
        self.finish_framebuffer("HDR", fb.fbo, size)?;
        fb.size = size;
        Ok(())
    }

    fn create_ping_pong_framebuffers(
        &mut self,
        size: UVec2,
        fb: &mut PingPongFramebuffers,
    ) -> Result<()> {
        check_framebuffer_size("ping-pong framebuffer", size)?;
        if fb.is_new() {
            for i in 0..2 {
                fb.fbos[i] = self.alloc_framebuffer();
                fb.color_buffers[i] = self.alloc_texture();
            }
        }
        for i in 0..2 {
            self.finish_framebuffer("ping-pong", fb.fbos[i], size)?;
        }
        fb.size = size;
        Ok(())
    }

    fn create_single_framebuffer(
        &mut self,
        size: UVec2,
        _format: ColorFormat,
        fb: &mut SingleFramebuffer,
    ) -> Result<()> {
        check_framebuffer_size("single framebuffer", size)?;
        if fb.is_new() {
            fb.fbo = self.alloc_framebuffer();
            fb.color = self.alloc_texture();
            fb.depth_rbo = self.alloc_renderbuffer();
        }
        self.finish_framebuffer("single", fb.fbo, size)?;
        fb.size = size;
        Ok(())
    }

    fn bind_framebuffer(&mut self, fbo: GpuHandle) {
        self.bound_fbo = fbo;
    }

    fn delete_framebuffer(&mut self, fbo: GpuHandle) {
        if fbo != 0 && self.framebuffers.remove(&fbo).is_some() {
            self.control.live_framebuffers.fetch_sub(1, Ordering::SeqCst);
            if self.bound_fbo == fbo {
                self.bound_fbo = 0;
            }
        }
    }

    fn delete_renderbuffer(&mut self, rbo: GpuHandle) {
        self.renderbuffers.remove(&rbo);
    }

    fn init_gui(&mut self) -> Result<()> {
        if self.gui.is_some() {
            return Err(GraphicsError::Lifecycle("GUI is already initialised".to_string()));
        }
        self.gui = Some(egui::Context::default());
        Ok(())
    }

    fn stop_gui(&mut self) {
        if self.gui_frame_open {
            self.end_gui();
        }
        self.gui = None;
    }

    fn begin_gui(&mut self) -> Option<egui::Context> {
        let ctx = self.gui.clone()?;
        let raw_input = egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(self.size.x as f32, self.size.y as f32),
            )),
            ..Default::default()
        };
        ctx.begin_pass(raw_input);
        self.gui_frame_open = true;
        Some(ctx)
    }

    fn end_gui(&mut self) {
        if !self.gui_frame_open {
            return;
        }
        self.gui_frame_open = false;
        if let Some(ctx) = &self.gui {
            let _ = ctx.end_pass();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_env() -> HeadlessEnvironment {
        let mut env = HeadlessEnvironment::new();
        env.pre_init(4).unwrap();
        env.make_window(&WindowSpec {
            title: "test".to_string(),
            size: UVec2::new(320, 240),
            fullscreen: false,
        })
        .unwrap();
        env.set_context_current().unwrap();
        env.init(0).unwrap();
        env.post_init().unwrap();
        env
    }

    #[test]
    fn hdr_resize_keeps_handles() {
        let mut env = ready_env();
        let mut fb = HdrFramebuffer::default();
        assert!(fb.is_new());
        env.create_hdr_framebuffer(UVec2::new(800, 600), 2, &mut fb).unwrap();
        let first = fb.clone();
        assert!(!fb.is_new());
        assert_eq!(fb.color_buffers.len(), 2);

        env.create_hdr_framebuffer(UVec2::new(1920, 1080), 2, &mut fb).unwrap();
        assert_eq!(fb.fbo, first.fbo);
        assert_eq!(fb.depth_rbo, first.depth_rbo);
        assert_eq!(fb.color_buffers, first.color_buffers);
        assert_eq!(fb.size, UVec2::new(1920, 1080));
    }

    #[test]
    fn zero_size_leaves_previous_state() {
        let mut env = ready_env();
        let mut fb = PingPongFramebuffers::default();
        assert!(env.create_ping_pong_framebuffers(UVec2::new(0, 10), &mut fb).is_err());
        assert!(fb.is_new());

        env.create_ping_pong_framebuffers(UVec2::new(64, 64), &mut fb).unwrap();
        let before = fb;
        let err = env
            .create_ping_pong_framebuffers(UVec2::new(64, 0), &mut fb)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ZeroSize { .. }));
        assert_eq!(fb, before);
    }

    #[test]
    fn incomplete_framebuffer_binds_default() {
        let mut env = ready_env();
        let control = env.control();
        control.set_incomplete_framebuffers(true);
        let mut fb = SingleFramebuffer::default();
        env.bind_framebuffer(99);
        let err = env
            .create_single_framebuffer(UVec2::new(16, 16), ColorFormat::Rgba8, &mut fb)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::FramebufferIncomplete { .. }));
        assert_eq!(env.bound_fbo, 0);
        assert_eq!(fb.size, UVec2::ZERO);
    }

    #[test]
    fn nearest_draw_wins_the_pixel_read() {
        let mut env = ready_env();
        let mut fb = SingleFramebuffer::default();
        env.create_single_framebuffer(UVec2::new(100, 100), ColorFormat::Rgba8, &mut fb)
            .unwrap();
        let quad = [
            Vertex::new([-0.5, -0.5, 0.0], [0.0; 3], [0.0; 2]),
            Vertex::new([0.5, -0.5, 0.0], [0.0; 3], [0.0; 2]),
            Vertex::new([0.5, 0.5, 0.0], [0.0; 3], [0.0; 2]),
        ];
        let mesh = env.calculate_mesh(&quad, &[0, 1, 2]).unwrap();
        let program = env
            .compile_shader(&ShaderSource {
                name: "flat",
                vertex: "void main() {}",
                fragment: "void main() {}",
            })
            .unwrap();

        env.bind_framebuffer(fb.fbo);
        env.set_viewport(fb.size);
        env.clear_buffers(Vec4::ZERO);
        env.use_shader(program);

        env.set_uniform(program, "modelMat", Uniform::Mat4(Mat4::from_translation(Vec3::Z * 0.5)));
        env.set_uniform(program, "color", Uniform::Vec3(Vec3::new(0.0, 0.0, 1.0 / 255.0)));
        env.draw_mesh(&mesh);
        env.set_uniform(program, "modelMat", Uniform::Mat4(Mat4::IDENTITY));
        env.set_uniform(program, "color", Uniform::Vec3(Vec3::new(0.0, 0.0, 2.0 / 255.0)));
        env.draw_mesh(&mesh);

        assert_eq!(env.read_pixel(fb.fbo, UVec2::new(50, 50)), [0, 0, 2, 255]);
        assert_eq!(env.read_pixel(fb.fbo, UVec2::new(5, 5)), [0, 0, 0, 0]);
    }

    #[test]
    fn freeing_a_zero_vao_is_an_error() {
        let mut env = ready_env();
        let mut mesh = GpuMesh::default();
        assert!(matches!(env.free_mesh(&mut mesh), Err(GraphicsError::DoubleFree(_))));
    }

    #[test]
    fn context_must_follow_window() {
        let mut env = HeadlessEnvironment::new();
        assert!(env.set_context_current().is_err());
        env.control().set_fail_context_creation(true);
        let spec = WindowSpec {
            title: "x".to_string(),
            size: UVec2::new(10, 10),
            fullscreen: false,
        };
        assert!(matches!(env.make_window(&spec), Err(GraphicsError::ContextCreation(_))));
    }
}
