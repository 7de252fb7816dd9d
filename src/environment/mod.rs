//! Backend-agnostic GPU and windowing interface.
//!
//! Every [`Environment`] call is a direct GPU or platform call and must be
//! issued from the thread that made the context current. The window's
//! render thread is the only caller once the window runs.

mod events;
mod headless;
mod registry;

#[cfg(feature = "opengl")]
pub mod opengl;

pub use events::{EventHub, ScrollListener, WinEvent, WinEventCallback};
pub use headless::{HeadlessControl, HeadlessEnvironment};
pub use registry::{EnvironmentHandle, EnvironmentRegistry};

use crate::error::{GraphicsError, Result};
use glam::{IVec2, Mat4, UVec2, Vec2, Vec3, Vec4};

/// Opaque GPU object name. Zero means "not allocated".
pub type GpuHandle = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// Half-float color, used by the post-processing chain.
    Rgba16F,
    /// 8-bit color, used for id picking where exact bytes matter.
    Rgba8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuMesh {
    pub vao: GpuHandle,
    pub vbo: GpuHandle,
    pub ibo: GpuHandle,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn is_allocated(&self) -> bool {
        self.vao != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    IVec2(IVec2),
    Mat4(Mat4),
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderSource {
    pub name: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Parameters for the native window created by [`Environment::make_window`].
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub title: String,
    pub size: UVec2,
    pub fullscreen: bool,
}

/// Multi-target HDR framebuffer: `color_buffers.len()` RGBA16F attachments
/// plus a depth renderbuffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdrFramebuffer {
    pub fbo: GpuHandle,
    pub depth_rbo: GpuHandle,
    pub color_buffers: Vec<GpuHandle>,
    pub size: UVec2,
}

impl HdrFramebuffer {
    pub fn is_new(&self) -> bool {
        self.fbo == 0
    }

    pub fn free(&mut self, env: &mut dyn Environment) {
        if self.is_new() {
            return;
        }
        for texture in self.color_buffers.drain(..) {
            env.delete_texture(texture);
        }
        env.delete_renderbuffer(self.depth_rbo);
        env.delete_framebuffer(self.fbo);
        *self = Self::default();
    }
}

/// Alternating blur targets. Newness is decided by the first handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingPongFramebuffers {
    pub fbos: [GpuHandle; 2],
    pub color_buffers: [GpuHandle; 2],
    pub size: UVec2,
}

impl PingPongFramebuffers {
    pub fn is_new(&self) -> bool {
        self.fbos[0] == 0
    }

    pub fn free(&mut self, env: &mut dyn Environment) {
        if self.is_new() {
            return;
        }
        for i in 0..2 {
            env.delete_texture(self.color_buffers[i]);
            env.delete_framebuffer(self.fbos[i]);
        }
        *self = Self::default();
    }
}

/// One color attachment plus a depth-stencil renderbuffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleFramebuffer {
    pub fbo: GpuHandle,
    pub color: GpuHandle,
    pub depth_rbo: GpuHandle,
    pub size: UVec2,
}

impl SingleFramebuffer {
    pub fn is_new(&self) -> bool {
        self.fbo == 0
    }

    pub fn free(&mut self, env: &mut dyn Environment) {
        if self.is_new() {
            return;
        }
        env.delete_texture(self.color);
        env.delete_renderbuffer(self.depth_rbo);
        env.delete_framebuffer(self.fbo);
        *self = Self::default();
    }
}

/// Shared precondition for every framebuffer creation call.
pub(crate) fn check_framebuffer_size(what: &'static str, size: UVec2) -> Result<()> {
    if size.x == 0 || size.y == 0 {
        let err = GraphicsError::ZeroSize {
            what,
            width: size.x,
            height: size.y,
        };
        log::error!("{err}");
        return Err(err);
    }
    Ok(())
}

pub trait Environment: Send {
    fn name(&self) -> &'static str;

    // window and context

    fn pre_init(&mut self, samples: u32) -> Result<()>;
    fn make_window(&mut self, spec: &WindowSpec) -> Result<()>;
    fn set_context_current(&mut self) -> Result<()>;
    fn init(&mut self, swap_interval: u32) -> Result<()>;
    fn post_init(&mut self) -> Result<()>;
    fn is_window_open(&self) -> bool;
    fn close_window(&mut self);
    /// Pumps native events and dispatches each one through `hub`.
    fn poll_events(&mut self, hub: &EventHub);

    fn window_size(&self) -> UVec2;
    fn set_window_size(&mut self, size: UVec2);
    fn window_position(&self) -> IVec2;
    fn set_window_position(&mut self, position: IVec2);
    fn screen_size(&self) -> UVec2;
    fn set_window_title(&mut self, _title: &str) {}
    /// Cursor position in window pixels, top-left origin.
    fn mouse_position(&self) -> Vec2;
    fn set_cursor_position(&mut self, position: Vec2);
    fn is_fullscreen(&self) -> bool;
    fn set_fullscreen(&mut self, value: bool);

    fn vendor(&self) -> String;
    fn renderer(&self) -> String;
    fn version(&self) -> String;

    fn set_depth_test_enabled(&mut self, enabled: bool);
    fn set_viewport(&mut self, size: UVec2);
    fn clear_buffers(&mut self, color: Vec4);
    fn clear_color_buffers(&mut self, color: Vec4);
    fn swap_buffers(&mut self);
    /// Reads one RGBA8 pixel, bottom-left origin, from `fbo`'s first attachment.
    fn read_pixel(&mut self, fbo: GpuHandle, position: UVec2) -> [u8; 4];

    // shaders

    fn compile_shader(&mut self, source: &ShaderSource) -> Result<GpuHandle>;
    fn delete_shader(&mut self, program: GpuHandle);
    fn use_shader(&mut self, program: GpuHandle);
    fn set_uniform(&mut self, program: GpuHandle, name: &str, value: Uniform);

    // meshes and drawing

    fn calculate_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<GpuMesh>;
    fn calculate_quad(&mut self) -> Result<GpuMesh>;
    fn calculate_skybox(&mut self) -> Result<GpuMesh>;
    fn calculate_empty_vao(&mut self) -> Result<GpuHandle>;
    fn draw_mesh(&mut self, mesh: &GpuMesh);
    fn draw_quad(&mut self, quad: &GpuMesh);
    fn draw_skybox(&mut self, cube: &GpuMesh, cubemap: GpuHandle);
    /// Draws `vertex_count` vertices from an attribute-less VAO.
    fn draw_vertices(&mut self, vao: GpuHandle, vertex_count: u32);
    fn free_mesh(&mut self, mesh: &mut GpuMesh) -> Result<()>;
    fn free_vao(&mut self, vao: GpuHandle);

    // textures and framebuffers

    fn calculate_texture(
        &mut self,
        size: UVec2,
        rgba: &[u8],
        filter: TextureFilter,
    ) -> Result<GpuHandle>;
    /// Faces in +X, -X, +Y, -Y, +Z, -Z order.
    fn calculate_cubemap(&mut self, face_size: UVec2, faces: [&[u8]; 6]) -> Result<GpuHandle>;
    fn delete_texture(&mut self, texture: GpuHandle);
    fn free_cubemap(&mut self, cubemap: GpuHandle);
    fn bind_texture(&mut self, unit: u32, texture: GpuHandle);

    fn create_hdr_framebuffer(
        &mut self,
        size: UVec2,
        color_count: u32,
        fb: &mut HdrFramebuffer,
    ) -> Result<()>;
    fn create_ping_pong_framebuffers(
        &mut self,
        size: UVec2,
        fb: &mut PingPongFramebuffers,
    ) -> Result<()>;
    fn create_single_framebuffer(
        &mut self,
        size: UVec2,
        format: ColorFormat,
        fb: &mut SingleFramebuffer,
    ) -> Result<()>;
    fn bind_framebuffer(&mut self, fbo: GpuHandle);
    fn delete_framebuffer(&mut self, fbo: GpuHandle);
    fn delete_renderbuffer(&mut self, rbo: GpuHandle);

    // GUI

    fn init_gui(&mut self) -> Result<()>;
    fn stop_gui(&mut self);
    /// Starts a GUI frame. `None` when the GUI is not initialised.
    fn begin_gui(&mut self) -> Option<egui::Context>;
    fn end_gui(&mut self);
    fn gui_texture(&self, texture: GpuHandle) -> egui::TextureId {
        egui::TextureId::User(u64::from(texture))
    }
}
