//! `GpuHandle` <-> glow object conversions. GL names are non-zero, so
//! zero maps to `None` everywhere.

use crate::environment::GpuHandle;
use crate::error::{GraphicsError, Result};
use glow::HasContext;
use std::num::NonZeroU32;

pub(super) fn texture(handle: GpuHandle) -> Option<glow::Texture> {
    NonZeroU32::new(handle).map(glow::NativeTexture)
}

pub(super) fn framebuffer(handle: GpuHandle) -> Option<glow::Framebuffer> {
    NonZeroU32::new(handle).map(glow::NativeFramebuffer)
}

pub(super) fn renderbuffer(handle: GpuHandle) -> Option<glow::Renderbuffer> {
    NonZeroU32::new(handle).map(glow::NativeRenderbuffer)
}

pub(super) fn program(handle: GpuHandle) -> Option<glow::Program> {
    NonZeroU32::new(handle).map(glow::NativeProgram)
}

pub(super) fn vertex_array(handle: GpuHandle) -> Option<glow::VertexArray> {
    NonZeroU32::new(handle).map(glow::NativeVertexArray)
}

pub(super) fn buffer(handle: GpuHandle) -> Option<glow::Buffer> {
    NonZeroU32::new(handle).map(glow::NativeBuffer)
}

pub(super) fn link_program(
    gl: &glow::Context,
    name: &str,
    vertex: &str,
    fragment: &str,
) -> Result<glow::Program> {
    unsafe {
        let compile = |stage: &'static str, ty: u32, source: &str| -> Result<glow::Shader> {
            let shader = gl.create_shader(ty).map_err(GraphicsError::Backend)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = format!("{name}: {}", gl.get_shader_info_log(shader));
                gl.delete_shader(shader);
                let err = GraphicsError::ShaderCompile { stage, log };
                log::error!("{err}");
                return Err(err);
            }
            Ok(shader)
        };
        let vert = compile("vertex", glow::VERTEX_SHADER, vertex)?;
        let frag = match compile("fragment", glow::FRAGMENT_SHADER, fragment) {
            Ok(frag) => frag,
            Err(err) => {
                gl.delete_shader(vert);
                return Err(err);
            }
        };

        let program = gl.create_program().map_err(GraphicsError::Backend)?;
        gl.attach_shader(program, vert);
        gl.attach_shader(program, frag);
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        gl.detach_shader(program, vert);
        gl.detach_shader(program, frag);
        gl.delete_shader(vert);
        gl.delete_shader(frag);
        if !linked {
            let err = GraphicsError::ShaderLink(format!("{name}: {}", gl.get_program_info_log(program)));
            gl.delete_program(program);
            log::error!("{err}");
            return Err(err);
        }
        Ok(program)
    }
}
