//! egui on top of glow: input through egui-winit, output drawn with a
//! small textured-triangle program.

use super::handles;
use crate::error::{GraphicsError, Result};
use egui_winit::winit::event::WindowEvent;
use glow::{HasContext, PixelUnpackData};
use std::collections::HashMap;
use winit::window::Window;

const GUI_VERT: &str = r#"#version 330 core
layout (location = 0) in vec2 position;
layout (location = 1) in vec2 uv;
layout (location = 2) in vec4 color;

uniform vec2 screenSize;

out vec2 vUv;
out vec4 vColor;

void main() {
    vUv = uv;
    vColor = color;
    gl_Position = vec4(2.0 * position.x / screenSize.x - 1.0, 1.0 - 2.0 * position.y / screenSize.y, 0.0, 1.0);
}
"#;

const GUI_FRAG: &str = r#"#version 330 core
in vec2 vUv;
in vec4 vColor;
uniform sampler2D image;
out vec4 fragColor;

void main() {
    fragColor = vColor * texture(image, vUv);
}
"#;

/// pos (2 f32) + uv (2 f32) + color (4 u8)
const VERTEX_STRIDE: i32 = 20;

pub(super) struct GuiFrameOutput {
    pub clipped_primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
    pub screen_size_px: [u32; 2],
}

/// egui context plus its winit input state.
pub(super) struct GuiHost {
    context: egui::Context,
    winit_state: egui_winit::State,
}

impl GuiHost {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        let winit_state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        Self {
            context,
            winit_state,
        }
    }

    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    pub fn begin(&mut self, window: &Window) -> egui::Context {
        let raw_input = self.winit_state.take_egui_input(window);
        self.context.begin_pass(raw_input);
        self.context.clone()
    }

    pub fn end(&mut self, window: &Window) -> GuiFrameOutput {
        let full_output = self.context.end_pass();
        self.winit_state
            .handle_platform_output(window, full_output.platform_output);
        let pixels_per_point = full_output.pixels_per_point;
        let clipped_primitives = self
            .context
            .tessellate(full_output.shapes, pixels_per_point);
        let size = window.inner_size();
        GuiFrameOutput {
            clipped_primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point,
            screen_size_px: [size.width.max(1), size.height.max(1)],
        }
    }
}

/// Draws tessellated egui output into the default framebuffer.
///
/// Managed textures (font atlas, loaded images) live here. `User(id)`
/// textures are GL texture names owned by the engine, e.g. a camera's
/// final image.
pub(super) struct GuiPainter {
    program: glow::Program,
    screen_size: Option<glow::UniformLocation>,
    image: Option<glow::UniformLocation>,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    ebo: glow::Buffer,
    textures: HashMap<egui::TextureId, (glow::Texture, [u32; 2])>,
    vertex_bytes: Vec<u8>,
    warned_missing_texture: bool,
}

impl GuiPainter {
    pub fn new(gl: &glow::Context) -> Result<Self> {
        let program = handles::link_program(gl, "gui", GUI_VERT, GUI_FRAG)?;
        unsafe {
            let vao = gl.create_vertex_array().map_err(GraphicsError::Backend)?;
            let vbo = gl.create_buffer().map_err(GraphicsError::Backend)?;
            let ebo = gl.create_buffer().map_err(GraphicsError::Backend)?;
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, VERTEX_STRIDE, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, VERTEX_STRIDE, 8);
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(2, 4, glow::UNSIGNED_BYTE, true, VERTEX_STRIDE, 16);
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.bind_vertex_array(None);

            Ok(Self {
                screen_size: gl.get_uniform_location(program, "screenSize"),
                image: gl.get_uniform_location(program, "image"),
                program,
                vao,
                vbo,
                ebo,
                textures: HashMap::new(),
                vertex_bytes: Vec::new(),
                warned_missing_texture: false,
            })
        }
    }

    pub fn paint(&mut self, gl: &glow::Context, frame: &GuiFrameOutput) {
        for (id, delta) in &frame.textures_delta.set {
            if let Err(err) = self.set_texture(gl, *id, delta) {
                log::error!("egui texture {id:?} could not be updated: {err}");
            }
        }

        let [width, height] = frame.screen_size_px;
        let ppp = frame.pixels_per_point.max(0.01);
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.viewport(0, 0, width as i32, height as i32);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
            gl.enable(glow::BLEND);
            gl.blend_equation(glow::FUNC_ADD);
            gl.blend_func_separate(
                glow::ONE,
                glow::ONE_MINUS_SRC_ALPHA,
                glow::ONE_MINUS_DST_ALPHA,
                glow::ONE,
            );
            gl.enable(glow::SCISSOR_TEST);
            gl.use_program(Some(self.program));
            gl.uniform_2_f32(
                self.screen_size.as_ref(),
                width as f32 / ppp,
                height as f32 / ppp,
            );
            gl.uniform_1_i32(self.image.as_ref(), 0);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_vertex_array(Some(self.vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
        }

        for clipped in &frame.clipped_primitives {
            let egui::epaint::Primitive::Mesh(mesh) = &clipped.primitive else {
                continue;
            };
            let Some(texture) = self.texture(mesh.texture_id) else {
                if !self.warned_missing_texture {
                    log::warn!("egui texture {:?} is unknown, skipping", mesh.texture_id);
                    self.warned_missing_texture = true;
                }
                continue;
            };

            let clip = clipped.clip_rect;
            let min_x = (clip.min.x * ppp).round().clamp(0.0, width as f32) as i32;
            let min_y = (clip.min.y * ppp).round().clamp(0.0, height as f32) as i32;
            let max_x = (clip.max.x * ppp).round().clamp(0.0, width as f32) as i32;
            let max_y = (clip.max.y * ppp).round().clamp(0.0, height as f32) as i32;
            if max_x <= min_x || max_y <= min_y {
                continue;
            }

            self.vertex_bytes.clear();
            for vertex in &mesh.vertices {
                for value in [vertex.pos.x, vertex.pos.y, vertex.uv.x, vertex.uv.y] {
                    self.vertex_bytes.extend_from_slice(&value.to_ne_bytes());
                }
                self.vertex_bytes.extend_from_slice(&vertex.color.to_array());
            }
            let index_bytes: Vec<u8> = mesh.indices.iter().flat_map(|i| i.to_ne_bytes()).collect();

            unsafe {
                gl.scissor(min_x, height as i32 - max_y, max_x - min_x, max_y - min_y);
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &self.vertex_bytes, glow::STREAM_DRAW);
                gl.buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, &index_bytes, glow::STREAM_DRAW);
                gl.draw_elements(glow::TRIANGLES, mesh.indices.len() as i32, glow::UNSIGNED_INT, 0);
            }
        }

        unsafe {
            gl.disable(glow::SCISSOR_TEST);
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
            gl.enable(glow::DEPTH_TEST);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
        }

        for id in &frame.textures_delta.free {
            if let Some((texture, _)) = self.textures.remove(id) {
                unsafe { gl.delete_texture(texture) };
            }
        }
    }

    fn texture(&self, id: egui::TextureId) -> Option<glow::Texture> {
        match id {
            egui::TextureId::Managed(_) => self.textures.get(&id).map(|(texture, _)| *texture),
            egui::TextureId::User(name) => u32::try_from(name).ok().and_then(handles::texture),
        }
    }

    fn set_texture(
        &mut self,
        gl: &glow::Context,
        id: egui::TextureId,
        delta: &egui::epaint::ImageDelta,
    ) -> Result<()> {
        let (width, height, pixels) = image_to_rgba8(delta)?;
        let filter = match delta.options.magnification {
            egui::TextureFilter::Nearest => glow::NEAREST,
            egui::TextureFilter::Linear => glow::LINEAR,
        };
        unsafe {
            if let Some([x, y]) = delta.pos {
                let Some((texture, [atlas_w, atlas_h])) = self.textures.get(&id).copied() else {
                    return Err(GraphicsError::Backend(format!(
                        "partial update for missing texture {id:?}"
                    )));
                };
                if x as u32 + width > atlas_w || y as u32 + height > atlas_h {
                    return Err(GraphicsError::Backend(
                        "egui partial texture update exceeds atlas bounds".to_string(),
                    ));
                }
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
                gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    x as i32,
                    y as i32,
                    width as i32,
                    height as i32,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    PixelUnpackData::Slice(Some(&pixels)),
                );
            } else {
                let texture = match self.textures.get(&id) {
                    Some((texture, _)) => *texture,
                    None => gl.create_texture().map_err(GraphicsError::Backend)?,
                };
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter as i32);
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter as i32);
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGBA8 as i32,
                    width as i32,
                    height as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    PixelUnpackData::Slice(Some(&pixels)),
                );
                self.textures.insert(id, (texture, [width, height]));
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    pub fn destroy(self, gl: &glow::Context) {
        unsafe {
            for (texture, _) in self.textures.into_values() {
                gl.delete_texture(texture);
            }
            gl.delete_buffer(self.vbo);
            gl.delete_buffer(self.ebo);
            gl.delete_vertex_array(self.vao);
            gl.delete_program(self.program);
        }
    }
}

fn image_to_rgba8(delta: &egui::epaint::ImageDelta) -> Result<(u32, u32, Vec<u8>)> {
    let overflow = |what: &str| GraphicsError::Backend(format!("egui image {what} overflow"));
    match &delta.image {
        egui::ImageData::Color(image) => {
            let w = u32::try_from(image.width()).map_err(|_| overflow("width"))?;
            let h = u32::try_from(image.height()).map_err(|_| overflow("height"))?;
            let pixels = image.pixels.iter().flat_map(|p| p.to_array()).collect();
            Ok((w, h, pixels))
        }
        egui::ImageData::Font(image) => {
            let w = u32::try_from(image.width()).map_err(|_| overflow("width"))?;
            let h = u32::try_from(image.height()).map_err(|_| overflow("height"))?;
            let pixels = image.srgba_pixels(None).flat_map(|p| p.to_array()).collect();
            Ok((w, h, pixels))
        }
    }
}
