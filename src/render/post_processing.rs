//! HDR render targets, bloom blur and tone-mapping composite of a camera.

use super::shaders;
use crate::environment::{
    ColorFormat, Environment, GpuHandle, GpuMesh, HdrFramebuffer, PingPongFramebuffers,
    SingleFramebuffer, Uniform,
};
use crate::error::Result;
use glam::{UVec2, Vec4};
use parking_lot::Mutex;

/// HDR attachment slots written by the geometry shaders.
pub const COLORED_IMAGE: usize = 0;
pub const BLOOM_MASK: usize = 1;
pub const CUSTOM_COLOR: usize = 2;
pub const SKYBOX_COLOR: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessingSettings {
    pub bloom: bool,
    pub bloom_intensity: f32,
    /// Number of separable blur passes.
    pub bloom_amount: u32,
    pub gamma: f32,
    pub exposure: f32,
}

impl Default for PostProcessingSettings {
    fn default() -> Self {
        Self {
            bloom: true,
            bloom_intensity: 1.0,
            bloom_amount: 10,
            gamma: 0.8,
            exposure: 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct Targets {
    hdr: HdrFramebuffer,
    ping_pong: PingPongFramebuffers,
    single: SingleFramebuffer,
    /// Ping-pong slot holding the last blur result.
    blurred: usize,
}

/// Shared GPU programs for every camera's post-processing.
#[derive(Debug, Default)]
pub struct PostPrograms {
    pub blur: GpuHandle,
    pub composite: GpuHandle,
    pub quad: GpuMesh,
}

impl PostPrograms {
    pub fn create(env: &mut dyn Environment) -> Result<Self> {
        let blur = env.compile_shader(&shaders::BLUR)?;
        let composite = match env.compile_shader(&shaders::COMPOSITE) {
            Ok(program) => program,
            Err(err) => {
                env.delete_shader(blur);
                return Err(err);
            }
        };
        let quad = env.calculate_quad()?;
        Ok(Self {
            blur,
            composite,
            quad,
        })
    }

    pub fn free(&mut self, env: &mut dyn Environment) {
        env.delete_shader(self.blur);
        env.delete_shader(self.composite);
        if self.quad.is_allocated() {
            let _ = env.free_mesh(&mut self.quad);
        }
        *self = Self::default();
    }
}

pub struct PostProcessing {
    hdr_buffers: u32,
    settings: Mutex<PostProcessingSettings>,
    targets: Mutex<Targets>,
}

impl PostProcessing {
    pub fn new(hdr_buffers: u32) -> Self {
        Self {
            hdr_buffers,
            settings: Mutex::new(PostProcessingSettings::default()),
            targets: Mutex::new(Targets::default()),
        }
    }

    pub fn hdr_buffer_count(&self) -> u32 {
        self.hdr_buffers
    }

    pub fn settings(&self) -> PostProcessingSettings {
        *self.settings.lock()
    }

    /// Applies every field through its clamping setter.
    pub fn set_settings(&self, settings: PostProcessingSettings) {
        self.set_bloom(settings.bloom);
        self.set_bloom_intensity(settings.bloom_intensity);
        self.set_bloom_amount(settings.bloom_amount);
        self.set_gamma(settings.gamma);
        self.set_exposure(settings.exposure);
    }

    pub fn set_bloom(&self, enabled: bool) {
        self.settings.lock().bloom = enabled;
    }

    pub fn bloom_enabled(&self) -> bool {
        self.settings.lock().bloom
    }

    pub fn set_bloom_intensity(&self, intensity: f32) {
        self.settings.lock().bloom_intensity = intensity.max(0.0);
    }

    pub fn set_bloom_amount(&self, amount: u32) {
        self.settings.lock().bloom_amount = amount.max(1);
    }

    pub fn set_gamma(&self, gamma: f32) {
        self.settings.lock().gamma = gamma.max(0.01);
    }

    pub fn set_exposure(&self, exposure: f32) {
        self.settings.lock().exposure = exposure.max(0.0);
    }

    pub fn is_calculated(&self) -> bool {
        !self.targets.lock().hdr.is_new()
    }

    pub fn size(&self) -> UVec2 {
        self.targets.lock().hdr.size
    }

    // texture getters, zero when the buffer does not exist

    pub fn final_texture_id(&self) -> GpuHandle {
        self.targets.lock().single.color
    }

    pub fn colored_image(&self) -> GpuHandle {
        self.hdr_attachment(COLORED_IMAGE)
    }

    pub fn bloom_mask(&self) -> GpuHandle {
        self.hdr_attachment(BLOOM_MASK)
    }

    pub fn custom_color_buffer(&self) -> GpuHandle {
        self.hdr_attachment(CUSTOM_COLOR)
    }

    pub fn skybox_color(&self) -> GpuHandle {
        self.hdr_attachment(SKYBOX_COLOR)
    }

    pub fn blur_bloom_mask(&self) -> GpuHandle {
        let targets = self.targets.lock();
        targets.ping_pong.color_buffers[targets.blurred]
    }

    /// Depth-stencil renderbuffer of the composite target.
    pub fn depth_buffer(&self) -> GpuHandle {
        self.targets.lock().single.depth_rbo
    }

    pub fn stencil_buffer(&self) -> GpuHandle {
        self.depth_buffer()
    }

    fn hdr_attachment(&self, slot: usize) -> GpuHandle {
        self.targets
            .lock()
            .hdr
            .color_buffers
            .get(slot)
            .copied()
            .unwrap_or(0)
    }

    /// Creates every target at `size`, or resizes the existing ones in
    /// place. A failure leaves the default framebuffer bound.
    pub(crate) fn calculate(&self, env: &mut dyn Environment, size: UVec2) -> Result<()> {
        let mut targets = self.targets.lock();
        let result = (|| {
            env.create_hdr_framebuffer(size, self.hdr_buffers, &mut targets.hdr)?;
            env.create_ping_pong_framebuffers(size, &mut targets.ping_pong)?;
            env.create_single_framebuffer(size, ColorFormat::Rgba16F, &mut targets.single)
        })();
        env.bind_framebuffer(0);
        if let Err(err) = &result {
            log::error!("post-processing targets at {}x{} failed: {err}", size.x, size.y);
        }
        result
    }

    /// Binds the HDR target and clears it.
    pub(crate) fn begin(&self, env: &mut dyn Environment, clear_color: Vec4) {
        let targets = self.targets.lock();
        env.bind_framebuffer(targets.hdr.fbo);
        env.set_viewport(targets.hdr.size);
        env.set_depth_test_enabled(true);
        env.clear_buffers(clear_color);
    }

    /// Blurs the bloom mask and composites into the final target, or into
    /// the default framebuffer when `direct_output` is set.
    pub(crate) fn end(&self, env: &mut dyn Environment, programs: &PostPrograms, direct_output: bool) {
        let settings = self.settings();
        let mut targets = self.targets.lock();
        let size = targets.hdr.size;
        let bloom_source = targets.hdr.color_buffers.get(BLOOM_MASK).copied();
        let bloom = settings.bloom && bloom_source.is_some();

        env.set_depth_test_enabled(false);
        if let Some(source) = bloom_source.filter(|_| bloom) {
            env.use_shader(programs.blur);
            env.set_uniform(programs.blur, "image", Uniform::Int(0));
            let mut horizontal = true;
            for pass in 0..settings.bloom_amount.max(1) {
                let target = usize::from(horizontal);
                env.bind_framebuffer(targets.ping_pong.fbos[target]);
                env.set_viewport(size);
                env.set_uniform(programs.blur, "horizontal", Uniform::Bool(horizontal));
                let input = if pass == 0 {
                    source
                } else {
                    targets.ping_pong.color_buffers[1 - target]
                };
                env.bind_texture(0, input);
                env.draw_quad(&programs.quad);
                targets.blurred = target;
                horizontal = !horizontal;
            }
        }

        let output = if direct_output { 0 } else { targets.single.fbo };
        env.bind_framebuffer(output);
        env.set_viewport(size);
        env.clear_color_buffers(Vec4::new(0.0, 0.0, 0.0, 1.0));
        env.use_shader(programs.composite);
        env.set_uniform(programs.composite, "scene", Uniform::Int(0));
        env.set_uniform(programs.composite, "bloomBlur", Uniform::Int(1));
        env.set_uniform(programs.composite, "bloom", Uniform::Bool(bloom));
        env.set_uniform(
            programs.composite,
            "bloomIntensity",
            Uniform::Float(settings.bloom_intensity),
        );
        env.set_uniform(programs.composite, "exposure", Uniform::Float(settings.exposure));
        env.set_uniform(programs.composite, "gamma", Uniform::Float(settings.gamma));
        env.bind_texture(0, targets.hdr.color_buffers.first().copied().unwrap_or(0));
        env.bind_texture(1, targets.ping_pong.color_buffers[targets.blurred]);
        env.draw_quad(&programs.quad);
        env.set_depth_test_enabled(true);
        env.bind_framebuffer(0);
    }

    pub(crate) fn free(&self, env: &mut dyn Environment) {
        let mut targets = self.targets.lock();
        targets.hdr.free(env);
        targets.ping_pong.free(env);
        targets.single.free(env);
        targets.blurred = 0;
    }

    #[cfg(test)]
    fn snapshot(&self) -> (HdrFramebuffer, PingPongFramebuffers, SingleFramebuffer) {
        let targets = self.targets.lock();
        (targets.hdr.clone(), targets.ping_pong, targets.single)
    }
}

impl std::fmt::Debug for PostProcessing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessing")
            .field("hdr_buffers", &self.hdr_buffers)
            .field("settings", &self.settings())
            .field("size", &self.size())
            .finish()
    }
}
