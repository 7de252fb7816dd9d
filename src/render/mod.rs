//! Scene drawing: registered meshes and textures, the skybox, the editor
//! grid, the manipulation tool and per-camera post-processing.
//!
//! Registration methods are called from any thread and only touch the
//! shared lists. Everything that talks to the GPU is `pub(crate)` and runs
//! on the window's render thread.

pub mod camera;
pub mod manipulation_tool;
pub mod pick;
pub mod post_processing;
pub mod shaders;

pub use camera::{Camera, CameraTransform, Projection};
pub use manipulation_tool::{Axis, ManipulationTool, Operation};
pub use pick::{int_to_color, PickBuffer, PickId, ViewportRegion};
pub use post_processing::{PostProcessing, PostProcessingSettings};

use crate::environment::{Environment, GpuHandle, GpuMesh, Uniform};
use crate::error::{GraphicsError, Result};
use crate::types::{Mesh, Skybox, Texture};
use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use post_processing::PostPrograms;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Full-screen grid, drawn from an attribute-less VAO.
const GRID_VERTEX_COUNT: u32 = 6;

#[derive(Default)]
struct SceneLists {
    meshes: Vec<Arc<Mesh>>,
    textures: Vec<Arc<Texture>>,
    skybox: Option<Arc<Skybox>>,
    /// Replaced skyboxes, kept until their owner frees them.
    retired_skyboxes: Vec<Arc<Skybox>>,
}

struct GpuResources {
    mesh_program: GpuHandle,
    flat_program: GpuHandle,
    skybox_program: GpuHandle,
    grid_program: GpuHandle,
    skybox_cube: GpuMesh,
    grid_vao: GpuHandle,
    post: PostPrograms,
    pick: PickBuffer,
}

impl GpuResources {
    fn create(env: &mut dyn Environment) -> Result<Self> {
        let mut programs = Vec::with_capacity(4);
        let compiled = [shaders::MESH, shaders::FLAT, shaders::SKYBOX, shaders::GRID]
            .iter()
            .try_for_each(|source| {
                programs.push(env.compile_shader(source)?);
                Ok::<_, GraphicsError>(())
            });
        if let Err(err) = compiled {
            for program in programs {
                env.delete_shader(program);
            }
            return Err(err);
        }
        Ok(Self {
            mesh_program: programs[0],
            flat_program: programs[1],
            skybox_program: programs[2],
            grid_program: programs[3],
            skybox_cube: env.calculate_skybox()?,
            grid_vao: env.calculate_empty_vao()?,
            post: PostPrograms::create(env)?,
            pick: PickBuffer::new(),
        })
    }

    fn free(mut self, env: &mut dyn Environment) {
        for program in [
            self.mesh_program,
            self.flat_program,
            self.skybox_program,
            self.grid_program,
        ] {
            env.delete_shader(program);
        }
        if self.skybox_cube.is_allocated() {
            let _ = env.free_mesh(&mut self.skybox_cube);
        }
        env.free_vao(self.grid_vao);
        self.post.free(env);
        self.pick.free(env);
    }
}

pub struct Render {
    lists: Mutex<SceneLists>,
    grid_enabled: AtomicBool,
    clear_color: Mutex<Vec4>,
    tool: ManipulationTool,
    gpu: Mutex<Option<GpuResources>>,
}

impl Render {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(SceneLists::default()),
            grid_enabled: AtomicBool::new(true),
            clear_color: Mutex::new(Vec4::new(0.1, 0.1, 0.2, 1.0)),
            tool: ManipulationTool::new(),
            gpu: Mutex::new(None),
        }
    }

    pub fn manipulation_tool(&self) -> &ManipulationTool {
        &self.tool
    }

    pub fn set_grid_enabled(&self, value: bool) {
        self.grid_enabled.store(value, Ordering::SeqCst);
    }

    pub fn is_grid_enabled(&self) -> bool {
        self.grid_enabled.load(Ordering::SeqCst)
    }

    pub fn set_clear_color(&self, color: Vec4) {
        *self.clear_color.lock() = color;
    }

    pub fn clear_color(&self) -> Vec4 {
        *self.clear_color.lock()
    }

    /// Adds a mesh to the drawn set. It reaches the GPU at the next frame.
    pub fn register_mesh(&self, mesh: Arc<Mesh>) -> Result<()> {
        self.register_meshes(vec![mesh])
    }

    /// Registers all meshes or none of them.
    pub fn register_meshes(&self, meshes: Vec<Arc<Mesh>>) -> Result<()> {
        let mut lists = self.lists.lock();
        for (i, mesh) in meshes.iter().enumerate() {
            let err = if mesh.is_destroyed() {
                Some(GraphicsError::Lifecycle(format!(
                    "mesh {} is destroyed and cannot be registered",
                    mesh.name()
                )))
            } else if lists.meshes.iter().chain(&meshes[..i]).any(|m| Arc::ptr_eq(m, mesh)) {
                Some(GraphicsError::Duplicate(format!("mesh {}", mesh.name())))
            } else {
                None
            };
            if let Some(err) = err {
                log::error!("{err}");
                return Err(err);
            }
        }
        lists.meshes.extend(meshes);
        Ok(())
    }

    pub fn register_texture(&self, texture: Arc<Texture>) -> Result<()> {
        let mut lists = self.lists.lock();
        if texture.is_destroyed() {
            let err = GraphicsError::Lifecycle(format!(
                "texture {} is destroyed and cannot be registered",
                texture.name()
            ));
            log::error!("{err}");
            return Err(err);
        }
        if lists.textures.iter().any(|t| Arc::ptr_eq(t, &texture)) {
            let err = GraphicsError::Duplicate(format!("texture {}", texture.name()));
            log::error!("{err}");
            return Err(err);
        }
        lists.textures.push(texture);
        Ok(())
    }

    /// Replaces the active skybox. The previous one keeps its cubemap until
    /// it is freed.
    pub fn set_skybox(&self, skybox: Option<Arc<Skybox>>) {
        let mut lists = self.lists.lock();
        let previous = std::mem::replace(&mut lists.skybox, skybox);
        if let Some(previous) = previous {
            lists.retired_skyboxes.push(previous);
        }
    }

    pub fn skybox(&self) -> Option<Arc<Skybox>> {
        self.lists.lock().skybox.clone()
    }

    pub fn meshes(&self) -> Vec<Arc<Mesh>> {
        self.lists.lock().meshes.clone()
    }

    pub fn textures(&self) -> Vec<Arc<Texture>> {
        self.lists.lock().textures.clone()
    }

    pub fn mesh_count(&self) -> usize {
        self.lists.lock().meshes.len()
    }

    pub(crate) fn init_gpu(&self, env: &mut dyn Environment) -> Result<()> {
        let mut gpu = self.gpu.lock();
        if gpu.is_some() {
            return Ok(());
        }
        *gpu = Some(GpuResources::create(env)?);
        log::debug!("render programs ready on {}", env.renderer());
        Ok(())
    }

    /// Uploads new resources and frees the destroyed ones.
    pub(crate) fn update_resources(&self, env: &mut dyn Environment) {
        let mut lists = self.lists.lock();

        lists.meshes.retain(|mesh| {
            if mesh.is_destroyed() {
                release_mesh(env, mesh);
                return false;
            }
            if let Err(err) = mesh.calculate(env) {
                log::error!("mesh {} could not be uploaded: {err}", mesh.name());
                return false;
            }
            if let Some(texture) = mesh.material().diffuse() {
                if let Err(err) = texture.calculate(env) {
                    log::error!("texture {} could not be uploaded: {err}", texture.name());
                }
            }
            true
        });

        lists.textures.retain(|texture| {
            if texture.is_destroyed() {
                texture.free_gpu(env);
                return false;
            }
            if let Err(err) = texture.calculate(env) {
                log::error!("texture {} could not be uploaded: {err}", texture.name());
                return false;
            }
            true
        });

        let current_freed = lists
            .skybox
            .as_ref()
            .is_some_and(|skybox| skybox.is_free_requested());
        if current_freed {
            if let Some(skybox) = lists.skybox.take() {
                skybox.free_gpu(env);
            }
        } else if let Some(skybox) = &lists.skybox {
            if let Err(err) = skybox.calculate(env) {
                log::error!("skybox {} could not be uploaded: {err}", skybox.name());
            }
        }
        lists.retired_skyboxes.retain(|skybox| {
            if skybox.is_free_requested() {
                skybox.free_gpu(env);
                return false;
            }
            true
        });
        drop(lists);

        if let Err(err) = self.tool.update_resources(env) {
            log::error!("manipulation tool meshes could not be uploaded: {err}");
        }
    }

    /// Renders every registered mesh into `camera`'s post-processing chain
    /// and composites the result.
    pub(crate) fn render_camera(
        &self,
        env: &mut dyn Environment,
        camera: &Arc<Camera>,
        window_size: UVec2,
    ) -> Result<()> {
        let gpu = self.gpu.lock();
        let Some(gpu) = gpu.as_ref() else {
            return Err(GraphicsError::Lifecycle(
                "render resources are not initialised".to_string(),
            ));
        };
        let size = camera.prepare(env, window_size)?;
        let post = camera.post_processing();
        post.begin(env, self.clear_color());
        self.draw_scene(env, gpu, camera);
        post.end(env, &gpu.post, camera.is_direct_output());
        camera.finish_frame(size);
        Ok(())
    }

    fn draw_scene(&self, env: &mut dyn Environment, gpu: &GpuResources, camera: &Arc<Camera>) {
        let (meshes, skybox) = {
            let lists = self.lists.lock();
            (lists.meshes.clone(), lists.skybox.clone())
        };

        if let Some(cubemap) = skybox.map(|s| s.cubemap_id()).filter(|&id| id != 0) {
            env.use_shader(gpu.skybox_program);
            set_camera_uniforms(env, gpu.skybox_program, camera);
            env.set_uniform(gpu.skybox_program, "skybox", Uniform::Int(0));
            env.draw_skybox(&gpu.skybox_cube, cubemap);
        }

        let (transparent, opaque): (Vec<_>, Vec<_>) = meshes
            .into_iter()
            .filter(|mesh| mesh.is_calculated())
            .partition(|mesh| mesh.material().transparent());
        env.use_shader(gpu.mesh_program);
        set_camera_uniforms(env, gpu.mesh_program, camera);
        for mesh in opaque.iter().chain(transparent.iter()) {
            draw_mesh(env, gpu.mesh_program, mesh);
        }

        if self.is_grid_enabled() {
            env.use_shader(gpu.grid_program);
            set_camera_uniforms(env, gpu.grid_program, camera);
            env.draw_vertices(gpu.grid_vao, GRID_VERTEX_COUNT);
        }

        env.use_shader(gpu.flat_program);
        self.tool.draw(env, gpu.flat_program, camera);
    }

    /// Color-id pick pass. Draws every uploaded mesh with its index encoded
    /// in the color, then reads `pixel` (bottom-left origin, camera frame).
    pub(crate) fn pick(
        &self,
        env: &mut dyn Environment,
        camera: &Arc<Camera>,
        pixel: UVec2,
    ) -> Result<Option<Arc<Mesh>>> {
        let meshes: Vec<Arc<Mesh>> = self
            .lists
            .lock()
            .meshes
            .iter()
            .filter(|mesh| mesh.is_calculated())
            .cloned()
            .collect();
        let mut gpu = self.gpu.lock();
        let Some(gpu) = gpu.as_mut() else {
            return Err(GraphicsError::Lifecycle(
                "render resources are not initialised".to_string(),
            ));
        };

        gpu.pick.begin(env, camera.size().max(UVec2::ONE))?;
        env.use_shader(gpu.flat_program);
        set_camera_uniforms(env, gpu.flat_program, camera);
        for (index, mesh) in meshes.iter().enumerate() {
            let Some(id) = PickId::from_index(index) else {
                log::warn!("pick pass stops at {} meshes", PickId::MAX);
                break;
            };
            draw_flat(env, gpu.flat_program, &mesh.gpu(), mesh.transform(), id.to_color());
        }
        let id = gpu.pick.read(env, pixel);
        Ok(id.index().and_then(|index| meshes.get(index).cloned()))
    }

    pub(crate) fn process_tool(
        &self,
        env: &mut dyn Environment,
        mouse: Vec2,
        left_down: bool,
    ) -> Result<()> {
        if !self.tool.is_armed() {
            return Ok(());
        }
        let mut gpu = self.gpu.lock();
        let Some(gpu) = gpu.as_mut() else {
            return Ok(());
        };
        env.use_shader(gpu.flat_program);
        self.tool
            .process(env, &mut gpu.pick, gpu.flat_program, mouse, left_down)
    }

    /// Releases every GPU object the render owns or tracks.
    pub(crate) fn free_all(&self, env: &mut dyn Environment) {
        let mut lists = self.lists.lock();
        for mesh in lists.meshes.drain(..) {
            release_mesh(env, &mesh);
        }
        for texture in lists.textures.drain(..) {
            texture.free_gpu(env);
        }
        for skybox in lists.skybox.take().into_iter().chain(lists.retired_skyboxes.drain(..)) {
            skybox.free_gpu(env);
        }
        drop(lists);
        self.tool.free_all(env);
        if let Some(gpu) = self.gpu.lock().take() {
            gpu.free(env);
        }
    }
}

impl Default for Render {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Render {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lists = self.lists.lock();
        f.debug_struct("Render")
            .field("meshes", &lists.meshes.len())
            .field("textures", &lists.textures.len())
            .field("skybox", &lists.skybox.as_ref().map(|s| s.name().to_string()))
            .field("grid", &self.is_grid_enabled())
            .finish()
    }
}

fn release_mesh(env: &mut dyn Environment, mesh: &Mesh) {
    if let Err(err) = mesh.free_gpu(env) {
        log::error!("mesh {} could not be freed: {err}", mesh.name());
    }
    if mesh.material().has_unfreed_textures() {
        let _ = mesh.material().free_textures();
    }
    if let Some(texture) = mesh.material().diffuse() {
        if texture.is_destroyed() {
            texture.free_gpu(env);
        }
    }
}

pub(crate) fn set_camera_uniforms(env: &mut dyn Environment, program: GpuHandle, camera: &Camera) {
    env.set_uniform(program, shaders::PROJ_MAT, Uniform::Mat4(camera.projection_matrix()));
    env.set_uniform(program, shaders::VIEW_MAT, Uniform::Mat4(camera.view_matrix()));
}

pub(crate) fn draw_flat(
    env: &mut dyn Environment,
    program: GpuHandle,
    mesh: &GpuMesh,
    model: Mat4,
    color: Vec3,
) {
    if !mesh.is_allocated() {
        return;
    }
    env.set_uniform(program, shaders::MODEL_MAT, Uniform::Mat4(model));
    env.set_uniform(program, shaders::COLOR, Uniform::Vec3(color));
    env.draw_mesh(mesh);
}

fn draw_mesh(env: &mut dyn Environment, program: GpuHandle, mesh: &Mesh) {
    let material = mesh.material();
    let diffuse = material
        .diffuse()
        .map(|texture| texture.gpu_id())
        .filter(|&id| id != 0);
    env.set_uniform(program, shaders::MODEL_MAT, Uniform::Mat4(mesh.transform()));
    env.set_uniform(program, shaders::COLOR, Uniform::Vec3(material.color()));
    env.set_uniform(program, "bloom", Uniform::Bool(material.bloom()));
    env.set_uniform(program, "hasDiffuse", Uniform::Bool(diffuse.is_some()));
    env.set_uniform(program, "diffuseMap", Uniform::Int(0));
    env.bind_texture(0, diffuse.unwrap_or(0));
    env.draw_mesh(&mesh.gpu());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::HeadlessEnvironment;
    use crate::types::{geometry, solid_skybox, solid_texture};

    fn ready() -> (HeadlessEnvironment, Render, Arc<Camera>) {
        let mut env = HeadlessEnvironment::new();
        let render = Render::new();
        render.init_gpu(&mut env).unwrap();
        let camera = Camera::new(2).unwrap();
        camera.set_frame_size(200, 200).unwrap();
        (env, render, camera)
    }

    #[test]
    fn duplicate_and_destroyed_meshes_are_rejected() {
        let render = Render::new();
        let cube = Mesh::new("cube", geometry::create_cube());
        render.register_mesh(cube.clone()).unwrap();
        assert!(matches!(
            render.register_mesh(cube.clone()),
            Err(GraphicsError::Duplicate(_))
        ));

        let a = Mesh::new("a", geometry::create_cube());
        let b = Mesh::new("b", geometry::create_cube());
        b.destroy().unwrap();
        assert!(render.register_meshes(vec![a.clone(), b]).is_err());
        assert!(render.register_meshes(vec![a.clone(), a]).is_err());
        assert_eq!(render.mesh_count(), 1);
    }

    #[test]
    fn pick_returns_the_mesh_under_the_pixel() {
        let (mut env, render, camera) = ready();
        let left = Mesh::new("left", geometry::create_cube());
        left.set_position(Vec3::new(-1.5, 0.0, 0.0));
        let right = Mesh::new("right", geometry::create_cube());
        right.set_position(Vec3::new(1.5, 0.0, 0.0));
        render.register_meshes(vec![left.clone(), right.clone()]).unwrap();
        render.update_resources(&mut env);

        let region = ViewportRegion::full(camera.size());
        let at = |p: Vec3| {
            let screen = camera.world_to_screen_point(p).unwrap();
            region.to_frame_pixel(screen, camera.size()).unwrap()
        };
        let hit = render.pick(&mut env, &camera, at(right.position())).unwrap();
        assert!(Arc::ptr_eq(&hit.unwrap(), &right));
        let hit = render.pick(&mut env, &camera, at(left.position())).unwrap();
        assert!(Arc::ptr_eq(&hit.unwrap(), &left));
        assert!(render
            .pick(&mut env, &camera, UVec2::new(100, 195))
            .unwrap()
            .is_none());
    }

    #[test]
    fn destroyed_resources_leave_the_gpu_at_the_next_update() {
        let (mut env, render, _camera) = ready();
        let control = env.control();
        let mesh = Mesh::new("cube", geometry::create_cube());
        let texture = solid_texture("t", [10, 20, 30, 255]);
        render.register_mesh(mesh.clone()).unwrap();
        render.register_texture(texture.clone()).unwrap();
        render.update_resources(&mut env);
        assert!(mesh.is_calculated());
        assert!(texture.is_calculated());
        let meshes_before = control.live_meshes();

        mesh.destroy().unwrap();
        texture.destroy().unwrap();
        render.update_resources(&mut env);
        assert_eq!(render.mesh_count(), 0);
        assert!(render.textures().is_empty());
        assert!(!texture.is_calculated());
        assert_eq!(control.live_meshes(), meshes_before - 1);
    }

    #[test]
    fn replaced_skybox_is_freed_once_requested() {
        let (mut env, render, _camera) = ready();
        let first = solid_skybox("first");
        render.set_skybox(Some(first.clone()));
        render.update_resources(&mut env);
        assert_ne!(first.cubemap_id(), 0);

        render.set_skybox(Some(solid_skybox("second")));
        render.update_resources(&mut env);
        assert_ne!(first.cubemap_id(), 0);
        first.free().unwrap();
        render.update_resources(&mut env);
        first.await_destroy(std::time::Duration::ZERO).unwrap();
        assert_eq!(first.cubemap_id(), 0);
    }

    #[test]
    fn render_camera_fills_the_camera_buffers() {
        let (mut env, render, camera) = ready();
        render.set_skybox(Some(solid_skybox("sky")));
        render.register_mesh(Mesh::new("cube", geometry::create_cube())).unwrap();
        render.update_resources(&mut env);
        render
            .render_camera(&mut env, &camera, UVec2::new(640, 480))
            .unwrap();
        assert_ne!(camera.post_processing().final_texture_id(), 0);
        assert_eq!(camera.post_processing().size(), UVec2::new(200, 200));
        camera.wait_buffers_calculate(std::time::Duration::ZERO).unwrap();
    }

    #[test]
    fn free_all_releases_everything() {
        let (mut env, render, camera) = ready();
        let control = env.control();
        render.register_mesh(Mesh::new("cube", geometry::create_cube())).unwrap();
        render.update_resources(&mut env);
        render.render_camera(&mut env, &camera, UVec2::ONE).unwrap();
        camera.free_gpu(&mut env);
        render.free_all(&mut env);
        assert_eq!(control.live_meshes(), 0);
        assert_eq!(control.live_framebuffers(), 0);
        assert_eq!(control.live_textures(), 0);
    }
}
