use super::geometry::{self, MeshGeometry};
use super::Material;
use crate::environment::{Environment, GpuMesh};
use crate::error::{GraphicsError, Result};
use glam::{Mat4, Vec3};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct Mesh {
    id: u64,
    name: String,
    geometry: Arc<MeshGeometry>,
    material: Material,
    transform: Mutex<Mat4>,
    gpu: Mutex<GpuMesh>,
    calculated: Arc<AtomicBool>,
    destroyed: AtomicBool,
}

impl Mesh {
    pub fn new(name: impl Into<String>, geometry: MeshGeometry) -> Arc<Self> {
        Self::with_shared_geometry(name.into(), Arc::new(geometry))
    }

    fn with_shared_geometry(name: String, geometry: Arc<MeshGeometry>) -> Arc<Self> {
        let calculated = Arc::new(AtomicBool::new(false));
        Arc::new(Self {
            id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            name,
            geometry,
            material: Material::new(calculated.clone()),
            transform: Mutex::new(Mat4::IDENTITY),
            gpu: Mutex::new(GpuMesh::default()),
            calculated,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Loads the `index`-th mesh of a model from `library`.
    pub fn load(library: &MeshLibrary, name: &str, index: usize) -> Result<Arc<Self>> {
        let mut meshes = library.load_all(name)?;
        if index >= meshes.len() {
            let err = GraphicsError::OutOfRange {
                what: format!("mesh index for \"{name}\""),
                requested: index,
                available: meshes.len(),
            };
            log::error!("{err}");
            return Err(err);
        }
        Ok(meshes.swap_remove(index))
    }

    /// New mesh sharing this geometry, with a copy of the material and
    /// transform. The copy is not calculated.
    pub fn copy(&self) -> Arc<Self> {
        let calculated = Arc::new(AtomicBool::new(false));
        Arc::new(Self {
            id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name.clone(),
            geometry: self.geometry.clone(),
            material: self.material.duplicate(calculated.clone()),
            transform: Mutex::new(*self.transform.lock()),
            gpu: Mutex::new(GpuMesh::default()),
            calculated,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &MeshGeometry {
        &self.geometry
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn transform(&self) -> Mat4 {
        *self.transform.lock()
    }

    pub fn set_transform(&self, transform: Mat4) {
        *self.transform.lock() = transform;
    }

    pub fn set_position(&self, position: Vec3) {
        let mut transform = self.transform.lock();
        transform.w_axis = position.extend(1.0);
    }

    pub fn position(&self) -> Vec3 {
        self.transform.lock().w_axis.truncate()
    }

    pub fn is_calculated(&self) -> bool {
        self.calculated.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Marks the mesh for teardown on the render thread.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            let err = GraphicsError::DoubleFree(format!("mesh {}", self.name));
            log::error!("{err}");
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn gpu(&self) -> GpuMesh {
        *self.gpu.lock()
    }

    pub(crate) fn calculate(&self, env: &mut dyn Environment) -> Result<()> {
        let mut gpu = self.gpu.lock();
        if gpu.is_allocated() {
            return Ok(());
        }
        *gpu = env.calculate_mesh(&self.geometry.vertices, &self.geometry.indices)?;
        self.calculated.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn free_gpu(&self, env: &mut dyn Environment) -> Result<()> {
        let mut gpu = self.gpu.lock();
        if !gpu.is_allocated() {
            return Ok(());
        }
        env.free_mesh(&mut gpu)?;
        self.calculated.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        if self.gpu.get_mut().is_allocated() {
            log::warn!("mesh {} dropped while still on the GPU", self.name);
        }
    }
}

/// Named models, each a list of geometries. Stands in for the model file
/// loader: every `load_all` returns fresh meshes sharing the geometry.
pub struct MeshLibrary {
    models: RwLock<HashMap<String, Vec<(String, Arc<MeshGeometry>)>>>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Library with the generated primitives `cube`, `plane`, `quad` and
    /// `arrows` (three meshes, X, Y and Z).
    pub fn with_primitives() -> Self {
        let library = Self::new();
        library.register("cube", vec![("cube".to_string(), geometry::create_cube())]);
        library.register("plane", vec![("plane".to_string(), geometry::create_plane(10.0))]);
        library.register(
            "quad",
            vec![("quad".to_string(), geometry::create_quad(Vec3::ZERO, 1.0, 1.0))],
        );
        let arrow = geometry::create_arrow(1.0, 0.03);
        library.register(
            "arrows",
            vec![
                ("arrow_x".to_string(), arrow.clone()),
                (
                    "arrow_y".to_string(),
                    arrow.clone().transformed(glam::Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2)),
                ),
                (
                    "arrow_z".to_string(),
                    arrow.transformed(glam::Mat3::from_rotation_y(-std::f32::consts::FRAC_PI_2)),
                ),
            ],
        );
        library
    }

    pub fn register(&self, model: &str, meshes: Vec<(String, MeshGeometry)>) {
        let entries = meshes
            .into_iter()
            .map(|(name, geometry)| (name, Arc::new(geometry)))
            .collect();
        self.models.write().insert(model.to_string(), entries);
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.read().contains_key(model)
    }

    pub fn load_all(&self, model: &str) -> Result<Vec<Arc<Mesh>>> {
        let models = self.models.read();
        let Some(entries) = models.get(model) else {
            let err = GraphicsError::InvalidArgument(format!("unknown model \"{model}\""));
            log::error!("{err}");
            return Err(err);
        };
        Ok(entries
            .iter()
            .map(|(name, geometry)| Mesh::with_shared_geometry(name.clone(), geometry.clone()))
            .collect())
    }
}

impl Default for MeshLibrary {
    fn default() -> Self {
        Self::with_primitives()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{HeadlessEnvironment, Environment};

    #[test]
    fn out_of_range_index_reports_both_bounds() {
        let library = MeshLibrary::with_primitives();
        let err = Mesh::load(&library, "arrows", 3).unwrap_err();
        match err {
            GraphicsError::OutOfRange {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(Mesh::load(&library, "arrows", 2).unwrap().name(), "arrow_z");
        assert!(Mesh::load(&library, "teapot", 0).is_err());
    }

    #[test]
    fn copy_shares_geometry_but_not_identity() {
        let mesh = Mesh::new("cube", geometry::create_cube());
        mesh.material().set_color(Vec3::new(1.0, 0.0, 0.0));
        mesh.set_position(Vec3::new(1.0, 2.0, 3.0));
        let copy = mesh.copy();
        assert_ne!(copy.id(), mesh.id());
        assert!(Arc::ptr_eq(&copy.geometry, &mesh.geometry));
        assert_eq!(copy.material().color(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(copy.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(!copy.is_calculated());
    }

    #[test]
    fn calculate_then_free_round_trips_gpu_state() {
        let mut env = HeadlessEnvironment::new();
        let control = env.control();
        let mesh = Mesh::new("cube", geometry::create_cube());
        mesh.calculate(&mut env).unwrap();
        assert!(mesh.is_calculated());
        assert!(mesh.material().set_transparent(true).is_err());
        assert_eq!(control.live_meshes(), 1);
        mesh.free_gpu(&mut env).unwrap();
        assert!(!mesh.is_calculated());
        assert_eq!(control.live_meshes(), 0);
        assert_eq!(env.name(), "headless");
    }

    #[test]
    fn destroy_twice_is_rejected() {
        let mesh = Mesh::new("quad", geometry::create_quad(Vec3::ZERO, 1.0, 1.0));
        mesh.destroy().unwrap();
        assert!(mesh.destroy().is_err());
    }
}
