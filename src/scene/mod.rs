//! Editor scene: a serialisable object hierarchy, the runtime meshes bound
//! to it, and the [`UsePoints`] gate that serialises editor reads against
//! destructive edits.

pub mod serialization;

use crate::error::{GraphicsError, Result};
use crate::render::{Axis, Operation, Render};
use crate::types::{Mesh, MeshLibrary, Skybox};
use glam::{EulerRot, Mat4, Quat, Vec3};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Local transform, edited in the inspector.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransformData {
    pub position: [f32; 3],
    pub rotation_deg: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for TransformData {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation_deg: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl TransformData {
    pub fn at(position: Vec3) -> Self {
        Self {
            position: position.into(),
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        compose_transform_matrix(self.position, self.rotation_deg, self.scale)
    }
}

/// One mesh of a library model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeshData {
    pub model: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    #[serde(default)]
    pub bloom: bool,
}

fn default_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// Cubemap faces stored as `<directory>/<face>.<extension>`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SkyboxData {
    pub directory: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SceneObjectKind {
    /// Grouping node without anything to draw.
    Empty,
    Mesh(MeshData),
    Skybox(SkyboxData),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneObject {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub transform: TransformData,
    pub kind: SceneObjectKind,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneState {
    name: String,
    next_id: u64,
    objects: Vec<SceneObject>,
}

impl Default for SceneState {
    fn default() -> Self {
        Self::new("Scene")
    }
}

impl SceneState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: 1,
            objects: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object_names(&self) -> Vec<&str> {
        self.objects.iter().map(|object| object.name.as_str()).collect()
    }

    pub fn object(&self, id: u64) -> Option<&SceneObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    pub fn object_mut(&mut self, id: u64) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|object| object.id == id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(|object| object.parent.is_none())
    }

    pub fn children(&self, id: u64) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(move |object| object.parent == Some(id))
    }

    pub fn add(
        &mut self,
        name: impl Into<String>,
        parent: Option<u64>,
        transform: TransformData,
        kind: SceneObjectKind,
    ) -> Result<u64> {
        if let Some(parent) = parent {
            self.expect_object(parent)?;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.objects.push(SceneObject {
            id,
            name: name.into(),
            parent,
            transform,
            kind,
        });
        Ok(id)
    }

    pub fn add_mesh(&mut self, name: &str, model: &str, index: usize, position: Vec3) -> Result<u64> {
        self.add(
            name,
            None,
            TransformData::at(position),
            SceneObjectKind::Mesh(MeshData {
                model: model.to_string(),
                index,
                color: default_color(),
                bloom: false,
            }),
        )
    }

    /// Removes `id` and its whole subtree. Returns the removed ids,
    /// parents before children.
    pub fn remove(&mut self, id: u64) -> Result<Vec<u64>> {
        self.expect_object(id)?;
        let removed = self.subtree(id);
        self.objects.retain(|object| !removed.contains(&object.id));
        Ok(removed)
    }

    /// Moves `id` under `parent`, refusing to create a cycle.
    pub fn reparent(&mut self, id: u64, parent: Option<u64>) -> Result<()> {
        self.expect_object(id)?;
        if let Some(parent) = parent {
            self.expect_object(parent)?;
            if self.subtree(id).contains(&parent) {
                let err = GraphicsError::InvalidArgument(format!(
                    "object {parent} is a descendant of {id}"
                ));
                log::error!("{err}");
                return Err(err);
            }
        }
        if let Some(object) = self.object_mut(id) {
            object.parent = parent;
        }
        Ok(())
    }

    pub fn rename(&mut self, id: u64, name: impl Into<String>) -> Result<()> {
        self.expect_object(id)?;
        if let Some(object) = self.object_mut(id) {
            object.name = name.into();
        }
        Ok(())
    }

    /// Local transforms multiplied from the root down to `id`.
    pub fn world_transform(&self, id: u64) -> Option<Mat4> {
        let mut object = self.object(id)?;
        let mut matrix = object.transform.matrix();
        // guards against a hand-edited file with a parent loop
        for _ in 0..self.objects.len() {
            let Some(parent) = object.parent.and_then(|parent| self.object(parent)) else {
                break;
            };
            matrix = parent.transform.matrix() * matrix;
            object = parent;
        }
        Some(matrix)
    }

    fn subtree(&self, id: u64) -> Vec<u64> {
        let mut ids = vec![id];
        let mut cursor = 0;
        while cursor < ids.len() {
            let current = ids[cursor];
            ids.extend(self.children(current).map(|child| child.id));
            cursor += 1;
        }
        ids
    }

    fn expect_object(&self, id: u64) -> Result<()> {
        if self.object(id).is_none() {
            let err = GraphicsError::InvalidArgument(format!("no scene object with id {id}"));
            log::error!("{err}");
            return Err(err);
        }
        Ok(())
    }
}

/// Live meshes and skybox created from a [`SceneState`], keyed by object id.
#[derive(Debug, Default)]
pub struct SceneRuntime {
    meshes: HashMap<u64, Arc<Mesh>>,
    skybox: Option<(u64, Arc<Skybox>)>,
}

impl SceneRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh(&self, id: u64) -> Option<&Arc<Mesh>> {
        self.meshes.get(&id)
    }

    pub fn skybox(&self) -> Option<&Arc<Skybox>> {
        self.skybox.as_ref().map(|(_, skybox)| skybox)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Scene object a picked mesh belongs to.
    pub fn object_for_mesh(&self, mesh: &Arc<Mesh>) -> Option<u64> {
        self.meshes
            .iter()
            .find(|(_, bound)| Arc::ptr_eq(bound, mesh))
            .map(|(&id, _)| id)
    }

    pub fn clear(&mut self) {
        self.meshes.clear();
        self.skybox = None;
    }
}

/// Scene description plus the runtime objects built from it.
#[derive(Debug, Default)]
pub struct Scene {
    pub state: SceneState,
    pub runtime: SceneRuntime,
    selected: Option<u64>,
}

impl Scene {
    pub fn new(state: SceneState) -> Self {
        Self {
            state,
            runtime: SceneRuntime::new(),
            selected: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(serialization::load_scene_from_file(path)?))
    }

    pub fn selected(&self) -> Option<u64> {
        self.selected.filter(|&id| self.state.object(id).is_some())
    }

    pub fn select(&mut self, id: Option<u64>) {
        self.selected = id;
    }

    /// Creates meshes (and the skybox) for objects that have none yet and
    /// registers them with `render`. Returns how many objects were bound.
    pub fn instantiate(&mut self, library: &MeshLibrary, render: &Render) -> Result<usize> {
        let mut created = Vec::new();
        let mut bound = 0;
        for object in self.state.objects() {
            match &object.kind {
                SceneObjectKind::Mesh(data) if !self.runtime.meshes.contains_key(&object.id) => {
                    let mesh = Mesh::load(library, &data.model, data.index)?;
                    mesh.material().set_color(Vec3::from(data.color));
                    mesh.material().set_bloom(data.bloom);
                    created.push((object.id, mesh));
                }
                SceneObjectKind::Skybox(data) if self.runtime.skybox.is_none() => {
                    let skybox = Skybox::load(Path::new(&data.directory), &data.extension)?;
                    render.set_skybox(Some(skybox.clone()));
                    self.runtime.skybox = Some((object.id, skybox));
                    bound += 1;
                }
                _ => {}
            }
        }
        render.register_meshes(created.iter().map(|(_, mesh)| mesh.clone()).collect())?;
        bound += created.len();
        self.runtime.meshes.extend(created);
        self.sync_transforms();
        log::debug!("scene \"{}\" bound {bound} objects", self.state.name());
        Ok(bound)
    }

    /// Pushes world transforms and material edits to the bound meshes.
    pub fn sync_transforms(&self) {
        for (&id, mesh) in &self.runtime.meshes {
            if let Some(matrix) = self.state.world_transform(id) {
                mesh.set_transform(matrix);
            }
            if let Some(SceneObjectKind::Mesh(data)) = self.state.object(id).map(|o| &o.kind) {
                mesh.material().set_color(Vec3::from(data.color));
                mesh.material().set_bloom(data.bloom);
            }
        }
    }

    /// Applies a manipulation tool drag to an object's local transform.
    pub fn apply_manipulation(&mut self, id: u64, operation: Operation, axis: Axis, amount: f32) {
        let slot = match axis {
            Axis::None => return,
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        };
        let Some(object) = self.state.object_mut(id) else {
            return;
        };
        let transform = &mut object.transform;
        match operation {
            Operation::Translate => transform.position[slot] += amount,
            Operation::Rotate => {
                transform.rotation_deg[slot] = (transform.rotation_deg[slot] + amount) % 360.0
            }
            Operation::Scale => {
                transform.scale[slot] = (transform.scale[slot] * (1.0 + amount)).max(0.001)
            }
        }
        self.sync_transforms();
    }

    /// Removes an object subtree and marks its meshes and skybox for
    /// teardown on the render thread.
    pub fn destroy_object(&mut self, id: u64, render: &Render) -> Result<Vec<u64>> {
        let removed = self.state.remove(id)?;
        for object_id in &removed {
            if let Some(mesh) = self.runtime.meshes.remove(object_id) {
                mesh.destroy()?;
            }
            if self.runtime.skybox.as_ref().is_some_and(|(sky, _)| sky == object_id) {
                if let Some((_, skybox)) = self.runtime.skybox.take() {
                    render.set_skybox(None);
                    skybox.free()?;
                }
            }
        }
        if self.selected.is_some_and(|selected| removed.contains(&selected)) {
            self.selected = None;
        }
        Ok(removed)
    }

    /// Forgets every runtime binding without touching the meshes. Used after
    /// the render that owned them released their GPU state.
    pub(crate) fn unbind_all(&mut self) {
        self.runtime.clear();
    }
}

/// Rotation order: Z (roll) * Y (yaw) * X (pitch).
pub fn compose_transform_matrix(position: [f32; 3], rotation_deg: [f32; 3], scale: [f32; 3]) -> Mat4 {
    let rotation = Quat::from_euler(
        EulerRot::ZYX,
        rotation_deg[2].to_radians(),
        rotation_deg[1].to_radians(),
        rotation_deg[0].to_radians(),
    );
    Mat4::from_scale_rotation_translation(Vec3::from(scale), rotation, Vec3::from(position))
}

/// Reader-writer gate around scene data. Editor draw routines take read
/// access, destructive edits take write access; both give up after a
/// bounded wait. The lock is fair: a waiting writer blocks new readers.
#[derive(Debug, Default)]
pub struct UsePoints<T> {
    lock: RwLock<T>,
}

impl<T> UsePoints<T> {
    pub fn new(value: T) -> Self {
        Self {
            lock: RwLock::new(value),
        }
    }

    pub fn read_for(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, T>> {
        self.lock.try_read_for(timeout).ok_or_else(|| {
            let err = GraphicsError::Timeout(timeout, "scene read access");
            log::error!("{err}");
            err
        })
    }

    pub fn write_for(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>> {
        self.lock.try_write_for(timeout).ok_or_else(|| {
            let err = GraphicsError::Timeout(timeout, "scene write access");
            log::error!("{err}");
            err
        })
    }

    pub fn into_inner(self) -> T {
        self.lock.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    fn sample() -> (SceneState, u64, u64, u64) {
        let mut state = SceneState::new("test");
        let root = state
            .add("root", None, TransformData::at(Vec3::new(1.0, 0.0, 0.0)), SceneObjectKind::Empty)
            .unwrap();
        let child = state.add_mesh("cube", "cube", 0, Vec3::new(0.0, 2.0, 0.0)).unwrap();
        state.reparent(child, Some(root)).unwrap();
        let grandchild = state
            .add("leaf", Some(child), TransformData::default(), SceneObjectKind::Empty)
            .unwrap();
        (state, root, child, grandchild)
    }

    #[test]
    fn hierarchy_queries() {
        let (state, root, child, grandchild) = sample();
        assert_eq!(state.roots().map(|o| o.id).collect::<Vec<_>>(), vec![root]);
        assert_eq!(state.children(root).map(|o| o.id).collect::<Vec<_>>(), vec![child]);
        assert_eq!(state.children(child).map(|o| o.id).collect::<Vec<_>>(), vec![grandchild]);
        assert_eq!(state.object_names(), vec!["root", "cube", "leaf"]);
    }

    #[test]
    fn remove_takes_the_subtree() {
        let (mut state, root, child, grandchild) = sample();
        let extra = state.add("extra", None, TransformData::default(), SceneObjectKind::Empty).unwrap();
        assert_eq!(state.remove(root).unwrap(), vec![root, child, grandchild]);
        assert_eq!(state.len(), 1);
        assert!(state.object(extra).is_some());
        assert!(state.remove(root).is_err());
    }

    #[test]
    fn reparent_refuses_cycles_and_unknown_parents() {
        let (mut state, root, _, grandchild) = sample();
        assert!(matches!(
            state.reparent(root, Some(grandchild)),
            Err(GraphicsError::InvalidArgument(_))
        ));
        assert!(state.reparent(root, Some(99)).is_err());
        assert!(state.add("orphan", Some(99), TransformData::default(), SceneObjectKind::Empty).is_err());
    }

    #[test]
    fn world_transform_walks_parents() {
        let (state, _, child, grandchild) = sample();
        let world = state.world_transform(grandchild).unwrap();
        assert!(world.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
        let child_world = state.world_transform(child).unwrap();
        assert!(child_world.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
    }

    #[test]
    fn compose_rotates_z_then_y_then_x() {
        let matrix = compose_transform_matrix([0.0; 3], [0.0, 0.0, 90.0], [2.0; 3]);
        let x = matrix.transform_vector3(Vec3::X);
        assert!(x.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5), "{x}");
    }

    #[test]
    fn instantiate_binds_meshes_and_destroy_marks_them() {
        let (state, _, child, _) = sample();
        let mut scene = Scene::new(state);
        let render = Render::new();
        let library = MeshLibrary::with_primitives();
        assert_eq!(scene.instantiate(&library, &render).unwrap(), 1);
        assert_eq!(render.mesh_count(), 1);
        // already bound objects are skipped
        assert_eq!(scene.instantiate(&library, &render).unwrap(), 0);

        let mesh = scene.runtime.mesh(child).unwrap().clone();
        assert!(mesh.position().abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
        assert_eq!(scene.runtime.object_for_mesh(&mesh), Some(child));

        scene.select(Some(child));
        scene.apply_manipulation(child, Operation::Translate, Axis::X, 0.5);
        assert!(mesh.position().abs_diff_eq(Vec3::new(1.5, 2.0, 0.0), 1e-6));

        scene.destroy_object(child, &render).unwrap();
        assert!(mesh.is_destroyed());
        assert_eq!(scene.selected(), None);
        assert_eq!(scene.runtime.mesh_count(), 0);
    }

    #[test]
    fn unknown_model_fails_instantiation() {
        let mut state = SceneState::new("bad");
        state.add_mesh("ghost", "teapot", 0, Vec3::ZERO).unwrap();
        let mut scene = Scene::new(state);
        assert!(scene
            .instantiate(&MeshLibrary::with_primitives(), &Render::new())
            .is_err());
    }

    #[test]
    fn write_times_out_while_a_reader_holds_the_gate() {
        let gate = Arc::new(UsePoints::new(0u32));
        let reader = gate.read_for(Duration::from_millis(10)).unwrap();
        // readers share the gate
        assert!(gate.read_for(Duration::from_millis(10)).is_ok());

        let (tx, rx) = mpsc::channel();
        let writer = {
            let gate = gate.clone();
            std::thread::spawn(move || {
                let result = gate.write_for(Duration::from_millis(20)).map(|_| ());
                tx.send(result).unwrap();
            })
        };
        let result = rx.recv().unwrap();
        writer.join().unwrap();
        assert!(matches!(result, Err(GraphicsError::Timeout(..))));

        drop(reader);
        *gate.write_for(Duration::from_millis(10)).unwrap() += 1;
        assert_eq!(Arc::try_unwrap(gate).unwrap().into_inner(), 1);
    }

    #[test]
    fn read_times_out_while_a_writer_holds_the_gate() {
        let gate = UsePoints::new(());
        let _writer = gate.write_for(Duration::ZERO).unwrap();
        assert!(matches!(
            gate.read_for(Duration::from_millis(5)),
            Err(GraphicsError::Timeout(..))
        ));
    }
}
