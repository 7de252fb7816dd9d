use super::Texture;
use crate::error::{GraphicsError, Result};
use glam::Vec3;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct MaterialState {
    color: Vec3,
    bloom: bool,
    transparent: bool,
    diffuse: Option<Arc<Texture>>,
}

/// Surface settings of one mesh.
///
/// Holding a diffuse texture counts as one use point on it.
#[derive(Debug)]
pub struct Material {
    state: Mutex<MaterialState>,
    mesh_calculated: Arc<AtomicBool>,
    textures_freed: AtomicBool,
}

impl Material {
    pub(crate) fn new(mesh_calculated: Arc<AtomicBool>) -> Self {
        Self {
            state: Mutex::new(MaterialState {
                color: Vec3::ONE,
                bloom: false,
                transparent: false,
                diffuse: None,
            }),
            mesh_calculated,
            textures_freed: AtomicBool::new(false),
        }
    }

    /// Copy for another mesh. The diffuse texture gains a use point.
    pub(crate) fn duplicate(&self, mesh_calculated: Arc<AtomicBool>) -> Self {
        let state = self.state.lock().clone();
        if let Some(texture) = &state.diffuse {
            texture.add_use_point();
        }
        Self {
            state: Mutex::new(state),
            mesh_calculated,
            textures_freed: AtomicBool::new(false),
        }
    }

    pub fn random_color3() -> Vec3 {
        Vec3::new(
            rand::random::<u8>() as f32,
            rand::random::<u8>() as f32,
            rand::random::<u8>() as f32,
        ) / 255.0
    }

    pub fn color(&self) -> Vec3 {
        self.state.lock().color
    }

    pub fn set_color(&self, color: Vec3) {
        self.state.lock().color = color;
    }

    pub fn bloom(&self) -> bool {
        self.state.lock().bloom
    }

    pub fn set_bloom(&self, value: bool) {
        self.state.lock().bloom = value;
    }

    pub fn diffuse(&self) -> Option<Arc<Texture>> {
        self.state.lock().diffuse.clone()
    }

    pub fn set_diffuse(&self, texture: Option<Arc<Texture>>) {
        if let Some(texture) = &texture {
            texture.add_use_point();
        }
        let previous = std::mem::replace(&mut self.state.lock().diffuse, texture);
        if let Some(previous) = previous {
            previous.remove_use_point();
        }
    }

    pub fn transparent(&self) -> bool {
        self.state.lock().transparent
    }

    /// Only possible before the owning mesh reached the GPU.
    pub fn set_transparent(&self, value: bool) -> Result<()> {
        if self.mesh_calculated.load(Ordering::SeqCst) {
            let err = GraphicsError::InvalidArgument(
                "mesh is already calculated, transparency can no longer change".to_string(),
            );
            log::error!("{err}");
            return Err(err);
        }
        self.state.lock().transparent = value;
        Ok(())
    }

    /// Releases the texture use points. An auto-remove texture nobody else
    /// uses is destroyed.
    pub fn free_textures(&self) -> Result<()> {
        if self.textures_freed.swap(true, Ordering::SeqCst) {
            let err = GraphicsError::DoubleFree("material textures".to_string());
            log::error!("{err}");
            return Err(err);
        }
        if let Some(texture) = self.state.lock().diffuse.take() {
            let remaining = texture.remove_use_point();
            if remaining == 0 && texture.auto_remove() && !texture.is_destroyed() {
                texture.destroy()?;
            }
        }
        Ok(())
    }

    pub(crate) fn has_unfreed_textures(&self) -> bool {
        !self.textures_freed.load(Ordering::SeqCst) && self.state.lock().diffuse.is_some()
    }
}

impl Drop for Material {
    fn drop(&mut self) {
        if self.has_unfreed_textures() {
            log::warn!("material dropped while its textures are not freed");
        }
    }
}
