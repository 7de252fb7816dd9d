use crate::environment::{Environment, GpuHandle, TextureFilter};
use crate::error::{GraphicsError, Result};
use glam::UVec2;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureKind {
    #[default]
    Diffuse,
    Normal,
    Specular,
    Glossiness,
}

impl TextureKind {
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Diffuse),
            1 => Some(Self::Normal),
            2 => Some(Self::Specular),
            3 => Some(Self::Glossiness),
            _ => None,
        }
    }
}

/// RGBA8 image plus its GPU counterpart.
///
/// Materials hold use points on a texture. An auto-remove texture destroys
/// itself once the last material lets go of it. Destruction only marks the
/// texture; the render thread deletes the GPU object and unregisters it.
#[derive(Debug)]
pub struct Texture {
    id: u64,
    name: String,
    size: UVec2,
    pixels: Vec<u8>,
    filter: TextureFilter,
    kind: TextureKind,
    auto_remove: bool,
    use_points: AtomicU32,
    gpu: Mutex<GpuHandle>,
    destroyed: AtomicBool,
}

impl Texture {
    pub fn from_rgba(
        name: impl Into<String>,
        size: UVec2,
        pixels: Vec<u8>,
        filter: TextureFilter,
    ) -> Result<Arc<Self>> {
        Self::build(name.into(), size, pixels, filter, TextureKind::Diffuse, false).map(Arc::new)
    }

    /// Decodes an image file from disk.
    pub fn load(
        path: &Path,
        auto_remove: bool,
        kind: TextureKind,
        filter: TextureFilter,
    ) -> Result<Arc<Self>> {
        let image = image::open(path)?.to_rgba8();
        let size = UVec2::new(image.width(), image.height());
        let texture = Self::build(
            path.display().to_string(),
            size,
            image.into_raw(),
            filter,
            kind,
            auto_remove,
        )?;
        log::debug!("loaded texture {} ({}x{})", texture.name, size.x, size.y);
        Ok(Arc::new(texture))
    }

    fn build(
        name: String,
        size: UVec2,
        pixels: Vec<u8>,
        filter: TextureFilter,
        kind: TextureKind,
        auto_remove: bool,
    ) -> Result<Self> {
        if size.x == 0 || size.y == 0 {
            return Err(GraphicsError::ZeroSize {
                what: "texture",
                width: size.x,
                height: size.y,
            });
        }
        let expected = size.x as usize * size.y as usize * 4;
        if pixels.len() != expected {
            return Err(GraphicsError::InvalidArgument(format!(
                "texture \"{name}\" has {} bytes, expected {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            size,
            pixels,
            filter,
            kind,
            auto_remove,
            use_points: AtomicU32::new(0),
            gpu: Mutex::new(0),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn filter(&self) -> TextureFilter {
        self.filter
    }

    pub fn auto_remove(&self) -> bool {
        self.auto_remove
    }

    pub fn gpu_id(&self) -> GpuHandle {
        *self.gpu.lock()
    }

    pub fn is_calculated(&self) -> bool {
        self.gpu_id() != 0
    }

    pub fn add_use_point(&self) {
        self.use_points.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops one use point and returns how many remain.
    pub fn remove_use_point(&self) -> u32 {
        let previous = self
            .use_points
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous == 0 {
            log::warn!("texture {} lost a use point it never had", self.name);
        }
        previous.saturating_sub(1)
    }

    pub fn use_points(&self) -> u32 {
        self.use_points.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Marks the texture for teardown. A second call is a double free.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            let err = GraphicsError::DoubleFree(format!("texture {}", self.name));
            log::error!("{err}");
            return Err(err);
        }
        log::debug!("texture {} marked for destruction", self.name);
        Ok(())
    }

    /// Uploads the pixels. Render thread only.
    pub(crate) fn calculate(&self, env: &mut dyn Environment) -> Result<GpuHandle> {
        let mut gpu = self.gpu.lock();
        if *gpu != 0 {
            return Ok(*gpu);
        }
        *gpu = env.calculate_texture(self.size, &self.pixels, self.filter)?;
        Ok(*gpu)
    }

    /// Deletes the GPU object. Render thread only.
    pub(crate) fn free_gpu(&self, env: &mut dyn Environment) {
        let mut gpu = self.gpu.lock();
        if *gpu != 0 {
            env.delete_texture(*gpu);
            *gpu = 0;
        }
    }
}

#[cfg(test)]
pub(crate) fn solid_texture(name: &str, rgba: [u8; 4]) -> Arc<Texture> {
    Texture::from_rgba(name, UVec2::new(2, 2), rgba.repeat(4), TextureFilter::Nearest).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroying_twice_is_a_double_free() {
        let texture = solid_texture("white", [255; 4]);
        texture.destroy().unwrap();
        assert!(texture.is_destroyed());
        assert!(matches!(texture.destroy(), Err(GraphicsError::DoubleFree(_))));
    }

    #[test]
    fn size_and_data_must_agree() {
        let err = Texture::from_rgba("bad", UVec2::new(2, 2), vec![0; 3], TextureFilter::Linear)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidArgument(_)));
        let err = Texture::from_rgba("empty", UVec2::new(0, 2), vec![], TextureFilter::Linear)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ZeroSize { .. }));
    }

    #[test]
    fn use_points_never_underflow() {
        let texture = solid_texture("t", [0; 4]);
        texture.add_use_point();
        assert_eq!(texture.remove_use_point(), 0);
        assert_eq!(texture.remove_use_point(), 0);
        assert_eq!(texture.use_points(), 0);
    }

    #[test]
    fn load_reads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        let texture = Texture::load(&path, true, TextureKind::Normal, TextureFilter::Nearest).unwrap();
        assert_eq!(texture.size(), UVec2::new(4, 2));
        assert!(texture.auto_remove());
        assert_eq!(texture.kind(), TextureKind::Normal);
    }
}
