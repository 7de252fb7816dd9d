use crate::environment::{Environment, GpuHandle};
use crate::error::{GraphicsError, Result};
use glam::UVec2;
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// File stems of the six faces, in cubemap order (+X, -X, +Y, -Y, +Z, -Z).
pub const FACE_NAMES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

#[derive(Debug, Default)]
struct SkyboxState {
    cubemap: GpuHandle,
    free_requested: bool,
    destroyed: bool,
}

#[derive(Debug)]
pub struct Skybox {
    name: String,
    face_size: UVec2,
    faces: [Vec<u8>; 6],
    state: Mutex<SkyboxState>,
    destroyed: Condvar,
}

impl Skybox {
    pub fn from_faces(name: impl Into<String>, face_size: UVec2, faces: [Vec<u8>; 6]) -> Result<Arc<Self>> {
        let name = name.into();
        if face_size.x == 0 || face_size.y == 0 {
            return Err(GraphicsError::ZeroSize {
                what: "skybox face",
                width: face_size.x,
                height: face_size.y,
            });
        }
        let expected = face_size.x as usize * face_size.y as usize * 4;
        if let Some(bad) = faces.iter().position(|f| f.len() != expected) {
            return Err(GraphicsError::InvalidArgument(format!(
                "skybox {name}: face {} has {} bytes, expected {expected}",
                FACE_NAMES[bad],
                faces[bad].len()
            )));
        }
        Ok(Arc::new(Self {
            name,
            face_size,
            faces,
            state: Mutex::new(SkyboxState::default()),
            destroyed: Condvar::new(),
        }))
    }

    /// Loads `<dir>/<face>.<extension>` for every face. All faces must share
    /// one size.
    pub fn load(dir: &Path, extension: &str) -> Result<Arc<Self>> {
        let mut size = None;
        let mut faces: [Vec<u8>; 6] = Default::default();
        for (slot, face) in faces.iter_mut().zip(FACE_NAMES) {
            let image = image::open(dir.join(format!("{face}.{extension}")))?.to_rgba8();
            let face_size = UVec2::new(image.width(), image.height());
            match size {
                None => size = Some(face_size),
                Some(first) if first != face_size => {
                    return Err(GraphicsError::InvalidArgument(format!(
                        "skybox face {face} is {}x{}, expected {}x{}",
                        face_size.x, face_size.y, first.x, first.y
                    )));
                }
                Some(_) => {}
            }
            *slot = image.into_raw();
        }
        let size = size.unwrap_or(UVec2::ZERO);
        Self::from_faces(dir.display().to_string(), size, faces)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn face_size(&self) -> UVec2 {
        self.face_size
    }

    pub fn cubemap_id(&self) -> GpuHandle {
        self.state.lock().cubemap
    }

    pub fn is_free_requested(&self) -> bool {
        self.state.lock().free_requested
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Asks the render thread to release the cubemap. A skybox that never
    /// reached the GPU is destroyed right away.
    pub fn free(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.free_requested {
            let err = GraphicsError::DoubleFree(format!("skybox {}", self.name));
            log::error!("{err}");
            return Err(err);
        }
        state.free_requested = true;
        if state.cubemap == 0 {
            state.destroyed = true;
            self.destroyed.notify_all();
        }
        Ok(())
    }

    /// Blocks until the cubemap is released, at most `timeout`.
    pub fn await_destroy(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if !state.free_requested {
            return Err(GraphicsError::Lifecycle(format!(
                "skybox {} awaited before free",
                self.name
            )));
        }
        while !state.destroyed {
            if self.destroyed.wait_until(&mut state, deadline).timed_out() {
                return Err(GraphicsError::Timeout(timeout, "skybox destruction"));
            }
        }
        Ok(())
    }

    pub(crate) fn calculate(&self, env: &mut dyn Environment) -> Result<GpuHandle> {
        let mut state = self.state.lock();
        if state.free_requested {
            return Err(GraphicsError::DoubleFree(format!("skybox {}", self.name)));
        }
        if state.cubemap == 0 {
            let faces = [
                self.faces[0].as_slice(),
                self.faces[1].as_slice(),
                self.faces[2].as_slice(),
                self.faces[3].as_slice(),
                self.faces[4].as_slice(),
                self.faces[5].as_slice(),
            ];
            state.cubemap = env.calculate_cubemap(self.face_size, faces)?;
        }
        Ok(state.cubemap)
    }

    pub(crate) fn free_gpu(&self, env: &mut dyn Environment) {
        let mut state = self.state.lock();
        if state.cubemap != 0 {
            env.free_cubemap(state.cubemap);
            state.cubemap = 0;
        }
        state.destroyed = true;
        self.destroyed.notify_all();
    }
}

#[cfg(test)]
pub(crate) fn solid_skybox(name: &str) -> Arc<Skybox> {
    let face = vec![128u8; 4];
    Skybox::from_faces(name, UVec2::ONE, std::array::from_fn(|_| face.clone())).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::HeadlessEnvironment;

    #[test]
    fn faces_must_match_the_declared_size() {
        let mut faces: [Vec<u8>; 6] = std::array::from_fn(|_| vec![0; 16]);
        faces[4] = vec![0; 12];
        let err = Skybox::from_faces("sky", UVec2::new(2, 2), faces).unwrap_err();
        assert!(err.to_string().contains("front"), "{err}");
    }

    #[test]
    fn await_destroy_returns_once_the_gpu_side_is_released() {
        let mut env = HeadlessEnvironment::new();
        let sky = solid_skybox("sky");
        assert_ne!(sky.calculate(&mut env).unwrap(), 0);
        sky.free().unwrap();
        assert!(sky.free().is_err());
        assert!(matches!(
            sky.await_destroy(Duration::from_millis(10)),
            Err(GraphicsError::Timeout(..))
        ));

        let waiter = {
            let sky = sky.clone();
            std::thread::spawn(move || sky.await_destroy(Duration::from_secs(5)))
        };
        sky.free_gpu(&mut env);
        waiter.join().unwrap().unwrap();
        assert_eq!(sky.cubemap_id(), 0);
    }

    #[test]
    fn never_uploaded_skybox_is_destroyed_on_free() {
        let sky = solid_skybox("sky");
        assert!(sky.await_destroy(Duration::from_millis(1)).is_err());
        sky.free().unwrap();
        sky.await_destroy(Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn load_reads_all_six_faces() {
        let dir = tempfile::tempdir().unwrap();
        for face in FACE_NAMES {
            image::RgbaImage::new(2, 2)
                .save(dir.path().join(format!("{face}.png")))
                .unwrap();
        }
        let sky = Skybox::load(dir.path(), "png").unwrap();
        assert_eq!(sky.face_size(), UVec2::new(2, 2));
    }
}
