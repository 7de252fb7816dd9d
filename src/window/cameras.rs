//! Camera collections owned by a window.
//!
//! `add` and `destroy` only enqueue; `drain` applies both queues at the
//! frame boundary. A camera destroyed before the boundary never becomes
//! active, whatever order the two calls came in.

use crate::error::{GraphicsError, Result};
use crate::render::Camera;
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct CameraQueues {
    active: Vec<Arc<Camera>>,
    pending_add: Vec<Arc<Camera>>,
    pending_destroy: Vec<Arc<Camera>>,
}

fn contains(list: &[Arc<Camera>], camera: &Arc<Camera>) -> bool {
    list.iter().any(|c| Arc::ptr_eq(c, camera))
}

impl CameraQueues {
    pub(crate) fn add(&mut self, camera: Arc<Camera>) -> Result<()> {
        let err = if camera.is_destroyed() {
            Some(GraphicsError::Lifecycle(format!(
                "camera {} is destroyed and cannot be added",
                camera.id()
            )))
        } else if contains(&self.active, &camera) || contains(&self.pending_add, &camera) {
            Some(GraphicsError::Duplicate(format!("camera {}", camera.id())))
        } else {
            None
        };
        if let Some(err) = err {
            log::error!("{err}");
            return Err(err);
        }
        self.pending_add.push(camera);
        Ok(())
    }

    pub(crate) fn destroy(&mut self, camera: Option<&Arc<Camera>>) -> Result<()> {
        let Some(camera) = camera else {
            let err = GraphicsError::NullHandle("camera");
            log::error!("{err}");
            return Err(err);
        };
        if contains(&self.pending_destroy, camera) || camera.is_destroyed() {
            let err = GraphicsError::DoubleFree(format!("camera {}", camera.id()));
            log::error!("{err}");
            return Err(err);
        }
        self.pending_destroy.push(camera.clone());
        Ok(())
    }

    /// Applies destroy requests, then additions in FIFO order. Returns the
    /// cameras whose GPU side must be released.
    pub(crate) fn drain(&mut self) -> Vec<Arc<Camera>> {
        let destroyed = std::mem::take(&mut self.pending_destroy);
        for camera in &destroyed {
            self.active.retain(|c| !Arc::ptr_eq(c, camera));
            self.pending_add.retain(|c| !Arc::ptr_eq(c, camera));
        }
        self.active.append(&mut self.pending_add);
        destroyed
    }

    pub(crate) fn active(&self) -> Vec<Arc<Camera>> {
        self.active.clone()
    }

    /// Active cameras, then pending additions in FIFO order, leaving out
    /// any camera queued for destruction.
    pub(crate) fn surviving(&self) -> Vec<Arc<Camera>> {
        self.active
            .iter()
            .chain(self.pending_add.iter())
            .filter(|camera| !contains(&self.pending_destroy, camera))
            .cloned()
            .collect()
    }

    pub(crate) fn is_active(&self, camera: &Arc<Camera>) -> bool {
        contains(&self.active, camera)
    }

    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        (
            self.active.len(),
            self.pending_add.len(),
            self.pending_destroy.len(),
        )
    }

    /// Every camera in any collection, each once, for teardown.
    pub(crate) fn take_all(&mut self) -> Vec<Arc<Camera>> {
        let mut all = std::mem::take(&mut self.active);
        for camera in self.pending_add.drain(..).chain(self.pending_destroy.drain(..)) {
            if !contains(&all, &camera) {
                all.push(camera);
            }
        }
        all
    }

    pub(crate) fn clear(&mut self) {
        self.active.clear();
        self.pending_add.clear();
        self.pending_destroy.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::HeadlessEnvironment;

    fn camera() -> Arc<Camera> {
        Camera::new(1).unwrap()
    }

    #[test]
    fn additions_take_effect_in_order_at_the_boundary() {
        let mut queues = CameraQueues::default();
        let (a, b, c) = (camera(), camera(), camera());
        queues.add(a.clone()).unwrap();
        queues.add(b.clone()).unwrap();
        assert!(queues.active().is_empty());
        assert_eq!(queues.counts(), (0, 2, 0));

        assert!(queues.drain().is_empty());
        queues.add(c.clone()).unwrap();
        queues.drain();
        let ids: Vec<u64> = queues.active().iter().map(|cam| cam.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn destroy_wins_when_added_first() {
        let mut queues = CameraQueues::default();
        let cam = camera();
        queues.add(cam.clone()).unwrap();
        queues.destroy(Some(&cam)).unwrap();
        let destroyed = queues.drain();
        assert_eq!(destroyed.len(), 1);
        assert!(!queues.is_active(&cam));
        assert_eq!(queues.counts(), (0, 0, 0));
    }

    #[test]
    fn destroy_wins_when_destroyed_first() {
        let mut queues = CameraQueues::default();
        let cam = camera();
        queues.destroy(Some(&cam)).unwrap();
        queues.add(cam.clone()).unwrap();
        queues.drain();
        assert!(!queues.is_active(&cam));
        assert_eq!(queues.counts(), (0, 0, 0));
    }

    #[test]
    fn destroying_none_changes_nothing() {
        let mut queues = CameraQueues::default();
        let cam = camera();
        queues.add(cam).unwrap();
        queues.drain();
        let before = queues.counts();
        assert!(matches!(queues.destroy(None), Err(GraphicsError::NullHandle(_))));
        assert_eq!(queues.counts(), before);
    }

    #[test]
    fn duplicates_and_destroyed_cameras_are_rejected() {
        let mut queues = CameraQueues::default();
        let cam = camera();
        queues.add(cam.clone()).unwrap();
        assert!(matches!(queues.add(cam.clone()), Err(GraphicsError::Duplicate(_))));
        queues.drain();
        assert!(queues.add(cam.clone()).is_err());

        queues.destroy(Some(&cam)).unwrap();
        assert!(matches!(
            queues.destroy(Some(&cam)),
            Err(GraphicsError::DoubleFree(_))
        ));
        for destroyed in queues.drain() {
            destroyed.free_gpu(&mut HeadlessEnvironment::new());
        }
        assert!(matches!(queues.add(cam), Err(GraphicsError::Lifecycle(_))));
    }

    #[test]
    fn surviving_includes_pending_additions_but_not_destroyed() {
        let mut queues = CameraQueues::default();
        let (a, b, c) = (camera(), camera(), camera());
        queues.add(a.clone()).unwrap();
        queues.drain();
        queues.add(b.clone()).unwrap();
        queues.add(c.clone()).unwrap();
        queues.destroy(Some(&c)).unwrap();
        let ids: Vec<u64> = queues.surviving().iter().map(|cam| cam.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn take_all_lists_each_camera_once() {
        let mut queues = CameraQueues::default();
        let (a, b) = (camera(), camera());
        queues.add(a.clone()).unwrap();
        queues.drain();
        queues.add(b.clone()).unwrap();
        queues.destroy(Some(&a)).unwrap();
        assert_eq!(queues.take_all().len(), 2);
        assert_eq!(queues.counts(), (0, 0, 0));
    }
}
