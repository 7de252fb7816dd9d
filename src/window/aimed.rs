//! One-shot "which mesh is under the cursor" request between a caller
//! thread and the render thread.

use crate::error::{GraphicsError, Result};
use crate::render::{Camera, ViewportRegion};
use crate::types::Mesh;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct AimState {
    request: Option<(Arc<Camera>, ViewportRegion)>,
    result: Option<Arc<Mesh>>,
    resolved: bool,
    closing: bool,
}

#[derive(Default)]
pub(crate) struct AimSlot {
    state: Mutex<AimState>,
    resolved: Condvar,
}

impl AimSlot {
    /// False while a request is outstanding or the window is closing.
    pub(crate) fn require(&self, camera: Arc<Camera>, region: ViewportRegion) -> bool {
        let mut state = self.state.lock();
        if state.request.is_some() || state.closing {
            return false;
        }
        state.request = Some((camera, region));
        state.result = None;
        state.resolved = false;
        true
    }

    pub(crate) fn is_outstanding(&self) -> bool {
        self.state.lock().request.is_some()
    }

    /// The pending request, left in place until [`AimSlot::publish`].
    pub(crate) fn take_request(&self) -> Option<(Arc<Camera>, ViewportRegion)> {
        self.state.lock().request.clone()
    }

    /// Stores the answer, then clears the outstanding request.
    pub(crate) fn publish(&self, mesh: Option<Arc<Mesh>>) {
        let mut state = self.state.lock();
        state.result = mesh;
        state.resolved = true;
        state.request = None;
        self.resolved.notify_all();
    }

    pub(crate) fn pop(&self) -> Option<Arc<Mesh>> {
        let mut state = self.state.lock();
        state.resolved = false;
        state.result.take()
    }

    /// Blocks until the outstanding request is answered and pops the
    /// answer. Without an outstanding request this is a plain pop.
    pub(crate) fn wait(&self, timeout: Duration) -> Result<Option<Arc<Mesh>>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.request.is_some() && !state.resolved {
            if self.resolved.wait_until(&mut state, deadline).timed_out() {
                return Err(GraphicsError::Timeout(timeout, "aimed mesh"));
            }
        }
        state.resolved = false;
        Ok(state.result.take())
    }

    /// Refuses new requests and answers an outstanding one with `None`.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closing = true;
        if state.request.take().is_some() {
            state.result = None;
            state.resolved = true;
        }
        self.resolved.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::geometry;
    use glam::UVec2;
    use std::sync::Barrier;

    fn region() -> ViewportRegion {
        ViewportRegion::full(UVec2::new(10, 10))
    }

    #[test]
    fn one_request_at_a_time() {
        let slot = AimSlot::default();
        let camera = Camera::new(1).unwrap();
        assert!(slot.require(camera.clone(), region()));
        assert!(!slot.require(camera.clone(), region()));
        slot.publish(None);
        assert!(slot.require(camera, region()));
    }

    #[test]
    fn concurrent_requests_have_one_winner() {
        let slot = Arc::new(AimSlot::default());
        let barrier = Arc::new(Barrier::new(2));
        let camera = Camera::new(1).unwrap();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let (slot, barrier, camera) = (slot.clone(), barrier.clone(), camera.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    slot.require(camera, region())
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn wait_returns_the_published_mesh_once() {
        let slot = Arc::new(AimSlot::default());
        let mesh = Mesh::new("cube", geometry::create_cube());
        assert!(slot.require(Camera::new(1).unwrap(), region()));
        assert!(matches!(
            slot.wait(Duration::from_millis(5)),
            Err(GraphicsError::Timeout(..))
        ));

        let publisher = {
            let (slot, mesh) = (slot.clone(), mesh.clone());
            std::thread::spawn(move || slot.publish(Some(mesh)))
        };
        let got = slot.wait(Duration::from_secs(5)).unwrap().unwrap();
        publisher.join().unwrap();
        assert!(Arc::ptr_eq(&got, &mesh));
        assert!(slot.pop().is_none());
    }

    #[test]
    fn close_resolves_to_none_and_refuses_new_requests() {
        let slot = AimSlot::default();
        let camera = Camera::new(1).unwrap();
        slot.require(camera.clone(), region());
        slot.close();
        assert!(slot.wait(Duration::ZERO).unwrap().is_none());
        assert!(!slot.require(camera, region()));
    }
}
