use parking_lot::{Mutex, RwLock};

/// Native window events as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WinEvent {
    Close,
    Move { x: i32, y: i32 },
    Resize { width: u32, height: u32 },
    LeftClick { pressed: bool },
    RightClick { pressed: bool },
    Focus(bool),
    Scroll { x: f64, y: f64 },
}

pub type WinEventCallback = Box<dyn Fn(WinEvent) + Send + Sync>;
pub type ScrollListener = Box<dyn Fn(f64, f64) + Send + Sync>;

/// One callback slot for every window event plus an append-only list of
/// scroll listeners.
#[derive(Default)]
pub struct EventHub {
    callback: RwLock<Option<WinEventCallback>>,
    scroll_listeners: Mutex<Vec<ScrollListener>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the callback, replacing the previous one. Returns true when
    /// a callback was already present.
    pub fn set_callback(&self, callback: WinEventCallback) -> bool {
        self.callback.write().replace(callback).is_some()
    }

    pub fn clear_callback(&self) {
        self.callback.write().take();
    }

    pub fn has_callback(&self) -> bool {
        self.callback.read().is_some()
    }

    pub fn add_scroll_listener(&self, listener: ScrollListener) {
        self.scroll_listeners.lock().push(listener);
    }

    pub fn scroll_listener_count(&self) -> usize {
        self.scroll_listeners.lock().len()
    }

    pub fn dispatch(&self, event: WinEvent) {
        if let Some(callback) = self.callback.read().as_ref() {
            callback(event);
        }
        if let WinEvent::Scroll { x, y } = event {
            for listener in self.scroll_listeners.lock().iter() {
                listener(x, y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventHub, WinEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn callback_sees_every_event_and_listeners_only_scroll() {
        let hub = EventHub::new();
        let all = Arc::new(AtomicUsize::new(0));
        let scrolls = Arc::new(AtomicUsize::new(0));

        let counter = all.clone();
        assert!(!hub.set_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        for _ in 0..2 {
            let counter = scrolls.clone();
            hub.add_scroll_listener(Box::new(move |_, y| {
                assert_eq!(y, -1.0);
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        hub.dispatch(WinEvent::Focus(true));
        hub.dispatch(WinEvent::Scroll { x: 0.0, y: -1.0 });

        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(scrolls.load(Ordering::SeqCst), 2);
        assert_eq!(hub.scroll_listener_count(), 2);
    }

    #[test]
    fn replacing_the_callback_reports_the_previous_one() {
        let hub = EventHub::new();
        assert!(!hub.set_callback(Box::new(|_| {})));
        assert!(hub.set_callback(Box::new(|_| {})));
        hub.clear_callback();
        assert!(!hub.has_callback());
        hub.dispatch(WinEvent::Close);
    }
}
