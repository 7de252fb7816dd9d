use crate::environment::Environment;
use glam::{IVec2, UVec2};

/// Window changes requested off the render thread, applied at the next
/// frame boundary in the order they were queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Resize(UVec2),
    Move(IVec2),
    CentralizeWindow,
    CentralizeCursor,
    SetFullScreen(bool),
}

impl WindowCommand {
    pub(crate) fn apply(self, env: &mut dyn Environment) {
        match self {
            Self::Resize(size) => env.set_window_size(size),
            Self::Move(position) => env.set_window_position(position),
            Self::CentralizeWindow => {
                let screen = env.screen_size().as_ivec2();
                let size = env.window_size().as_ivec2();
                env.set_window_position((screen - size) / 2);
            }
            Self::CentralizeCursor => {
                let center = env.window_size().as_vec2() * 0.5;
                env.set_cursor_position(center);
            }
            Self::SetFullScreen(value) => {
                if env.is_fullscreen() != value {
                    env.set_fullscreen(value);
                }
            }
        }
        log::debug!("applied window command {self:?}");
    }
}
