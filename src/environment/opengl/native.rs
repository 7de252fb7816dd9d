//! Native window, GL display and context creation.

use crate::environment::WindowSpec;
use crate::error::{GraphicsError, Result};
use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext, Version,
};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::num::NonZeroU32;
use std::thread::ThreadId;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

/// A value that may only be touched from the thread that owns it.
///
/// The OpenGL backend lives in an `EnvironmentHandle` that is shared across
/// threads, but every native object inside is created and used by the
/// window's render thread only.
pub(super) struct ThreadBound<T> {
    value: std::mem::ManuallyDrop<T>,
    owner: ThreadId,
}

// SAFETY: the value is only reachable through `get`/`get_mut`, which check
// that the caller is the owning thread. Dropping on a foreign thread leaks
// instead of running the destructor there.
unsafe impl<T> Send for ThreadBound<T> {}

impl<T> ThreadBound<T> {
    pub(super) fn new(value: T) -> Self {
        Self {
            value: std::mem::ManuallyDrop::new(value),
            owner: std::thread::current().id(),
        }
    }

    fn check(&self) -> Result<()> {
        if std::thread::current().id() != self.owner {
            return Err(GraphicsError::Backend(
                "native object used outside its render thread".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) fn get(&self) -> Result<&T> {
        self.check()?;
        Ok(&self.value)
    }

    pub(super) fn get_mut(&mut self) -> Result<&mut T> {
        self.check()?;
        Ok(&mut self.value)
    }

    /// Hands the value to the calling thread.
    ///
    /// # Safety
    ///
    /// The previous owner must no longer run. A window joins its render
    /// thread on close, so the next render thread may adopt the event loop.
    pub(super) unsafe fn adopt(&mut self) {
        self.owner = std::thread::current().id();
    }
}

impl<T> Drop for ThreadBound<T> {
    fn drop(&mut self) {
        if std::thread::current().id() == self.owner {
            // SAFETY: dropped once, on the owning thread.
            unsafe { std::mem::ManuallyDrop::drop(&mut self.value) };
        } else {
            log::warn!("native object dropped outside its render thread, leaking it");
        }
    }
}

/// Window events gathered during one pump of the event loop.
#[derive(Default)]
pub(super) struct EventCollector {
    pub events: Vec<WindowEvent>,
}

impl ApplicationHandler for EventCollector {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.events.push(event);
    }
}

/// Builds the event loop for the calling thread. winit allows one per
/// process, so the backend keeps it across window reloads.
pub(super) fn create_event_loop() -> Result<EventLoop<()>> {
    let mut builder = EventLoop::builder();
    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        builder.with_any_thread(true);
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        winit::platform::x11::EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    builder
        .build()
        .map_err(|err| GraphicsError::ContextCreation(format!("event loop: {err}")))
}

pub(super) struct NativeWindow {
    pub window: Window,
    pub display: Display,
    pub surface: Surface<WindowSurface>,
    pub context: ContextSlot,
    pub samples: u8,
}

pub(super) enum ContextSlot {
    NotCurrent(NotCurrentContext),
    Current(PossiblyCurrentContext),
    Lost,
}

impl NativeWindow {
    pub fn create(event_loop: &EventLoop<()>, spec: &WindowSpec, samples: u32) -> Result<Self> {
        let fullscreen = spec.fullscreen.then_some(Fullscreen::Borderless(None));
        let attributes = WindowAttributes::default()
            .with_title(spec.title.clone())
            .with_inner_size(PhysicalSize::new(spec.size.x, spec.size.y))
            .with_fullscreen(fullscreen)
            .with_resizable(true);
        #[allow(deprecated)]
        let window = event_loop.create_window(attributes).map_err(context_error)?;

        let display_handle = window.display_handle().map_err(context_error)?.as_raw();
        let window_handle = window.window_handle().map_err(context_error)?.as_raw();

        #[cfg(target_os = "windows")]
        let preference = DisplayApiPreference::Wgl(Some(window_handle));
        #[cfg(target_os = "macos")]
        let preference = DisplayApiPreference::Cgl;
        #[cfg(all(unix, not(target_os = "macos")))]
        let preference = DisplayApiPreference::Egl;

        let display = unsafe { Display::new(display_handle, preference) }.map_err(context_error)?;
        let config = choose_config(&display, window_handle, samples)?;

        let size = window.inner_size();
        let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            window_handle,
            non_zero(size.width),
            non_zero(size.height),
        );
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .map_err(context_error)?;

        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(window_handle));
        let context = unsafe { display.create_context(&config, &context_attributes) }
            .map_err(context_error)?;

        log::debug!(
            "GL config: {} samples, depth {}, stencil {}",
            config.num_samples(),
            config.depth_size(),
            config.stencil_size()
        );
        Ok(Self {
            window,
            display,
            surface,
            context: ContextSlot::NotCurrent(context),
            samples: config.num_samples(),
        })
    }

    pub fn make_current(&mut self) -> Result<()> {
        let slot = std::mem::replace(&mut self.context, ContextSlot::Lost);
        self.context = match slot {
            ContextSlot::NotCurrent(context) => {
                ContextSlot::Current(context.make_current(&self.surface).map_err(context_error)?)
            }
            ContextSlot::Current(context) => {
                context.make_current(&self.surface).map_err(context_error)?;
                ContextSlot::Current(context)
            }
            ContextSlot::Lost => {
                return Err(GraphicsError::ContextCreation("GL context was lost".to_string()))
            }
        };
        Ok(())
    }

    pub fn current(&self) -> Option<&PossiblyCurrentContext> {
        match &self.context {
            ContextSlot::Current(context) => Some(context),
            _ => None,
        }
    }

    pub fn load_gl(&self) -> glow::Context {
        unsafe { glow::Context::from_loader_function_cstr(|s: &CStr| self.display.get_proc_address(s)) }
    }

    pub fn set_swap_interval(&self, interval: u32) {
        let Some(context) = self.current() else {
            return;
        };
        let interval = match NonZeroU32::new(interval) {
            Some(frames) => SwapInterval::Wait(frames),
            None => SwapInterval::DontWait,
        };
        if let Err(err) = self.surface.set_swap_interval(context, interval) {
            log::warn!("swap interval could not be set: {err}");
        }
    }

    pub fn resize_surface(&self, width: u32, height: u32) {
        if let Some(context) = self.current() {
            self.surface.resize(context, non_zero(width), non_zero(height));
        }
    }

    pub fn swap_buffers(&self) {
        let Some(context) = self.current() else {
            return;
        };
        if let Err(err) = self.surface.swap_buffers(context) {
            log::error!("swap buffers failed: {err}");
        }
    }
}

fn choose_config(
    display: &Display,
    window_handle: raw_window_handle::RawWindowHandle,
    samples: u32,
) -> Result<Config> {
    let template = ConfigTemplateBuilder::new()
        .with_depth_size(24)
        .with_stencil_size(8)
        .with_transparency(false)
        .compatible_with_native_window(window_handle)
        .build();
    let wanted = u8::try_from(samples).unwrap_or(u8::MAX);
    let configs = unsafe { display.find_configs(template) }.map_err(context_error)?;
    // Closest sample count not above the request, else the smallest one.
    configs
        .reduce(|best, config| {
            let fits = config.num_samples() <= wanted;
            let best_fits = best.num_samples() <= wanted;
            match (fits, best_fits) {
                (true, false) => config,
                (true, true) if config.num_samples() > best.num_samples() => config,
                (false, false) if config.num_samples() < best.num_samples() => config,
                _ => best,
            }
        })
        .ok_or_else(|| GraphicsError::ContextCreation("no suitable GL config".to_string()))
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

fn context_error(err: impl std::fmt::Display) -> GraphicsError {
    let err = GraphicsError::ContextCreation(err.to_string());
    log::error!("{err}");
    err
}
