use crate::environment::{Environment, GpuHandle};

/// One GUI frame handed to the installed [`Canvas`].
pub struct GuiFrame<'a> {
    pub ctx: &'a egui::Context,
    env: &'a dyn Environment,
}

impl<'a> GuiFrame<'a> {
    pub(crate) fn new(ctx: &'a egui::Context, env: &'a dyn Environment) -> Self {
        Self { ctx, env }
    }

    /// egui handle for a GPU texture, e.g. a camera's final image.
    pub fn texture_id(&self, texture: GpuHandle) -> egui::TextureId {
        self.env.gui_texture(texture)
    }
}

/// Editor GUI drawn by the render thread once per frame while the GUI is
/// enabled. Must not call back into `Window::set_canvas`.
pub trait Canvas: Send {
    fn draw(&mut self, frame: &GuiFrame<'_>);
}

impl<F> Canvas for F
where
    F: FnMut(&GuiFrame<'_>) + Send,
{
    fn draw(&mut self, frame: &GuiFrame<'_>) {
        self(frame)
    }
}
