//! Editor widgets: scene hierarchy, object inspector and the camera image
//! view. Drawn from a window canvas on the render thread.

use crate::error::Result;
use crate::scene::{Scene, SceneObject, SceneObjectKind, SceneState, UsePoints};
use egui::collapsing_header::CollapsingState;
use glam::Vec2;
use std::time::Duration;

/// GL textures have a bottom-left origin.
const FLIP_V: egui::Rect = egui::Rect {
    min: egui::pos2(0.0, 1.0),
    max: egui::pos2(1.0, 0.0),
};

/// How long editor panels wait for the scene before skipping a frame.
pub const SCENE_WAIT: Duration = Duration::from_millis(50);

/// Largest size with `image`'s aspect ratio that fits in `window`.
pub fn fit_texture(window: Vec2, image: Vec2) -> Vec2 {
    if image.x <= 0.0 || image.y <= 0.0 || window.x <= 0.0 || window.y <= 0.0 {
        return Vec2::ZERO;
    }
    let scale = (window.x / image.x).min(window.y / image.y);
    image * scale
}

pub fn draw_texture(
    ui: &mut egui::Ui,
    window_size: Vec2,
    image_size: Vec2,
    texture: egui::TextureId,
    center: bool,
) -> egui::Response {
    let size = fit_texture(window_size, image_size);
    if center {
        let pad = ((window_size - size) * 0.5).max(Vec2::ZERO);
        ui.add_space(pad.y);
        ui.horizontal(|ui| {
            ui.add_space(pad.x);
            add_image(ui, texture, size)
        })
        .inner
    } else {
        add_image(ui, texture, size)
    }
}

fn add_image(ui: &mut egui::Ui, texture: egui::TextureId, size: Vec2) -> egui::Response {
    let sized = egui::load::SizedTexture::new(texture, egui::vec2(size.x, size.y));
    ui.add(egui::Image::new(sized).uv(FLIP_V).sense(egui::Sense::click()))
}

/// Tree of scene objects. Returns the object clicked this frame.
pub fn draw_hierarchy(ui: &mut egui::Ui, state: &SceneState, selected: Option<u64>) -> Option<u64> {
    let mut clicked = None;
    ui.strong(state.name());
    ui.separator();
    for root in state.roots() {
        hierarchy_node(ui, state, root, selected, &mut clicked, 0);
    }
    if state.is_empty() {
        ui.weak("empty scene");
    }
    clicked
}

fn hierarchy_node(
    ui: &mut egui::Ui,
    state: &SceneState,
    object: &SceneObject,
    selected: Option<u64>,
    clicked: &mut Option<u64>,
    depth: usize,
) {
    if depth > state.len() {
        return;
    }
    let is_selected = selected == Some(object.id);
    let label = format!("{} {}", kind_icon(&object.kind), object.name);
    let mut children = state.children(object.id).peekable();
    if children.peek().is_none() {
        if ui.selectable_label(is_selected, label).clicked() {
            *clicked = Some(object.id);
        }
        return;
    }

    let id = ui.make_persistent_id(("hierarchy", object.id));
    let (_, header, _) = CollapsingState::load_with_default_open(ui.ctx(), id, true)
        .show_header(ui, |ui| ui.selectable_label(is_selected, label))
        .body(|ui| {
            for child in children {
                hierarchy_node(ui, state, child, selected, clicked, depth + 1);
            }
        });
    if header.inner.clicked() {
        *clicked = Some(object.id);
    }
}

fn kind_icon(kind: &SceneObjectKind) -> &'static str {
    match kind {
        SceneObjectKind::Empty => "[+]",
        SceneObjectKind::Mesh(_) => "[m]",
        SceneObjectKind::Skybox(_) => "[s]",
    }
}

/// Editable fields of one object. Returns true when anything changed.
pub fn draw_inspector(ui: &mut egui::Ui, object: &mut SceneObject) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label("Name");
        changed |= ui.text_edit_singleline(&mut object.name).changed();
    });
    ui.weak(format!("id {}", object.id));
    ui.separator();

    egui::Grid::new(("transform", object.id))
        .num_columns(2)
        .show(ui, |ui| {
            let transform = &mut object.transform;
            changed |= vec3_row(ui, "Position", &mut transform.position, 0.05);
            changed |= vec3_row(ui, "Rotation", &mut transform.rotation_deg, 1.0);
            changed |= vec3_row(ui, "Scale", &mut transform.scale, 0.01);
        });

    match &mut object.kind {
        SceneObjectKind::Mesh(mesh) => {
            ui.separator();
            ui.label(format!("{} [{}]", mesh.model, mesh.index));
            ui.horizontal(|ui| {
                ui.label("Color");
                changed |= ui.color_edit_button_rgb(&mut mesh.color).changed();
            });
            changed |= ui.checkbox(&mut mesh.bloom, "Bloom").changed();
        }
        SceneObjectKind::Skybox(skybox) => {
            ui.separator();
            ui.label(format!("{}/*.{}", skybox.directory, skybox.extension));
        }
        SceneObjectKind::Empty => {}
    }
    changed
}

fn vec3_row(ui: &mut egui::Ui, label: &str, value: &mut [f32; 3], speed: f64) -> bool {
    ui.label(label);
    let mut changed = false;
    ui.horizontal(|ui| {
        for (component, prefix) in value.iter_mut().zip(["x ", "y ", "z "]) {
            changed |= ui
                .add(egui::DragValue::new(component).speed(speed).prefix(prefix))
                .changed();
        }
    });
    ui.end_row();
    changed
}

/// "Hierarchy" window over the shared scene. A click selects the object.
pub fn hierarchy_window(ctx: &egui::Context, scene: &UsePoints<Scene>) -> Result<()> {
    let clicked = {
        let scene = scene.read_for(SCENE_WAIT)?;
        egui::Window::new("Hierarchy")
            .default_width(220.0)
            .show(ctx, |ui| draw_hierarchy(ui, &scene.state, scene.selected()))
            .and_then(|response| response.inner)
            .flatten()
    };
    if let Some(id) = clicked {
        scene.write_for(SCENE_WAIT)?.select(Some(id));
    }
    Ok(())
}

/// "Inspector" window for the selected object. Edits are written back
/// under the scene's write gate and pushed to the bound meshes.
pub fn inspector_window(ctx: &egui::Context, scene: &UsePoints<Scene>) -> Result<()> {
    let mut object = {
        let scene = scene.read_for(SCENE_WAIT)?;
        scene
            .selected()
            .and_then(|id| scene.state.object(id))
            .cloned()
    };
    let changed = egui::Window::new("Inspector")
        .default_width(260.0)
        .show(ctx, |ui| match object.as_mut() {
            Some(object) => draw_inspector(ui, object),
            None => {
                ui.weak("nothing selected");
                false
            }
        })
        .and_then(|response| response.inner)
        .unwrap_or(false);

    if let (true, Some(edited)) = (changed, object) {
        let mut scene = scene.write_for(SCENE_WAIT)?;
        if let Some(slot) = scene.state.object_mut(edited.id) {
            *slot = edited;
        }
        scene.sync_transforms();
    }
    Ok(())
}

/// Shows a texture, e.g. a camera's final image, in the central panel.
/// Without `window_size` the image fits the space the panel has left.
pub fn texture_panel(
    ctx: &egui::Context,
    window_size: Option<Vec2>,
    image_size: Vec2,
    texture: egui::TextureId,
    center: bool,
) -> egui::Response {
    egui::CentralPanel::default()
        .frame(egui::Frame::NONE)
        .show(ctx, |ui| {
            let available = ui.available_size();
            let window = window_size.unwrap_or(Vec2::new(available.x, available.y));
            draw_texture(ui, window, image_size, texture, center)
        })
        .inner
}

/// One line per object, used by the demo log.
pub fn scene_summary(state: &SceneState) -> String {
    let mut summary = String::new();
    for object in state.objects() {
        let [x, y, z] = object.transform.position;
        summary.push_str(&format!(
            "{} {} (position {x:.2}, {y:.2}, {z:.2})\n",
            kind_icon(&object.kind),
            object.name
        ));
    }
    summary.push_str(&format!("objects: {}", state.len()));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphicsError;
    use crate::scene::TransformData;
    use glam::Vec3;

    fn scene() -> UsePoints<Scene> {
        let mut state = SceneState::new("ui");
        let group = state
            .add("group", None, TransformData::default(), SceneObjectKind::Empty)
            .unwrap();
        let cube = state.add_mesh("cube", "cube", 0, Vec3::ZERO).unwrap();
        state.reparent(cube, Some(group)).unwrap();
        let mut scene = Scene::new(state);
        scene.select(Some(cube));
        UsePoints::new(scene)
    }

    fn run_frame(mut draw: impl FnMut(&egui::Context)) {
        let ctx = egui::Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| draw(ctx));
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        assert_eq!(fit_texture(Vec2::new(400.0, 400.0), Vec2::new(800.0, 400.0)), Vec2::new(400.0, 200.0));
        assert_eq!(fit_texture(Vec2::new(100.0, 50.0), Vec2::new(10.0, 10.0)), Vec2::new(50.0, 50.0));
        assert_eq!(fit_texture(Vec2::new(100.0, 50.0), Vec2::ZERO), Vec2::ZERO);
    }

    #[test]
    fn panels_draw_without_changing_an_untouched_scene() {
        let gate = scene();
        let before = gate.read_for(SCENE_WAIT).unwrap().state.clone();
        run_frame(|ctx| {
            hierarchy_window(ctx, &gate).unwrap();
            inspector_window(ctx, &gate).unwrap();
            texture_panel(ctx, None, Vec2::new(64.0, 32.0), egui::TextureId::User(3), true);
        });
        assert_eq!(gate.read_for(SCENE_WAIT).unwrap().state, before);
    }

    #[test]
    fn panels_give_up_while_the_scene_is_being_edited() {
        let gate = scene();
        let _writer = gate.write_for(SCENE_WAIT).unwrap();
        run_frame(|ctx| {
            assert!(matches!(hierarchy_window(ctx, &gate), Err(GraphicsError::Timeout(..))));
            assert!(matches!(inspector_window(ctx, &gate), Err(GraphicsError::Timeout(..))));
        });
    }

    #[test]
    fn summary_lists_every_object() {
        let gate = scene();
        let summary = scene_summary(&gate.read_for(SCENE_WAIT).unwrap().state);
        assert!(summary.contains("group"));
        assert!(summary.contains("cube"));
        assert!(summary.ends_with("objects: 2"));
    }
}
