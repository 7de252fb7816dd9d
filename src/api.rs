//! Flat `"Class.Method"` entry points for an embedded scripting runtime.
//!
//! Every entry is a typed closure over [`Value`] arguments. The table checks
//! arity before calling; the entry checks argument types and null handles
//! and reports both as errors instead of panicking.

use crate::engine::Engine;
use crate::environment::TextureFilter;
use crate::error::{GraphicsError, Result};
use crate::render::{Axis, Camera, Operation, Render, ViewportRegion};
use crate::scene::{Scene, UsePoints};
use crate::types::{Material, Mesh, Skybox, Texture, TextureKind};
use crate::ui;
use crate::window::{Canvas, Window};
use glam::{Vec2, Vec3};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A canvas handed over once, to the first `Window.SetCanvas` that takes it.
#[derive(Clone)]
pub struct CanvasValue(Arc<Mutex<Option<Box<dyn Canvas>>>>);

impl CanvasValue {
    pub fn new(canvas: impl Canvas + 'static) -> Self {
        Self(Arc::new(Mutex::new(Some(Box::new(canvas)))))
    }

    fn take(&self) -> Option<Box<dyn Canvas>> {
        self.0.lock().take()
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vec2(Vec2),
    Vec3(Vec3),
    List(Vec<Value>),
    Engine(Arc<Engine>),
    Window(Arc<Window>),
    Render(Arc<Render>),
    Camera(Arc<Camera>),
    /// The post-processing chain of this camera.
    PostProcessing(Arc<Camera>),
    /// The manipulation tool of this render.
    ManipulationTool(Arc<Render>),
    Mesh(Arc<Mesh>),
    /// The material of this mesh.
    Material(Arc<Mesh>),
    Texture(Arc<Texture>),
    Skybox(Arc<Skybox>),
    Scene(Arc<UsePoints<Scene>>),
    Gui(egui::Context),
    Canvas(CanvasValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Str(_) => "Str",
            Self::Vec2(_) => "Vec2",
            Self::Vec3(_) => "Vec3",
            Self::List(_) => "List",
            Self::Engine(_) => "Engine",
            Self::Window(_) => "Window",
            Self::Render(_) => "Render",
            Self::Camera(_) => "Camera",
            Self::PostProcessing(_) => "PostProcessing",
            Self::ManipulationTool(_) => "ManipulationTool",
            Self::Mesh(_) => "Mesh",
            Self::Material(_) => "Material",
            Self::Texture(_) => "Texture",
            Self::Skybox(_) => "Skybox",
            Self::Scene(_) => "Scene",
            Self::Gui(_) => "Gui",
            Self::Canvas(_) => "Canvas",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    fn optional<T>(value: Option<T>, wrap: impl FnOnce(T) -> Value) -> Value {
        value.map_or(Value::Nil, wrap)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::Vec2(v) => write!(f, "Vec2({}, {})", v.x, v.y),
            Self::Vec3(v) => write!(f, "Vec3({}, {}, {})", v.x, v.y, v.z),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Mesh(mesh) => write!(f, "Mesh({})", mesh.name()),
            Self::Camera(camera) => write!(f, "Camera({})", camera.id()),
            other => f.write_str(other.type_name()),
        }
    }
}

/// Arguments of one call, with typed accessors that name the entry in
/// their errors.
pub struct Args<'a> {
    entry: &'a str,
    values: &'a [Value],
}

macro_rules! handle_arg {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, index: usize) -> Result<$ty> {
            match self.value(index)? {
                Value::$variant(handle) => Ok(handle.clone()),
                Value::Nil => Err(self.null(stringify!($variant))),
                other => Err(self.mismatch(index, stringify!($variant), other)),
            }
        }
    };
}

impl<'a> Args<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn value(&self, index: usize) -> Result<&'a Value> {
        self.values.get(index).ok_or_else(|| {
            report(GraphicsError::OutOfRange {
                what: format!("argument of {}", self.entry),
                requested: index,
                available: self.values.len(),
            })
        })
    }

    fn mismatch(&self, index: usize, expected: &str, got: &Value) -> GraphicsError {
        report(GraphicsError::InvalidArgument(format!(
            "argument {} of {} must be {expected}, got {}",
            index + 1,
            self.entry,
            got.type_name()
        )))
    }

    fn null(&self, what: &'static str) -> GraphicsError {
        log::error!("{} was called with a null {what}", self.entry);
        GraphicsError::NullHandle(what)
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        match self.value(index)? {
            Value::Bool(value) => Ok(*value),
            other => Err(self.mismatch(index, "Bool", other)),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        match self.value(index)? {
            Value::Int(value) => Ok(*value),
            other => Err(self.mismatch(index, "Int", other)),
        }
    }

    pub fn uint(&self, index: usize) -> Result<u32> {
        let value = self.int(index)?;
        u32::try_from(value).map_err(|_| {
            report(GraphicsError::InvalidArgument(format!(
                "argument {} of {} must be a non-negative 32-bit integer, got {value}",
                index + 1,
                self.entry
            )))
        })
    }

    /// Accepts Int too.
    pub fn float(&self, index: usize) -> Result<f32> {
        match self.value(index)? {
            Value::Float(value) => Ok(*value as f32),
            Value::Int(value) => Ok(*value as f32),
            other => Err(self.mismatch(index, "Float", other)),
        }
    }

    pub fn str(&self, index: usize) -> Result<&'a str> {
        match self.value(index)? {
            Value::Str(value) => Ok(value),
            other => Err(self.mismatch(index, "Str", other)),
        }
    }

    pub fn vec2(&self, index: usize) -> Result<Vec2> {
        match self.value(index)? {
            Value::Vec2(value) => Ok(*value),
            other => Err(self.mismatch(index, "Vec2", other)),
        }
    }

    pub fn vec3(&self, index: usize) -> Result<Vec3> {
        match self.value(index)? {
            Value::Vec3(value) => Ok(*value),
            other => Err(self.mismatch(index, "Vec3", other)),
        }
    }

    pub fn millis(&self, index: usize) -> Result<Duration> {
        Ok(Duration::from_millis(u64::from(self.uint(index)?)))
    }

    handle_arg!(window, Window, Arc<Window>);
    handle_arg!(render, Render, Arc<Render>);
    handle_arg!(camera, Camera, Arc<Camera>);
    handle_arg!(post_processing, PostProcessing, Arc<Camera>);
    handle_arg!(tool, ManipulationTool, Arc<Render>);
    handle_arg!(mesh, Mesh, Arc<Mesh>);
    handle_arg!(material, Material, Arc<Mesh>);
    handle_arg!(texture, Texture, Arc<Texture>);
    handle_arg!(skybox, Skybox, Arc<Skybox>);
    handle_arg!(scene, Scene, Arc<UsePoints<Scene>>);
    handle_arg!(gui, Gui, egui::Context);
    handle_arg!(canvas, Canvas, CanvasValue);

    /// `Nil` maps to `None`; any other non-camera value is a type error.
    pub fn optional_camera(&self, index: usize) -> Result<Option<Arc<Camera>>> {
        match self.value(index)? {
            Value::Nil => Ok(None),
            _ => self.camera(index).map(Some),
        }
    }

    pub fn optional_texture(&self, index: usize) -> Result<Option<Arc<Texture>>> {
        match self.value(index)? {
            Value::Nil => Ok(None),
            _ => self.texture(index).map(Some),
        }
    }

    pub fn optional_skybox(&self, index: usize) -> Result<Option<Arc<Skybox>>> {
        match self.value(index)? {
            Value::Nil => Ok(None),
            _ => self.skybox(index).map(Some),
        }
    }

    /// A list whose every item is a mesh.
    pub fn meshes(&self, index: usize) -> Result<Vec<Arc<Mesh>>> {
        let Value::List(items) = self.value(index)? else {
            return Err(self.mismatch(index, "List", &self.values[index]));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Mesh(mesh) => Ok(mesh.clone()),
                Value::Nil => Err(self.null("Mesh")),
                other => Err(self.mismatch(index, "List of Mesh", other)),
            })
            .collect()
    }
}

fn report(err: GraphicsError) -> GraphicsError {
    log::error!("{err}");
    err
}

type Binding = Box<dyn Fn(&Args<'_>) -> Result<Value> + Send + Sync>;

struct Entry {
    arity: usize,
    call: Binding,
}

/// Named entry points. Sorted, so listings are stable.
#[derive(Default)]
pub struct BindingTable {
    entries: BTreeMap<&'static str, Entry>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every engine entry point bound to `engine`.
    pub fn with_engine(engine: &Arc<Engine>) -> Self {
        let mut table = Self::new();
        register_engine(&mut table, engine);
        register_window(&mut table, engine);
        register_camera(&mut table);
        register_post_processing(&mut table);
        register_render(&mut table, engine);
        register_manipulation_tool(&mut table);
        register_resources(&mut table, engine);
        register_gui(&mut table, engine);
        log::debug!("binding table holds {} entries", table.len());
        table
    }

    /// False if `name` is taken; the existing entry stays.
    pub fn register<F>(&mut self, name: &'static str, arity: usize, call: F) -> bool
    where
        F: Fn(&Args<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        if self.entries.contains_key(name) {
            log::warn!("binding {name} is already registered");
            return false;
        }
        self.entries.insert(
            name,
            Entry {
                arity,
                call: Box::new(call),
            },
        );
        true
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let Some(entry) = self.entries.get(name) else {
            return Err(report(GraphicsError::InvalidArgument(format!(
                "unknown binding {name}"
            ))));
        };
        if args.len() != entry.arity {
            return Err(report(GraphicsError::InvalidArgument(format!(
                "{name} expects {} arguments, got {}",
                entry.arity,
                args.len()
            ))));
        }
        (entry.call)(&Args {
            entry: name,
            values: args,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|entry| entry.arity)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn register_engine(table: &mut BindingTable, engine: &Arc<Engine>) {
    let this = engine.clone();
    table.register("Engine.Get", 0, move |_| Ok(Value::Engine(this.clone())));
    let this = engine.clone();
    table.register("Engine.Reload", 0, move |_| {
        let cameras = this.reload()?;
        Ok(Value::List(cameras.into_iter().map(Value::Camera).collect()))
    });
}

fn register_window(table: &mut BindingTable, engine: &Arc<Engine>) {
    let this = engine.clone();
    table.register("Window.Get", 0, move |_| Ok(Value::Window(this.window())));
    table.register("Window.GetRender", 1, |args| {
        Ok(Value::Render(args.window(0)?.render().clone()))
    });
    table.register("Window.AddCamera", 2, |args| {
        args.window(0)?.add_camera(args.camera(1)?)?;
        Ok(Value::Nil)
    });
    table.register("Window.DestroyCamera", 2, |args| {
        let camera = args.optional_camera(1)?;
        args.window(0)?.destroy_camera(camera.as_ref())?;
        Ok(Value::Nil)
    });
    table.register("Window.SetCanvas", 2, |args| {
        let window = args.window(0)?;
        let Some(canvas) = args.canvas(1)?.take() else {
            return Err(report(GraphicsError::InvalidArgument(
                "canvas was already handed to a window".to_string(),
            )));
        };
        Ok(Value::Bool(window.set_canvas(canvas)))
    });
    table.register("Window.GetWindowSize", 1, |args| {
        Ok(Value::Vec2(args.window(0)?.window_size().as_vec2()))
    });
    table.register("Window.IsFullScreen", 1, |args| {
        Ok(Value::Bool(args.window(0)?.is_fullscreen()))
    });
    table.register("Window.SetGUIEnabled", 2, |args| {
        args.window(0)?.set_gui_enabled(args.bool(1)?);
        Ok(Value::Nil)
    });
    table.register("Window.SetFullScreen", 2, |args| {
        args.window(0)?.set_fullscreen(args.bool(1)?);
        Ok(Value::Nil)
    });
    table.register("Window.Resize", 3, |args| {
        args.window(0)?.resize(args.uint(1)?, args.uint(2)?)?;
        Ok(Value::Nil)
    });
    table.register("Window.CentralizeWindow", 1, |args| {
        args.window(0)?.centralize_window();
        Ok(Value::Nil)
    });
    table.register("Window.CentralizeCursor", 1, |args| {
        args.window(0)?.centralize_cursor();
        Ok(Value::Nil)
    });
    table.register("Window.RequireAimedMesh", 4, |args| {
        let window = args.window(0)?;
        let region = ViewportRegion::new(args.vec2(2)?, args.vec2(3)?);
        Ok(Value::Bool(window.require_aimed_mesh(args.camera(1)?, region)))
    });
    table.register("Window.PopAimedMesh", 1, |args| {
        Ok(Value::optional(args.window(0)?.pop_aimed_mesh(), Value::Mesh))
    });
}

fn register_camera(table: &mut BindingTable) {
    table.register("Camera.New", 1, |args| {
        Ok(Value::Camera(Camera::new(args.uint(0)?)?))
    });
    table.register("Camera.GetPostProcessing", 1, |args| {
        Ok(Value::PostProcessing(args.camera(0)?))
    });
    table.register("Camera.SetFrameSize", 3, |args| {
        args.camera(0)?.set_frame_size(args.uint(1)?, args.uint(2)?)?;
        Ok(Value::Nil)
    });
    table.register("Camera.SetDirectOutput", 2, |args| {
        args.camera(0)?.set_direct_output(args.bool(1)?);
        Ok(Value::Nil)
    });
    table.register("Camera.IsDirectOutput", 1, |args| {
        Ok(Value::Bool(args.camera(0)?.is_direct_output()))
    });
    table.register("Camera.GetSize", 1, |args| {
        Ok(Value::Vec2(args.camera(0)?.size().as_vec2()))
    });
    table.register("Camera.WaitCalculate", 2, |args| {
        args.camera(0)?.wait_calculate(args.millis(1)?)?;
        Ok(Value::Nil)
    });
    table.register("Camera.WaitBuffersCalculate", 2, |args| {
        args.camera(0)?.wait_buffers_calculate(args.millis(1)?)?;
        Ok(Value::Nil)
    });
    table.register("Camera.WorldToScreenPoint", 2, |args| {
        let point = args.camera(0)?.world_to_screen_point(args.vec3(1)?);
        Ok(Value::optional(point, Value::Vec2))
    });
}

fn register_post_processing(table: &mut BindingTable) {
    table.register("PostProcessing.SetBloomIntensity", 2, |args| {
        args.post_processing(0)?
            .post_processing()
            .set_bloom_intensity(args.float(1)?);
        Ok(Value::Nil)
    });
    table.register("PostProcessing.SetBloomAmount", 2, |args| {
        args.post_processing(0)?
            .post_processing()
            .set_bloom_amount(args.uint(1)?);
        Ok(Value::Nil)
    });
    table.register("PostProcessing.SetBloom", 2, |args| {
        args.post_processing(0)?.post_processing().set_bloom(args.bool(1)?);
        Ok(Value::Nil)
    });
    table.register("PostProcessing.GetBloomEnabled", 1, |args| {
        Ok(Value::Bool(args.post_processing(0)?.post_processing().bloom_enabled()))
    });
    table.register("PostProcessing.SetGamma", 2, |args| {
        args.post_processing(0)?.post_processing().set_gamma(args.float(1)?);
        Ok(Value::Nil)
    });
    table.register("PostProcessing.SetExposure", 2, |args| {
        args.post_processing(0)?
            .post_processing()
            .set_exposure(args.float(1)?);
        Ok(Value::Nil)
    });

    type Getter = fn(&crate::render::PostProcessing) -> u32;
    let getters: [(&'static str, Getter); 8] = [
        ("PostProcessing.GetFinalTextureID", |p| p.final_texture_id()),
        ("PostProcessing.GetColoredImage", |p| p.colored_image()),
        ("PostProcessing.GetBloomMask", |p| p.bloom_mask()),
        ("PostProcessing.GetCustomColorBuffer", |p| p.custom_color_buffer()),
        ("PostProcessing.GetBlurBloomMask", |p| p.blur_bloom_mask()),
        ("PostProcessing.GetSkyboxColor", |p| p.skybox_color()),
        ("PostProcessing.GetStencilBuffer", |p| p.stencil_buffer()),
        ("PostProcessing.GetDepthBuffer", |p| p.depth_buffer()),
    ];
    for (name, getter) in getters {
        table.register(name, 1, move |args| {
            let camera = args.post_processing(0)?;
            Ok(Value::Int(i64::from(getter(camera.post_processing()))))
        });
    }
}

fn register_render(table: &mut BindingTable, engine: &Arc<Engine>) {
    let this = engine.clone();
    table.register("Render.Get", 0, move |_| Ok(Value::Render(this.render())));
    table.register("Render.SetGridEnabled", 2, |args| {
        args.render(0)?.set_grid_enabled(args.bool(1)?);
        Ok(Value::Nil)
    });
    table.register("Render.RegisterMesh", 2, |args| {
        args.render(0)?.register_mesh(args.mesh(1)?)?;
        Ok(Value::Nil)
    });
    table.register("Render.RegisterMeshes", 2, |args| {
        args.render(0)?.register_meshes(args.meshes(1)?)?;
        Ok(Value::Nil)
    });
    table.register("Render.RegisterTexture", 2, |args| {
        args.render(0)?.register_texture(args.texture(1)?)?;
        Ok(Value::Nil)
    });
    table.register("Render.GetManipulationTool", 1, |args| {
        Ok(Value::ManipulationTool(args.render(0)?))
    });
    table.register("Render.SetSkybox", 2, |args| {
        args.render(0)?.set_skybox(args.optional_skybox(1)?);
        Ok(Value::Nil)
    });
}

fn register_manipulation_tool(table: &mut BindingTable) {
    table.register("ManipulationTool.SetRings", 2, |args| {
        args.tool(0)?.manipulation_tool().set_rings(args.meshes(1)?)?;
        Ok(Value::Nil)
    });
    table.register("ManipulationTool.SetArrows", 2, |args| {
        args.tool(0)?.manipulation_tool().set_arrows(args.meshes(1)?)?;
        Ok(Value::Nil)
    });
    table.register("ManipulationTool.GetActiveAxis", 1, |args| {
        Ok(Value::Int(args.tool(0)?.manipulation_tool().active_axis().index()))
    });
    table.register("ManipulationTool.Require", 4, |args| {
        let render = args.tool(0)?;
        let region = ViewportRegion::new(args.vec2(2)?, args.vec2(3)?);
        Ok(Value::Bool(
            render.manipulation_tool().require(args.camera(1)?, region),
        ))
    });
    table.register("ManipulationTool.Clear", 1, |args| {
        Ok(Value::Bool(args.tool(0)?.manipulation_tool().clear()))
    });
    table.register("ManipulationTool.GetOperation", 1, |args| {
        Ok(Value::Int(args.tool(0)?.manipulation_tool().operation().index()))
    });
    table.register("ManipulationTool.SetOperation", 2, |args| {
        let render = args.tool(0)?;
        let index = args.int(1)?;
        let Some(operation) = Operation::from_index(index) else {
            return Err(report(GraphicsError::InvalidArgument(format!(
                "unknown manipulation operation {index}"
            ))));
        };
        render.manipulation_tool().set_operation(operation);
        Ok(Value::Nil)
    });
    table.register("ManipulationTool.DisableAxis", 1, |args| {
        args.tool(0)?.manipulation_tool().disable_axis();
        Ok(Value::Nil)
    });
    table.register("ManipulationTool.GetDrag", 1, |args| {
        Ok(Value::Float(args.tool(0)?.manipulation_tool().drag()))
    });
}

fn register_resources(table: &mut BindingTable, engine: &Arc<Engine>) {
    let library = engine.library().clone();
    table.register("Mesh.Load", 2, move |args| {
        let index = args.uint(1)? as usize;
        Ok(Value::Mesh(Mesh::load(&library, args.str(0)?, index)?))
    });
    let library = engine.library().clone();
    table.register("Mesh.LoadAll", 1, move |args| {
        let meshes = library.load_all(args.str(0)?)?;
        Ok(Value::List(meshes.into_iter().map(Value::Mesh).collect()))
    });
    table.register("Mesh.Copy", 1, |args| Ok(Value::Mesh(args.mesh(0)?.copy())));
    table.register("Mesh.GetMaterial", 1, |args| Ok(Value::Material(args.mesh(0)?)));

    table.register("Material.SetDiffuse", 2, |args| {
        let mesh = args.material(0)?;
        mesh.material().set_diffuse(args.optional_texture(1)?);
        Ok(Value::Nil)
    });
    table.register("Material.SetBloom", 2, |args| {
        args.material(0)?.material().set_bloom(args.bool(1)?);
        Ok(Value::Nil)
    });
    table.register("Material.SetColor", 2, |args| {
        args.material(0)?.material().set_color(args.vec3(1)?);
        Ok(Value::Nil)
    });
    table.register("Material.RandomColor3", 0, |_| {
        Ok(Value::Vec3(Material::random_color3()))
    });

    table.register("Texture.Load", 4, |args| {
        let kind_index = args.int(2)?;
        let kind = TextureKind::from_index(kind_index).ok_or_else(|| {
            report(GraphicsError::InvalidArgument(format!(
                "unknown texture kind {kind_index}"
            )))
        })?;
        let filter = match args.int(3)? {
            0 => TextureFilter::Nearest,
            1 => TextureFilter::Linear,
            other => {
                return Err(report(GraphicsError::InvalidArgument(format!(
                    "unknown texture filter {other}"
                ))))
            }
        };
        let texture = Texture::load(Path::new(args.str(0)?), args.bool(1)?, kind, filter)?;
        Ok(Value::Texture(texture))
    });

    table.register("Skybox.Load", 2, |args| {
        Ok(Value::Skybox(Skybox::load(Path::new(args.str(0)?), args.str(1)?)?))
    });
    table.register("Skybox.Free", 1, |args| {
        args.skybox(0)?.free()?;
        Ok(Value::Nil)
    });
    table.register("Skybox.AwaitDestroy", 2, |args| {
        args.skybox(0)?.await_destroy(args.millis(1)?)?;
        Ok(Value::Nil)
    });

    let this = engine.clone();
    table.register("Scene.Get", 0, move |_| Ok(Value::Scene(this.scene().clone())));
}

/// Scene units (or degrees) per window pixel of manipulation drag.
const DRAG_TO_SCENE: f32 = 0.01;

fn register_gui(table: &mut BindingTable, engine: &Arc<Engine>) {
    table.register("GUIWindow.DrawHierarchy", 2, |args| {
        ui::hierarchy_window(&args.gui(0)?, &*args.scene(1)?)?;
        Ok(Value::Nil)
    });
    table.register("GUIWindow.DrawInspector", 2, |args| {
        ui::inspector_window(&args.gui(0)?, &*args.scene(1)?)?;
        Ok(Value::Nil)
    });
    table.register("GUIWindow.DrawTexture", 5, |args| {
        let ctx = args.gui(0)?;
        let texture = egui::TextureId::User(u64::from(args.uint(3)?));
        ui::texture_panel(&ctx, Some(args.vec2(1)?), args.vec2(2)?, texture, args.bool(4)?);
        Ok(Value::Nil)
    });
    let this = engine.clone();
    table.register("GUIWindow.ApplyManipulation", 0, move |_| {
        let render = this.render();
        let tool = render.manipulation_tool();
        let axis = tool.active_axis();
        if axis == Axis::None {
            return Ok(Value::Bool(false));
        }
        let mut scene = this.scene().write_for(ui::SCENE_WAIT)?;
        let Some(selected) = scene.selected() else {
            return Ok(Value::Bool(false));
        };
        let delta = tool.take_drag_delta();
        if delta == 0.0 {
            return Ok(Value::Bool(false));
        }
        scene.apply_manipulation(selected, tool.operation(), axis, delta as f32 * DRAG_TO_SCENE);
        Ok(Value::Bool(true))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::environment::{EnvironmentHandle, HeadlessEnvironment};
    use crate::scene::SceneState;
    use pretty_assertions::assert_eq;

    fn table() -> (BindingTable, Arc<Engine>) {
        crate::logging::init_for_tests();
        let engine = Engine::new(
            EnvironmentHandle::new(HeadlessEnvironment::new()),
            WindowConfig::default(),
            Scene::new(SceneState::new("api")),
        );
        (BindingTable::with_engine(&engine), engine)
    }

    fn message(result: Result<Value>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn every_entry_point_is_registered() {
        let (table, _engine) = table();
        let expected = [
            "Engine.Get", "Engine.Reload",
            "Window.Get", "Window.GetRender", "Window.AddCamera", "Window.DestroyCamera",
            "Window.SetCanvas", "Window.GetWindowSize", "Window.IsFullScreen",
            "Window.SetGUIEnabled", "Window.SetFullScreen", "Window.Resize",
            "Window.CentralizeWindow", "Window.CentralizeCursor", "Window.RequireAimedMesh",
            "Window.PopAimedMesh",
            "Camera.New", "Camera.GetPostProcessing", "Camera.SetFrameSize",
            "Camera.SetDirectOutput", "Camera.IsDirectOutput", "Camera.GetSize",
            "Camera.WaitCalculate", "Camera.WaitBuffersCalculate", "Camera.WorldToScreenPoint",
            "PostProcessing.SetBloomIntensity", "PostProcessing.SetBloomAmount",
            "PostProcessing.SetBloom", "PostProcessing.GetBloomEnabled", "PostProcessing.SetGamma",
            "PostProcessing.SetExposure", "PostProcessing.GetFinalTextureID",
            "PostProcessing.GetColoredImage", "PostProcessing.GetBloomMask",
            "PostProcessing.GetCustomColorBuffer", "PostProcessing.GetBlurBloomMask",
            "PostProcessing.GetSkyboxColor", "PostProcessing.GetStencilBuffer",
            "PostProcessing.GetDepthBuffer",
            "Render.Get", "Render.SetGridEnabled", "Render.RegisterMesh", "Render.RegisterMeshes",
            "Render.RegisterTexture", "Render.GetManipulationTool", "Render.SetSkybox",
            "ManipulationTool.SetRings", "ManipulationTool.SetArrows",
            "ManipulationTool.GetActiveAxis", "ManipulationTool.Require", "ManipulationTool.Clear",
            "ManipulationTool.GetOperation", "ManipulationTool.SetOperation",
            "ManipulationTool.DisableAxis", "ManipulationTool.GetDrag",
            "Mesh.Load", "Mesh.LoadAll", "Mesh.Copy", "Mesh.GetMaterial",
            "Material.SetDiffuse", "Material.SetBloom", "Material.SetColor", "Material.RandomColor3",
            "Texture.Load", "Skybox.Load", "Skybox.Free", "Skybox.AwaitDestroy",
            "GUIWindow.DrawHierarchy", "GUIWindow.DrawInspector", "GUIWindow.DrawTexture",
        ];
        let missing: Vec<_> = expected.iter().filter(|name| !table.contains(name)).collect();
        assert!(missing.is_empty(), "missing entries: {missing:?}");
    }

    #[test]
    fn arity_and_type_mismatches_are_errors() {
        let (table, _engine) = table();
        let window = table.call("Window.Get", &[]).unwrap();
        assert_eq!(
            message(table.call("Window.Resize", &[window.clone(), Value::Int(10)])),
            "invalid argument: Window.Resize expects 3 arguments, got 2"
        );
        assert_eq!(
            message(table.call("Window.Resize", &[window.clone(), Value::Str("10".into()), Value::Int(5)])),
            "invalid argument: argument 2 of Window.Resize must be Int, got Str"
        );
        assert!(message(table.call("Window.Resize", &[window, Value::Int(-1), Value::Int(5)]))
            .contains("non-negative"));
        assert!(message(table.call("Window.Explode", &[])).contains("unknown binding"));
    }

    #[test]
    fn null_handles_are_rejected() {
        let (table, _engine) = table();
        assert!(matches!(
            table.call("Camera.GetSize", &[Value::Nil]),
            Err(GraphicsError::NullHandle("Camera"))
        ));
        let window = table.call("Window.Get", &[]).unwrap();
        assert!(matches!(
            table.call("Window.DestroyCamera", &[window, Value::Nil]),
            Err(GraphicsError::NullHandle(_))
        ));
        let list = Value::List(vec![Value::Nil]);
        let render = table.call("Render.Get", &[]).unwrap();
        assert!(matches!(
            table.call("Render.RegisterMeshes", &[render, list]),
            Err(GraphicsError::NullHandle("Mesh"))
        ));
    }

    #[test]
    fn out_of_range_mesh_index_names_both_bounds() {
        let (table, _engine) = table();
        let err = message(table.call("Mesh.Load", &[Value::Str("arrows".into()), Value::Int(3)]));
        assert!(err.contains("3 >= 3"), "{err}");
        let Value::List(meshes) = table.call("Mesh.LoadAll", &[Value::Str("arrows".into())]).unwrap() else {
            panic!("expected a list");
        };
        assert_eq!(meshes.len(), 3);
    }

    #[test]
    fn camera_and_post_processing_through_the_table() {
        let (table, _engine) = table();
        assert!(table.call("Camera.New", &[Value::Int(0)]).is_err());
        let camera = table.call("Camera.New", &[Value::Int(2)]).unwrap();
        table
            .call("Camera.SetFrameSize", &[camera.clone(), Value::Int(320), Value::Int(200)])
            .unwrap();
        let Value::Vec2(size) = table.call("Camera.GetSize", &[camera.clone()]).unwrap() else {
            panic!("expected a size");
        };
        assert_eq!(size, Vec2::new(320.0, 200.0));

        let post = table.call("Camera.GetPostProcessing", &[camera.clone()]).unwrap();
        table.call("PostProcessing.SetBloomAmount", &[post.clone(), Value::Int(0)]).unwrap();
        table.call("PostProcessing.SetBloom", &[post.clone(), Value::Bool(false)]).unwrap();
        table.call("PostProcessing.SetGamma", &[post.clone(), Value::Int(2)]).unwrap();
        let Value::Camera(handle) = &camera else { panic!("expected a camera") };
        let settings = handle.post_processing().settings();
        assert_eq!(settings.bloom_amount, 1);
        assert!(!settings.bloom);
        assert_eq!(settings.gamma, 2.0);
        assert!(matches!(
            table.call("PostProcessing.GetBloomEnabled", &[post.clone()]).unwrap(),
            Value::Bool(false)
        ));
        // nothing is allocated before the camera joins a running window
        assert!(matches!(
            table.call("PostProcessing.GetFinalTextureID", &[post]).unwrap(),
            Value::Int(0)
        ));
    }

    #[test]
    fn manipulation_tool_and_materials_through_the_table() {
        let (table, _engine) = table();
        let render = table.call("Render.Get", &[]).unwrap();
        let tool = table.call("Render.GetManipulationTool", &[render.clone()]).unwrap();
        let camera = table.call("Camera.New", &[Value::Int(1)]).unwrap();
        let region = [Value::Vec2(Vec2::ZERO), Value::Vec2(Vec2::splat(100.0))];
        let require = [tool.clone(), camera.clone(), region[0].clone(), region[1].clone()];
        assert!(matches!(table.call("ManipulationTool.Require", &require).unwrap(), Value::Bool(true)));
        assert!(matches!(table.call("ManipulationTool.Require", &require).unwrap(), Value::Bool(false)));
        assert!(matches!(table.call("ManipulationTool.Clear", &[tool.clone()]).unwrap(), Value::Bool(true)));
        table.call("ManipulationTool.SetOperation", &[tool.clone(), Value::Int(2)]).unwrap();
        assert!(matches!(
            table.call("ManipulationTool.GetOperation", &[tool.clone()]).unwrap(),
            Value::Int(2)
        ));
        assert!(table.call("ManipulationTool.SetOperation", &[tool.clone(), Value::Int(7)]).is_err());
        let two = Value::List(vec![
            table.call("Mesh.Load", &[Value::Str("cube".into()), Value::Int(0)]).unwrap(),
            table.call("Mesh.Load", &[Value::Str("cube".into()), Value::Int(0)]).unwrap(),
        ]);
        assert!(table.call("ManipulationTool.SetArrows", &[tool, two]).is_err());

        let mesh = table.call("Mesh.Load", &[Value::Str("cube".into()), Value::Int(0)]).unwrap();
        let material = table.call("Mesh.GetMaterial", &[mesh.clone()]).unwrap();
        table
            .call("Material.SetColor", &[material, Value::Vec3(Vec3::new(0.5, 0.25, 1.0))])
            .unwrap();
        table.call("Render.RegisterMesh", &[render.clone(), mesh.clone()]).unwrap();
        assert!(matches!(
            table.call("Render.RegisterMesh", &[render, mesh.clone()]),
            Err(GraphicsError::Duplicate(_))
        ));
        let Value::Mesh(mesh) = mesh else { panic!("expected a mesh") };
        assert_eq!(mesh.material().color(), Vec3::new(0.5, 0.25, 1.0));
    }

    #[test]
    fn gui_entries_draw_into_a_frame() {
        let (table, _engine) = table();
        let scene = table.call("Scene.Get", &[]).unwrap();
        let ctx = egui::Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            let gui = Value::Gui(ctx.clone());
            table.call("GUIWindow.DrawHierarchy", &[gui.clone(), scene.clone()]).unwrap();
            table.call("GUIWindow.DrawInspector", &[gui.clone(), scene.clone()]).unwrap();
            let texture = [
                gui,
                Value::Vec2(Vec2::new(200.0, 100.0)),
                Value::Vec2(Vec2::new(64.0, 64.0)),
                Value::Int(5),
                Value::Bool(true),
            ];
            table.call("GUIWindow.DrawTexture", &texture).unwrap();
        });
    }

    #[test]
    fn apply_manipulation_moves_by_new_drag_only() {
        use crate::environment::Environment;
        use crate::render::{shaders, PickBuffer};

        let (table, engine) = table();
        let id = {
            let mut scene = engine.scene().write_for(ui::SCENE_WAIT).unwrap();
            let id = scene.state.add_mesh("box", "cube", 0, Vec3::ZERO).unwrap();
            scene.select(Some(id));
            id
        };
        let mut env = HeadlessEnvironment::new();
        let flat = env.compile_shader(&shaders::FLAT).unwrap();
        let mut pick = PickBuffer::new();
        let camera = Camera::new(1).unwrap();
        camera.set_frame_size(200, 200).unwrap();
        let render = engine.render();
        let tool = render.manipulation_tool();
        tool.update_resources(&mut env).unwrap();
        assert!(tool.require(camera.clone(), ViewportRegion::full(glam::UVec2::new(200, 200))));

        let on_x = camera.world_to_screen_point(Vec3::new(0.5, 0.0, 0.0)).unwrap();
        let mut frame = |mouse: Vec2| tool.process(&mut env, &mut pick, flat, mouse, true).unwrap();
        frame(on_x);
        assert_eq!(tool.active_axis(), Axis::X);
        frame(on_x + Vec2::new(100.0, 0.0));
        let apply = || table.call("GUIWindow.ApplyManipulation", &[]).unwrap();
        assert!(matches!(apply(), Value::Bool(true)));

        // mouse held still: nothing new to apply
        frame(on_x + Vec2::new(100.0, 0.0));
        assert!(matches!(apply(), Value::Bool(false)));
        assert!(matches!(apply(), Value::Bool(false)));

        let scene = engine.scene().read_for(ui::SCENE_WAIT).unwrap();
        let x = scene.state.object(id).unwrap().transform.position[0];
        assert!((x - 1.0).abs() < 1e-4, "x = {x}");
    }

    #[test]
    fn canvas_is_handed_over_once() {
        let (table, _engine) = table();
        let window = table.call("Window.Get", &[]).unwrap();
        let canvas = Value::Canvas(CanvasValue::new(|_: &crate::window::GuiFrame<'_>| {}));
        assert!(matches!(
            table.call("Window.SetCanvas", &[window.clone(), canvas.clone()]).unwrap(),
            Value::Bool(true)
        ));
        assert!(table.call("Window.SetCanvas", &[window, canvas]).is_err());
    }

    #[test]
    fn registering_a_taken_name_keeps_the_first_entry() {
        let mut table = BindingTable::new();
        assert!(table.register("Debug.Answer", 0, |_| Ok(Value::Int(42))));
        assert!(!table.register("Debug.Answer", 0, |_| Ok(Value::Int(0))));
        assert!(matches!(table.call("Debug.Answer", &[]).unwrap(), Value::Int(42)));
        assert_eq!(table.arity("Debug.Answer"), Some(0));
    }
}
