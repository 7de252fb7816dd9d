//! Window, camera and post-processing runtime with a threaded render loop.
//!
//! A [`Window`] owns one render thread that drives a pluggable
//! [`Environment`](environment::Environment) backend: a headless one for
//! tests and servers, and an OpenGL one behind the `opengl` feature.
//! Callers on other threads queue cameras, meshes and requests; the render
//! thread applies them at the next frame boundary.

pub mod api;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod logging;
pub mod render;
pub mod scene;
pub mod timing;
pub mod types;
pub mod ui;
pub mod window;

pub use api::{BindingTable, Value};
pub use config::{WindowConfig, WindowFormat};
pub use engine::Engine;
pub use environment::{EnvironmentHandle, EnvironmentRegistry, HeadlessEnvironment};
pub use error::{GraphicsError, Result};
pub use render::{Camera, ManipulationTool, PostProcessing, Render};
pub use scene::{Scene, SceneState, UsePoints};
pub use types::{Material, Mesh, MeshLibrary, Skybox, Texture};
pub use window::{Canvas, GuiFrame, Window};
