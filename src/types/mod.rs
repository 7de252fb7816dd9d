//! Drawable resources shared between caller threads and the render thread.

pub mod geometry;
mod material;
mod mesh;
mod skybox;
mod texture;

pub use geometry::MeshGeometry;
pub use material::Material;
pub use mesh::{Mesh, MeshLibrary};
pub use skybox::{Skybox, FACE_NAMES};
pub use texture::{Texture, TextureKind};

#[cfg(test)]
pub(crate) use skybox::solid_skybox;
#[cfg(test)]
pub(crate) use texture::solid_texture;
