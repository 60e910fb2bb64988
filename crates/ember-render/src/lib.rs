//! Frame orchestration and rendering for the Ember renderer.
//!
//! This crate provides:
//! - [`Renderer`]: swapchain ownership and the begin/end frame bracket
//! - [`FrameResources`]: per-slot uniform buffers and descriptor sets
//! - Scene objects, camera and the global uniform block
//! - Render systems for lit meshes, textured meshes and point lights
//! - A string-keyed registry for meshes, materials and textures

pub mod assets;
pub mod camera;
pub mod error;
pub mod frame;
pub mod frame_resources;
pub mod mesh;
pub mod renderer;
pub mod scene;
pub mod systems;
pub mod ubo;

pub use assets::{checker_image, AssetRegistry, MaterialHandle, MeshHandle, TextureHandle};
pub use camera::{Camera, WORLD_UP};
pub use error::{AssetKind, RenderError, Result};
pub use frame::FrameContext;
pub use frame_resources::{DescriptorSetId, FrameResources};
pub use mesh::{Mesh, MeshBuilder, MeshData, Vertex};
pub use renderer::{Renderer, RendererConfig};
pub use scene::{Components, Model, ObjectId, PointLight, Scene, SceneObject};
pub use systems::{
    PointLightPush, PointLightSystem, SimplePush, SimpleRenderSystem, TexturedRenderSystem,
};
pub use ubo::{GlobalUbo, PointLightUbo};
