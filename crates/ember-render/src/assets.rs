//! Named meshes, materials and textures.

use crate::error::{AssetKind, RenderError, Result};
use crate::mesh::{Mesh, MeshData};
use ember_gpu::{vk, GraphicsDevice, TextureDesc};
use hashbrown::HashMap;
use std::path::Path;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(usize);

        impl $name {
            pub const fn index(self) -> usize {
                self.0
            }
        }
    };
}

handle!(
    /// Handle to a mesh in an [`AssetRegistry`].
    MeshHandle
);
handle!(
    /// Handle to a material (graphics pipeline) in an [`AssetRegistry`].
    MaterialHandle
);
handle!(
    /// Handle to a texture in an [`AssetRegistry`].
    TextureHandle
);

/// One kind of named asset.
struct Store<T> {
    items: Vec<T>,
    names: HashMap<String, usize>,
    kind: AssetKind,
}

impl<T> Store<T> {
    fn new(kind: AssetKind) -> Self {
        Self {
            items: Vec::new(),
            names: HashMap::new(),
            kind,
        }
    }

    /// Insert or replace `name`, returning its index.
    fn insert(&mut self, name: &str, item: T) -> usize {
        if let Some(&index) = self.names.get(name) {
            tracing::debug!("Replacing {} '{name}'", self.kind);
            self.items[index] = item;
            return index;
        }
        let index = self.items.len();
        self.items.push(item);
        self.names.insert(name.to_string(), index);
        index
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::AssetNotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    fn get(&self, index: usize) -> Result<&T> {
        self.items.get(index).ok_or_else(|| RenderError::AssetNotFound {
            kind: self.kind,
            name: format!("#{index}"),
        })
    }
}

/// Registry of GPU assets, filled at startup and read by render systems.
pub struct AssetRegistry<B: GraphicsDevice> {
    meshes: Store<Mesh<B>>,
    materials: Store<B::Pipeline>,
    textures: Store<B::Texture>,
}

impl<B: GraphicsDevice> Default for AssetRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsDevice> AssetRegistry<B> {
    pub fn new() -> Self {
        Self {
            meshes: Store::new(AssetKind::Mesh),
            materials: Store::new(AssetKind::Material),
            textures: Store::new(AssetKind::Texture),
        }
    }

    pub fn add_mesh(&mut self, name: &str, mesh: Mesh<B>) -> MeshHandle {
        MeshHandle(self.meshes.insert(name, mesh))
    }

    /// Upload `data` and register it as `name`.
    pub fn upload_mesh(&mut self, device: &B, name: &str, data: &MeshData) -> Result<MeshHandle> {
        let mesh = Mesh::upload(device, data, name)?;
        Ok(self.add_mesh(name, mesh))
    }

    pub fn add_material(&mut self, name: &str, pipeline: B::Pipeline) -> MaterialHandle {
        MaterialHandle(self.materials.insert(name, pipeline))
    }

    pub fn add_texture(&mut self, name: &str, texture: B::Texture) -> TextureHandle {
        TextureHandle(self.textures.insert(name, texture))
    }

    /// Create a texture from tightly packed RGBA8 pixels.
    pub fn create_texture(
        &mut self,
        device: &B,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureHandle> {
        let texture = device.create_texture(&TextureDesc {
            width,
            height,
            pixels,
            filter: vk::Filter::LINEAR,
            name,
        })?;
        Ok(self.add_texture(name, texture))
    }

    /// Decode an image file and upload it as an RGBA texture.
    pub fn load_texture(
        &mut self,
        device: &B,
        name: &str,
        path: impl AsRef<Path>,
    ) -> Result<TextureHandle> {
        let path = path.as_ref();
        let image = image::open(path)?.to_rgba8();
        tracing::info!(
            "Loaded texture '{name}' from {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        self.create_texture(device, name, image.width(), image.height(), image.as_raw())
    }

    pub fn mesh_handle(&self, name: &str) -> Result<MeshHandle> {
        self.meshes.index_of(name).map(MeshHandle)
    }

    pub fn material_handle(&self, name: &str) -> Result<MaterialHandle> {
        self.materials.index_of(name).map(MaterialHandle)
    }

    pub fn texture_handle(&self, name: &str) -> Result<TextureHandle> {
        self.textures.index_of(name).map(TextureHandle)
    }

    pub fn mesh(&self, handle: MeshHandle) -> Result<&Mesh<B>> {
        self.meshes.get(handle.0)
    }

    pub fn material(&self, handle: MaterialHandle) -> Result<&B::Pipeline> {
        self.materials.get(handle.0)
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&B::Texture> {
        self.textures.get(handle.0)
    }
}

/// Procedural checkerboard, used when no texture file is given.
pub fn checker_image(size: u32, cells: u32, dark: [u8; 4], light: [u8; 4]) -> image::RgbaImage {
    let cell = (size / cells.max(1)).max(1);
    image::RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            image::Rgba(light)
        } else {
            image::Rgba(dark)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshBuilder;
    use ember_gpu::mock::MockDevice;
    use glam::Vec3;

    #[test]
    fn lookup_by_name_and_handle() {
        let device = MockDevice::new();
        let mut assets = AssetRegistry::<MockDevice>::new();
        let cube = assets
            .upload_mesh(&device, "cube", &MeshBuilder::cube(Vec3::ONE))
            .unwrap();
        let quad = assets
            .upload_mesh(&device, "quad", &MeshBuilder::quad(1.0, 1.0, Vec3::ONE))
            .unwrap();

        assert_ne!(cube, quad);
        assert_eq!(assets.mesh_handle("quad").unwrap(), quad);
        assert_eq!(assets.mesh(cube).unwrap().index_count(), 36);
    }

    #[test]
    fn missing_asset_is_reported_by_kind_and_name() {
        let assets = AssetRegistry::<MockDevice>::new();
        match assets.texture_handle("floor") {
            Err(RenderError::AssetNotFound { kind, name }) => {
                assert_eq!(kind, AssetKind::Texture);
                assert_eq!(name, "floor");
            }
            other => panic!("unexpected result: {:?}", other.map(|h| h.index())),
        }
        assert!(assets.material(MaterialHandle(3)).is_err());
    }

    #[test]
    fn reinserting_a_name_keeps_its_handle() {
        let device = MockDevice::new();
        let mut assets = AssetRegistry::<MockDevice>::new();
        let pixels = checker_image(4, 2, [0, 0, 0, 255], [255; 4]);
        let first = assets
            .create_texture(&device, "checker", 4, 4, pixels.as_raw())
            .unwrap();
        let second = assets
            .create_texture(&device, "checker", 4, 4, pixels.as_raw())
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn checker_alternates_cells() {
        let image = checker_image(4, 2, [0, 0, 0, 255], [255; 4]);
        assert_eq!(image.get_pixel(0, 0).0, [255; 4]);
        assert_eq!(image.get_pixel(2, 0).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(2, 2).0, [255; 4]);
    }
}
