//! Scene objects and their optional components.

use crate::assets::{MaterialHandle, MeshHandle, TextureHandle};
use bitflags::bitflags;
use ember_core::Transform;
use glam::Vec3;
use hashbrown::HashMap;

/// Unique object identifier. Never reused within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Which optional components an object carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Components: u8 {
        const MODEL = 1;
        const POINT_LIGHT = 1 << 1;
        const TEXTURE = 1 << 2;
    }
}

/// Mesh plus the material (pipeline) that draws it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub intensity: f32,
}

/// An object in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    id: ObjectId,
    pub transform: Transform,
    pub color: Vec3,
    pub model: Option<Model>,
    pub point_light: Option<PointLight>,
    pub texture: Option<TextureHandle>,
}

impl SceneObject {
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    pub fn components(&self) -> Components {
        let mut components = Components::empty();
        components.set(Components::MODEL, self.model.is_some());
        components.set(Components::POINT_LIGHT, self.point_light.is_some());
        components.set(Components::TEXTURE, self.texture.is_some());
        components
    }
}

/// Collection of scene objects keyed by id.
#[derive(Debug, Default)]
pub struct Scene {
    objects: HashMap<ObjectId, SceneObject>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty object and return it for configuration.
    pub fn spawn(&mut self) -> &mut SceneObject {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.entry(id).or_insert(SceneObject {
            id,
            transform: Transform::default(),
            color: Vec3::ZERO,
            model: None,
            point_light: None,
            texture: None,
        })
    }

    /// Add a point light. `radius` is stored as the transform's x scale.
    pub fn spawn_point_light(&mut self, intensity: f32, radius: f32, color: Vec3) -> ObjectId {
        let object = self.spawn();
        object.color = color;
        object.transform.scale.x = radius;
        object.point_light = Some(PointLight { intensity });
        object.id
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        self.objects.remove(&id)
    }

    /// Objects in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values()
    }

    /// Ids of objects carrying all of `components`, in ascending order.
    pub fn ids_with(&self, components: Components) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self
            .objects
            .values()
            .filter(|o| o.components().contains(components))
            .map(SceneObject::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut scene = Scene::new();
        let ids: Vec<_> = (0..5).map(|_| scene.spawn().id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(scene.len(), 5);
    }

    #[test]
    fn removal_keeps_other_objects_and_ids() {
        let mut scene = Scene::new();
        let a = scene.spawn().id();
        let b = scene.spawn().id();
        scene.get_mut(b).unwrap().color = Vec3::X;

        assert!(scene.remove(a).is_some());
        assert!(scene.remove(a).is_none());
        assert_eq!(scene.get(b).unwrap().color, Vec3::X);

        let c = scene.spawn().id();
        assert!(c > b);
        assert!(scene.get(a).is_none());
    }

    #[test]
    fn components_reflect_optional_fields() {
        let mut scene = Scene::new();
        let light = scene.spawn_point_light(0.2, 0.1, Vec3::ONE);
        let object = scene.get(light).unwrap();
        assert_eq!(object.components(), Components::POINT_LIGHT);
        assert_eq!(object.transform.scale.x, 0.1);

        let plain = scene.spawn().id();
        assert_eq!(scene.ids_with(Components::POINT_LIGHT), vec![light]);
        assert_eq!(scene.ids_with(Components::empty()), vec![light, plain]);
    }
}
