// Scene graph: objects, overlay, lights, camera

pub mod camera;
pub mod game_object;
pub mod model;

pub use camera::Camera;
pub use game_object::{GameObject, ObjectId, OverlayObject, Transform, Transform2d};
pub use model::{Model, OverlayVertex, Vertex, VertexLayout};

use glam::Vec3;

/// Hands out object ids, monotonically increasing per scene.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        id
    }
}

/// A directional light before being packed for the shader.
#[derive(Debug, Clone, Copy)]
pub struct SceneLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// Everything drawn in a frame.
#[derive(Default)]
pub struct Scene {
    ids: IdAllocator,
    pub objects: Vec<GameObject>,
    pub overlay: Vec<OverlayObject>,
    pub lights: Vec<SceneLight>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ObjectId {
        self.ids.allocate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let mut allocator = IdAllocator::default();
        let a = allocator.allocate();
        let b = allocator.allocate();
        let c = allocator.allocate();
        assert!(a < b && b < c);
        assert_eq!(a, ObjectId(0));
        assert_eq!(c, ObjectId(2));
    }

    #[test]
    fn scenes_do_not_share_id_counters() {
        let mut first = Scene::new();
        let mut second = Scene::new();
        assert_eq!(first.next_id(), ObjectId(0));
        assert_eq!(first.next_id(), ObjectId(1));
        assert_eq!(second.next_id(), ObjectId(0));
    }
}
