//! Boundary to the external renderer

use std::collections::HashMap;

use glam::Vec3;

use crate::mesh::FLOATS_PER_TRIANGLE;

/// Opaque handle of a mesh added to the scene
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Receives chunk geometry from the streaming controller
///
/// Materials are the renderer's business and shared across all chunks.
pub trait SceneSink {
    fn add_mesh(&mut self, world_position: Vec3, triangles: &[f32]) -> MeshHandle;
    fn remove_mesh(&mut self, handle: MeshHandle);
}

#[derive(Clone, Debug)]
pub struct LiveMesh {
    pub world_position: Vec3,
    pub triangle_count: usize,
}

/// Headless scene that only tracks which meshes are alive
///
/// Used by the demo binary and tests; also counts removals of handles that
/// were not alive, which always indicates a bookkeeping bug upstream.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    next_handle: u64,
    live: HashMap<MeshHandle, LiveMesh>,
    removed: u64,
    invalid_removals: u64,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&LiveMesh> {
        self.live.get(&handle)
    }

    pub fn removed_count(&self) -> u64 {
        self.removed
    }

    pub fn invalid_removals(&self) -> u64 {
        self.invalid_removals
    }

    pub fn total_triangles(&self) -> usize {
        self.live.values().map(|m| m.triangle_count).sum()
    }
}

impl SceneSink for MeshRegistry {
    fn add_mesh(&mut self, world_position: Vec3, triangles: &[f32]) -> MeshHandle {
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(
            handle,
            LiveMesh {
                world_position,
                triangle_count: triangles.len() / FLOATS_PER_TRIANGLE,
            },
        );
        handle
    }

    fn remove_mesh(&mut self, handle: MeshHandle) {
        if self.live.remove(&handle).is_some() {
            self.removed += 1;
        } else {
            log::warn!("Removing mesh {:?} that is not in the scene", handle);
            self.invalid_removals += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let mut scene = MeshRegistry::new();
        let a = scene.add_mesh(Vec3::ZERO, &[0.0; 18]);
        let b = scene.add_mesh(Vec3::new(32.0, 0.0, 0.0), &[0.0; 9]);
        assert_ne!(a, b);
        assert_eq!(scene.live_count(), 2);
        assert_eq!(scene.total_triangles(), 3);

        scene.remove_mesh(a);
        assert!(!scene.contains(a));
        assert!(scene.contains(b));
        assert_eq!(scene.removed_count(), 1);
    }

    #[test]
    fn test_double_remove_counted() {
        let mut scene = MeshRegistry::new();
        let a = scene.add_mesh(Vec3::ZERO, &[0.0; 9]);
        scene.remove_mesh(a);
        scene.remove_mesh(a);
        assert_eq!(scene.removed_count(), 1);
        assert_eq!(scene.invalid_removals(), 1);
    }
}
