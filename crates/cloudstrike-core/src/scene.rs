//! Scene graph: the ECS world holding world geometry and enemies.
//!
//! Both kinds are renderables of the same shape, so every entity carries a
//! [`RenderKind`] tag assigned at spawn. World reloads clear by tag and never
//! touch enemies.

use hecs::World;

use crate::components::{Enemy, PointCloud, PointCloudHandle, RenderKind, Transform};
use crate::pointcloud::PointCloudAsset;

/// GPU-side owner of point-cloud buffers.
///
/// The scene decides *when* buffers are created and released; the backend
/// decides *how*. `release` must free everything `upload` allocated.
pub trait RenderResources {
    fn upload(&mut self, asset: &PointCloudAsset) -> PointCloudHandle;
    fn release(&mut self, handle: PointCloudHandle);
}

/// Central scene state: the ECS world plus the current world-geometry generation.
pub struct SceneWorld {
    pub world: World,
    generation: u64,
}

impl Default for SceneWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneWorld {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            generation: 0,
        }
    }

    /// Generation of the attached world geometry (0 before the first load).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Detach every world-geometry entity and release its GPU buffers.
    /// Returns the number of entities removed.
    pub fn clear_world_geometry(&mut self, resources: &mut dyn RenderResources) -> usize {
        let doomed: Vec<(hecs::Entity, Option<PointCloudHandle>)> = self
            .world
            .query::<(&RenderKind, Option<&PointCloud>)>()
            .iter()
            .filter(|(_, (kind, _))| kind.is_world_geometry())
            .map(|(entity, (_, cloud))| (entity, cloud.map(|c| c.handle)))
            .collect();

        for (entity, handle) in &doomed {
            let _ = self.world.despawn(*entity);
            if let Some(handle) = handle {
                resources.release(*handle);
            }
        }
        doomed.len()
    }

    /// Dispose the current world geometry, then attach `assets` as the next
    /// generation. Both steps complete before this returns, so two
    /// generations never coexist. Returns the new generation.
    pub fn replace_world_geometry(
        &mut self,
        assets: Vec<PointCloudAsset>,
        resources: &mut dyn RenderResources,
    ) -> u64 {
        let removed = self.clear_world_geometry(resources);
        self.generation += 1;
        let generation = self.generation;

        for asset in &assets {
            let handle = resources.upload(asset);
            let transform = Transform {
                rotation: asset.rotation,
                ..Default::default()
            };
            let cloud = PointCloud {
                handle,
                point_count: asset.point_count(),
                point_size: asset.point_size,
                source: asset.source.clone(),
            };
            self.world
                .spawn((transform, cloud, RenderKind::WorldGeometry { generation }));
        }

        tracing::info!(
            "World geometry generation {} attached: {} clouds ({} previous removed)",
            generation,
            assets.len(),
            removed
        );
        generation
    }

    pub fn spawn_enemy(&mut self, transform: Transform, enemy: Enemy) -> hecs::Entity {
        self.world.spawn((transform, enemy, RenderKind::Enemy))
    }

    /// Despawn `entity` only if it is tagged as an enemy.
    pub fn despawn_enemy(&mut self, entity: hecs::Entity) -> bool {
        let is_enemy = self
            .world
            .get::<&RenderKind>(entity)
            .map(|kind| kind.is_enemy())
            .unwrap_or(false);
        is_enemy && self.world.despawn(entity).is_ok()
    }

    /// Remove every enemy (used on teardown).
    pub fn clear_enemies(&mut self) -> usize {
        let enemies: Vec<hecs::Entity> = self.enemy_transforms().into_iter().map(|(e, _)| e).collect();
        for entity in &enemies {
            let _ = self.world.despawn(*entity);
        }
        enemies.len()
    }

    /// Snapshot of live enemies and their transforms.
    pub fn enemy_transforms(&self) -> Vec<(hecs::Entity, Transform)> {
        self.world
            .query::<(&RenderKind, &Transform)>()
            .iter()
            .filter(|(_, (kind, _))| kind.is_enemy())
            .map(|(entity, (_, transform))| (entity, *transform))
            .collect()
    }

    /// Snapshot of attached point clouds and their transforms.
    pub fn point_clouds(&self) -> Vec<(PointCloud, Transform)> {
        self.world
            .query::<(&RenderKind, &PointCloud, &Transform)>()
            .iter()
            .filter(|(_, (kind, _, _))| kind.is_world_geometry())
            .map(|(_, (_, cloud, transform))| (cloud.clone(), *transform))
            .collect()
    }

    pub fn enemy_count(&self) -> usize {
        self.world
            .query::<&RenderKind>()
            .iter()
            .filter(|(_, kind)| kind.is_enemy())
            .count()
    }

    pub fn world_geometry_count(&self) -> usize {
        self.world
            .query::<&RenderKind>()
            .iter()
            .filter(|(_, kind)| kind.is_world_geometry())
            .count()
    }
}
