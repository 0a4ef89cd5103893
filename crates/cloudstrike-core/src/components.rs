use glam::{Mat4, Quat, Vec3};

/// Transform component. Present on every scene entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Local -Z expressed in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// Newtype handle into the GPU point-cloud cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointCloudHandle(pub usize);

/// Role of a renderable in the scene.
///
/// Every renderable is tagged at creation time. World clearing and hit-testing
/// select entities by this tag only, never by the presence of other components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    WorldGeometry { generation: u64 },
    Enemy,
}

impl RenderKind {
    pub fn is_enemy(&self) -> bool {
        matches!(self, RenderKind::Enemy)
    }

    pub fn is_world_geometry(&self) -> bool {
        matches!(self, RenderKind::WorldGeometry { .. })
    }
}

/// A decimated point cloud attached to the scene.
#[derive(Debug, Clone)]
pub struct PointCloud {
    pub handle: PointCloudHandle,
    pub point_count: usize,
    pub point_size: f32,
    pub source: String,
}

/// A transient hostile target.
#[derive(Debug, Clone)]
pub struct Enemy {
    pub spawned_at_ms: f64,
    /// Accumulated roll around the enemy's own forward axis.
    pub spin: f32,
}
