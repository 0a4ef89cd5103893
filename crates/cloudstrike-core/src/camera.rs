use glam::{Mat4, Quat, Vec2, Vec3};

/// First-person viewpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// A ray in world space with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl CameraState {
    /// View direction through the center of the viewport.
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    /// Forward and right flattened onto the horizontal plane and renormalized,
    /// so walking ignores look pitch.
    pub fn horizontal_basis(&self) -> (Vec3, Vec3) {
        let flatten = |v: Vec3| Vec3::new(v.x, 0.0, v.z).normalize_or_zero();
        (flatten(self.forward()), flatten(self.right()))
    }

    /// Apply one incremental look step.
    ///
    /// Yaw turns about world up and is pre-multiplied; pitch turns about the
    /// camera's local right axis and is post-multiplied. Swapping the order
    /// introduces roll.
    pub fn apply_look(&mut self, yaw: f32, pitch: f32) {
        self.apply_yaw(yaw);
        self.apply_pitch(pitch);
    }

    pub fn apply_yaw(&mut self, yaw: f32) {
        self.orientation = (Quat::from_rotation_y(yaw) * self.orientation).normalize();
    }

    pub fn apply_pitch(&mut self, pitch: f32) {
        self.orientation = (self.orientation * Quat::from_rotation_x(pitch)).normalize();
    }

    /// Move along the horizontal plane. `axis.y` is forward/back, `axis.x`
    /// is strafe right/left.
    ///
    /// The move is committed only if the result stays strictly inside
    /// `max_distance` of the origin; otherwise it is dropped for this frame.
    /// Returns whether the camera moved.
    pub fn navigate(&mut self, axis: Vec2, speed: f32, max_distance: f32) -> bool {
        let (forward, right) = self.horizontal_basis();
        let direction = (forward * axis.y + right * axis.x).normalize_or_zero();
        if direction == Vec3::ZERO {
            return false;
        }
        let candidate = self.position + direction * speed;
        if candidate.length() < max_distance {
            self.position = candidate;
            true
        } else {
            false
        }
    }

    /// Ray from the camera through the exact viewport center.
    pub fn center_ray(&self) -> Ray {
        Ray {
            origin: self.position,
            direction: self.forward().normalize(),
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }
}
