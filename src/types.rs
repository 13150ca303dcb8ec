use nalgebra_glm as glm;

/// Maximum bone influences for a skinned vertex. You can't actually change
/// this constant without also changing the vertex attribute layout that the
/// renderer consumes.
pub const MAX_WEIGHTS: usize = 4;

/// Tick rate used when a clip does not declare one, and for expressing
/// crossfade durations in ticks.
pub const DEFAULT_TICKS_PER_SECOND: f32 = 25.0;

/// Tolerance for the per vertex weight sum invariant. A weighted vertex
/// must sum to ~1.0 and a static vertex to ~0.0 within this value.
pub const WEIGHT_SUM_EPSILON: f32 = 1e-3;

/// Axis aligned bounding box in model space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: glm::Vec3,
    pub max: glm::Vec3,
}

impl BoundingBox {
    /// An inverted box that any point will expand
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: glm::vec3(f32::MAX, f32::MAX, f32::MAX),
            max: glm::vec3(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    pub fn include(&mut self, p: &glm::Vec3) {
        self.min = glm::min2(&self.min, p);
        self.max = glm::max2(&self.max, p);
    }

    #[must_use]
    pub fn centre(&self) -> glm::Vec3 {
        (self.min + self.max) * 0.5f32
    }

    #[must_use]
    pub fn size(&self) -> glm::Vec3 {
        self.max - self.min
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}
