//! Root transform repair for import formats that lack a usable root
//! transform for skinning. This is a format gated post processing pass,
//! not a general code path: it runs once, after the first animation
//! evaluation, and only when the scene format asks for it.

use super::data::ModelData;
use crate::trs;
use ahash::{HashMap, HashMapExt};
use log::debug;
use nalgebra_glm as glm;

/// Quantization applied before bucketing, so that rotations equal up to
/// float noise land in the same bucket
const BUCKET_SCALE: f32 = 1000.0;

/// Samples the rotation component of every weighted vertex's blended skin
/// transform, buckets identical rotations, and returns the inverse of the
/// most frequent one as the correction to apply to every subsequently
/// computed skin matrix. Never fails; with nothing weighted the
/// correction is the identity.
#[must_use]
pub fn root_correction(data: &ModelData) -> glm::Mat4 {
    let mut buckets = HashMap::<[i32; 4], (u32, glm::Quat)>::new();

    for attr in &data.buffers.attributes {
        let sum: f32 = attr.bone_weights.iter().sum();
        if sum <= 0.0f32 {
            continue;
        }
        let mut blended = glm::Mat4::zeros();
        for k in 0..attr.bone_weights.len() {
            let weight = attr.bone_weights[k];
            if weight > 0.0f32 {
                blended +=
                    data.skin_matrices[attr.bone_ids[k] as usize] * weight;
            }
        }
        let rotation =
            glm::quat_normalize(&trs::decompose(&blended).rotation);
        let entry = buckets
            .entry(quantize(&rotation))
            .or_insert((0, rotation));
        entry.0 += 1;
    }

    let Some((count, rotation)) = buckets.values().max_by_key(|(c, _)| *c)
    else {
        return glm::Mat4::identity();
    };
    debug!(
        "root repair: {} buckets, majority count={}",
        buckets.len(),
        count
    );
    glm::quat_to_mat4(&rotation.conjugate())
}

/// A quaternion and its negation are the same rotation, so the sign is
/// canonicalized before quantizing
#[allow(clippy::cast_possible_truncation)]
fn quantize(q: &glm::Quat) -> [i32; 4] {
    let q = if q.w < 0.0f32 { -*q } else { *q };
    [
        (q.i * BUCKET_SCALE).round() as i32,
        (q.j * BUCKET_SCALE).round() as i32,
        (q.k * BUCKET_SCALE).round() as i32,
        (q.w * BUCKET_SCALE).round() as i32,
    ]
}
