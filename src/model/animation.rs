use crate::{
    scene_import::{SceneClip, SceneTrack},
    trs::Trs,
    types::DEFAULT_TICKS_PER_SECOND,
};
use ahash::{HashMap, HashMapExt};
use nalgebra_glm as glm;

#[derive(Clone, Copy, Debug)]
pub struct VectorKey {
    pub time: f32,
    pub value: glm::Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct QuatKey {
    pub time: f32,
    pub value: glm::Quat,
}

#[derive(Clone, Copy, Debug)]
pub struct MeshKey {
    pub time: f32,
    pub value: u32,
}

/// Keyframe samples for one node. The three lists are independent, may
/// have different lengths, and are never empty once the clip has been
/// registered with a model.
#[derive(Clone, Debug, Default)]
pub struct NodeTrack {
    pub node_name: String,
    pub scale_keys: Vec<VectorKey>,
    pub rotation_keys: Vec<QuatKey>,
    pub translation_keys: Vec<VectorKey>,
}

impl NodeTrack {
    /// Builds a track from the interchange shape, filling any empty list
    /// with a single key from the node's bind pose so that evaluation
    /// always has data.
    #[must_use]
    pub fn from_scene(track: &SceneTrack, bind: &Trs) -> Self {
        let mut scale_keys: Vec<VectorKey> = track
            .scale_keys
            .iter()
            .map(|(time, v)| VectorKey {
                time: *time,
                value: (*v).into(),
            })
            .collect();
        let mut rotation_keys: Vec<QuatKey> = track
            .rotation_keys
            .iter()
            .map(|(time, q)| QuatKey {
                time: *time,
                value: glm::quat(q[0], q[1], q[2], q[3]),
            })
            .collect();
        let mut translation_keys: Vec<VectorKey> = track
            .translation_keys
            .iter()
            .map(|(time, v)| VectorKey {
                time: *time,
                value: (*v).into(),
            })
            .collect();
        if scale_keys.is_empty() {
            scale_keys.push(VectorKey {
                time: 0.0f32,
                value: bind.scale,
            });
        }
        if rotation_keys.is_empty() {
            rotation_keys.push(QuatKey {
                time: 0.0f32,
                value: bind.rotation,
            });
        }
        if translation_keys.is_empty() {
            translation_keys.push(VectorKey {
                time: 0.0f32,
                value: bind.translation,
            });
        }
        Self {
            node_name: track.node_name.clone(),
            scale_keys,
            rotation_keys,
            translation_keys,
        }
    }

    /// Interpolated pose at `ticks`. The caller must keep `ticks` inside
    /// the track's key range; there is no clamping or extrapolation and
    /// out of range input is a caller error.
    #[must_use]
    pub fn sample(&self, ticks: f32) -> Trs {
        Trs {
            translation: interpolate_vector(&self.translation_keys, ticks),
            rotation: interpolate_rotation(&self.rotation_keys, ticks),
            scale: interpolate_vector(&self.scale_keys, ticks),
        }
    }

    /// Pose of the first keyframe of each list, the target side of a
    /// crossfade
    #[must_use]
    pub fn first_pose(&self) -> Trs {
        Trs {
            translation: self.translation_keys[0].value,
            rotation: self.rotation_keys[0].value,
            scale: self.scale_keys[0].value,
        }
    }

    /// Earliest key time across the three lists
    #[must_use]
    pub fn start_ticks(&self) -> f32 {
        let mut start = f32::MAX;
        if let Some(k) = self.scale_keys.first() {
            start = start.min(k.time);
        }
        if let Some(k) = self.rotation_keys.first() {
            start = start.min(k.time);
        }
        if let Some(k) = self.translation_keys.first() {
            start = start.min(k.time);
        }
        if start < f32::MAX {
            start
        } else {
            0.0f32
        }
    }
}

/// A named animation clip holding one keyframe track per animated node
#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    /// Length in clip native ticks
    pub duration: f32,
    /// 0.0 means unspecified, see `effective_ticks_per_second`
    pub ticks_per_second: f32,
    pub tracks: Vec<NodeTrack>,
    track_lookup: HashMap<String, usize>,
    /// Mesh level key lists keyed by mesh name. Stored for the renderer
    /// side, not evaluated here.
    pub mesh_tracks: HashMap<String, Vec<MeshKey>>,
}

impl AnimationClip {
    /// Builds a clip from the interchange shape. `bind` supplies the bind
    /// pose for nodes whose track is missing a channel.
    pub fn from_scene<F>(clip: &SceneClip, bind: F) -> Self
    where
        F: Fn(&str) -> Trs,
    {
        let tracks: Vec<NodeTrack> = clip
            .tracks
            .iter()
            .map(|t| NodeTrack::from_scene(t, &bind(&t.node_name)))
            .collect();
        let mut track_lookup = HashMap::with_capacity(tracks.len());
        for (i, t) in tracks.iter().enumerate() {
            track_lookup.insert(t.node_name.clone(), i);
        }
        let mut mesh_tracks = HashMap::new();
        for mt in &clip.mesh_tracks {
            let keys = mt
                .keys
                .iter()
                .map(|(time, value)| MeshKey {
                    time: *time,
                    value: *value,
                })
                .collect();
            mesh_tracks.insert(mt.mesh_name.clone(), keys);
        }
        Self {
            name: clip.name.clone(),
            duration: clip.duration,
            ticks_per_second: clip.ticks_per_second,
            tracks,
            track_lookup,
            mesh_tracks,
        }
    }

    /// Track index for a node, resolved once at animation bind time and
    /// reused every frame
    #[must_use]
    pub fn track_for(&self, node_name: &str) -> Option<usize> {
        self.track_lookup.get(node_name).copied()
    }

    #[must_use]
    pub fn track(&self, index: usize) -> &NodeTrack {
        &self.tracks[index]
    }

    /// The clip's tick rate, or the default when the format left it
    /// unspecified
    #[must_use]
    pub fn effective_ticks_per_second(&self) -> f32 {
        if self.ticks_per_second > 0.0f32 {
            self.ticks_per_second
        } else {
            DEFAULT_TICKS_PER_SECOND
        }
    }

    /// Earliest key time of any track, where playback resumes after a
    /// crossfade completes
    #[must_use]
    pub fn start_ticks(&self) -> f32 {
        let start = self
            .tracks
            .iter()
            .map(NodeTrack::start_ticks)
            .fold(f32::MAX, f32::min);
        if start < f32::MAX {
            start
        } else {
            0.0f32
        }
    }
}

/// Wraps a tick time into `[0, duration)`, folding negative values forward
#[must_use]
pub fn wrap_ticks(ticks: f32, duration: f32) -> f32 {
    if duration <= 0.0f32 {
        return 0.0f32;
    }
    let m = ticks % duration;
    if m < 0.0f32 {
        m + duration
    } else {
        m
    }
}

fn interpolation_factor(start: f32, end: f32, current: f32) -> f32 {
    let factor = (current - start) / (end - start);
    debug_assert!(
        (0.0f32..=1.0f32).contains(&factor),
        "keyframe factor {factor} out of range"
    );
    factor
}

/// Componentwise linear interpolation of a vector key list. A single key
/// is returned unconditionally regardless of time.
fn interpolate_vector(keys: &[VectorKey], ticks: f32) -> glm::Vec3 {
    if keys.len() == 1 {
        return keys[0].value;
    }
    for w in keys.windows(2) {
        if ticks < w[1].time {
            let factor = interpolation_factor(w[0].time, w[1].time, ticks);
            return glm::lerp(&w[0].value, &w[1].value, factor);
        }
    }
    // Exactly at or past the last key
    keys[keys.len() - 1].value
}

/// Normalized spherical interpolation of a rotation key list. A single
/// key is returned unconditionally regardless of time.
fn interpolate_rotation(keys: &[QuatKey], ticks: f32) -> glm::Quat {
    if keys.len() == 1 {
        return keys[0].value;
    }
    for w in keys.windows(2) {
        if ticks < w[1].time {
            let factor = interpolation_factor(w[0].time, w[1].time, ticks);
            return glm::quat_normalize(&glm::quat_slerp(
                &w[0].value,
                &w[1].value,
                factor,
            ));
        }
    }
    keys[keys.len() - 1].value
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0005;

    fn vkey(time: f32, x: f32, y: f32, z: f32) -> VectorKey {
        VectorKey {
            time,
            value: glm::vec3(x, y, z),
        }
    }

    #[test]
    fn single_key_any_time() {
        let keys = [vkey(3.0, 1.0, 2.0, 3.0)];
        for t in [-100.0f32, 0.0, 3.0, 99.0] {
            let v = interpolate_vector(&keys, t);
            assert!(glm::distance(&v, &glm::vec3(1.0, 2.0, 3.0)) < EPSILON);
        }
    }

    #[test]
    fn two_key_endpoints_and_midpoint() {
        let keys = [vkey(0.0, 0.0, 0.0, 0.0), vkey(10.0, 10.0, 0.0, 0.0)];
        let v = interpolate_vector(&keys, 0.0);
        assert!(glm::distance(&v, &glm::vec3(0.0, 0.0, 0.0)) < EPSILON);
        let v = interpolate_vector(&keys, 10.0);
        assert!(glm::distance(&v, &glm::vec3(10.0, 0.0, 0.0)) < EPSILON);
        // Scenario from the original data set: halfway along a straight
        // 10 unit move is 5 units
        let v = interpolate_vector(&keys, 5.0);
        assert!(glm::distance(&v, &glm::vec3(5.0, 0.0, 0.0)) < EPSILON);
    }

    #[test]
    fn rotation_halfway() {
        let half = std::f32::consts::FRAC_PI_2;
        let keys = [
            QuatKey {
                time: 0.0,
                value: glm::Quat::identity(),
            },
            QuatKey {
                time: 10.0,
                value: glm::quat_angle_axis(
                    std::f32::consts::PI,
                    &glm::vec3(0.0, 1.0, 0.0),
                ),
            },
        ];
        let q = interpolate_rotation(&keys, 5.0);
        let expect = glm::quat_angle_axis(half, &glm::vec3(0.0, 1.0, 0.0));
        let c = glm::quat_equal_eps(&q, &expect, EPSILON);
        assert!(c.x && c.y && c.z && c.w);
    }

    #[test]
    fn wrap_folds_negative_forward() {
        assert!((wrap_ticks(5.0, 10.0) - 5.0).abs() < EPSILON);
        assert!((wrap_ticks(15.0, 10.0) - 5.0).abs() < EPSILON);
        assert!((wrap_ticks(-3.0, 10.0) - 7.0).abs() < EPSILON);
        assert!(wrap_ticks(42.0, 0.0).abs() < EPSILON);
    }

    #[test]
    fn mesh_tracks_carry_through() {
        use crate::scene_import::{SceneClip, SceneMeshTrack};

        let clip = AnimationClip::from_scene(
            &SceneClip {
                name: "flip".to_owned(),
                duration: 4.0,
                ticks_per_second: 30.0,
                tracks: Vec::new(),
                mesh_tracks: vec![SceneMeshTrack {
                    mesh_name: "page".to_owned(),
                    keys: vec![(0.0, 0), (2.0, 1)],
                }],
            },
            |_| Trs::default(),
        );
        assert!((clip.effective_ticks_per_second() - 30.0).abs() < EPSILON);
        let keys = &clip.mesh_tracks["page"];
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].value, 1);
    }

    #[test]
    fn missing_channel_filled_from_bind() {
        let scene = SceneTrack {
            node_name: "joint".to_owned(),
            translation_keys: vec![(0.0, [1.0, 0.0, 0.0])],
            ..SceneTrack::default()
        };
        let bind = Trs {
            scale: glm::vec3(2.0, 2.0, 2.0),
            ..Trs::default()
        };
        let track = NodeTrack::from_scene(&scene, &bind);
        assert_eq!(track.scale_keys.len(), 1);
        let pose = track.sample(0.0);
        assert!(glm::distance(&pose.scale, &bind.scale) < EPSILON);
        assert!(
            glm::distance(&pose.translation, &glm::vec3(1.0, 0.0, 0.0))
                < EPSILON
        );
    }
}
