use super::{data::ModelData, node::NodeTree};
use crate::{
    model::animation::wrap_ticks,
    trs::{self, Trs},
    types::DEFAULT_TICKS_PER_SECOND,
};
use ahash::{HashMap, HashMapExt};
use log::{debug, warn};

/// Playback state. A transition holds a frozen snapshot of the outgoing
/// pose, keyed by node index, and counts update calls in ticks.
#[derive(Clone, Debug)]
pub enum Playback {
    Playing {
        clip: usize,
        tick_offset: f32,
    },
    Transitioning {
        target: usize,
        snapshot: HashMap<usize, Trs>,
        elapsed_ticks: f32,
        duration_ticks: f32,
    },
}

impl Default for Playback {
    fn default() -> Self {
        Self::Playing {
            clip: 0,
            tick_offset: 0.0f32,
        }
    }
}

/// Evaluates either straight single clip playback or a timed crossfade
/// from a frozen pose snapshot toward a new clip. Writes the per node
/// local transforms; the tree walk that composes them into world space
/// runs afterwards.
#[derive(Default)]
pub struct Controller {
    pub state: Playback,
    /// Track index per node for the clip being played or faded toward,
    /// resolved once per clip change instead of per frame
    bound_tracks: Vec<Option<usize>>,
}

impl Controller {
    #[must_use]
    pub fn new(tree: &NodeTree, data: &ModelData) -> Self {
        let mut controller = Self {
            state: Playback::default(),
            bound_tracks: vec![None; tree.len()],
        };
        if !data.clips.is_empty() {
            controller.bind(tree, data, 0);
        }
        controller
    }

    /// The clip being played, or faded toward
    #[must_use]
    pub const fn current_clip(&self) -> usize {
        match self.state {
            Playback::Playing { clip, .. } => clip,
            Playback::Transitioning { target, .. } => target,
        }
    }

    #[must_use]
    pub const fn is_transitioning(&self) -> bool {
        matches!(self.state, Playback::Transitioning { .. })
    }

    /// Resolves the per node track references for a clip
    fn bind(&mut self, tree: &NodeTree, data: &ModelData, clip: usize) {
        let clip = &data.clips[clip];
        for i in 0..tree.len() {
            self.bound_tracks[i] = clip.track_for(&tree.node(i).name);
        }
    }

    /// Starts a timed crossfade toward `target`. The current pose is
    /// frozen into a one key per node snapshot, evaluated at the playback
    /// time reached by the most recent update (`seconds`).
    pub fn set_animation(
        &mut self,
        data: &ModelData,
        tree: &NodeTree,
        target: usize,
        transition_seconds: f32,
        seconds: f32,
    ) {
        if target >= data.clips.len() {
            warn!("unknown clip id {target}");
            return;
        }
        let snapshot = self.snapshot_pose(data, tree, seconds);
        self.bind(tree, data, target);
        self.state = Playback::Transitioning {
            target,
            snapshot,
            elapsed_ticks: 0.0f32,
            duration_ticks: transition_seconds * DEFAULT_TICKS_PER_SECOND,
        };
    }

    /// Freezes the current pose. While playing, every node track present
    /// in the current clip is evaluated at the current playback time.
    /// Mid-transition the last evaluated locals are decomposed instead so
    /// a second switch stays continuous.
    fn snapshot_pose(
        &self,
        data: &ModelData,
        tree: &NodeTree,
        seconds: f32,
    ) -> HashMap<usize, Trs> {
        let mut snapshot = HashMap::new();
        match &self.state {
            Playback::Playing { clip, tick_offset } => {
                let Some(clip) = data.clips.get(*clip) else {
                    return snapshot;
                };
                let ticks = wrap_ticks(
                    seconds * clip.effective_ticks_per_second()
                        + tick_offset,
                    clip.duration,
                );
                for (i, track) in self.bound_tracks.iter().enumerate() {
                    if let Some(t) = track {
                        snapshot.insert(i, clip.track(*t).sample(ticks));
                    }
                }
            }
            Playback::Transitioning { snapshot: old, .. } => {
                for (i, track) in self.bound_tracks.iter().enumerate() {
                    if track.is_some() || old.contains_key(&i) {
                        snapshot
                            .insert(i, trs::decompose(&data.node_locals[i]));
                    }
                }
            }
        }
        snapshot
    }

    /// Writes the current local transform of every node for this frame.
    /// `seconds` is the model's animation clock; transition progress
    /// advances by exactly one tick per call regardless of it.
    pub fn update(
        &mut self,
        data: &mut ModelData,
        tree: &NodeTree,
        seconds: f32,
    ) {
        match self.state {
            Playback::Playing { clip, tick_offset } => {
                self.evaluate_clip(data, tree, clip, tick_offset, seconds);
            }
            Playback::Transitioning {
                target,
                elapsed_ticks,
                duration_ticks,
                ..
            } => {
                if duration_ticks <= 0.0f32 {
                    // A zero length transition completes on the very next
                    // update and resumes playback immediately
                    let tick_offset =
                        self.complete_transition(data, target, seconds);
                    self.evaluate_clip(
                        data,
                        tree,
                        target,
                        tick_offset,
                        seconds,
                    );
                    return;
                }
                let factor = elapsed_ticks / duration_ticks;
                self.evaluate_blend(data, tree, target, factor);
                let elapsed_ticks = elapsed_ticks + 1.0f32;
                if elapsed_ticks >= duration_ticks {
                    self.complete_transition(data, target, seconds);
                } else if let Playback::Transitioning {
                    elapsed_ticks: e, ..
                } = &mut self.state
                {
                    *e = elapsed_ticks;
                }
            }
        }
    }

    /// Returns to `Playing` with a tick offset chosen so that playback
    /// continues from the target clip's first key, which the blend has
    /// just reached
    fn complete_transition(
        &mut self,
        data: &ModelData,
        target: usize,
        seconds: f32,
    ) -> f32 {
        let tick_offset = data.clips.get(target).map_or(0.0f32, |clip| {
            clip.start_ticks()
                - seconds * clip.effective_ticks_per_second()
        });
        debug!("transition to clip {target} complete");
        self.state = Playback::Playing {
            clip: target,
            tick_offset,
        };
        tick_offset
    }

    fn evaluate_clip(
        &self,
        data: &mut ModelData,
        tree: &NodeTree,
        clip: usize,
        tick_offset: f32,
        seconds: f32,
    ) {
        let Some(clip) = data.clips.get(clip) else {
            // A model without animations holds its bind pose
            data.reset_locals_to_bind(tree);
            return;
        };
        let ticks = wrap_ticks(
            seconds * clip.effective_ticks_per_second() + tick_offset,
            clip.duration,
        );
        let locals: Vec<_> = (0..tree.len())
            .map(|i| {
                self.bound_tracks[i].map_or_else(
                    || tree.node(i).local_bind,
                    |t| clip.track(t).sample(ticks).to_matrix(),
                )
            })
            .collect();
        data.node_locals.copy_from_slice(&locals);
    }

    /// One crossfade step: per node, blend according to which side has
    /// data. Snapshot only nodes relax toward the bind pose, target only
    /// nodes start from it, and untouched nodes stay at bind.
    fn evaluate_blend(
        &self,
        data: &mut ModelData,
        tree: &NodeTree,
        target: usize,
        factor: f32,
    ) {
        let Playback::Transitioning { ref snapshot, .. } = self.state else {
            return;
        };
        let clip = &data.clips[target];
        let mut locals = Vec::with_capacity(tree.len());
        for i in 0..tree.len() {
            let from = snapshot.get(&i);
            let to = self.bound_tracks[i].map(|t| clip.track(t).first_pose());
            let local = match (from, to) {
                (Some(a), Some(b)) => trs::blend(a, &b, factor).to_matrix(),
                (Some(a), None) => {
                    let bind = trs::decompose(&tree.node(i).local_bind);
                    trs::blend(a, &bind, factor).to_matrix()
                }
                (None, Some(b)) => {
                    let bind = trs::decompose(&tree.node(i).local_bind);
                    trs::blend(&bind, &b, factor).to_matrix()
                }
                (None, None) => tree.node(i).local_bind,
            };
            locals.push(local);
        }
        data.node_locals.copy_from_slice(&locals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::animation::AnimationClip,
        scene_import::{SceneClip, SceneData, SceneNode, SceneTrack},
    };
    use nalgebra_glm as glm;

    const EPSILON: f32 = 0.0005;

    fn one_node_scene() -> SceneData {
        SceneData {
            nodes: vec![SceneNode {
                name: "joint".to_owned(),
                parent: None,
                children: Vec::new(),
                transform: glm::Mat4::identity(),
                meshes: Vec::new(),
            }],
            ..SceneData::default()
        }
    }

    fn translation_clip(name: &str, x0: f32, x1: f32) -> SceneClip {
        SceneClip {
            name: name.to_owned(),
            duration: 10.0,
            ticks_per_second: 0.0,
            tracks: vec![SceneTrack {
                node_name: "joint".to_owned(),
                translation_keys: vec![
                    (0.0, [x0, 0.0, 0.0]),
                    (10.0, [x1, 0.0, 0.0]),
                ],
                ..SceneTrack::default()
            }],
            mesh_tracks: Vec::new(),
        }
    }

    fn build() -> (NodeTree, ModelData, Controller) {
        let scene = one_node_scene();
        let tree = NodeTree::from_scene(&scene).unwrap();
        let mut data = ModelData::from_scene(&scene, &tree).unwrap();
        for sc in
            [translation_clip("walk", 0.0, 10.0), translation_clip("run", 100.0, 110.0)]
        {
            let clip = AnimationClip::from_scene(&sc, |name| {
                tree.bind_pose(name).unwrap_or_default()
            });
            data.register_clip(clip);
        }
        let controller = Controller::new(&tree, &data);
        (tree, data, controller)
    }

    fn local_x(data: &ModelData) -> f32 {
        data.node_locals[0][(0, 3)]
    }

    #[test]
    fn first_blend_step_equals_snapshot() {
        let (tree, mut data, mut controller) = build();
        // 5 ticks into "walk" at the default rate
        let seconds = 5.0 / crate::types::DEFAULT_TICKS_PER_SECOND;
        controller.update(&mut data, &tree, seconds);
        let before = local_x(&data);
        controller.set_animation(&data, &tree, 1, 1.0, seconds);
        controller.update(&mut data, &tree, seconds);
        assert!((local_x(&data) - before).abs() < EPSILON);
    }

    #[test]
    fn transition_completes_after_duration_times_rate_calls() {
        let (tree, mut data, mut controller) = build();
        controller.update(&mut data, &tree, 0.0);
        controller.set_animation(&data, &tree, 1, 1.0, 0.0);
        let calls = crate::types::DEFAULT_TICKS_PER_SECOND as usize;
        for i in 0..calls {
            assert!(controller.is_transitioning(), "call {i}");
            controller.update(&mut data, &tree, 0.0);
        }
        assert!(!controller.is_transitioning());
        assert!(matches!(
            controller.state,
            Playback::Playing { clip: 1, .. }
        ));
    }

    #[test]
    fn zero_duration_transition_completes_immediately() {
        let (tree, mut data, mut controller) = build();
        controller.update(&mut data, &tree, 0.0);
        controller.set_animation(&data, &tree, 1, 0.0, 0.0);
        assert!(controller.is_transitioning());
        controller.update(&mut data, &tree, 0.0);
        assert!(matches!(
            controller.state,
            Playback::Playing { clip: 1, .. }
        ));
        // Already playing the target's first key on that same call
        assert!((local_x(&data) - 100.0).abs() < EPSILON);
    }

    #[test]
    fn unknown_clip_is_a_no_op() {
        let (tree, mut data, mut controller) = build();
        controller.update(&mut data, &tree, 0.0);
        controller.set_animation(&data, &tree, 7, 1.0, 0.0);
        assert!(!controller.is_transitioning());
        assert_eq!(controller.current_clip(), 0);
    }

    #[test]
    fn blend_reaches_target_first_key() {
        let (tree, mut data, mut controller) = build();
        controller.update(&mut data, &tree, 0.0);
        controller.set_animation(&data, &tree, 1, 1.0, 0.0);
        let calls = crate::types::DEFAULT_TICKS_PER_SECOND as usize;
        let mut last = f32::NAN;
        for _ in 0..calls {
            controller.update(&mut data, &tree, 0.0);
            last = local_x(&data);
        }
        // The last blended frame is one tick step short of the target
        // pose; the first regular frame lands exactly on it
        assert!((last - 100.0).abs() < 4.0 + EPSILON);
        controller.update(&mut data, &tree, 0.0);
        assert!((local_x(&data) - 100.0).abs() < EPSILON);
    }
}
