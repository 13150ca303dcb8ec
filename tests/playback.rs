//! Integration tests driving a whole `Model` through load, playback,
//! crossfade and the renderer facing output, using scenes built directly
//! in the flat interchange shape.

use calluna::{
    ca_error::CaError,
    model::{Model, Playback},
    scene_import::{
        ImportError, SceneBone, SceneClip, SceneData, SceneMesh, SceneNode,
        SceneTrack, VertexWeight,
    },
    trs,
    types::DEFAULT_TICKS_PER_SECOND,
};
use nalgebra_glm as glm;
use std::sync::Once;

const EPSILON: f32 = 0.0005f32;
static INIT: Once = Once::new();

fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

/// Seconds that reach `ticks` at the default rate
fn seconds_for(ticks: f32) -> f32 {
    ticks / DEFAULT_TICKS_PER_SECOND
}

fn translation_of(m: &glm::Mat4) -> glm::Vec3 {
    glm::vec3(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

fn quad_mesh(bone: Option<SceneBone>) -> SceneMesh {
    SceneMesh {
        name: "quad".to_owned(),
        material_id: Some(0),
        positions: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        normals: vec![[0.0, 0.0, 1.0]; 4],
        colours: Vec::new(),
        tex_coords: Vec::new(),
        indices: vec![0, 1, 2, 0, 2, 3],
        bones: bone.into_iter().collect(),
    }
}

fn fully_weighted(bone_name: &str) -> SceneBone {
    SceneBone {
        name: bone_name.to_owned(),
        offset: glm::Mat4::identity(),
        weights: (0..4)
            .map(|v| VertexWeight {
                vertex: v,
                weight: 1.0,
            })
            .collect(),
    }
}

/// root -> child, with the quad owned and skinned by the child
fn scene_with_clips(clips: Vec<SceneClip>) -> SceneData {
    SceneData {
        nodes: vec![
            SceneNode {
                name: "root".to_owned(),
                parent: None,
                children: vec![1],
                transform: glm::Mat4::identity(),
                meshes: Vec::new(),
            },
            SceneNode {
                name: "child".to_owned(),
                parent: Some(0),
                children: Vec::new(),
                transform: glm::Mat4::identity(),
                meshes: vec![0],
            },
        ],
        meshes: vec![quad_mesh(Some(fully_weighted("child")))],
        clips,
        ..SceneData::default()
    }
}

fn slide_clip(name: &str, node: &str, x0: f32, x1: f32) -> SceneClip {
    SceneClip {
        name: name.to_owned(),
        duration: 10.0,
        ticks_per_second: 0.0,
        tracks: vec![SceneTrack {
            node_name: node.to_owned(),
            translation_keys: vec![(0.0, [x0, 0.0, 0.0]), (10.0, [x1, 0.0, 0.0])],
            ..SceneTrack::default()
        }],
        mesh_tracks: Vec::new(),
    }
}

fn loaded_model(scene: &SceneData) -> Model {
    let mut model = Model::new();
    model.load_scene(scene).unwrap();
    model
}

#[test]
fn position_track_interpolates_linearly() {
    init_tests();
    let scene = scene_with_clips(vec![slide_clip("slide", "child", 0.0, 10.0)]);
    let mut model = loaded_model(&scene);
    model.update(seconds_for(5.0));
    let p = translation_of(&model.local_transforms()[1]);
    assert!(glm::distance(&p, &glm::vec3(5.0, 0.0, 0.0)) < EPSILON);
}

#[test]
fn rotation_track_interpolates_spherically() {
    let clip = SceneClip {
        name: "turn".to_owned(),
        duration: 10.0,
        ticks_per_second: 0.0,
        tracks: vec![SceneTrack {
            node_name: "child".to_owned(),
            rotation_keys: vec![
                (0.0, [0.0, 0.0, 0.0, 1.0]),
                // 180 degrees about Y
                (10.0, [0.0, 1.0, 0.0, 0.0]),
            ],
            ..SceneTrack::default()
        }],
        mesh_tracks: Vec::new(),
    };
    let scene = scene_with_clips(vec![clip]);
    let mut model = loaded_model(&scene);
    model.update(seconds_for(5.0));
    let rotation = trs::decompose(&model.local_transforms()[1]).rotation;
    // A quaternion and its negation are the same rotation, so check the
    // effect on a vector: 90 degrees about Y carries +X onto -Z
    let rotated = glm::quat_rotate_vec3(
        &glm::quat_normalize(&rotation),
        &glm::vec3(1.0, 0.0, 0.0),
    );
    assert!(glm::distance(&rotated, &glm::vec3(0.0, 0.0, -1.0)) < EPSILON);
}

#[test]
fn child_world_transform_composes_through_the_tree() {
    let mut scene = scene_with_clips(Vec::new());
    scene.nodes[0].transform = glm::translation(&glm::vec3(1.0, 0.0, 0.0));
    scene.nodes[1].transform = glm::translation(&glm::vec3(0.0, 1.0, 0.0));
    let mut model = loaded_model(&scene);
    model.update(0.0);
    let p = translation_of(&model.world_transforms()[1]);
    assert!(glm::distance(&p, &glm::vec3(1.0, 1.0, 0.0)) < EPSILON);
}

#[test]
fn skin_matrix_follows_the_animated_node() {
    let scene = scene_with_clips(vec![slide_clip("slide", "child", 0.0, 10.0)]);
    let mut model = loaded_model(&scene);
    model.update(seconds_for(5.0));
    // Identity offset, identity parent: the slot tracks the node's world
    let p = translation_of(&model.skin_matrices()[0]);
    assert!(glm::distance(&p, &glm::vec3(5.0, 0.0, 0.0)) < EPSILON);
}

#[test]
fn zero_duration_transition_resumes_target_immediately() {
    let scene = scene_with_clips(vec![
        slide_clip("walk", "child", 0.0, 10.0),
        slide_clip("run", "child", 100.0, 110.0),
    ]);
    let mut model = loaded_model(&scene);
    model.update(0.0);
    model.set_animation(1, 0.0);
    assert!(matches!(
        model.playback(),
        Playback::Transitioning { .. }
    ));
    model.update(0.0);
    assert!(matches!(model.playback(), Playback::Playing { clip: 1, .. }));
    let p = translation_of(&model.local_transforms()[1]);
    assert!(glm::distance(&p, &glm::vec3(100.0, 0.0, 0.0)) < EPSILON);
}

#[test]
fn crossfade_runs_for_the_requested_tick_count() {
    let scene = scene_with_clips(vec![
        slide_clip("walk", "child", 0.0, 10.0),
        slide_clip("run", "child", 100.0, 110.0),
    ]);
    let mut model = loaded_model(&scene);
    let seconds = seconds_for(5.0);
    model.update(seconds);
    let before = translation_of(&model.local_transforms()[1]);
    model.set_animation_by_name("run", 1.0);

    // The first blended frame reproduces the frozen snapshot exactly
    model.update(seconds);
    let first = translation_of(&model.local_transforms()[1]);
    assert!(glm::distance(&first, &before) < EPSILON);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let calls = DEFAULT_TICKS_PER_SECOND as usize;
    for _ in 1..calls {
        assert!(matches!(
            model.playback(),
            Playback::Transitioning { .. }
        ));
        model.update(seconds);
    }
    assert!(matches!(model.playback(), Playback::Playing { clip: 1, .. }));

    // The first regular frame lands on the target's first key
    model.update(seconds);
    let p = translation_of(&model.local_transforms()[1]);
    assert!(glm::distance(&p, &glm::vec3(100.0, 0.0, 0.0)) < EPSILON);
}

#[test]
fn unknown_clip_name_leaves_playback_untouched() {
    init_tests();
    let scene = scene_with_clips(vec![slide_clip("walk", "child", 0.0, 10.0)]);
    let mut model = loaded_model(&scene);
    model.update(0.0);
    model.set_animation_by_name("sprint", 0.5);
    assert!(matches!(model.playback(), Playback::Playing { clip: 0, .. }));
}

#[test]
fn partial_weight_sum_fails_the_load() {
    let mut scene = scene_with_clips(Vec::new());
    scene.meshes[0].bones[0].weights[1].weight = 0.6;
    let mut model = Model::new();
    let result = model.load_scene(&scene);
    assert!(matches!(
        result,
        Err(CaError::ImportError(ImportError::BadWeightSum(1)))
    ));
    assert!(!model.is_loaded());
    assert!(model.render().is_none());
}

#[test]
fn hidden_meshes_are_not_drawn() {
    let scene = scene_with_clips(Vec::new());
    let mut model = loaded_model(&scene);
    model.update(0.0);
    assert_eq!(model.render().unwrap().draws.len(), 1);
    model.set_mesh_visible("quad", false);
    assert_eq!(model.render().unwrap().draws.len(), 0);
    // Unknown names are a no-op
    model.set_mesh_visible("engine", true);
    assert_eq!(model.render().unwrap().draws.len(), 0);
    model.set_mesh_visible("quad", true);
    assert_eq!(model.render().unwrap().draws.len(), 1);
}

#[test]
fn bounding_box_covers_the_vertices() {
    let scene = scene_with_clips(Vec::new());
    let model = loaded_model(&scene);
    let bounds = model.bounding_box();
    assert!(glm::distance(&bounds.min, &glm::Vec3::zeros()) < EPSILON);
    assert!(glm::distance(&bounds.max, &glm::vec3(1.0, 1.0, 0.0)) < EPSILON);
    assert!(
        glm::distance(&bounds.centre(), &glm::vec3(0.5, 0.5, 0.0)) < EPSILON
    );
}

#[test]
fn distance_accumulates_root_travel() {
    let scene = SceneData {
        nodes: vec![SceneNode {
            name: "root".to_owned(),
            parent: None,
            children: Vec::new(),
            transform: glm::Mat4::identity(),
            meshes: Vec::new(),
        }],
        clips: vec![slide_clip("drift", "root", 0.0, 10.0)],
        ..SceneData::default()
    };
    let mut model = loaded_model(&scene);
    model.update(0.0);
    assert!(model.distance_travelled().abs() < EPSILON);
    model.update(seconds_for(4.0));
    model.update(seconds_for(9.0));
    assert!((model.distance_travelled() - 9.0).abs() < EPSILON);
}

#[test]
fn next_animation_cycles_in_load_order() {
    let scene = scene_with_clips(vec![
        slide_clip("walk", "child", 0.0, 10.0),
        slide_clip("run", "child", 100.0, 110.0),
    ]);
    let mut model = loaded_model(&scene);
    assert_eq!(model.clip_names(), vec!["walk", "run"]);
    model.update(0.0);
    model.next_animation(0.0);
    model.update(0.0);
    assert!(matches!(model.playback(), Playback::Playing { clip: 1, .. }));
    model.next_animation(0.0);
    model.update(0.0);
    assert!(matches!(model.playback(), Playback::Playing { clip: 0, .. }));
}

#[test]
fn unloaded_model_renders_nothing() {
    let mut model = Model::new();
    model.update(1.0);
    assert!(model.render().is_none());
    assert_eq!(model.clip_count(), 0);
}
