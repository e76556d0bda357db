//! Shared scene builders.

use nalgebra::{Point3, Vector3};
use sim_core::{BodyDef, BodyHandle, BoxDef, Scene, SceneConfig, Transform};

pub fn scene() -> Scene {
    Scene::new(SceneConfig::default()).expect("default config is valid")
}

pub fn unit_cube() -> BoxDef {
    BoxDef::new(Transform::identity(), Vector3::repeat(0.5))
}

/// A static 40 x 40 x 1 slab centered at the origin; its top face is at
/// z = 0.5.
pub fn ground(scene: &mut Scene) -> BodyHandle {
    let body = scene.create_body(&BodyDef::fixed()).expect("heap has room");
    scene
        .add_box(
            body,
            &BoxDef::new(Transform::identity(), Vector3::new(20.0, 20.0, 0.5)),
        )
        .expect("valid box");
    body
}

/// A dynamic unit cube centered at `position`.
pub fn cube_at(scene: &mut Scene, position: Point3<f64>) -> BodyHandle {
    let body = scene
        .create_body(&BodyDef::dynamic().with_position(position))
        .expect("heap has room");
    scene.add_box(body, &unit_cube()).expect("valid box");
    body
}

pub fn run(scene: &mut Scene, steps: usize) {
    for _ in 0..steps {
        scene.step().expect("step succeeds");
    }
}
