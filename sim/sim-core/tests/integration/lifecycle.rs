//! Body and box lifecycle through a running scene.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_core::{BodyDef, BoxDef, SimError, Transform};

use crate::fixtures::{cube_at, ground, run, scene};

#[test]
fn body_mass_is_the_sum_of_its_boxes() {
    let mut scene = scene();
    let body = scene.create_body(&BodyDef::dynamic()).expect("heap has room");
    let defs = [
        BoxDef::new(Transform::identity(), Vector3::new(0.5, 0.5, 0.5)).with_density(2.0),
        BoxDef::new(Transform::from_position(Point3::new(1.0, 0.0, 0.0)), Vector3::new(0.5, 0.25, 0.25)),
        BoxDef::new(
            Transform::from_axis_angle(Point3::new(0.0, 0.0, 1.0), Vector3::x(), 0.7),
            Vector3::new(0.1, 0.2, 0.3),
        )
        .with_density(5.0),
    ];
    for def in &defs {
        scene.add_box(body, def).expect("valid box");
    }

    let shapes: Vec<_> = scene.shapes().map(|(_, s)| s.compute_mass()).collect();
    let expected_mass: f64 = shapes.iter().map(|m| m.mass).sum();
    let expected_center = shapes
        .iter()
        .fold(Vector3::zeros(), |acc, m| acc + m.center.coords * m.mass)
        / expected_mass;

    let body = scene.body(body).expect("body exists");
    assert_relative_eq!(body.mass(), expected_mass, epsilon = 1e-12);
    assert_relative_eq!(body.mass(), 2.0 + 0.25 + 5.0 * 0.048, epsilon = 1e-12);
    assert_relative_eq!(body.local_center().coords, expected_center, epsilon = 1e-12);
    assert_relative_eq!(body.inv_mass(), 1.0 / expected_mass, epsilon = 1e-12);
}

#[test]
fn removing_the_bottom_of_a_stack_drops_the_top() {
    let mut scene = scene();
    ground(&mut scene);
    let bottom = cube_at(&mut scene, Point3::new(0.0, 0.0, 0.99));
    let top = cube_at(&mut scene, Point3::new(0.0, 0.0, 1.98));
    run(&mut scene, 30);
    // The top cube's fat box also reaches the ground, but only two pairs touch
    assert_eq!(scene.contacts().filter(|(_, c)| c.is_colliding()).count(), 2);

    scene.remove_body(bottom).expect("bottom exists");
    assert!(scene.contacts().all(|(_, c)| {
        let (a, b) = c.bodies();
        scene.body(a).is_some() && scene.body(b).is_some()
    }));

    run(&mut scene, 120);
    let z = scene.body(top).expect("top exists").position().z;
    assert!(z > 0.9 && z < 1.05, "top cube ended at z = {z}");
}

#[test]
fn removed_handles_stay_dead_after_slot_reuse() {
    let mut scene = scene();
    let old = cube_at(&mut scene, Point3::origin());
    let old_box = scene.body(old).expect("body exists").boxes()[0];
    scene.remove_body(old).expect("body exists");

    let new = cube_at(&mut scene, Point3::new(5.0, 0.0, 0.0));
    assert_ne!(old, new);
    assert!(scene.body(old).is_none());
    assert!(scene.shape(old_box).is_none());
    assert!(matches!(scene.remove_body(old), Err(SimError::InvalidBody(_))));
    assert!(scene.body(new).is_some());
}

#[test]
fn heap_is_returned_when_bodies_go_away() {
    let mut scene = scene();
    ground(&mut scene);
    for i in 0..10 {
        cube_at(&mut scene, Point3::new(f64::from(i) * 2.0 - 9.0, 0.0, 2.0));
    }
    run(&mut scene, 10);
    assert!(scene.heap().bytes_used() > 0);
    assert_eq!(scene.heap().live_blocks(), 22);

    scene.remove_all_bodies().unwrap();
    assert_eq!(scene.body_count(), 0);
    assert_eq!(scene.box_count(), 0);
    assert_eq!(scene.contact_count(), 0);
    assert_eq!(scene.heap().bytes_used(), 0);
    assert_eq!(scene.heap().free_block_count(), 1);
}

#[test]
fn layers_filter_contacts() {
    let mut scene = scene();
    let floor = ground(&mut scene);
    let ghost = scene
        .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 0.99)).with_layers(0b10))
        .expect("heap has room");
    scene
        .add_box(ghost, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
        .expect("valid box");

    run(&mut scene, 30);
    assert_eq!(scene.contact_count(), 0);
    assert!(scene.body(ghost).expect("ghost exists").position().z < 0.5);

    // Sharing a layer again lets the floor catch a new body
    scene.remove_body(ghost).expect("ghost exists");
    scene.body_mut(floor).expect("floor exists").set_layers(0b11);
    let solid = cube_at(&mut scene, Point3::new(5.0, 0.0, 0.99));
    run(&mut scene, 30);
    assert!(scene.body(solid).expect("cube exists").position().z > 0.9);
}

#[test]
fn simulation_is_deterministic() {
    fn build() -> sim_core::Scene {
        let mut scene = scene();
        ground(&mut scene);
        for i in 0..5 {
            let body = scene
                .create_body(
                    &BodyDef::dynamic()
                        .with_position(Point3::new(f64::from(i) * 0.3, 0.0, 1.5 + f64::from(i) * 1.1))
                        .with_rotation(Vector3::new(1.0, 1.0, 0.0), 0.2 * f64::from(i)),
                )
                .expect("heap has room");
            scene
                .add_box(body, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
                .expect("valid box");
        }
        scene
    }

    let mut a = build();
    let mut b = build();
    run(&mut a, 120);
    run(&mut b, 120);
    for ((_, x), (_, y)) in a.bodies().zip(b.bodies()) {
        assert_eq!(x.position(), y.position());
        assert_eq!(x.quaternion(), y.quaternion());
    }
}
