//! Island partitioning over the contact graph.

use nalgebra::{Point3, Vector3};
use sim_core::{BodyDef, BoxDef, Scene, SceneConfig, Transform};

use crate::fixtures::{cube_at, ground, run, scene};

#[test]
fn separate_stacks_share_the_ground_but_not_an_island() {
    let mut scene = scene();
    let floor = ground(&mut scene);
    let left = cube_at(&mut scene, Point3::new(-3.0, 0.0, 0.99));
    let right = cube_at(&mut scene, Point3::new(3.0, 0.0, 0.99));

    scene.step().expect("step succeeds");

    let islands = scene.islands();
    assert_eq!(islands.len(), 2);
    for island in islands {
        // The static ground joins every island but links none of them
        assert!(island.contains(floor));
        assert_eq!(island.bodies().len(), 2);
        assert_eq!(island.contacts().len(), 1);
    }
    assert_ne!(islands[0].contains(left), islands[1].contains(left));
    assert_ne!(islands[0].contains(right), islands[1].contains(right));
}

#[test]
fn touching_cubes_join_one_island() {
    let mut scene = Scene::new(SceneConfig::default().zero_gravity()).expect("valid config");
    let handles: Vec<_> = (0..4)
        .map(|i| cube_at(&mut scene, Point3::new(f64::from(i) * 0.99, 0.0, 0.0)))
        .collect();
    let loner = cube_at(&mut scene, Point3::new(10.0, 0.0, 0.0));

    scene.step().expect("step succeeds");

    let chain = scene
        .islands()
        .iter()
        .find(|island| island.contains(handles[0]))
        .expect("chain island exists");
    assert!(handles.iter().all(|h| chain.contains(*h)));
    assert!(!chain.contains(loner));
    assert_eq!(chain.contacts().len(), 3);
    assert_eq!(scene.islands().len(), 2);
}

#[test]
fn kicked_island_wakes_alone() {
    let mut scene = scene();
    ground(&mut scene);
    let left = cube_at(&mut scene, Point3::new(-3.0, 0.0, 0.99));
    let right = cube_at(&mut scene, Point3::new(3.0, 0.0, 0.99));
    run(&mut scene, 120);
    assert_eq!(scene.awake_body_count(), 0);
    assert!(scene.islands().is_empty());

    scene
        .body_mut(left)
        .expect("cube exists")
        .set_linear_velocity(Vector3::new(1.0, 0.0, 0.0))
        .expect("dynamic body accepts velocity");
    scene.step().expect("step succeeds");

    assert_eq!(scene.islands().len(), 1);
    assert!(scene.islands()[0].contains(left));
    assert!(scene.body(left).expect("cube exists").is_awake());
    assert!(!scene.body(right).expect("cube exists").is_awake());
}

#[test]
fn sensors_report_overlap_without_pushing() {
    let mut scene = Scene::new(SceneConfig::default().zero_gravity()).expect("valid config");
    let zone = scene.create_body(&BodyDef::fixed()).expect("heap has room");
    scene
        .add_box(zone, &BoxDef::new(Transform::identity(), Vector3::repeat(2.0)).as_sensor())
        .expect("valid box");
    let mover = scene
        .create_body(
            &BodyDef::dynamic()
                .with_linear_velocity(Vector3::new(1.0, 0.0, 0.0))
                .with_damping(0.0, 0.0),
        )
        .expect("heap has room");
    scene
        .add_box(mover, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
        .expect("valid box");

    run(&mut scene, 2);

    let (_, contact) = scene.contacts().next().expect("sensor contact exists");
    assert!(contact.is_sensor());
    assert!(contact.is_colliding());
    assert_eq!(scene.body(mover).expect("mover exists").linear_velocity(), Vector3::x());
    assert!(scene.islands().iter().all(|island| island.contacts().is_empty()));
}

#[test]
fn never_sleeping_body_keeps_its_island_awake() {
    let mut scene = scene();
    ground(&mut scene);
    let restless = scene
        .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 0.99)).never_sleep())
        .expect("heap has room");
    scene
        .add_box(restless, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
        .expect("valid box");

    run(&mut scene, 120);
    assert!(scene.body(restless).expect("body exists").is_awake());
    assert_eq!(scene.islands().len(), 1);
}
