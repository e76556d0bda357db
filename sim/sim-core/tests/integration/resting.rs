//! Resting contact, stacking and sleeping.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};

use sim_core::{BodyDef, BoxDef, Transform};

use crate::fixtures::{cube_at, ground, run, scene};

#[test]
fn resting_cube_settles_on_ground_and_sleeps() {
    let mut scene = scene();
    ground(&mut scene);
    let cube = cube_at(&mut scene, Point3::new(0.0, 0.0, 0.99));

    run(&mut scene, 120);

    let body = scene.body(cube).expect("cube exists");
    // Settled within the penetration slop of the ground's top face
    assert!(body.position().z > 0.9 && body.position().z <= 1.0);
    assert_relative_eq!(body.position().x, 0.0, epsilon = 1e-6);
    assert!(!body.is_awake());
    assert_eq!(body.linear_velocity(), Vector3::zeros());
    assert_eq!(scene.awake_body_count(), 0);
    // Sleeping bodies keep their contacts
    assert_eq!(scene.contact_count(), 1);
}

#[test]
fn sleeping_cube_stays_put() {
    let mut scene = scene();
    ground(&mut scene);
    let cube = cube_at(&mut scene, Point3::new(0.3, -0.2, 0.99));
    run(&mut scene, 120);

    let body = scene.body(cube).expect("cube exists");
    assert!(!body.is_awake());
    let (position, rotation) = (body.position(), body.quaternion());

    for _ in 0..60 {
        let stats = scene.step().expect("step succeeds");
        // Nothing awake: no islands and no narrow-phase work
        assert_eq!(stats.islands, 0);
        assert_eq!(stats.contacts_tested, 0);
    }

    let body = scene.body(cube).expect("cube exists");
    assert!(!body.is_awake());
    assert_eq!(body.position(), position);
    assert_eq!(body.quaternion(), rotation);
    assert_eq!(scene.contact_count(), 1);
}

#[test]
fn off_center_impulse_spins_new_cube() {
    let mut scene = scene();
    let cube = cube_at(&mut scene, Point3::new(0.0, 0.0, 5.0));

    let body = scene.body_mut(cube).expect("cube exists");
    body.apply_linear_impulse_at_world_point(Vector3::y(), &Point3::new(0.5, 0.0, 5.0));

    assert_relative_eq!(body.linear_velocity(), Vector3::y(), epsilon = 1e-12);
    // r x J = (0.5, 0, 0) x (0, 1, 0); a unit cube has I^-1 = 6
    assert_relative_eq!(body.angular_velocity(), Vector3::new(0.0, 0.0, 3.0), epsilon = 1e-12);
}

#[test]
fn world_inertia_tracks_set_transform() {
    let mut scene = scene();
    let body = scene.create_body(&BodyDef::dynamic()).expect("heap has room");
    scene
        .add_box(body, &BoxDef::new(Transform::identity(), Vector3::new(0.5, 0.5, 1.0)))
        .expect("valid box");

    let b = scene.body(body).expect("body exists");
    assert_relative_eq!(*b.inv_inertia_world(), *b.inv_inertia_model(), epsilon = 1e-12);

    scene
        .set_transform(body, Point3::origin(), Some((Vector3::x(), std::f64::consts::FRAC_PI_2)))
        .expect("body exists");
    let b = scene.body(body).expect("body exists");
    let (model, world) = (b.inv_inertia_model(), b.inv_inertia_world());
    // A quarter turn about x swaps the y and z principal axes
    assert_relative_eq!(world[(1, 1)], model[(2, 2)], epsilon = 1e-12);
    assert_relative_eq!(world[(2, 2)], model[(1, 1)], epsilon = 1e-12);
    assert!((world[(1, 1)] - world[(2, 2)]).abs() > 1.0);
}

#[test]
fn impulse_wakes_sleeping_cube() {
    let mut scene = scene();
    ground(&mut scene);
    let cube = cube_at(&mut scene, Point3::new(0.0, 0.0, 0.99));
    run(&mut scene, 120);
    let rest_height = scene.body(cube).expect("cube exists").position().z;

    let body = scene.body_mut(cube).expect("cube exists");
    assert!(!body.is_awake());
    body.apply_linear_impulse(Vector3::new(0.0, 0.0, 5.0));
    assert!(body.is_awake());

    scene.step().expect("step succeeds");
    let body = scene.body(cube).expect("cube exists");
    assert!(body.position().z > rest_height);
    assert!(body.linear_velocity().z > 0.0);
}

#[test]
fn falling_cube_lands_instead_of_tunneling() {
    let mut scene = scene();
    ground(&mut scene);
    let cube = cube_at(&mut scene, Point3::new(0.0, 0.0, 4.0));

    run(&mut scene, 180);

    let z = scene.body(cube).expect("cube exists").position().z;
    assert!(z > 0.9 && z < 1.05, "cube ended at z = {z}");
}

#[test]
fn stack_of_three_stays_upright() {
    let mut scene = scene();
    ground(&mut scene);
    let cubes: Vec<_> = (0..3)
        .map(|i| cube_at(&mut scene, Point3::new(0.0, 0.0, 0.99 + f64::from(i) * 0.99)))
        .collect();

    run(&mut scene, 180);

    for (i, handle) in cubes.iter().enumerate() {
        let body = scene.body(*handle).expect("cube exists");
        let expected = 1.0 + i as f64;
        let p = body.position();
        assert!((p.z - expected).abs() < 0.1, "cube {i} at z = {}", p.z);
        assert!(p.x.abs() < 0.05 && p.y.abs() < 0.05, "cube {i} drifted to {p}");
        // Still axis aligned
        assert!(body.quaternion().angle() < 0.05);
    }
}

#[test]
fn frictionless_slope_slides_and_friction_holds() {
    // A cube on a ground tilted 0.3 rad about y
    fn slide_distance(friction: f64, enable_friction: bool) -> f64 {
        use sim_core::{BodyDef, BoxDef, Transform};

        let mut scene = scene();
        scene.set_enable_friction(enable_friction);
        let ramp = scene
            .create_body(&BodyDef::fixed().with_rotation(Vector3::y(), 0.3))
            .expect("heap has room");
        scene
            .add_box(
                ramp,
                &BoxDef::new(Transform::identity(), Vector3::new(20.0, 20.0, 0.5)).with_friction(friction),
            )
            .expect("valid box");

        let up = scene.body(ramp).expect("ramp exists").world_vector(&Vector3::z());
        let start = Point3::origin() + up * 0.99;
        let cube = scene
            .create_body(&BodyDef::dynamic().with_position(start).with_rotation(Vector3::y(), 0.3))
            .expect("heap has room");
        scene
            .add_box(cube, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)).with_friction(friction))
            .expect("valid box");

        run(&mut scene, 60);
        (scene.body(cube).expect("cube exists").position() - start).norm()
    }

    let sliding = slide_distance(0.0, false);
    let held = slide_distance(1.0, true);
    assert!(sliding > 0.5, "frictionless cube moved {sliding}");
    assert!(held < 0.1, "high-friction cube moved {held}");
}
