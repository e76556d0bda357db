//! Queries, debug drawing and the dump against simulated scenes.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_core::{Aabb, LineRecorder, Ray};

use crate::fixtures::{cube_at, ground, run, scene};

#[test]
fn raycast_follows_a_body_after_it_moves() {
    let mut scene = scene();
    let floor = ground(&mut scene);
    let cube = cube_at(&mut scene, Point3::new(0.0, 0.0, 3.0));
    run(&mut scene, 120);

    let top = scene.body(cube).expect("cube exists").position().z + 0.5;
    let ray = Ray::new(Point3::new(0.0, 0.0, 10.0), -Vector3::z(), 20.0);
    let (hit_box, hit) = scene.raycast_closest(&ray).expect("ray hits the cube");

    assert_eq!(scene.shape(hit_box).expect("box exists").body(), cube);
    assert_relative_eq!(hit.point(&ray).z, top, epsilon = 1e-6);
    assert_relative_eq!(hit.normal, Vector3::z(), epsilon = 1e-6);

    // Beside the cube the ray reaches the floor
    let ray = Ray::new(Point3::new(5.0, 0.0, 10.0), -Vector3::z(), 20.0);
    let (hit_box, hit) = scene.raycast_closest(&ray).expect("ray hits the floor");
    assert_eq!(scene.shape(hit_box).expect("box exists").body(), floor);
    assert_relative_eq!(hit.toi, 9.5, epsilon = 1e-9);
}

#[test]
fn region_query_finds_every_box_in_a_row() {
    let mut scene = scene();
    ground(&mut scene);
    for i in 0..5 {
        cube_at(&mut scene, Point3::new(f64::from(i) * 3.0, 0.0, 0.99));
    }
    run(&mut scene, 5);

    let region = Aabb::new(Point3::new(-1.0, -1.0, 0.6), Point3::new(7.0, 1.0, 2.0));
    let mut found = 0;
    scene.query_aabb(&region, |_, shape| {
        assert_eq!(shape.half_extents(), Vector3::repeat(0.5));
        found += 1;
        true
    });
    assert_eq!(found, 3);

    assert!(scene.query_point_any(&Point3::new(12.0, 0.2, 1.0)));
    assert!(scene.query_point_any(&Point3::new(1.5, 0.0, 0.0)));
    assert!(!scene.query_point_any(&Point3::new(1.5, 0.0, 1.0)));
}

#[test]
fn debug_drawing_covers_every_box_and_touching_point() {
    let mut scene = scene();
    ground(&mut scene);
    cube_at(&mut scene, Point3::new(0.0, 0.0, 0.99));
    cube_at(&mut scene, Point3::new(3.0, 0.0, 0.99));
    scene.step().expect("step succeeds");

    let mut recorder = LineRecorder::new();
    scene.render(&mut recorder);
    assert_eq!(recorder.triangle_count(), 3 * 12);
    assert_eq!(recorder.point_count(), 8);
    assert_eq!(recorder.line_count(), 8);
}

#[test]
fn dump_lists_every_body_and_box() {
    let mut scene = scene();
    ground(&mut scene);
    cube_at(&mut scene, Point3::new(0.0, 0.0, 3.0));
    cube_at(&mut scene, Point3::new(2.0, 0.0, 3.0));
    run(&mut scene, 10);

    let mut out = String::new();
    scene.dump(&mut out).expect("writing to a String cannot fail");
    assert_eq!(out.matches("scene.create_body(&bd)?;").count(), 3);
    assert_eq!(out.matches("scene.add_box(").count(), 3);
    assert_eq!(out.matches("BodyDef::fixed()").count(), 1);
    assert_eq!(out.matches("BodyDef::dynamic()").count(), 2);
    assert!(out.contains("let mut bodies = Vec::with_capacity(3);"));
}
