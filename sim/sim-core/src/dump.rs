//! Textual scene dump.
//!
//! [`Scene::dump`] writes Rust statements that rebuild the scene against
//! this crate's API: the full [`SceneConfig`](sim_types::SceneConfig) and
//! the `Scene::new` call first, then one block per body with its
//! definition and boxes. Reals are printed with 15 decimals. Pasting the
//! output into a function that returns `sim_types::Result<_>` reproduces
//! the scene, which makes bug reports replayable.

use std::fmt::{self, Write};

use nalgebra::{Point3, Vector3};
use sim_types::{BodyKind, MixingRule, SceneConfig, Transform};

use crate::body::Body;
use crate::scene::Scene;
use crate::shape::BoxShape;

struct Vec3(Vector3<f64>);

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3::new({:.15}, {:.15}, {:.15})", self.0.x, self.0.y, self.0.z)
    }
}

struct Pt3(Point3<f64>);

impl fmt::Display for Pt3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point3::new({:.15}, {:.15}, {:.15})", self.0.x, self.0.y, self.0.z)
    }
}

struct Tx<'a>(&'a Transform);

impl fmt::Display for Tx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.0.rotation;
        write!(f, "Transform::new({}, Matrix3::new(", Pt3(self.0.position))?;
        for i in 0..3 {
            for j in 0..3 {
                if i + j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{:.15}", r[(i, j)])?;
            }
        }
        f.write_str("))")
    }
}

fn constructor(kind: BodyKind) -> &'static str {
    match kind {
        BodyKind::Static => "fixed",
        BodyKind::Dynamic => "dynamic",
        BodyKind::Kinematic => "kinematic",
    }
}

fn rule(mixing: MixingRule) -> &'static str {
    match mixing {
        MixingRule::GeometricMean => "MixingRule::GeometricMean",
        MixingRule::Average => "MixingRule::Average",
        MixingRule::Minimum => "MixingRule::Minimum",
        MixingRule::Maximum => "MixingRule::Maximum",
        MixingRule::Multiply => "MixingRule::Multiply",
    }
}

fn dump_config(w: &mut impl Write, config: &SceneConfig, mutable: bool) -> fmt::Result {
    let binding = if mutable { "let mut scene" } else { "let scene" };
    writeln!(w, "{binding} = Scene::new(SceneConfig {{")?;
    writeln!(w, "    timestep: {:.15},", config.timestep)?;
    writeln!(w, "    gravity: {},", Vec3(config.gravity))?;
    writeln!(w, "    iterations: {},", config.iterations)?;
    writeln!(w, "    allow_sleep: {},", config.allow_sleep)?;
    writeln!(w, "    enable_friction: {},", config.enable_friction)?;

    let solver = &config.solver;
    writeln!(w, "    solver: SolverConfig {{")?;
    writeln!(w, "        baumgarte: {:.15},", solver.baumgarte)?;
    writeln!(w, "        penetration_slop: {:.15},", solver.penetration_slop)?;
    writeln!(w, "        restitution_threshold: {:.15},", solver.restitution_threshold)?;
    writeln!(w, "    }},")?;

    let sleep = &config.sleep;
    writeln!(w, "    sleep: SleepConfig {{")?;
    writeln!(w, "        linear_tolerance: {:.15},", sleep.linear_tolerance)?;
    writeln!(w, "        angular_tolerance: {:.15},", sleep.angular_tolerance)?;
    writeln!(w, "        time_to_sleep: {:.15},", sleep.time_to_sleep)?;
    writeln!(w, "    }},")?;

    writeln!(w, "    mixing: MaterialMixing {{")?;
    writeln!(w, "        friction: {},", rule(config.mixing.friction))?;
    writeln!(w, "        restitution: {},", rule(config.mixing.restitution))?;
    writeln!(w, "    }},")?;

    writeln!(w, "    aabb_margin: {:.15},", config.aabb_margin)?;
    writeln!(w, "    heap_bytes: {},", config.heap_bytes)?;
    writeln!(w, "    contacts_per_page: {},", config.contacts_per_page)?;
    match config.island_capacity {
        Some(limit) => writeln!(w, "    island_capacity: Some({limit}),")?,
        None => writeln!(w, "    island_capacity: None,")?,
    }
    writeln!(w, "}})?;")
}

impl Scene {
    /// Write replayable construction statements for the whole scene.
    ///
    /// # Errors
    ///
    /// Propagates errors from the sink.
    pub fn dump(&self, w: &mut impl Write) -> fmt::Result {
        let count = self.body_count();
        dump_config(w, self.config(), count > 0)?;
        if count == 0 {
            return Ok(());
        }
        writeln!(w, "let mut bodies = Vec::with_capacity({count});")?;

        for (_, body) in self.bodies() {
            writeln!(w)?;
            self.dump_body(w, body)?;
        }
        Ok(())
    }

    fn dump_body(&self, w: &mut impl Write, body: &Body) -> fmt::Result {
        let (axis, angle) = body
            .quaternion()
            .axis_angle()
            .map_or((Vector3::z(), 0.0), |(axis, angle)| (axis.into_inner(), angle));
        let [lx, ly, lz] = body.locked_axes();

        writeln!(w, "{{")?;
        writeln!(w, "    let bd = BodyDef::{}()", constructor(body.kind()))?;
        writeln!(w, "        .with_position({})", Pt3(body.position()))?;
        writeln!(w, "        .with_rotation({}, {angle:.15})", Vec3(axis))?;
        writeln!(w, "        .with_linear_velocity({})", Vec3(body.linear_velocity()))?;
        writeln!(w, "        .with_angular_velocity({})", Vec3(body.angular_velocity()))?;
        writeln!(w, "        .with_gravity_scale({:.15})", body.gravity_scale())?;
        writeln!(w, "        .with_layers({:#010x})", body.layers())?;
        writeln!(
            w,
            "        .with_damping({:.15}, {:.15})",
            body.linear_damping(),
            body.angular_damping()
        )?;
        writeln!(w, "        .with_locked_axes({lx}, {ly}, {lz})")?;
        writeln!(w, "        .with_user_data({})", body.user_data())?;
        if !body.allows_sleep() {
            writeln!(w, "        .never_sleep()")?;
        }
        if !body.is_awake() {
            writeln!(w, "        .asleep()")?;
        }
        writeln!(w, "        ;")?;
        writeln!(w, "    let body = scene.create_body(&bd)?;")?;

        for shape in body.boxes().iter().filter_map(|h| self.shape(*h)) {
            dump_box(w, shape)?;
        }

        writeln!(w, "    bodies.push(body);")?;
        writeln!(w, "}}")
    }
}

fn dump_box(w: &mut impl Write, shape: &BoxShape) -> fmt::Result {
    writeln!(w, "    scene.add_box(")?;
    writeln!(w, "        body,")?;
    writeln!(
        w,
        "        &BoxDef::new({}, {})",
        Tx(shape.local_transform()),
        Vec3(shape.half_extents())
    )?;
    writeln!(w, "            .with_friction({:.15})", shape.friction())?;
    writeln!(w, "            .with_restitution({:.15})", shape.restitution())?;
    writeln!(w, "            .with_density({:.15})", shape.density())?;
    writeln!(w, "            .with_user_data({})", shape.user_data())?;
    if shape.is_sensor() {
        writeln!(w, "            .as_sensor()")?;
    }
    writeln!(w, "    )?;")
}
