//! Debug drawing through an abstract pen-based renderer.
//!
//! The scene never talks to a graphics API. It drives a [`DebugRenderer`]
//! the way a plotter is driven: set a color and a pen position, then draw
//! lines from the pen, triangles with an explicit normal, or points.
//! [`LineRecorder`] is an implementation that records every call, for
//! tests and headless inspection.

use nalgebra::{Point3, Vector3};

use crate::aabb::Aabb;
use crate::scene::Scene;
use crate::shape::BOX_TRIANGLES;

/// Length of the normal line drawn at each contact point.
const CONTACT_NORMAL_LENGTH: f64 = 0.5;
/// Point scale used for contact points.
const CONTACT_POINT_SCALE: f64 = 10.0;

const AWAKE_COLOR: [f32; 4] = [0.2, 0.4, 0.7, 1.0];
const ASLEEP_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
const PERSISTENT_CONTACT_COLOR: [f32; 4] = [0.2, 0.2, 1.0, 1.0];
const NEW_CONTACT_COLOR: [f32; 4] = [1.0, 0.2, 0.4, 1.0];
const NORMAL_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const TREE_COLOR: [f32; 4] = [0.5, 0.5, 1.0, 1.0];

/// Sink for debug geometry.
pub trait DebugRenderer {
    /// Color used by subsequent draw calls.
    fn set_pen_color(&mut self, r: f32, g: f32, b: f32, a: f32);

    /// Move the pen without drawing.
    fn set_pen_position(&mut self, p: Point3<f64>);

    /// Scale used by [`DebugRenderer::point`].
    fn set_scale(&mut self, s: Vector3<f64>);

    /// Draw a line from the pen to `p` and leave the pen at `p`.
    fn line(&mut self, p: Point3<f64>);

    /// Normal used by the next [`DebugRenderer::triangle`].
    fn set_tri_normal(&mut self, n: Vector3<f64>);

    /// Draw a triangle.
    fn triangle(&mut self, a: Point3<f64>, b: Point3<f64>, c: Point3<f64>);

    /// Draw a point at the pen position.
    fn point(&mut self);
}

/// A recorded draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    /// A line segment.
    Line {
        /// Start point.
        from: Point3<f64>,
        /// End point.
        to: Point3<f64>,
        /// RGBA color.
        color: [f32; 4],
    },
    /// A triangle.
    Triangle {
        /// Corners.
        vertices: [Point3<f64>; 3],
        /// Face normal.
        normal: Vector3<f64>,
        /// RGBA color.
        color: [f32; 4],
    },
    /// A point.
    Point {
        /// Position.
        at: Point3<f64>,
        /// Scale.
        scale: Vector3<f64>,
        /// RGBA color.
        color: [f32; 4],
    },
}

/// A [`DebugRenderer`] that keeps every draw call in order.
#[derive(Debug, Clone)]
pub struct LineRecorder {
    color: [f32; 4],
    pen: Point3<f64>,
    scale: Vector3<f64>,
    normal: Vector3<f64>,
    commands: Vec<DrawCommand>,
}

impl Default for LineRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineRecorder {
    /// An empty recorder with a white pen at the origin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: [1.0; 4],
            pen: Point3::origin(),
            scale: Vector3::repeat(1.0),
            normal: Vector3::z(),
            commands: Vec::new(),
        }
    }

    /// Every draw call so far.
    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of lines drawn.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count()
    }

    /// Number of triangles drawn.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Triangle { .. }))
            .count()
    }

    /// Number of points drawn.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Point { .. }))
            .count()
    }

    /// Forget recorded calls, keeping the pen state.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl DebugRenderer for LineRecorder {
    fn set_pen_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.color = [r, g, b, a];
    }

    fn set_pen_position(&mut self, p: Point3<f64>) {
        self.pen = p;
    }

    fn set_scale(&mut self, s: Vector3<f64>) {
        self.scale = s;
    }

    fn line(&mut self, p: Point3<f64>) {
        self.commands.push(DrawCommand::Line {
            from: self.pen,
            to: p,
            color: self.color,
        });
        self.pen = p;
    }

    fn set_tri_normal(&mut self, n: Vector3<f64>) {
        self.normal = n;
    }

    fn triangle(&mut self, a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) {
        self.commands.push(DrawCommand::Triangle {
            vertices: [a, b, c],
            normal: self.normal,
            color: self.color,
        });
    }

    fn point(&mut self) {
        self.commands.push(DrawCommand::Point {
            at: self.pen,
            scale: self.scale,
            color: self.color,
        });
    }
}

fn set_color(render: &mut impl DebugRenderer, [r, g, b, a]: [f32; 4]) {
    render.set_pen_color(r, g, b, a);
}

/// Draw the twelve edges of `aabb`.
pub fn draw_aabb(render: &mut impl DebugRenderer, aabb: &Aabb) {
    let (lo, hi) = (aabb.min, aabb.max);

    // Top and bottom rings
    for y in [hi.y, lo.y] {
        render.set_pen_position(Point3::new(lo.x, y, lo.z));
        render.line(Point3::new(lo.x, y, hi.z));
        render.line(Point3::new(hi.x, y, hi.z));
        render.line(Point3::new(hi.x, y, lo.z));
        render.line(Point3::new(lo.x, y, lo.z));
    }

    // Verticals
    for (x, z) in [(lo.x, lo.z), (hi.x, lo.z), (hi.x, hi.z), (lo.x, hi.z)] {
        render.set_pen_position(Point3::new(x, lo.y, z));
        render.line(Point3::new(x, hi.y, z));
    }
}

impl Scene {
    /// Draw every box and every touching contact.
    pub fn render(&self, render: &mut impl DebugRenderer) {
        self.render_boxes(render);
        self.render_contacts(render);
    }

    /// Draw every box as twelve triangles, colored by whether its body is
    /// awake.
    pub fn render_boxes(&self, render: &mut impl DebugRenderer) {
        for (_, body) in self.bodies() {
            set_color(render, if body.is_awake() { AWAKE_COLOR } else { ASLEEP_COLOR });
            for handle in body.boxes() {
                let Some(shape) = self.shape(*handle) else {
                    continue;
                };
                let vertices = shape.oriented(body.transform()).vertices();
                for [i, j, k] in BOX_TRIANGLES {
                    let (a, b, c) = (vertices[i], vertices[j], vertices[k]);
                    render.set_tri_normal((b - a).cross(&(c - a)).normalize());
                    render.triangle(a, b, c);
                }
            }
        }
    }

    /// Draw each point of each touching contact, plus its normal.
    pub fn render_contacts(&self, render: &mut impl DebugRenderer) {
        for (_, contact) in self.contacts() {
            if !contact.is_colliding() {
                continue;
            }
            let manifold = contact.manifold();
            for point in &manifold.contacts {
                set_color(
                    render,
                    if point.warm_started > 0 {
                        PERSISTENT_CONTACT_COLOR
                    } else {
                        NEW_CONTACT_COLOR
                    },
                );
                render.set_pen_position(point.position);
                render.set_scale(Vector3::repeat(CONTACT_POINT_SCALE));
                render.point();

                set_color(render, NORMAL_COLOR);
                render.set_pen_position(point.position);
                render.line(point.position + manifold.normal * CONTACT_NORMAL_LENGTH);
            }
        }
    }

    /// Draw every node of the broad-phase tree.
    pub fn render_broad_phase(&self, render: &mut impl DebugRenderer) {
        set_color(render, TREE_COLOR);
        self.contacts
            .broad_phase
            .tree()
            .visit_nodes(|aabb, _, _| draw_aabb(&mut *render, aabb));
    }
}
