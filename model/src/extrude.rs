use std::f64::consts::FRAC_PI_2;

use glam::{vec2, DVec2, Vec2, Vec3};

use crate::{
    geometry::{IndexedMesh, MeshBuilder},
    outline::Outline,
    Error,
};

/// The settings for extruding an outline along the Z-axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Extrusion {
    /// The total height of the extrusion including both bevels.
    pub depth: f64,
    /// How far the bevels reach into the outline.
    pub bevel_size: f64,
    /// How far each bevel reaches along the Z-axis, at most half the depth.
    pub bevel_thickness: f64,
    /// The number of segments per bevel.
    pub bevel_segments: usize,
}

/// A slice of the extrusion: the outline offset at a given height.
struct Layer {
    z: f64,
    outline: Outline,
}

impl Extrusion {
    /// Returns the layers from bottom to top.
    ///
    /// The outline is shrunk by the bevel size at the very bottom and top and reaches its full
    /// size where the bevels end, so the extrusion never exceeds the outline.
    fn layers(&self, outline: &Outline) -> Vec<Layer> {
        let thickness = self.bevel_thickness.clamp(0.0, self.depth / 2.0);
        let segments = self.bevel_segments.max(1);
        #[allow(clippy::cast_precision_loss)]
        let segments_float = segments as f64;

        let bevel = |t: f64| {
            let angle = t * FRAC_PI_2;
            (
                thickness * (1.0 - angle.cos()),
                self.bevel_size * (angle.sin() - 1.0),
            )
        };

        let mut layers = Vec::with_capacity(2 * segments + 2);
        for step in 0..=segments {
            #[allow(clippy::cast_precision_loss)]
            let (z, offset) = bevel(step as f64 / segments_float);
            layers.push(Layer {
                z,
                outline: outline.offset(offset),
            });
        }
        for step in (0..=segments).rev() {
            #[allow(clippy::cast_precision_loss)]
            let (z, offset) = bevel(step as f64 / segments_float);
            let z = self.depth - z;

            if layers.last().is_some_and(|layer| (layer.z - z).abs() < 1e-9) {
                continue;
            }
            layers.push(Layer {
                z,
                outline: outline.offset(offset),
            });
        }

        layers
    }
}

/// Extrudes an outline from `z = 0` to `z = depth` with beveled top and bottom edges.
///
/// The top cap is emitted first, followed by the side walls and the bottom cap. All faces use
/// the given material.
///
/// # Errors
///
/// Returns an [`Error`] if the caps cannot be triangulated.
pub fn extrude(
    outline: &Outline,
    extrusion: &Extrusion,
    material_index: usize,
) -> Result<IndexedMesh, Error> {
    let layers = extrusion.layers(outline);
    let (Some(bottom), Some(top)) = (layers.first(), layers.last()) else {
        return Err(Error::DegenerateOutline);
    };

    let mut builder = MeshBuilder::new();
    let (min, size) = planar_bounds(outline);
    let planar_uv = |point: DVec2| cap_uv(point, min, size);

    // Both caps use the same shrunk outline
    let cap_points: Vec<DVec2> = top.outline.contours().flatten().copied().collect();
    let triangles = top.outline.triangulate()?;

    for &[a, b, c] in &triangles {
        let corners = [a, b, c].map(|index| cap_points[index]);
        builder.push_triangle(
            corners.map(|point| point3(point, top.z)),
            corners.map(planar_uv),
            material_index,
        );
    }

    for (lower, upper) in layers.iter().zip(layers.iter().skip(1)) {
        for (lower_contour, upper_contour) in lower.outline.contours().zip(upper.outline.contours())
        {
            push_wall(
                &mut builder,
                lower_contour,
                upper_contour,
                (lower.z, upper.z),
                extrusion.depth,
                material_index,
            );
        }
    }

    for &[a, b, c] in &triangles {
        let corners = [a, c, b].map(|index| cap_points[index]);
        builder.push_triangle(
            corners.map(|point| point3(point, bottom.z)),
            corners.map(planar_uv),
            material_index,
        );
    }

    Ok(builder.build())
}

/// Adds the wall between two corresponding contours of neighboring layers.
fn push_wall(
    builder: &mut MeshBuilder,
    lower: &[DVec2],
    upper: &[DVec2],
    (lower_z, upper_z): (f64, f64),
    depth: f64,
    material_index: usize,
) {
    let count = lower.len();
    #[allow(clippy::cast_possible_truncation)]
    let (v_lower, v_upper) = ((lower_z / depth) as f32, (upper_z / depth) as f32);
    let mut u = 0.0;

    for index in 0..count {
        let next = (index + 1) % count;
        #[allow(clippy::cast_possible_truncation)]
        let length = lower[index].distance(lower[next]) as f32;

        builder.push_quad(
            [
                point3(lower[index], lower_z),
                point3(lower[next], lower_z),
                point3(upper[next], upper_z),
                point3(upper[index], upper_z),
            ],
            [
                vec2(u, v_lower),
                vec2(u + length, v_lower),
                vec2(u + length, v_upper),
                vec2(u, v_upper),
            ],
            material_index,
        );
        u += length;
    }
}

/// Returns the minimum corner and size of the outline's bounding rectangle.
fn planar_bounds(outline: &Outline) -> (DVec2, DVec2) {
    let (min, max) = outline.outer().iter().fold(
        (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
        |(min, max), point| (min.min(*point), max.max(*point)),
    );

    (min, (max - min).max(DVec2::splat(f64::EPSILON)))
}

/// Lifts a 2D point to 3D at the given height.
#[allow(clippy::cast_possible_truncation)]
fn point3(point: DVec2, z: f64) -> Vec3 {
    Vec3::new(point.x as f32, point.y as f32, z as f32)
}

/// Returns the UVs used for a point on a planar cap with the given bounds.
fn cap_uv(point: DVec2, min: DVec2, size: DVec2) -> Vec2 {
    ((point - min) / size).as_vec2()
}

#[cfg(test)]
mod tests {
    use glam::dvec2;

    use super::*;
    use crate::outline::rectangle;

    fn extrusion() -> Extrusion {
        Extrusion {
            depth: 1.0,
            bevel_size: 0.1,
            bevel_thickness: 0.1,
            bevel_segments: 3,
        }
    }

    fn square_with_hole() -> Outline {
        Outline::new(
            rectangle(DVec2::ZERO, dvec2(4.0, 4.0)),
            vec![rectangle(dvec2(1.0, 1.0), dvec2(3.0, 3.0))],
        )
        .unwrap()
    }

    #[test]
    fn extrusion_stays_within_outline() {
        let mesh = extrude(&square_with_hole(), &extrusion(), 0).unwrap();
        let bounds = mesh.bounds().unwrap();

        assert!((bounds.min - Vec3::ZERO).length() < 1e-6);
        assert!((bounds.max - Vec3::new(4.0, 4.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn layer_count_follows_bevel_segments() {
        let layers = extrusion().layers(&square_with_hole());

        assert_eq!(layers.len(), 8);
        assert!(layers.windows(2).all(|pair| pair[0].z < pair[1].z));
    }

    #[test]
    fn thick_bevels_share_the_middle_layer() {
        let extrusion = Extrusion {
            bevel_thickness: 2.0,
            ..extrusion()
        };

        let layers = extrusion.layers(&square_with_hole());
        assert_eq!(layers.len(), 7);
    }

    #[test]
    fn caps_face_outwards() {
        let mesh = extrude(&square_with_hole(), &extrusion(), 0).unwrap();

        let up = mesh.normals.iter().filter(|normal| normal.z > 0.99).count();
        let down = mesh.normals.iter().filter(|normal| normal.z < -0.99).count();
        assert_eq!(up, down);
        assert!(up > 0);

        // The first triangle belongs to the top cap
        assert!(mesh.normals[0].z > 0.99);
    }

    #[test]
    fn walls_face_away_from_the_solid() {
        let mesh = extrude(&square_with_hole(), &extrusion(), 0).unwrap();

        for triangle in 0..mesh.triangle_count() {
            let normal = mesh.normals[triangle * 3];
            if normal.z.abs() > 0.01 {
                continue;
            }
            let [a, b, c] = mesh.triangle(triangle);
            let center = (a + b + c) / 3.0;
            let on_outer_wall = center.x < 0.01
                || center.x > 3.99
                || center.y < 0.01
                || center.y > 3.99;

            let towards_center = (Vec3::new(2.0, 2.0, center.z) - center).dot(normal);
            if on_outer_wall {
                assert!(towards_center < 0.0);
            } else {
                assert!(towards_center > 0.0);
            }
        }
    }

    #[test]
    fn single_material_group() {
        let mesh = extrude(&square_with_hole(), &extrusion(), 3).unwrap();

        assert_eq!(mesh.groups.len(), 1);
        assert_eq!(mesh.groups[0].material_index, 3);
    }

    #[test]
    fn cap_uvs_span_the_outline() {
        let uv = cap_uv(dvec2(2.0, 1.0), DVec2::ZERO, dvec2(4.0, 4.0));
        assert_eq!(uv, vec2(0.5, 0.25));
    }
}
