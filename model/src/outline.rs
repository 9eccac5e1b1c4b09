use config::{Layout, ISO_ENTER, ISO_ENTER_ALLOWANCE, KEY_GAP, ROW_PITCH};
use earcutr::earcut;
use glam::{dvec2, DVec2};
use itertools::Itertools;

use crate::Error;

/// Points closer than this are merged.
const MERGE_DISTANCE: f64 = 1e-9;

/// The longest a mitered offset may grow relative to the offset distance.
const MITER_LIMIT: f64 = 4.0;

/// A closed polygonal contour without repeated end point.
pub type Contour = Vec<DVec2>;

/// A 2D shape made of an outer contour and holes.
///
/// The outer contour is always counterclockwise and holes are always clockwise, so the
/// outward edge normal of every contour points away from the solid.
#[derive(Clone, Debug, PartialEq)]
pub struct Outline {
    outer: Contour,
    holes: Vec<Contour>,
}

impl Outline {
    /// Creates an outline, normalizing the winding of all contours.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateOutline`] if a contour has less than three distinct points.
    pub fn new(outer: Contour, holes: Vec<Contour>) -> Result<Self, Error> {
        let outer = with_winding(cleaned(outer)?, true);
        let holes = holes
            .into_iter()
            .map(|hole| Ok(with_winding(cleaned(hole)?, false)))
            .collect::<Result<_, Error>>()?;

        Ok(Self { outer, holes })
    }

    /// Returns the outer contour.
    #[must_use]
    pub fn outer(&self) -> &[DVec2] {
        &self.outer
    }

    /// Returns the holes.
    #[must_use]
    pub fn holes(&self) -> &[Contour] {
        &self.holes
    }

    /// Returns all contours, the outer one first.
    pub fn contours(&self) -> impl Iterator<Item = &Contour> {
        std::iter::once(&self.outer).chain(&self.holes)
    }

    /// Returns the outline with every edge moved outwards by the given distance.
    ///
    /// Negative distances shrink the solid, i.e. the outer contour moves inwards while holes
    /// grow.
    #[must_use]
    pub fn offset(&self, distance: f64) -> Self {
        Self {
            outer: offset_contour(&self.outer, distance),
            holes: self
                .holes
                .iter()
                .map(|hole| offset_contour(hole, distance))
                .collect(),
        }
    }

    /// Triangulates the area between the outer contour and the holes.
    ///
    /// Indices refer to the points of all contours in the order of [`Outline::contours`], all
    /// triangles are counterclockwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Triangulation`] if the outline cannot be triangulated.
    pub fn triangulate(&self) -> Result<Vec<[usize; 3]>, Error> {
        let points: Vec<DVec2> = self.contours().flatten().copied().collect();
        let coordinates: Vec<f64> = points.iter().flat_map(DVec2::to_array).collect();

        let mut hole_indices = Vec::with_capacity(self.holes.len());
        let mut start = self.outer.len();
        for hole in &self.holes {
            hole_indices.push(start);
            start += hole.len();
        }

        let indices =
            earcut(&coordinates, &hole_indices, 2).map_err(|_| Error::Triangulation)?;

        Ok(indices
            .chunks_exact(3)
            .map(|triangle| {
                let [a, b, c] = [triangle[0], triangle[1], triangle[2]];
                if signed_area(&[points[a], points[b], points[c]]) < 0.0 {
                    [a, c, b]
                } else {
                    [a, b, c]
                }
            })
            .collect())
    }
}

/// Returns the signed area of a contour, positive for counterclockwise contours.
#[must_use]
pub fn signed_area(contour: &[DVec2]) -> f64 {
    contour
        .iter()
        .circular_tuple_windows()
        .map(|(a, b)| a.perp_dot(*b))
        .sum::<f64>()
        / 2.0
}

/// Returns a counterclockwise rectangle.
#[must_use]
pub fn rectangle(min: DVec2, max: DVec2) -> Contour {
    vec![min, dvec2(max.x, min.y), max, dvec2(min.x, max.y)]
}

/// Returns a counterclockwise rectangle with corners rounded by quadratic curves.
///
/// The radius is clamped to half of the smaller side, a radius of 0 yields a sharp rectangle.
#[must_use]
pub fn rounded_rectangle(min: DVec2, max: DVec2, radius: f64, segments: usize) -> Contour {
    let size = max - min;
    let radius = radius.clamp(0.0, size.min_element() / 2.0);
    if radius <= MERGE_DISTANCE || segments == 0 {
        return rectangle(min, max);
    }

    // Each corner is given by its control point and the directions towards the previous and
    // next corner
    let corners = [
        (dvec2(max.x, min.y), DVec2::NEG_X, DVec2::Y),
        (max, DVec2::NEG_Y, DVec2::NEG_X),
        (dvec2(min.x, max.y), DVec2::X, DVec2::NEG_Y),
        (min, DVec2::Y, DVec2::X),
    ];

    #[allow(clippy::cast_precision_loss)]
    let segments_float = segments as f64;
    let mut contour = Vec::with_capacity(4 * (segments + 1));
    for (control, towards_previous, towards_next) in corners {
        let start = control + radius * towards_previous;
        let end = control + radius * towards_next;

        for step in 0..=segments {
            #[allow(clippy::cast_precision_loss)]
            let t = step as f64 / segments_float;
            let point = (1.0 - t) * (1.0 - t) * start + 2.0 * (1.0 - t) * t * control + t * t * end;
            contour.push(point);
        }
    }

    contour
}

/// Returns one rectangular hole per contiguous run of present keys in every row.
///
/// The layout is centered on the origin, holes are shrunk by `margin` on every side so that
/// neighboring holes never touch. The upper part of an ISO Enter key, which reaches into the
/// row above, gets a hole of its own.
#[must_use]
pub fn key_holes(layout: &Layout, margin: f64) -> Vec<Contour> {
    let mut holes = Vec::new();
    let left = -layout.width / 2.0;
    let mut top = layout.height / 2.0;

    for (row, widths) in layout.rows.iter().enumerate() {
        top -= layout.row_offset(row);
        let bottom = top - ROW_PITCH;

        let mut cursor = left;
        let mut run_start = None;
        let mut key = 0;
        for &width in widths {
            if width > 0.0 {
                if layout.code(row, key) == Some(ISO_ENTER) {
                    holes.push(run_hole(
                        cursor - ISO_ENTER_ALLOWANCE,
                        cursor + width,
                        top,
                        top + layout.iso_enter_reach(row),
                        margin,
                    ));
                }
                run_start.get_or_insert(cursor);
                cursor += width;
                key += 1;
            } else {
                if let Some(start) = run_start.take() {
                    holes.push(run_hole(start, cursor, bottom, top, margin));
                }
                cursor += KEY_GAP;
            }
        }
        if let Some(start) = run_start {
            holes.push(run_hole(start, cursor, bottom, top, margin));
        }

        top = bottom;
    }

    holes
}

fn run_hole(start: f64, end: f64, bottom: f64, top: f64, margin: f64) -> Contour {
    rectangle(
        dvec2(start + margin, bottom + margin),
        dvec2(end - margin, top - margin),
    )
}

/// Removes repeated points and checks that enough points remain.
fn cleaned(mut contour: Contour) -> Result<Contour, Error> {
    contour.dedup_by(|a, b| a.distance(*b) <= MERGE_DISTANCE);
    while contour.len() > 1
        && contour
            .first()
            .zip(contour.last())
            .is_some_and(|(first, last)| first.distance(*last) <= MERGE_DISTANCE)
    {
        contour.pop();
    }

    if contour.len() < 3 || signed_area(&contour).abs() <= MERGE_DISTANCE {
        Err(Error::DegenerateOutline)
    } else {
        Ok(contour)
    }
}

/// Returns the contour in counterclockwise or clockwise winding.
fn with_winding(mut contour: Contour, counterclockwise: bool) -> Contour {
    if (signed_area(&contour) > 0.0) != counterclockwise {
        contour.reverse();
    }
    contour
}

/// Returns the outward normal of the edge from `a` to `b`.
fn edge_normal(a: DVec2, b: DVec2) -> DVec2 {
    let direction = (b - a).normalize_or_zero();
    dvec2(direction.y, -direction.x)
}

/// Moves every edge of the contour along its outward normal.
fn offset_contour(contour: &[DVec2], distance: f64) -> Contour {
    if distance == 0.0 {
        return contour.to_vec();
    }

    let count = contour.len();
    (0..count)
        .map(|index| {
            let previous = contour[(index + count - 1) % count];
            let point = contour[index];
            let next = contour[(index + 1) % count];

            let first = edge_normal(previous, point);
            let second = edge_normal(point, next);
            let bisector = (first + second).normalize_or_zero();
            let cosine = bisector.dot(first);

            let miter = if cosine > 1.0 / MITER_LIMIT {
                distance / cosine
            } else {
                distance * MITER_LIMIT
            };

            point + miter * bisector
        })
        .collect()
}
