use config::{Case, CaseStyle, Layout, EPSILON};
use glam::{dvec2, Vec3};

use crate::{
    extrude::{extrude, Extrusion},
    geometry::IndexedMesh,
    outline::{key_holes, rectangle, rounded_rectangle, Outline},
    Error,
};

/// The height of the case, the top surface lies at `z = 0`.
pub const CASE_DEPTH: f64 = 0.75;

/// The distance between the key holes and the key area boundary.
pub const HOLE_MARGIN: f64 = 0.1;

/// The number of segments used for every rounded corner.
const CORNER_SEGMENTS: usize = 8;

/// The geometric parameters of a case.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CaseSettings {
    /// The space between the key area and the outer case edge.
    pub bezel: f64,
    /// The corner radius of rounded cases.
    pub corner_radius: f64,
    /// How far the bevels reach into the outline.
    pub bevel_size: f64,
    /// How far the bevels reach along the Z-axis.
    pub bevel_thickness: f64,
    /// The number of segments per bevel.
    pub bevel_segments: usize,
}

impl CaseSettings {
    /// Checks the settings for consistency.
    fn validate(&self) -> Result<(), Error> {
        let non_negative = [
            ("bezel", self.bezel),
            ("corner radius", self.corner_radius),
            ("bevel size", self.bevel_size),
            ("bevel thickness", self.bevel_thickness),
        ];
        if let Some((name, value)) = non_negative
            .iter()
            .find(|(_, value)| !(value.is_finite() && *value >= 0.0))
        {
            return Err(Error::InvalidCase(format!(
                "{name} `{value}` is not a non-negative number"
            )));
        }
        if self.bevel_size >= HOLE_MARGIN {
            return Err(Error::InvalidCase(format!(
                "bevel size `{}` must be smaller than the hole margin `{HOLE_MARGIN}`",
                self.bevel_size
            )));
        }
        if self.bevel_size >= self.bezel + HOLE_MARGIN {
            return Err(Error::InvalidCase(format!(
                "bevel size `{}` does not fit into the bezel `{}`",
                self.bevel_size, self.bezel
            )));
        }

        Ok(())
    }
}

impl Default for CaseSettings {
    fn default() -> Self {
        Self {
            bezel: 0.5,
            corner_radius: 0.5,
            bevel_size: 0.05,
            bevel_thickness: 0.05,
            bevel_segments: 3,
        }
    }
}

impl From<&Case> for CaseSettings {
    fn from(case: &Case) -> Self {
        Self {
            bezel: case.bezel.into(),
            corner_radius: case.corner_radius.into(),
            bevel_size: case.bevel.size.into(),
            bevel_thickness: case.bevel.thickness.into(),
            bevel_segments: case.bevel.segments.get().into(),
        }
    }
}

/// A built case.
#[derive(Clone, Debug, PartialEq)]
pub struct CaseMesh {
    /// The case mesh using a single material.
    pub mesh: IndexedMesh,
    /// The number of holes punched into the case.
    pub hole_count: usize,
}

/// Builds the case for the given layout.
///
/// The case spans the layout plus the bezel on every side and is centered on the origin with
/// its top surface at `z = 0`. Every contiguous run of keys gets a hole.
///
/// # Errors
///
/// Returns an [`Error`] if the layout or settings are invalid, the case is never built from
/// malformed input.
pub fn build_case(
    layout: &Layout,
    style: CaseStyle,
    settings: &CaseSettings,
) -> Result<CaseMesh, Error> {
    layout.validate()?;
    settings.validate()?;

    let half_size = dvec2(
        layout.width / 2.0 + settings.bezel,
        layout.height / 2.0 + settings.bezel,
    );
    let outer = match style {
        CaseStyle::Rounded => rounded_rectangle(
            -half_size,
            half_size,
            settings.corner_radius,
            CORNER_SEGMENTS,
        ),
        CaseStyle::Sharp => rectangle(-half_size, half_size),
    };
    let holes = key_holes(layout, HOLE_MARGIN);
    let hole_count = holes.len();
    let outline = Outline::new(outer, holes)?;

    let extrusion = Extrusion {
        depth: CASE_DEPTH,
        bevel_size: settings.bevel_size,
        bevel_thickness: settings.bevel_thickness,
        bevel_segments: settings.bevel_segments,
    };
    let mut mesh = extrude(&outline, &extrusion, 0)?;

    #[allow(clippy::cast_possible_truncation)]
    let depth = CASE_DEPTH as f32;
    mesh.map_positions(|position| position - Vec3::Z * depth);

    if style == CaseStyle::Sharp {
        #[allow(clippy::cast_possible_truncation)]
        let (rear, lip, threshold) = (
            (layout.height / 2.0) as f32,
            lip_height(layout.height) as f32,
            -EPSILON as f32,
        );
        mesh.map_positions(|position| {
            if position.z >= threshold && position.y > rear {
                position + Vec3::Z * lip
            } else {
                position
            }
        });
    }

    Ok(CaseMesh { mesh, hole_count })
}

/// Returns how far the rear lip of a sharp case rises above the top surface.
#[must_use]
pub fn lip_height(layout_height: f64) -> f64 {
    if layout_height > 6.0 {
        0.67
    } else if layout_height > 5.0 {
        0.55
    } else {
        0.5
    }
}
