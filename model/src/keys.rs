use std::{collections::HashMap, rc::Rc};

use config::{Layout, ISO_ENTER, ISO_ENTER_ALLOWANCE, KEY_GAP, ROW_PITCH};
use glam::{dvec2, DVec2, DVec3, Vec2, Vec3};

use crate::{
    geometry::{compile, face_normal, Face, IndexedMesh, LegacyGeometry, MeshBuilder},
    outline::{rectangle, Contour, Outline},
    Error,
};

/// The material index of the keycap faces carrying the legend.
pub const KEYCAP_TOP_MATERIAL: usize = 0;

/// The material index of all other keycap faces.
pub const KEYCAP_SIDE_MATERIAL: usize = 1;

/// The height of a keycap.
pub const KEYCAP_HEIGHT: f64 = 0.45;

/// The height of a switch housing.
pub const SWITCH_HEIGHT: f64 = 0.4;

/// The space between neighboring keycaps, split evenly between both keys.
const KEYCAP_GUTTER: f64 = 0.05;

/// How far the top face of a keycap is inset from its footprint.
const KEYCAP_TAPER: f64 = 0.08;

/// The height of the keycap bottom above the case top surface.
const KEYCAP_ELEVATION: f64 = 0.15;

/// How far the switch housing is inset from the key footprint.
const SWITCH_INSET: f64 = 0.2;

/// The depth of a switch housing along the Y-axis.
const SWITCH_DEPTH: f64 = 0.6;

/// The height of the switch housing bottom below the case top surface.
const SWITCH_SINK: f64 = 0.3;

/// The footprint of a key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyShape {
    /// A rectangular key.
    Rectangular,
    /// An L-shaped ISO Enter key whose upper part reaches into the row above.
    IsoEnter,
}

/// A key placed on the layout.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyInstance {
    /// The key code, empty if the layout has no codes.
    pub code: String,
    /// The row of the key, counted from the rear.
    pub row: usize,
    /// The index of the key within its row, gaps not counted.
    pub col: usize,
    /// The width of the keycap bounding box in key units.
    pub unit_width: f64,
    /// The height of the keycap bounding box in key units.
    pub unit_height: f64,
    /// The center of the key within its row.
    pub position: DVec3,
    /// The footprint of the key.
    pub shape: KeyShape,
    /// The offset of the legend from the center of the keycap bounding box in key units.
    pub legend_offset: DVec2,
}

impl KeyInstance {
    /// Returns the width the key occupies in its row.
    #[must_use]
    pub fn row_width(&self) -> f64 {
        match self.shape {
            KeyShape::Rectangular => self.unit_width,
            KeyShape::IsoEnter => self.unit_width - ISO_ENTER_ALLOWANCE,
        }
    }

    /// Returns the key footprint relative to the key position.
    fn footprint(&self) -> Contour {
        let half_width = self.row_width() / 2.0;
        let half_pitch = ROW_PITCH / 2.0;

        match self.shape {
            KeyShape::Rectangular => rectangle(
                dvec2(-half_width, -half_pitch),
                dvec2(half_width, half_pitch),
            ),
            KeyShape::IsoEnter => {
                let left = -half_width - ISO_ENTER_ALLOWANCE;
                let top = self.unit_height - half_pitch;

                vec![
                    dvec2(-half_width, -half_pitch),
                    dvec2(half_width, -half_pitch),
                    dvec2(half_width, top),
                    dvec2(left, top),
                    dvec2(left, half_pitch),
                    dvec2(-half_width, half_pitch),
                ]
            }
        }
    }

    /// Returns the bounding rectangle of the footprint relative to the key position.
    fn bounding_rectangle(&self) -> (DVec2, DVec2) {
        let half_pitch = ROW_PITCH / 2.0;
        let max = dvec2(self.row_width() / 2.0, self.unit_height - half_pitch);

        (max - dvec2(self.unit_width, self.unit_height), max)
    }

    /// Returns the bounding rectangle of the keycap top face relative to the key position.
    ///
    /// Legend textures are stretched across this rectangle, so their edges line up with the
    /// edges of the top face.
    fn top_rectangle(&self) -> (DVec2, DVec2) {
        let (min, max) = self.bounding_rectangle();
        let inset = DVec2::splat(KEYCAP_GUTTER / 2.0 + KEYCAP_TAPER);

        (min + inset, max - inset)
    }
}

/// Returns all keys of the layout.
///
/// Rows are walked from the rear to the front with a cursor starting at the left layout edge.
/// A width of 0 advances the cursor by [`KEY_GAP`], any other width places a key centered in
/// the space it covers.
#[must_use]
pub fn key_instances(layout: &Layout) -> Vec<KeyInstance> {
    let mut instances = Vec::new();
    let left = -layout.width / 2.0;
    let mut top = layout.height / 2.0;

    for (row, widths) in layout.rows.iter().enumerate() {
        top -= layout.row_offset(row);
        let center_y = top - ROW_PITCH / 2.0;

        let mut cursor = left;
        let mut col = 0;
        for &width in widths {
            if width <= 0.0 {
                cursor += KEY_GAP;
                continue;
            }

            let code = layout.code(row, col).unwrap_or_default().to_owned();
            let (shape, unit_width, unit_height, legend_offset) = if code == ISO_ENTER {
                (
                    KeyShape::IsoEnter,
                    width + ISO_ENTER_ALLOWANCE,
                    ROW_PITCH + layout.iso_enter_reach(row),
                    // Centers the legend on the upper part
                    dvec2(0.0, ROW_PITCH / 2.0),
                )
            } else {
                (KeyShape::Rectangular, width, ROW_PITCH, DVec2::ZERO)
            };

            instances.push(KeyInstance {
                code,
                row,
                col,
                unit_width,
                unit_height,
                position: DVec3::new(cursor + width / 2.0, center_y, 0.0),
                shape,
                legend_offset,
            });

            cursor += width;
            col += 1;
        }

        top -= ROW_PITCH;
    }

    instances
}

/// The semantic class of a keycap face.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaceKind {
    /// A face carrying the legend.
    Top,
    /// Any other face.
    Side,
}

/// Classifies a face by its normal, faces whose normal points mostly upwards are top faces.
#[must_use]
pub fn classify_face(normal: Vec3) -> FaceKind {
    if normal.z > normal.x.abs().max(normal.y.abs()) {
        FaceKind::Top
    } else {
        FaceKind::Side
    }
}

/// Builds the keycap mesh of a key relative to its position.
///
/// The keycap is a tapered prism over the key footprint. Top faces come first and use
/// [`KEYCAP_TOP_MATERIAL`] with UVs spanning the bounding box of the top face, all other faces use
/// [`KEYCAP_SIDE_MATERIAL`].
///
/// # Errors
///
/// Returns an [`Error`] if the footprint cannot be triangulated.
pub fn keycap_mesh(key: &KeyInstance) -> Result<IndexedMesh, Error> {
    let base = Outline::new(key.footprint(), Vec::new())?.offset(-KEYCAP_GUTTER / 2.0);
    let top = base.offset(-KEYCAP_TAPER);
    let (bottom_ring, top_ring) = (base.outer(), top.outer());
    let count = bottom_ring.len();

    let (min, max) = key.top_rectangle();
    let size = max - min;
    let top_uv = |point: DVec2| ((point - min) / size).as_vec2();

    let (bottom_z, top_z) = (KEYCAP_ELEVATION, KEYCAP_ELEVATION + KEYCAP_HEIGHT);
    let mut geometry = LegacyGeometry {
        vertices: bottom_ring
            .iter()
            .map(|point| lift(*point, bottom_z))
            .chain(top_ring.iter().map(|point| lift(*point, top_z)))
            .collect(),
        faces: Vec::new(),
    };

    for index in 0..count {
        let next = (index + 1) % count;
        let quad = [index, next, count + next, count + index];
        geometry.faces.push(
            Face::new(quad[0], quad[1], quad[2]).with_uvs([
                Vec2::ZERO,
                Vec2::X,
                Vec2::ONE,
            ]),
        );
        geometry.faces.push(
            Face::new(quad[0], quad[2], quad[3]).with_uvs([
                Vec2::ZERO,
                Vec2::ONE,
                Vec2::Y,
            ]),
        );
    }
    for [a, b, c] in top.triangulate()? {
        geometry.faces.push(
            Face::new(count + a, count + b, count + c)
                .with_uvs([a, b, c].map(|index| top_uv(top_ring[index]))),
        );
    }
    for [a, b, c] in base.triangulate()? {
        geometry.faces.push(Face::new(a, c, b));
    }

    // Top faces first, regardless of construction order
    let (top_faces, side_faces): (Vec<Face>, Vec<Face>) = std::mem::take(&mut geometry.faces)
        .into_iter()
        .partition(|face| {
            classify_face(face_normal(face.vertices.map(|vertex| geometry.vertices[vertex])))
                == FaceKind::Top
        });
    geometry.faces = top_faces
        .into_iter()
        .map(|face| face.with_material(KEYCAP_TOP_MATERIAL))
        .chain(
            side_faces
                .into_iter()
                .map(|face| face.with_material(KEYCAP_SIDE_MATERIAL)),
        )
        .collect();

    Ok(compile(&geometry))
}

/// Builds the switch housing mesh of a key relative to its position.
///
/// The housing is a box centered on the row part of the key, sunk into the case.
#[must_use]
pub fn switch_mesh(key: &KeyInstance) -> IndexedMesh {
    let half_width = (key.row_width() / 2.0 - SWITCH_INSET).max(SWITCH_INSET);
    let half_depth = SWITCH_DEPTH / 2.0;
    let (bottom, top) = (-SWITCH_SINK, SWITCH_HEIGHT - SWITCH_SINK);

    let corners = rectangle(dvec2(-half_width, -half_depth), dvec2(half_width, half_depth));
    let lower = corners.iter().map(|point| lift(*point, bottom));
    let upper = corners.iter().map(|point| lift(*point, top));
    let (lower, upper): (Vec<_>, Vec<_>) = (lower.collect(), upper.collect());
    let uvs = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];

    let mut builder = MeshBuilder::new();
    builder.push_quad([upper[0], upper[1], upper[2], upper[3]], uvs, 0);
    for index in 0..4 {
        let next = (index + 1) % 4;
        builder.push_quad(
            [lower[index], lower[next], upper[next], upper[index]],
            uvs,
            0,
        );
    }
    builder.push_quad([lower[3], lower[2], lower[1], lower[0]], uvs, 0);

    builder.build()
}

/// Lifts a 2D point to 3D at the given height.
#[allow(clippy::cast_possible_truncation)]
fn lift(point: DVec2, z: f64) -> Vec3 {
    Vec3::new(point.x as f32, point.y as f32, z as f32)
}

/// A key with its meshes.
#[derive(Clone, Debug)]
pub struct Key {
    /// The placement of the key.
    pub instance: KeyInstance,
    /// The keycap mesh relative to the key position.
    pub keycap: Rc<IndexedMesh>,
    /// The switch housing mesh relative to the key position.
    pub switch: Rc<IndexedMesh>,
}

/// The keys of a layout.
///
/// Keys with the same footprint share their meshes.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    /// All keys in layout order.
    pub keys: Vec<Key>,
}

impl KeySet {
    /// Builds the keys of the given layout.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the layout is invalid.
    pub fn build(layout: &Layout) -> Result<Self, Error> {
        layout.validate()?;

        let mut meshes: HashMap<(KeyShape, u64, u64), (Rc<IndexedMesh>, Rc<IndexedMesh>)> =
            HashMap::new();
        let mut keys = Vec::new();

        for instance in key_instances(layout) {
            let footprint = (
                instance.shape,
                instance.unit_width.to_bits(),
                instance.unit_height.to_bits(),
            );
            let (keycap, switch) = if let Some(meshes) = meshes.get(&footprint) {
                meshes.clone()
            } else {
                let built = (
                    Rc::new(keycap_mesh(&instance)?),
                    Rc::new(switch_mesh(&instance)),
                );
                meshes.insert(footprint, built.clone());
                built
            };

            keys.push(Key {
                instance,
                keycap,
                switch,
            });
        }

        Ok(Self { keys })
    }

    /// Returns the switch housing meshes with their positions.
    pub fn switch_meshes(&self) -> impl Iterator<Item = (&IndexedMesh, Vec3)> {
        self.keys
            .iter()
            .map(|key| (key.switch.as_ref(), key.instance.position.as_vec3()))
    }

    /// Returns the keycap meshes with their positions.
    pub fn keycap_meshes(&self) -> impl Iterator<Item = (&IndexedMesh, Vec3)> {
        self.keys
            .iter()
            .map(|key| (key.keycap.as_ref(), key.instance.position.as_vec3()))
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
