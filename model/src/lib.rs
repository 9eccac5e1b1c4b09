//! The `model` crate contains everything related to building the CPU side of a keyboard scene
//! from a given state.

mod case;
mod controller;
mod extrude;
mod finish;
mod keyboard;
mod keys;
mod legend;
mod outline;

/// The geometry module contains the render-ready mesh representation and the compatibility
/// layer for legacy geometry descriptions.
pub mod geometry;

pub use case::{build_case, lip_height, CaseMesh, CaseSettings, CASE_DEPTH, HOLE_MARGIN};
pub use controller::{Controller, WATCHED_PATHS};
pub use extrude::{extrude, Extrusion};
pub use finish::{finish_map, FINISH_MAP_SIZE};
pub use keyboard::{CaseModel, Changes, KeyModel, Keyboard};
pub use keys::{
    classify_face, key_instances, keycap_mesh, switch_mesh, FaceKind, Key, KeyInstance, KeySet,
    KeyShape, KEYCAP_HEIGHT, KEYCAP_SIDE_MATERIAL, KEYCAP_TOP_MATERIAL, SWITCH_HEIGHT,
};
pub use legend::{
    glyph, glyph_codes, rasterize_legend, rasterize_plain, CacheStats, LegendCache, LegendKey,
    MaterialSet, PlainKey, SharedLegendCache, Texture, TextureKey, FLIP_Y, PIXELS_PER_UNIT,
};
pub use outline::{key_holes, rectangle, rounded_rectangle, signed_area, Contour, Outline};

/// The error type for errors while building a keyboard scene.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration is invalid.
    #[error("invalid configuration")]
    Config(#[from] config::Error),
    /// Failed to access the state store.
    #[error("failed to access state store")]
    Store(#[from] store::Error),
    /// An outline contour has less than three distinct points.
    #[error("outline has a contour with less than three distinct points")]
    DegenerateOutline,
    /// An outline could not be triangulated.
    #[error("failed to triangulate outline")]
    Triangulation,
    /// The case settings violate a constraint.
    #[error("case builder: {0}")]
    InvalidCase(String),
    /// A texture could not be rasterized.
    #[error("failed to rasterize texture of {width}x{height} pixels")]
    Rasterization {
        /// The requested width in pixels.
        width: u32,
        /// The requested height in pixels.
        height: u32,
    },
}
