//! The `config` crate contains everything related to the available configuration options.

mod colorway;
mod layout;
mod primitives;

use std::{fs::read_to_string, io, num::NonZeroU8, path::Path};

use serde::{Deserialize, Serialize};

pub use colorway::{Colorway, Colorways, Swatch, SwatchKind, Swatches};
pub use layout::{Layout, EPSILON, ISO_ENTER, ISO_ENTER_ALLOWANCE, KEY_GAP, ROW_PITCH};
pub use primitives::{FiniteFloat, PositiveFloat};

/// A color.
pub type Color = hex_color::HexColor;

/// The complete configuration state of the keyboard scene.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct State {
    /// The case configuration.
    pub case: Case,
    /// The key configuration.
    pub keys: Keys,
    /// The colorway configuration.
    pub colorways: Colorways,
}

/// A configuration of the keyboard case.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    /// The name of the layout.
    pub layout: String,
    /// The construction style of the case.
    pub style: CaseStyle,
    /// The color of the case.
    pub primary_color: Color,
    /// The surface finish of the case.
    pub material: CaseMaterial,
    /// The space between the keys and the outer case edge.
    pub bezel: PositiveFloat,
    /// The corner radius of rounded cases.
    pub corner_radius: FiniteFloat,
    /// The bevel of the top and bottom case edges.
    pub bevel: Bevel,
}

/// A bevel of extruded edges.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Bevel {
    /// How far the bevel reaches into the outline.
    pub size: PositiveFloat,
    /// How far the bevel reaches along the extrusion.
    pub thickness: PositiveFloat,
    /// The number of segments of each bevel.
    pub segments: NonZeroU8,
}

/// The construction strategies of the case.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaseStyle {
    /// An outline with rounded corners made of quadratic curves.
    #[serde(alias = "A")]
    Rounded,
    /// A sharp outline with a raised rear lip.
    #[serde(alias = "B")]
    Sharp,
}

/// The surface finish presets of the case.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaseMaterial {
    /// A plain surface.
    Matte,
    /// A surface with fine horizontal streaks.
    Brushed,
    /// A surface with a soft highlight.
    Glossy,
}

/// A configuration of the keys.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Keys {
    /// The style of the primary legends.
    pub legend_primary_style: LegendStyle,
}

/// The legend styles of keycaps.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LegendStyle {
    /// A medium centered legend.
    Cherry,
    /// A large legend in the top left corner.
    Sa,
    /// A bold centered legend.
    Gmk,
}

impl State {
    /// Loads a state from the TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be read or is not a valid state.
    pub fn try_from_path(path: &Path) -> Result<Self, Error> {
        let state = toml::from_str(&read_to_string(path)?)?;

        Ok(state)
    }

    /// Returns the layout the state refers to.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the layout is unknown.
    pub fn layout(&self) -> Result<Layout, Error> {
        Layout::named(&self.case.layout)
    }
}

impl Default for State {
    fn default() -> Self {
        let toml_string = include_str!("default.toml");
        toml::from_str(toml_string).expect("default configuration should always be deserializable")
    }
}

/// The error type for errors regarding parsing configurations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to open file.
    #[error("failed to open file")]
    FileOpen(#[from] io::Error),
    /// Failed to parse TOML.
    #[error("failed to parse TOML")]
    TomlParse(#[from] toml::de::Error),
    /// Float is not finite.
    #[error("float is not finite")]
    NonFiniteFloat,
    /// Float is not positive.
    #[error("float is not positive")]
    NonPositiveFloat,
    /// A layout violates a constraint.
    #[error("invalid layout `{layout}`: {reason}")]
    InvalidLayout {
        /// The name of the layout.
        layout: String,
        /// The violated constraint.
        reason: String,
    },
    /// The upper part of an ISO Enter key covers a key in the row above.
    #[error("ISO Enter in row {row} of layout `{layout}` overlaps key `{blocking}` in the row above")]
    IsoEnterBlocked {
        /// The name of the layout.
        layout: String,
        /// The row of the ISO Enter key.
        row: usize,
        /// The code of the covered key, or its index if the layout has no codes.
        blocking: String,
    },
    /// There is no layout with the given name.
    #[error("unknown layout `{0}`")]
    UnknownLayout(String),
    /// There is no colorway with the given name.
    #[error("unknown colorway `{0}`")]
    UnknownColorway(String),
    /// An embedded catalogue is malformed.
    #[error("malformed built-in catalogue: {0}")]
    Catalogue(String),
}
