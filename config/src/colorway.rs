use std::{collections::BTreeMap, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::{Color, Error};

/// The swatch groups of a colorway.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SwatchKind {
    /// Alphanumeric keys and the space bar.
    Base,
    /// Modifier, navigation and function keys.
    Mods,
    /// Highlighted keys such as Escape and Enter.
    Accent,
}

/// The colors of a group of keycaps.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Swatch {
    /// The keycap color.
    pub background: Color,
    /// The legend color.
    pub legend: Color,
}

/// The three swatches of a colorway.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Swatches {
    /// The swatch of alphanumeric keys.
    pub base: Swatch,
    /// The swatch of modifier keys.
    pub mods: Swatch,
    /// The swatch of accent keys.
    pub accent: Swatch,
}

/// A keycap and switch color scheme.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Colorway {
    /// The display name of the colorway.
    pub label: String,
    /// The switch housing color.
    pub switch: Color,
    /// The keycap swatches.
    pub swatches: Swatches,
    /// Swatch assignments overriding the default classification of key codes.
    #[serde(default)]
    pub overrides: BTreeMap<String, SwatchKind>,
}

impl Colorway {
    /// Returns the built-in colorway with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColorway`] if there is no colorway with this name.
    pub fn named(name: &str) -> Result<Self, Error> {
        catalogue()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownColorway(name.to_owned()))
    }

    /// Returns the names of all built-in colorways.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded colorway catalogue is malformed.
    pub fn names() -> Result<Vec<String>, Error> {
        Ok(catalogue()?.keys().cloned().collect())
    }

    /// Returns the swatch kind used for the key with the given code.
    #[must_use]
    pub fn swatch_kind(&self, code: &str) -> SwatchKind {
        self.overrides
            .get(code)
            .copied()
            .unwrap_or_else(|| classify(code))
    }

    /// Returns the swatch used for the key with the given code.
    #[must_use]
    pub fn swatch_for(&self, code: &str) -> &Swatch {
        match self.swatch_kind(code) {
            SwatchKind::Base => &self.swatches.base,
            SwatchKind::Mods => &self.swatches.mods,
            SwatchKind::Accent => &self.swatches.accent,
        }
    }
}

/// Returns the default swatch kind of a key code.
fn classify(code: &str) -> SwatchKind {
    const ACCENTS: [&str; 3] = ["Escape", "Enter", "IsoEnter"];
    const BASE: [&str; 13] = [
        "Backquote",
        "Minus",
        "Equal",
        "BracketLeft",
        "BracketRight",
        "Backslash",
        "IntlBackslash",
        "Semicolon",
        "Quote",
        "Comma",
        "Period",
        "Slash",
        "Space",
    ];

    if ACCENTS.contains(&code) {
        SwatchKind::Accent
    } else if code.starts_with("Key") || code.starts_with("Digit") || BASE.contains(&code) {
        SwatchKind::Base
    } else {
        SwatchKind::Mods
    }
}

/// The colorway configuration: the active colorway and user defined ones.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Colorways {
    /// The name of the active colorway.
    pub active: String,
    /// User defined colorways, taking precedence over built-in ones.
    #[serde(default)]
    pub custom: BTreeMap<String, Colorway>,
}

impl Colorways {
    /// Resolves the active colorway, looking at custom colorways first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColorway`] if no colorway with the active name exists.
    pub fn resolve_active(&self) -> Result<Colorway, Error> {
        match self.custom.get(&self.active) {
            Some(colorway) => Ok(colorway.clone()),
            None => Colorway::named(&self.active),
        }
    }
}

/// Returns the catalogue of built-in colorways.
fn catalogue() -> Result<&'static BTreeMap<String, Colorway>, Error> {
    static CATALOGUE: OnceLock<Result<BTreeMap<String, Colorway>, String>> = OnceLock::new();

    CATALOGUE
        .get_or_init(|| {
            toml::from_str(include_str!("colorways.toml")).map_err(|error| error.to_string())
        })
        .as_ref()
        .map_err(|reason| Error::Catalogue(reason.clone()))
}
