use std::{collections::BTreeMap, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The distance the row cursor advances for a 0-width entry.
pub const KEY_GAP: f64 = 0.25;

/// The vertical distance between two neighboring rows.
pub const ROW_PITCH: f64 = 1.0;

/// The tolerance used when checking that rows fit into a layout.
pub const EPSILON: f64 = 1e-6;

/// The key code of the L-shaped ISO Enter key.
pub const ISO_ENTER: &str = "IsoEnter";

/// The additional width the upper part of an ISO Enter key extends to the left.
pub const ISO_ENTER_ALLOWANCE: f64 = 0.25;

/// A physical keyboard layout measured in key units.
///
/// Rows are ordered from the rear to the front of the board and every row is an ordered
/// sequence of key widths. A width of 0 marks a gap which advances the row cursor by
/// [`KEY_GAP`] without placing a key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LayoutDefinition", into = "LayoutDefinition")]
pub struct Layout {
    /// The name of the layout.
    pub name: String,
    /// The overall width.
    pub width: f64,
    /// The overall height.
    pub height: f64,
    /// Additional vertical space inserted before each row.
    pub row_offsets: Vec<f64>,
    /// The key widths of every row.
    pub rows: Vec<Vec<f64>>,
    /// The key codes of every row, one per non-zero width. May be empty.
    pub codes: Vec<Vec<String>>,
}

impl Layout {
    /// Creates an unnamed layout without key codes.
    #[must_use]
    pub fn new(width: f64, height: f64, rows: Vec<Vec<f64>>) -> Self {
        Self {
            name: "custom".to_owned(),
            width,
            height,
            row_offsets: Vec::new(),
            rows,
            codes: Vec::new(),
        }
    }

    /// Returns the built-in layout with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLayout`] if there is no layout with this name.
    pub fn named(name: &str) -> Result<Self, Error> {
        catalogue()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownLayout(name.to_owned()))
    }

    /// Returns the names of all built-in layouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded layout catalogue is malformed.
    pub fn names() -> Result<Vec<String>, Error> {
        Ok(catalogue()?.keys().cloned().collect())
    }

    /// Checks the layout for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: String| Error::InvalidLayout {
            layout: self.name.clone(),
            reason,
        };

        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(invalid(format!("width `{}` is not positive", self.width)));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(invalid(format!("height `{}` is not positive", self.height)));
        }
        if self.rows.is_empty() {
            return Err(invalid("layout has no rows".to_owned()));
        }
        if self.row_offsets.len() > self.rows.len() {
            return Err(invalid("more row offsets than rows".to_owned()));
        }
        if let Some(offset) = self
            .row_offsets
            .iter()
            .find(|offset| !(offset.is_finite() && **offset >= 0.0))
        {
            return Err(invalid(format!("row offset `{offset}` is negative")));
        }

        for (index, row) in self.rows.iter().enumerate() {
            if let Some(width) = row.iter().find(|width| !(width.is_finite() && **width >= 0.0)) {
                return Err(invalid(format!("row {index} has invalid width `{width}`")));
            }

            let extent = self.row_extent(index);
            if extent > self.width + EPSILON {
                return Err(invalid(format!(
                    "row {index} spans {extent} units but the layout is {} wide",
                    self.width
                )));
            }
        }

        let rows_extent = self.rows_extent();
        if rows_extent > self.height + EPSILON {
            return Err(invalid(format!(
                "rows span {rows_extent} units but the layout is {} high",
                self.height
            )));
        }

        if !self.codes.is_empty() {
            if self.codes.len() != self.rows.len() {
                return Err(invalid(format!(
                    "{} code rows given for {} rows",
                    self.codes.len(),
                    self.rows.len()
                )));
            }
            for (index, (row, codes)) in self.rows.iter().zip(&self.codes).enumerate() {
                let keys = row.iter().filter(|width| **width > 0.0).count();
                if keys != codes.len() {
                    return Err(invalid(format!(
                        "row {index} has {keys} keys but {} codes",
                        codes.len()
                    )));
                }
            }
            if self
                .codes
                .first()
                .is_some_and(|codes| codes.iter().any(|code| code == ISO_ENTER))
            {
                return Err(invalid("ISO Enter cannot be placed in the first row".to_owned()));
            }
            self.validate_iso_enter()?;
        }

        Ok(())
    }

    /// Checks that the upper part of every ISO Enter key only covers empty space in the row
    /// above.
    fn validate_iso_enter(&self) -> Result<(), Error> {
        for row in 1..self.rows.len() {
            for (key, (start, end)) in self.key_spans(row).into_iter().enumerate() {
                if self.code(row, key) != Some(ISO_ENTER) {
                    continue;
                }

                let upper = (start - ISO_ENTER_ALLOWANCE, end);
                let blocking = self
                    .key_spans(row - 1)
                    .into_iter()
                    .position(|(start, end)| {
                        start < upper.1 - EPSILON && end > upper.0 + EPSILON
                    });
                if let Some(blocking) = blocking {
                    return Err(Error::IsoEnterBlocked {
                        layout: self.name.clone(),
                        row,
                        blocking: self
                            .code(row - 1, blocking)
                            .map_or_else(|| format!("#{blocking}"), str::to_owned),
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns the horizontal spans of the keys in the given row, measured from the left
    /// layout edge.
    #[must_use]
    pub fn key_spans(&self, row: usize) -> Vec<(f64, f64)> {
        let mut cursor = 0.0;
        let mut spans = Vec::new();

        for &width in self.rows.get(row).map_or(&[][..], Vec::as_slice) {
            if width > 0.0 {
                spans.push((cursor, cursor + width));
                cursor += width;
            } else {
                cursor += KEY_GAP;
            }
        }

        spans
    }

    /// Returns the horizontal space the row with the given index occupies.
    #[must_use]
    pub fn row_extent(&self, row: usize) -> f64 {
        self.rows.get(row).map_or(0.0, |widths| {
            widths
                .iter()
                .map(|&width| if width > 0.0 { width } else { KEY_GAP })
                .sum()
        })
    }

    /// Returns the vertical space all rows occupy.
    #[must_use]
    pub fn rows_extent(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let rows = self.rows.len() as f64 * ROW_PITCH;

        rows + self.row_offsets.iter().sum::<f64>()
    }

    /// Returns the additional vertical space before the row with the given index.
    #[must_use]
    pub fn row_offset(&self, row: usize) -> f64 {
        self.row_offsets.get(row).copied().unwrap_or_default()
    }

    /// Returns how far the upper part of an ISO Enter key in the given row reaches above the
    /// row, up to the top of the row above.
    #[must_use]
    pub fn iso_enter_reach(&self, row: usize) -> f64 {
        ROW_PITCH + self.row_offset(row)
    }

    /// Returns the code of the `key`-th present key in the given row.
    #[must_use]
    pub fn code(&self, row: usize, key: usize) -> Option<&str> {
        self.codes
            .get(row)
            .and_then(|codes| codes.get(key))
            .map(String::as_str)
    }
}

/// The serialized form of a layout, rows use a compact token notation.
#[derive(Serialize, Deserialize)]
struct LayoutDefinition {
    #[serde(default)]
    name: String,
    width: f64,
    height: f64,
    #[serde(default)]
    row_offsets: Vec<f64>,
    rows: Vec<String>,
}

impl TryFrom<LayoutDefinition> for Layout {
    type Error = Error;

    fn try_from(definition: LayoutDefinition) -> Result<Self, Self::Error> {
        let mut rows = Vec::with_capacity(definition.rows.len());
        let mut codes = Vec::with_capacity(definition.rows.len());

        for row in &definition.rows {
            let (widths, row_codes) =
                parse_row(row).map_err(|reason| Error::InvalidLayout {
                    layout: definition.name.clone(),
                    reason,
                })?;
            rows.push(widths);
            codes.push(row_codes);
        }

        let layout = Self {
            name: definition.name,
            width: definition.width,
            height: definition.height,
            row_offsets: definition.row_offsets,
            rows,
            codes,
        };
        layout.validate()?;

        Ok(layout)
    }
}

impl From<Layout> for LayoutDefinition {
    fn from(layout: Layout) -> Self {
        let rows = layout
            .rows
            .iter()
            .enumerate()
            .map(|(row, widths)| {
                let mut key = 0;
                widths
                    .iter()
                    .map(|&width| {
                        if width > 0.0 {
                            let code = layout.code(row, key).unwrap_or("Key").to_owned();
                            key += 1;
                            format!("{code}:{width}")
                        } else {
                            "_".to_owned()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();

        Self {
            name: layout.name,
            width: layout.width,
            height: layout.height,
            row_offsets: layout.row_offsets,
            rows,
        }
    }
}

/// Parses a row such as `"Tab:1.5 KeyQ _ Delete"` into widths and codes.
fn parse_row(row: &str) -> Result<(Vec<f64>, Vec<String>), String> {
    let mut widths = Vec::new();
    let mut codes = Vec::new();

    for token in row.split_whitespace() {
        if token == "_" {
            widths.push(0.0);
            continue;
        }

        let (code, width) = match token.split_once(':') {
            Some((code, width)) => {
                let width: f64 = width
                    .parse()
                    .map_err(|_| format!("invalid width in token `{token}`"))?;
                (code, width)
            }
            None => (token, 1.0),
        };
        if code.is_empty() || width <= 0.0 {
            return Err(format!("invalid key token `{token}`"));
        }

        widths.push(width);
        codes.push(code.to_owned());
    }

    Ok((widths, codes))
}

/// Returns the catalogue of built-in layouts.
fn catalogue() -> Result<&'static BTreeMap<String, Layout>, Error> {
    static CATALOGUE: OnceLock<Result<BTreeMap<String, Layout>, String>> = OnceLock::new();

    CATALOGUE
        .get_or_init(|| {
            let definitions: BTreeMap<String, LayoutDefinition> =
                toml::from_str(include_str!("layouts.toml")).map_err(|error| error.to_string())?;

            definitions
                .into_iter()
                .map(|(name, mut definition)| {
                    definition.name.clone_from(&name);
                    Layout::try_from(definition)
                        .map(|layout| (name, layout))
                        .map_err(|error| error.to_string())
                })
                .collect()
        })
        .as_ref()
        .map_err(|reason| Error::Catalogue(reason.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_layouts_are_valid() {
        let names = Layout::names().unwrap();
        assert!(names.len() >= 4);

        for name in names {
            let layout = Layout::named(&name).unwrap();
            assert_eq!(layout.name, name);
            layout.validate().unwrap();
        }
    }

    #[test]
    fn no_row_overflows_the_outline() {
        for name in Layout::names().unwrap() {
            let layout = Layout::named(&name).unwrap();
            for row in 0..layout.rows.len() {
                assert!(
                    layout.row_extent(row) <= layout.width + EPSILON,
                    "row {row} of layout {name} overflows"
                );
            }
        }
    }

    #[test]
    fn tkl_dimensions() {
        let layout = Layout::named("tkl").unwrap();

        assert_eq!(layout.rows.len(), 6);
        assert!((layout.rows_extent() - 6.5).abs() < EPSILON);
        assert_eq!(layout.code(0, 0), Some("Escape"));
        assert_eq!(layout.code(5, 3), Some("Space"));
    }

    #[test]
    fn row_notation_parses_gaps_and_widths() {
        let (widths, codes) = parse_row("Tab:1.5 KeyQ _ _ Delete").unwrap();

        assert_eq!(widths, vec![1.5, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(codes, vec!["Tab", "KeyQ", "Delete"]);
        assert!(parse_row("KeyQ:abc").is_err());
        assert!(parse_row("KeyQ:0").is_err());
    }

    #[test]
    fn overflowing_row_is_rejected() {
        let layout = Layout::new(3.0, 1.0, vec![vec![1.0, 1.0, 1.5]]);

        assert!(matches!(
            layout.validate(),
            Err(Error::InvalidLayout { .. })
        ));
    }

    #[test]
    fn gaps_count_towards_row_extent() {
        let layout = Layout::new(3.0, 1.0, vec![vec![1.0, 0.0, 0.0, 1.0]]);

        assert!((layout.row_extent(0) - 2.5).abs() < EPSILON);
        layout.validate().unwrap();
    }

    #[test]
    fn missing_dimensions_are_rejected() {
        let layout = Layout::new(0.0, 5.0, vec![vec![1.0]]);
        assert!(layout.validate().is_err());

        let layout = Layout::new(5.0, 5.0, Vec::new());
        assert!(layout.validate().is_err());
    }

    #[test]
    fn mismatched_codes_are_rejected() {
        let mut layout = Layout::new(3.0, 1.0, vec![vec![1.0, 1.0]]);
        layout.codes = vec![vec!["KeyA".to_owned()]];

        assert!(layout.validate().is_err());
    }

    #[test]
    fn iso_enter_over_occupied_keys_is_rejected() {
        let mut layout = Layout::new(3.0, 2.0, vec![vec![1.0, 1.0, 1.0], vec![1.75, 1.25]]);
        layout.codes = vec![
            vec!["KeyA".to_owned(), "KeyB".to_owned(), "KeyC".to_owned()],
            vec!["KeyD".to_owned(), ISO_ENTER.to_owned()],
        ];

        match layout.validate() {
            Err(Error::IsoEnterBlocked { row, blocking, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(blocking, "KeyB");
            }
            result => panic!("expected a blocked ISO Enter, got {result:?}"),
        }
    }

    #[test]
    fn iso_enter_below_a_gap_is_accepted() {
        let mut layout = Layout::new(
            3.0,
            2.0,
            vec![vec![1.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], vec![1.75, 1.25]],
        );
        layout.codes = vec![
            vec!["KeyA".to_owned()],
            vec!["KeyD".to_owned(), ISO_ENTER.to_owned()],
        ];

        layout.validate().unwrap();
        assert_eq!(layout.key_spans(1), vec![(0.0, 1.75), (1.75, 3.0)]);
    }

    #[test]
    fn iso_enter_reaches_across_row_offsets() {
        let mut layout = Layout::new(3.0, 2.5, vec![vec![1.0], vec![1.0]]);
        layout.row_offsets = vec![0.0, 0.5];

        assert!((layout.iso_enter_reach(1) - 1.5).abs() < EPSILON);
        assert!((layout.iso_enter_reach(0) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn unknown_layout() {
        assert!(matches!(
            Layout::named("unknown"),
            Err(Error::UnknownLayout(_))
        ));
    }
}
