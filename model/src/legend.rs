use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use config::{Color, LegendStyle};
use font8x8::legacy::BASIC_LEGACY;
use glam::{DVec2, Vec2};
use log::debug;
use tiny_skia::{Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::Error;

/// The raster density of legend textures.
pub const PIXELS_PER_UNIT: u32 = 128;

/// Whether textures need to be flipped vertically on upload.
///
/// Textures are rasterized with their origin in the top left corner and mesh UVs are already
/// flipped once (see [`crate::geometry::flip_v`]), so flipping them again would turn every
/// legend upside down.
pub const FLIP_Y: bool = false;

/// The color of all legends.
const LEGEND_COLOR: Color = Color::rgb(255, 255, 255);

/// The width of the border stroke in pixels.
const BORDER_WIDTH: f32 = 4.0;

/// The distance between the legend and the texture edge in pixels.
const PADDING: u32 = 16;

/// The side length of a glyph cell in font pixels.
const GLYPH_CELLS: u32 = 8;

/// The printable legends of known key codes.
const GLYPHS: &[(&str, &str)] = &[
    ("Escape", "Esc"),
    ("Backquote", "`"),
    ("Minus", "-"),
    ("Equal", "="),
    ("Backspace", "Back"),
    ("Tab", "Tab"),
    ("BracketLeft", "["),
    ("BracketRight", "]"),
    ("Backslash", "\\"),
    ("IntlBackslash", "\\"),
    ("CapsLock", "Caps"),
    ("Semicolon", ";"),
    ("Quote", "'"),
    ("Enter", "Enter"),
    ("IsoEnter", "Enter"),
    ("ShiftLeft", "Shift"),
    ("ShiftRight", "Shift"),
    ("Comma", ","),
    ("Period", "."),
    ("Slash", "/"),
    ("ControlLeft", "Ctrl"),
    ("ControlRight", "Ctrl"),
    ("MetaLeft", "Win"),
    ("MetaRight", "Win"),
    ("AltLeft", "Alt"),
    ("AltRight", "Alt"),
    ("ContextMenu", "Menu"),
    ("Fn", "Fn"),
    ("PrintScreen", "PrtSc"),
    ("ScrollLock", "ScrLk"),
    ("Pause", "Pause"),
    ("Insert", "Ins"),
    ("Delete", "Del"),
    ("Home", "Home"),
    ("End", "End"),
    ("PageUp", "PgUp"),
    ("PageDown", "PgDn"),
    ("ArrowUp", "^"),
    ("ArrowDown", "v"),
    ("ArrowLeft", "<"),
    ("ArrowRight", ">"),
];

/// Returns the legend printed on the key with the given code.
///
/// Codes missing from the glyph table fall back to the code without its `Key` or `Digit`
/// prefix, or the raw code otherwise.
#[must_use]
pub fn glyph(code: &str) -> &str {
    if let Some((_, legend)) = GLYPHS.iter().find(|(known, _)| *known == code) {
        return legend;
    }

    ["Key", "Digit"]
        .iter()
        .find_map(|prefix| code.strip_prefix(prefix).filter(|rest| !rest.is_empty()))
        .unwrap_or(code)
}

/// Returns the known key codes of the glyph table.
pub fn glyph_codes() -> impl Iterator<Item = &'static str> {
    GLYPHS.iter().map(|(code, _)| *code)
}

/// An RGBA8 raster image with its origin in the top left corner.
#[derive(Clone, PartialEq, Eq)]
pub struct Texture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Texture {
    /// Creates a texture from an opaque pixmap.
    pub(crate) fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            width: pixmap.width(),
            height: pixmap.height(),
            data: pixmap.take(),
        }
    }

    /// Returns the width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel data, row by row starting at the top.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the pixel at the given coordinates.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) is outside of the {}x{} texture",
            self.width,
            self.height
        );
        let index = 4 * (y * self.width + x) as usize;

        [0, 1, 2, 3].map(|channel| self.data[index + channel])
    }

    /// Returns the pixel a mesh UV refers to, using nearest neighbor sampling.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn sample(&self, uv: Vec2) -> [u8; 4] {
        let uv = uv.clamp(Vec2::ZERO, Vec2::ONE);
        let v = if FLIP_Y { 1.0 - uv.y } else { uv.y };

        let x = ((uv.x * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);

        self.pixel(x, y)
    }

    /// Returns true if any pixel differs from the given color.
    #[must_use]
    pub fn has_pixel_other_than(&self, color: Color) -> bool {
        let color = [color.r, color.g, color.b, 255];
        self.data.chunks_exact(4).any(|pixel| pixel != color)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Returns the pixel size of a texture covering the given size in key units.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_size(size: DVec2) -> [u32; 2] {
    let pixels = (size * f64::from(PIXELS_PER_UNIT)).round().max(DVec2::ONE);
    [pixels.x as u32, pixels.y as u32]
}

/// Converts a color to a tiny-skia color.
fn skia_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, 255)
}

/// Returns a darker shade of the color.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn darker(color: Color) -> Color {
    let scale = |channel: u8| (f32::from(channel) * 0.8) as u8;

    Color::rgb(scale(color.r), scale(color.g), scale(color.b))
}

/// Creates a pixmap filled with the background color.
fn canvas([width, height]: [u32; 2], background: Color) -> Result<Pixmap, Error> {
    let mut pixmap = Pixmap::new(width, height).ok_or(Error::Rasterization { width, height })?;
    pixmap.fill(skia_color(background));

    Ok(pixmap)
}

/// Strokes a border along the edge of the pixmap.
#[allow(clippy::cast_precision_loss)]
fn stroke_border(pixmap: &mut Pixmap, color: Color) {
    let (width, height) = (pixmap.width() as f32, pixmap.height() as f32);
    let Some(rect) = Rect::from_xywh(
        BORDER_WIDTH / 2.0,
        BORDER_WIDTH / 2.0,
        width - BORDER_WIDTH,
        height - BORDER_WIDTH,
    ) else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(skia_color(color));
    let stroke = Stroke {
        width: BORDER_WIDTH,
        ..Stroke::default()
    };
    pixmap.stroke_path(
        &PathBuilder::from_rect(rect),
        &paint,
        &stroke,
        Transform::identity(),
        None,
    );
}

/// Returns the font scale for a legend fitting into the given width.
fn glyph_scale(style: LegendStyle, characters: u32, available_width: u32) -> u32 {
    let base = match style {
        LegendStyle::Sa => 7,
        LegendStyle::Cherry | LegendStyle::Gmk => 6,
    };
    let base = if characters > 1 { base / 2 } else { base };
    let fitting = available_width / (GLYPH_CELLS * characters).max(1);

    base.min(fitting).max(1)
}

/// Returns the font bitmap of a character, `?` for characters the font lacks.
fn glyph_bitmap(character: char) -> [u8; 8] {
    let index = character as usize;
    if character.is_ascii() && index < BASIC_LEGACY.len() {
        BASIC_LEGACY[index]
    } else {
        BASIC_LEGACY[b'?' as usize]
    }
}

/// Draws the legend text onto the pixmap.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn draw_legend(pixmap: &mut Pixmap, legend: &str, style: LegendStyle, offset: [i32; 2]) {
    let characters = legend.chars().count() as u32;
    if characters == 0 {
        return;
    }

    let (width, height) = (pixmap.width(), pixmap.height());
    let scale = glyph_scale(style, characters, width.saturating_sub(2 * PADDING));
    let text_width = GLYPH_CELLS * scale * characters;
    let text_height = GLYPH_CELLS * scale;

    let (left, top) = match style {
        LegendStyle::Sa => (PADDING as i32, PADDING as i32),
        LegendStyle::Cherry | LegendStyle::Gmk => (
            (width as i32 - text_width as i32) / 2 + offset[0],
            (height as i32 - text_height as i32) / 2 + offset[1],
        ),
    };
    let weight = match style {
        LegendStyle::Gmk => (scale / 3).max(1),
        LegendStyle::Cherry | LegendStyle::Sa => 0,
    };

    let mut paint = Paint::default();
    paint.set_color(skia_color(LEGEND_COLOR));
    paint.anti_alias = false;

    for (index, character) in legend.chars().enumerate() {
        let cell_left = left + (index as u32 * GLYPH_CELLS * scale) as i32;

        for (row, bits) in glyph_bitmap(character).into_iter().enumerate() {
            for column in 0..GLYPH_CELLS {
                if (bits >> column) & 1 == 0 {
                    continue;
                }

                let x = cell_left + (column * scale) as i32;
                let y = top + (row as u32 * scale) as i32;
                if let Some(rect) = Rect::from_xywh(
                    x as f32,
                    y as f32,
                    (scale + weight) as f32,
                    scale as f32,
                ) {
                    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                }
            }
        }
    }
}

/// Rasterizes the legend texture of a keycap top.
///
/// The texture is filled with the background, framed by a darker border and shows the legend in
/// white. The foreground color is ignored since legends are always white. The offset moves the
/// legend away from the texture center in key units, with Y pointing up.
///
/// # Errors
///
/// Returns an [`Error`] if the texture cannot be allocated.
pub fn rasterize_legend(
    legend: &str,
    style: LegendStyle,
    _foreground: Color,
    background: Color,
    size: DVec2,
    offset: DVec2,
) -> Result<Texture, Error> {
    rasterize(legend, style, background, pixel_size(size), pixel_offset(offset))
}

/// Rasterizes a legend texture of the given pixel size.
fn rasterize(
    legend: &str,
    style: LegendStyle,
    background: Color,
    size: [u32; 2],
    offset: [i32; 2],
) -> Result<Texture, Error> {
    let mut pixmap = canvas(size, background)?;
    stroke_border(&mut pixmap, darker(background));
    draw_legend(&mut pixmap, legend, style, offset);

    Ok(Texture::from_pixmap(pixmap))
}

/// Rasterizes the plain texture of the keycap sides.
///
/// # Errors
///
/// Returns an [`Error`] if the texture cannot be allocated.
pub fn rasterize_plain(background: Color, size: DVec2) -> Result<Texture, Error> {
    canvas(pixel_size(size), background).map(Texture::from_pixmap)
}

/// Converts an offset in key units with Y pointing up to pixels with Y pointing down.
#[allow(clippy::cast_possible_truncation)]
fn pixel_offset(offset: DVec2) -> [i32; 2] {
    let pixels = (offset * f64::from(PIXELS_PER_UNIT)).round();
    [pixels.x as i32, -pixels.y as i32]
}

/// The appearance of a legend texture.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LegendKey {
    /// The key code.
    pub code: String,
    /// The legend style.
    pub style: LegendStyle,
    /// The background color.
    pub background: Color,
    /// The texture size in pixels.
    pub size: [u32; 2],
    /// The legend offset in pixels.
    pub offset: [i32; 2],
}

impl LegendKey {
    /// Creates the key of a legend texture covering the given size in key units.
    #[must_use]
    pub fn new(code: &str, style: LegendStyle, background: Color, size: DVec2, offset: DVec2) -> Self {
        Self {
            code: code.to_owned(),
            style,
            background,
            size: pixel_size(size),
            offset: pixel_offset(offset),
        }
    }

    /// Returns the key of the matching plain texture.
    #[must_use]
    pub fn plain(&self) -> PlainKey {
        PlainKey {
            background: self.background,
            size: self.size,
        }
    }
}

/// The appearance of a plain texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlainKey {
    /// The background color.
    pub background: Color,
    /// The texture size in pixels.
    pub size: [u32; 2],
}

/// Identifies a cached texture.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureKey {
    /// A legend texture.
    Legend(LegendKey),
    /// A plain texture.
    Plain(PlainKey),
}

/// The textures of a keycap.
#[derive(Clone, Debug)]
pub struct MaterialSet {
    /// The legend texture of the top faces.
    pub top: Rc<Texture>,
    /// The plain texture of all other faces.
    pub side: Rc<Texture>,
    /// The key of the top texture.
    pub top_key: TextureKey,
    /// The key of the side texture.
    pub side_key: TextureKey,
}

/// Statistics of a [`LegendCache`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// The number of requests served from the cache.
    pub hits: usize,
    /// The number of requests that required rasterization.
    pub misses: usize,
    /// The number of cached textures.
    pub entries: usize,
}

/// A handle to a legend cache shared between keyboards.
pub type SharedLegendCache = Rc<RefCell<LegendCache>>;

/// A cache of rasterized keycap textures.
///
/// Entries are immutable once created and are only dropped by [`LegendCache::clear`].
#[derive(Default)]
pub struct LegendCache {
    legends: HashMap<LegendKey, Rc<Texture>>,
    plains: HashMap<PlainKey, Rc<Texture>>,
    hits: usize,
    misses: usize,
}

impl LegendCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache shared by all keyboards built on the current thread.
    ///
    /// Rendering is single threaded, so this is the one cache of the process unless a
    /// keyboard is given its own.
    #[must_use]
    pub fn shared() -> SharedLegendCache {
        thread_local! {
            static SHARED: SharedLegendCache = Rc::new(RefCell::new(LegendCache::new()));
        }

        SHARED.with(Rc::clone)
    }

    /// Returns the legend texture with the given appearance, rasterizing it on first use.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the texture cannot be rasterized.
    pub fn legend(&mut self, key: &LegendKey) -> Result<Rc<Texture>, Error> {
        if let Some(texture) = self.legends.get(key) {
            self.hits += 1;
            return Ok(texture.clone());
        }

        self.misses += 1;
        debug!("Rasterizing legend of `{}`", key.code);
        let texture = Rc::new(rasterize(
            glyph(&key.code),
            key.style,
            key.background,
            key.size,
            key.offset,
        )?);
        self.legends.insert(key.clone(), texture.clone());

        Ok(texture)
    }

    /// Returns the plain texture with the given appearance, rasterizing it on first use.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the texture cannot be rasterized.
    pub fn plain(&mut self, key: PlainKey) -> Result<Rc<Texture>, Error> {
        if let Some(texture) = self.plains.get(&key) {
            self.hits += 1;
            return Ok(texture.clone());
        }

        self.misses += 1;
        let texture = Rc::new(canvas(key.size, key.background).map(Texture::from_pixmap)?);
        self.plains.insert(key, texture.clone());

        Ok(texture)
    }

    /// Returns the textures of a keycap with the given legend appearance.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a texture cannot be rasterized.
    pub fn material_set(&mut self, key: LegendKey) -> Result<MaterialSet, Error> {
        let plain = key.plain();

        Ok(MaterialSet {
            top: self.legend(&key)?,
            side: self.plain(plain)?,
            top_key: TextureKey::Legend(key),
            side_key: TextureKey::Plain(plain),
        })
    }

    /// Returns the cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.legends.len() + self.plains.len(),
        }
    }

    /// Drops all cached textures.
    pub fn clear(&mut self) {
        debug!("Clearing {} cached textures", self.legends.len() + self.plains.len());
        self.legends.clear();
        self.plains.clear();
    }
}

#[cfg(test)]
mod tests {
    use glam::{dvec2, vec2};

    use super::*;

    const BACKGROUND: Color = Color::rgb(0x4a, 0x90, 0xe2);

    fn legend(text: &str, style: LegendStyle) -> Texture {
        rasterize_legend(
            text,
            style,
            Color::rgb(0, 0, 0),
            BACKGROUND,
            DVec2::ONE,
            DVec2::ZERO,
        )
        .unwrap()
    }

    /// Returns the bounding box of all white pixels.
    fn legend_bounds(texture: &Texture) -> Option<([u32; 2], [u32; 2])> {
        let mut bounds: Option<([u32; 2], [u32; 2])> = None;
        for y in 0..texture.height() {
            for x in 0..texture.width() {
                if texture.pixel(x, y) == [255, 255, 255, 255] {
                    bounds = Some(match bounds {
                        Some((min, max)) => (
                            [min[0].min(x), min[1].min(y)],
                            [max[0].max(x), max[1].max(y)],
                        ),
                        None => ([x, y], [x, y]),
                    });
                }
            }
        }
        bounds
    }

    #[test]
    fn glyph_table_lookup() {
        assert_eq!(glyph("Escape"), "Esc");
        assert_eq!(glyph("ShiftLeft"), "Shift");
        assert_eq!(glyph("IsoEnter"), "Enter");
        assert_eq!(glyph("ArrowUp"), "^");
    }

    #[test]
    fn unknown_codes_fall_back_to_stripped_code() {
        assert_eq!(glyph("KeyA"), "A");
        assert_eq!(glyph("Digit1"), "1");
        assert_eq!(glyph("F5"), "F5");
        assert_eq!(glyph("Key"), "Key");
        assert_eq!(glyph(""), "");
    }

    #[test]
    fn every_known_code_draws_a_glyph() {
        for code in glyph_codes() {
            let texture = legend(glyph(code), LegendStyle::Cherry);

            assert!(
                legend_bounds(&texture).is_some(),
                "legend of `{code}` is blank"
            );
            assert!(texture.has_pixel_other_than(BACKGROUND));
        }
    }

    #[test]
    fn texture_size_follows_key_units() {
        let texture = rasterize_plain(BACKGROUND, dvec2(6.25, 1.0)).unwrap();

        assert_eq!(texture.width(), 800);
        assert_eq!(texture.height(), 128);
        assert!(!texture.has_pixel_other_than(BACKGROUND));
    }

    #[test]
    fn border_is_darker_than_background() {
        let texture = legend("A", LegendStyle::Cherry);
        let [r, g, b, _] = texture.pixel(0, 0);

        assert!(r < BACKGROUND.r && g < BACKGROUND.g && b < BACKGROUND.b);
    }

    #[test]
    fn foreground_is_always_white() {
        let first = rasterize_legend(
            "A",
            LegendStyle::Cherry,
            Color::rgb(0, 0, 0),
            BACKGROUND,
            DVec2::ONE,
            DVec2::ZERO,
        )
        .unwrap();
        let second = rasterize_legend(
            "A",
            LegendStyle::Cherry,
            Color::rgb(255, 0, 0),
            BACKGROUND,
            DVec2::ONE,
            DVec2::ZERO,
        )
        .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn cherry_legends_are_centered() {
        let ([left, top], [right, bottom]) = legend_bounds(&legend("O", LegendStyle::Cherry)).unwrap();

        assert!(left > 32 && right < 96);
        assert!(top > 32 && bottom < 96);
    }

    #[test]
    fn sa_legends_are_in_the_top_left() {
        let ([left, top], [right, bottom]) = legend_bounds(&legend("O", LegendStyle::Sa)).unwrap();

        assert!(left < 64 && top < 64);
        assert!(right < 80 && bottom < 80);
    }

    #[test]
    fn gmk_legends_are_bold() {
        let count = |texture: &Texture| {
            texture
                .data()
                .chunks_exact(4)
                .filter(|pixel| *pixel == [255, 255, 255, 255])
                .count()
        };

        assert!(count(&legend("I", LegendStyle::Gmk)) > count(&legend("I", LegendStyle::Cherry)));
    }

    #[test]
    fn long_legends_are_scaled_down() {
        let texture = legend("Shift", LegendStyle::Cherry);
        let ([left, _], [right, _]) = legend_bounds(&texture).unwrap();

        assert!(left >= PADDING && right < 128 - PADDING);
    }

    #[test]
    fn legend_offset_moves_legend_up() {
        let texture = rasterize_legend(
            "O",
            LegendStyle::Cherry,
            Color::rgb(255, 255, 255),
            BACKGROUND,
            dvec2(1.5, 2.0),
            dvec2(0.0, 0.5),
        )
        .unwrap();
        let ([_, top], [_, bottom]) = legend_bounds(&texture).unwrap();

        assert!(bottom < texture.height() / 2);
        assert!(top > 0);
    }

    #[test]
    fn unknown_characters_use_placeholder() {
        assert_eq!(glyph_bitmap('é'), glyph_bitmap('?'));
        assert_ne!(glyph_bitmap('A'), glyph_bitmap('?'));
    }

    #[test]
    fn sampling_starts_at_the_top_row() {
        let texture = legend("A", LegendStyle::Sa);

        assert_eq!(texture.sample(vec2(0.0, 0.0)), texture.pixel(0, 0));
        assert_eq!(
            texture.sample(vec2(1.0, 1.0)),
            texture.pixel(texture.width() - 1, texture.height() - 1)
        );
    }

    #[test]
    fn cache_returns_identical_instances() {
        let mut cache = LegendCache::new();
        let key = LegendKey::new("KeyA", LegendStyle::Cherry, BACKGROUND, DVec2::ONE, DVec2::ZERO);

        let first = cache.legend(&key).unwrap();
        let second = cache.legend(&key).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn material_sets_share_plain_textures() {
        let mut cache = LegendCache::new();
        let first = cache
            .material_set(LegendKey::new(
                "KeyA",
                LegendStyle::Sa,
                BACKGROUND,
                DVec2::ONE,
                DVec2::ZERO,
            ))
            .unwrap();
        let second = cache
            .material_set(LegendKey::new(
                "KeyB",
                LegendStyle::Sa,
                BACKGROUND,
                DVec2::ONE,
                DVec2::ZERO,
            ))
            .unwrap();

        assert!(!Rc::ptr_eq(&first.top, &second.top));
        assert!(Rc::ptr_eq(&first.side, &second.side));
        assert_eq!(cache.stats().entries, 3);
    }

    #[test]
    fn clearing_drops_all_entries() {
        let mut cache = LegendCache::new();
        let key = LegendKey::new("KeyA", LegendStyle::Gmk, BACKGROUND, DVec2::ONE, DVec2::ZERO);
        let first = cache.legend(&key).unwrap();

        cache.clear();
        assert_eq!(cache.stats().entries, 0);

        let second = cache.legend(&key).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }
}
