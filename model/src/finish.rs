use config::CaseMaterial;
use tiny_skia::{
    Color, GradientStop, Paint, Pixmap, Point, RadialGradient, Rect, SpreadMode, Transform,
};

use crate::{legend::Texture, Error};

/// The side length of finish maps in pixels.
pub const FINISH_MAP_SIZE: u32 = 256;

/// Returns the grayscale finish map modulating the flat case color.
///
/// Matte cases have no finish map.
///
/// # Errors
///
/// Returns an [`Error`] if the map cannot be rasterized, callers should fall back to the flat
/// case color.
pub fn finish_map(material: CaseMaterial) -> Result<Option<Texture>, Error> {
    let pixmap = match material {
        CaseMaterial::Matte => return Ok(None),
        CaseMaterial::Brushed => brushed()?,
        CaseMaterial::Glossy => glossy()?,
    };

    Ok(Some(Texture::from_pixmap(pixmap)))
}

fn blank(gray: u8) -> Result<Pixmap, Error> {
    let mut pixmap = Pixmap::new(FINISH_MAP_SIZE, FINISH_MAP_SIZE).ok_or(Error::Rasterization {
        width: FINISH_MAP_SIZE,
        height: FINISH_MAP_SIZE,
    })?;
    pixmap.fill(Color::from_rgba8(gray, gray, gray, 255));

    Ok(pixmap)
}

/// Fine horizontal streaks of varying brightness.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn brushed() -> Result<Pixmap, Error> {
    let mut pixmap = blank(235)?;
    let mut paint = Paint::default();
    paint.anti_alias = false;

    for row in 0..FINISH_MAP_SIZE {
        // Deterministic noise, maps are identical between rebuilds
        let noise = (row.wrapping_mul(2_654_435_761) >> 16) % 40;
        let gray = 215 + noise as u8;
        paint.set_color(Color::from_rgba8(gray, gray, gray, 255));

        if let Some(rect) = Rect::from_xywh(0.0, row as f32, FINISH_MAP_SIZE as f32, 1.0) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    Ok(pixmap)
}

/// A soft highlight towards the top left corner.
#[allow(clippy::cast_precision_loss)]
fn glossy() -> Result<Pixmap, Error> {
    let mut pixmap = blank(215)?;
    let size = FINISH_MAP_SIZE as f32;
    let center = Point::from_xy(size * 0.3, size * 0.3);

    let rasterization_error = Error::Rasterization {
        width: FINISH_MAP_SIZE,
        height: FINISH_MAP_SIZE,
    };
    let shader = RadialGradient::new(
        center,
        center,
        size * 0.6,
        vec![
            GradientStop::new(0.0, Color::from_rgba8(255, 255, 255, 255)),
            GradientStop::new(1.0, Color::from_rgba8(255, 255, 255, 0)),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    )
    .ok_or(rasterization_error)?;

    let mut paint = Paint::default();
    paint.shader = shader;
    let Some(rect) = Rect::from_xywh(0.0, 0.0, size, size) else {
        return Ok(pixmap);
    };
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);

    Ok(pixmap)
}
