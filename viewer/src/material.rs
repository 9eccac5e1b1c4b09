use std::sync::Arc;

use config::Color;
use three_d::{
    ColorMaterial, Context, CpuMaterial, Mat3, PhysicalMaterial, SquareMatrix, Srgba, Texture2D,
    Texture2DRef,
};

/// Converts a configuration color to an opaque sRGB color.
pub fn srgba(color: Color) -> Srgba {
    let Color { r, g, b, .. } = color;

    Srgba::new_opaque(r, g, b)
}

/// Wraps a shared GPU texture for use in a material.
fn texture_ref(texture: &Arc<Texture2D>) -> Texture2DRef {
    Texture2DRef {
        texture: Arc::clone(texture),
        transformation: Mat3::identity(),
    }
}

/// Creates the unlit case material, modulating the flat color with a finish map if present.
///
/// The case color is filled in directly, so it looks the same under any lighting.
pub fn case_material(color: Color, finish: Option<&Arc<Texture2D>>) -> ColorMaterial {
    ColorMaterial {
        color: srgba(color),
        texture: finish.map(texture_ref),
        ..Default::default()
    }
}

/// Creates the unlit keycap material showing a legend or plain texture.
///
/// The texture already carries the key color, so it is not tinted.
pub fn keycap_material(texture: &Arc<Texture2D>) -> ColorMaterial {
    ColorMaterial {
        color: Srgba::WHITE,
        texture: Some(texture_ref(texture)),
        ..Default::default()
    }
}

/// Creates the lit material of switch housings.
pub fn switch_material(context: &Context, color: Color) -> PhysicalMaterial {
    PhysicalMaterial::new_opaque(
        context,
        &CpuMaterial {
            albedo: srgba(color),
            roughness: 0.4,
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_opaque() {
        let color = srgba(Color::rgb(0x4a, 0x90, 0xe2));

        assert_eq!(color, Srgba::new(0x4a, 0x90, 0xe2, 255));
    }

    #[test]
    fn case_is_a_flat_fill_of_its_color() {
        let material = case_material(Color::rgb(0x20, 0x30, 0x40), None);

        assert_eq!(material.color, Srgba::new_opaque(0x20, 0x30, 0x40));
        assert!(material.texture.is_none());
        assert!(!material.is_transparent);
    }
}
