use model::{Changes, Keyboard, CASE_DEPTH};
use three_d::{
    vec3, Camera, Context, CpuMaterial, CpuMesh, Gm, Light, Mat4, Mesh, PhysicalMaterial,
    RenderTarget, Srgba,
};

use crate::objects::Component;

/// The floor extends this far beyond the case on every side, in key units.
const FLOOR_MARGIN: f32 = 12.0;

/// A floor the keyboard rests on.
#[derive(Default)]
pub struct Room {
    floor: Option<Gm<Mesh, PhysicalMaterial>>,
}

impl Room {
    /// Creates the room around the given keyboard.
    pub fn new(context: &Context, keyboard: &Keyboard) -> Self {
        let mut room = Self::default();
        room.reload(context, keyboard);

        room
    }
}

impl Component for Room {
    fn apply(&mut self, context: &Context, keyboard: &Keyboard, changes: Changes) {
        if changes.case_geometry {
            self.reload(context, keyboard);
        }
    }

    fn reload(&mut self, context: &Context, keyboard: &Keyboard) {
        let size = keyboard
            .case()
            .mesh
            .bounds()
            .map_or(vec3(1.0, 1.0, 0.0), |bounds| {
                let size = bounds.size();
                vec3(size.x, size.y, 0.0)
            });

        #[allow(clippy::cast_possible_truncation)]
        let depth = CASE_DEPTH as f32;
        let mut mesh = Mesh::new(context, &CpuMesh::square());
        mesh.set_transformation(
            Mat4::from_translation(vec3(0.0, 0.0, -depth - 0.01))
                * Mat4::from_nonuniform_scale(
                    size.x / 2.0 + FLOOR_MARGIN,
                    size.y / 2.0 + FLOOR_MARGIN,
                    1.0,
                ),
        );
        let material = PhysicalMaterial::new_opaque(
            context,
            &CpuMaterial {
                albedo: Srgba::new_opaque(0xd8, 0xd4, 0xcc),
                roughness: 0.9,
                ..Default::default()
            },
        );

        self.floor = Some(Gm::new(mesh, material));
    }

    fn release(&mut self) {
        self.floor = None;
    }

    fn render(&self, render_target: &RenderTarget, camera: &Camera, lights: &[&dyn Light]) {
        if let Some(floor) = &self.floor {
            render_target.render(camera, floor, lights);
        }
    }
}
