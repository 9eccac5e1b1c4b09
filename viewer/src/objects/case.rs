use std::sync::Arc;

use model::{Changes, Keyboard};
use three_d::{Camera, ColorMaterial, Context, Gm, Light, Mesh, RenderTarget, Texture2D};

use crate::{
    material::case_material,
    mesh::{cpu_meshes, cpu_texture},
    objects::Component,
};

/// The keyboard case, drawn unlit in its flat color.
#[derive(Default)]
pub struct CaseObject {
    parts: Vec<Gm<Mesh, ColorMaterial>>,
    finish: Option<Arc<Texture2D>>,
}

impl CaseObject {
    /// Creates the case of the given keyboard.
    pub fn new(context: &Context, keyboard: &Keyboard) -> Self {
        let mut case = Self::default();
        case.reload(context, keyboard);

        case
    }

    fn upload_finish(&mut self, context: &Context, keyboard: &Keyboard) {
        self.finish = keyboard
            .case()
            .finish
            .as_ref()
            .map(|finish| Arc::new(Texture2D::new(context, &cpu_texture("finish", finish))));
    }

    fn material(&self, keyboard: &Keyboard) -> ColorMaterial {
        case_material(keyboard.case().color, self.finish.as_ref())
    }
}

impl Component for CaseObject {
    fn apply(&mut self, context: &Context, keyboard: &Keyboard, changes: Changes) {
        if changes.case_geometry {
            self.reload(context, keyboard);
        } else if changes.case_material {
            self.upload_finish(context, keyboard);
            let material = self.material(keyboard);
            for part in &mut self.parts {
                part.material = material.clone();
            }
        }
    }

    fn reload(&mut self, context: &Context, keyboard: &Keyboard) {
        self.upload_finish(context, keyboard);
        self.parts = cpu_meshes(&keyboard.case().mesh)
            .into_iter()
            .map(|(_, mesh)| Gm::new(Mesh::new(context, &mesh), self.material(keyboard)))
            .collect();
    }

    fn release(&mut self) {
        self.parts.clear();
        self.finish = None;
    }

    fn render(&self, render_target: &RenderTarget, camera: &Camera, lights: &[&dyn Light]) {
        render_target.render(camera, &self.parts, lights);
    }
}
