use std::{collections::HashSet, rc::Rc};

use model::{Changes, KeyModel, Keyboard, KEYCAP_TOP_MATERIAL};
use three_d::{
    vec3, Camera, ColorMaterial, Context, Gm, InstancedMesh, Instances, Light, Mat4, Mesh,
    PhysicalMaterial, RenderTarget,
};

use crate::{
    material::{keycap_material, switch_material},
    mesh::{cpu_meshes, TextureCache},
    objects::Component,
};

/// One material group of a keycap.
struct KeycapPart {
    key: usize,
    material_index: usize,
    inner: Gm<Mesh, ColorMaterial>,
}

/// The keycaps and switches of a keyboard.
#[derive(Default)]
pub struct KeysObject {
    keycaps: Vec<KeycapPart>,
    switches: Vec<Gm<InstancedMesh, PhysicalMaterial>>,
    textures: TextureCache,
}

impl KeysObject {
    /// Creates the keys of the given keyboard.
    pub fn new(context: &Context, keyboard: &Keyboard) -> Self {
        let mut keys = Self::default();
        keys.reload(context, keyboard);

        keys
    }

    /// Returns the number of uploaded keycap textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn material(
        &mut self,
        context: &Context,
        model: &KeyModel,
        material_index: usize,
    ) -> ColorMaterial {
        let materials = &model.materials;
        let (key, texture) = if material_index == KEYCAP_TOP_MATERIAL {
            (&materials.top_key, &materials.top)
        } else {
            (&materials.side_key, &materials.side)
        };

        keycap_material(&self.textures.get_or_upload(context, key, texture))
    }

    fn upload_keycaps(&mut self, context: &Context, keyboard: &Keyboard) {
        let mut keycaps = Vec::new();

        for (index, model) in keyboard.keys().iter().enumerate() {
            let position = model.key.instance.position.as_vec3();
            let transformation = Mat4::from_translation(vec3(position.x, position.y, position.z));

            for (material_index, cpu_mesh) in cpu_meshes(&model.key.keycap) {
                let mut mesh = Mesh::new(context, &cpu_mesh);
                mesh.set_transformation(transformation);

                keycaps.push(KeycapPart {
                    key: index,
                    material_index,
                    inner: Gm::new(mesh, self.material(context, model, material_index)),
                });
            }
        }

        self.keycaps = keycaps;
    }

    fn upload_switches(&mut self, context: &Context, keyboard: &Keyboard) {
        // Keys of the same shape share their switch mesh, draw each shared mesh instanced
        let mut groups: Vec<(Rc<_>, Vec<Mat4>)> = Vec::new();
        for model in keyboard.keys() {
            let position = model.key.instance.position.as_vec3();
            let transformation = Mat4::from_translation(vec3(position.x, position.y, position.z));

            match groups
                .iter_mut()
                .find(|(mesh, _)| Rc::ptr_eq(mesh, &model.key.switch))
            {
                Some((_, transformations)) => transformations.push(transformation),
                None => groups.push((Rc::clone(&model.key.switch), vec![transformation])),
            }
        }

        self.switches = groups
            .into_iter()
            .flat_map(|(mesh, transformations)| {
                cpu_meshes(&mesh)
                    .into_iter()
                    .map(move |(_, cpu_mesh)| (cpu_mesh, transformations.clone()))
            })
            .map(|(cpu_mesh, transformations)| {
                let instanced_mesh = InstancedMesh::new(
                    context,
                    &Instances {
                        transformations,
                        ..Default::default()
                    },
                    &cpu_mesh,
                );

                Gm::new(
                    instanced_mesh,
                    switch_material(context, keyboard.switch_color()),
                )
            })
            .collect();
    }

    fn update_materials(&mut self, context: &Context, keyboard: &Keyboard) {
        let mut keycaps = std::mem::take(&mut self.keycaps);
        for part in &mut keycaps {
            if let Some(model) = keyboard.keys().get(part.key) {
                part.inner.material = self.material(context, model, part.material_index);
            }
        }
        self.keycaps = keycaps;

        for switch in &mut self.switches {
            switch.material = switch_material(context, keyboard.switch_color());
        }
    }

    fn drop_unused_textures(&mut self, keyboard: &Keyboard) {
        let used: HashSet<_> = keyboard
            .keys()
            .iter()
            .flat_map(|model| [&model.materials.top_key, &model.materials.side_key])
            .collect();

        self.textures.retain(|key| used.contains(key));
    }
}

impl Component for KeysObject {
    fn apply(&mut self, context: &Context, keyboard: &Keyboard, changes: Changes) {
        if changes.keys_geometry {
            self.reload(context, keyboard);
        } else if changes.keys_material {
            self.update_materials(context, keyboard);
            self.drop_unused_textures(keyboard);
        }
    }

    fn reload(&mut self, context: &Context, keyboard: &Keyboard) {
        self.textures.clear();
        self.upload_keycaps(context, keyboard);
        self.upload_switches(context, keyboard);
    }

    fn release(&mut self) {
        self.keycaps.clear();
        self.switches.clear();
        self.textures.clear();
    }

    fn render(&self, render_target: &RenderTarget, camera: &Camera, lights: &[&dyn Light]) {
        render_target.render(
            camera,
            self.keycaps.iter().map(|part| &part.inner),
            lights,
        );
        render_target.render(camera, &self.switches, lights);
    }
}
