use log::debug;
use model::{Changes, Keyboard};
use three_d::{
    degrees, vec3, AmbientLight, Attenuation, Camera, ClearState, Context, Degrees, InnerSpace,
    Light, PointLight, RenderTarget, Srgba, Vec3, Viewport,
};

use crate::{
    driver::Renderer,
    objects::{CaseObject, Component, KeysObject, Room},
};

/// The distance of the camera to the keyboard center in key units.
const DEFAULT_DISTANCE: f32 = 40.0;
/// The vertical field of view.
const DEFAULT_FOV: Degrees = degrees(22.5);
/// The point the camera looks at.
const DEFAULT_TARGET: Vec3 = vec3(0.0, 0.0, 0.0);
/// The color the render target is cleared with.
const BACKGROUND: [f32; 4] = [0.93, 0.93, 0.94, 1.0];

/// A scene rendering a keyboard in a room.
pub struct Scene {
    camera: Camera,
    case: CaseObject,
    keys: KeysObject,
    room: Room,
    components: Vec<Box<dyn Component>>,
    lights: Vec<PointLight>,
    ambient: AmbientLight,
}

impl Scene {
    /// Creates a scene showing the given keyboard.
    pub fn new(context: &Context, viewport: Viewport, keyboard: &Keyboard) -> Self {
        let camera = Camera::new_perspective(
            viewport,
            vec3(0.0, -1.0, 1.2).normalize_to(DEFAULT_DISTANCE),
            DEFAULT_TARGET,
            Vec3::unit_z(),
            DEFAULT_FOV,
            0.1,
            1000.0,
        );

        let light_positions = [
            vec3(-12.0, -10.0, 18.0),
            vec3(12.0, -6.0, 14.0),
            vec3(0.0, 14.0, 16.0),
        ];
        let lights = light_positions
            .iter()
            .map(|position| {
                PointLight::new(context, 0.6, Srgba::WHITE, *position, Attenuation::default())
            })
            .collect();
        let ambient = AmbientLight::new(context, 0.35, Srgba::WHITE);

        Self {
            camera,
            case: CaseObject::new(context, keyboard),
            keys: KeysObject::new(context, keyboard),
            room: Room::new(context, keyboard),
            components: Vec::new(),
            lights,
            ambient,
        }
    }

    /// Registers an additional component.
    pub fn add(&mut self, component: Box<dyn Component>) {
        self.components.push(component);
    }

    /// Returns the camera for modification by camera controls.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Returns the number of uploaded keycap textures.
    pub fn texture_count(&self) -> usize {
        self.keys.texture_count()
    }

    fn parts_mut(&mut self) -> impl Iterator<Item = &mut (dyn Component + 'static)> {
        let builtin: [&mut (dyn Component + 'static); 3] =
            [&mut self.case, &mut self.keys, &mut self.room];

        builtin
            .into_iter()
            .chain(self.components.iter_mut().map(Box::as_mut))
    }

    fn parts(&self) -> impl Iterator<Item = &(dyn Component + 'static)> {
        let builtin: [&(dyn Component + 'static); 3] = [&self.case, &self.keys, &self.room];

        builtin
            .into_iter()
            .chain(self.components.iter().map(Box::as_ref))
    }
}

impl Renderer for Scene {
    type Context = Context;
    type Target<'a> = RenderTarget<'a>;

    /// Applies changes of the keyboard to all components.
    fn apply(&mut self, context: &Context, keyboard: &Keyboard, changes: Changes) {
        for part in self.parts_mut() {
            part.apply(context, keyboard, changes);
        }
        debug!("{} keycap textures uploaded", self.texture_count());
    }

    /// Advances all components by one frame.
    fn update(&mut self, elapsed: f64) {
        for part in self.parts_mut() {
            part.update(elapsed);
        }
    }

    /// Uploads all GPU resources to a restored graphics context.
    fn reload(&mut self, context: &Context, keyboard: &Keyboard) {
        for part in self.parts_mut() {
            part.reload(context, keyboard);
        }
    }

    /// Releases the GPU resources of all components.
    fn release(&mut self) {
        for part in self.parts_mut() {
            part.release();
        }
    }

    /// Renders the scene to the given render target.
    fn render(&self, render_target: &RenderTarget<'_>) {
        let mut lights: Vec<_> = self
            .lights
            .iter()
            .map(|light| light as &dyn Light)
            .collect();
        lights.push(&self.ambient as &dyn Light);

        let [r, g, b, a] = BACKGROUND;
        let render_target = render_target.clear(ClearState::color_and_depth(r, g, b, a, 1.0));

        for part in self.parts() {
            part.render(render_target, &self.camera, &lights);
        }
    }
}
