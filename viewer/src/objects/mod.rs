mod case;
mod keys;
mod room;

use model::{Changes, Keyboard};
use three_d::{Camera, Context, Light, RenderTarget};

pub use case::CaseObject;
pub use keys::KeysObject;
pub use room::Room;

/// A part of the scene which can be rendered and kept in sync with the keyboard.
pub trait Component {
    /// Advances the component by one frame, `elapsed` is the time since the last frame in
    /// milliseconds.
    fn update(&mut self, _elapsed: f64) {}

    /// Applies changes of the keyboard scene.
    fn apply(&mut self, _context: &Context, _keyboard: &Keyboard, _changes: Changes) {}

    /// Uploads all GPU resources again after the graphics context was restored.
    fn reload(&mut self, context: &Context, keyboard: &Keyboard);

    /// Releases all GPU resources, the component renders nothing until reloaded.
    fn release(&mut self);

    /// Renders `self` to the given render target.
    fn render(&self, render_target: &RenderTarget, camera: &Camera, lights: &[&dyn Light]);
}
