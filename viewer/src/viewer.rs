use std::rc::Rc;

use model::{Controller, Keyboard};
use store::Store;
use three_d::{Camera, Context, RenderTarget, Viewport};

use crate::{
    diagnostics::Diagnostics, driver::Driver, lifecycle::Status, objects::Component,
    scene::Scene, Error,
};

/// A keyboard scene bound to a state store and a graphics context.
///
/// State updates are picked up on the next frame. A lost graphics context pauses rendering
/// while state updates keep being applied, restoring re-uploads all GPU resources.
pub struct Viewer {
    driver: Driver<Scene>,
}

impl Viewer {
    /// Builds the keyboard scene from the store state and uploads it to the given context.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the viewport is empty or the stored state is invalid.
    pub fn initialize(context: &Context, viewport: Viewport, store: Store) -> Result<Self, Error> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::EmptySurface {
                width: viewport.width,
                height: viewport.height,
            });
        }

        let controller = Controller::new(store)?;
        let scene = Scene::new(context, viewport, controller.keyboard());

        Ok(Self {
            driver: Driver::new(controller, scene, context.clone()),
        })
    }

    /// Attaches a diagnostics port, it immediately receives the current status.
    pub fn set_diagnostics(&mut self, diagnostics: Rc<dyn Diagnostics>) {
        self.driver.set_diagnostics(diagnostics);
    }

    /// Registers an observer called on every status transition.
    pub fn observe(&mut self, observer: impl FnMut(&Status) + 'static) {
        self.driver.observe(observer);
    }

    /// Adds a component to the scene.
    pub fn add(&mut self, mut component: Box<dyn Component>) {
        if let Some(context) = self.driver.context() {
            component.reload(context, self.driver.keyboard());
        }
        self.driver.renderer_mut().add(component);
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> &Status {
        self.driver.status()
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &Store {
        self.driver.store()
    }

    /// Returns the CPU side of the keyboard scene.
    #[must_use]
    pub fn keyboard(&self) -> &Keyboard {
        self.driver.keyboard()
    }

    /// Returns the camera for modification by camera controls.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.driver.renderer_mut().camera_mut()
    }

    /// Resizes the camera viewport.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.camera_mut().set_viewport(viewport);
    }

    /// Runs one frame: applies pending state updates, advances all components and renders.
    ///
    /// A panic anywhere in the frame marks the graphics context as lost.
    pub fn frame(&mut self, render_target: &RenderTarget<'_>, elapsed: f64) -> &Status {
        self.driver.frame(render_target, elapsed)
    }

    /// Renders a single frame without applying state updates.
    pub fn render(&mut self, render_target: &RenderTarget<'_>) {
        self.driver.render(render_target);
    }

    /// Pauses rendering after the graphics context was lost, releasing all GPU resources.
    pub fn context_lost(&mut self) {
        self.driver.context_lost();
    }

    /// Hands over a restored graphics context, uploading to it on the next due frame.
    pub fn context_restored(&mut self, context: Context) {
        self.driver.context_restored(context);
    }

    /// Releases all GPU resources and stops rendering. Calling it again does nothing.
    ///
    /// Dropping the viewer disposes it as well.
    pub fn dispose(&mut self) {
        self.driver.dispose();
    }
}
