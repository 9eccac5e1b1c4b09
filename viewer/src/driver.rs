use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};

use log::{debug, warn};
use model::{Changes, Controller, Keyboard};
use store::Store;
use web_time::Instant;

use crate::{
    diagnostics::Diagnostics,
    lifecycle::{Lifecycle, Status},
};

/// The GPU side of a viewer.
///
/// Every method may panic if the graphics context stopped working, the [`Driver`] then
/// treats the context as lost.
pub trait Renderer {
    /// The graphics context resources are uploaded to.
    type Context: Clone;
    /// The target frames are rendered to.
    type Target<'a>;

    /// Applies changes of the keyboard scene.
    fn apply(&mut self, context: &Self::Context, keyboard: &Keyboard, changes: Changes);

    /// Advances the scene by one frame, `elapsed` is the time since the last frame in
    /// milliseconds.
    fn update(&mut self, elapsed: f64);

    /// Uploads all GPU resources to the given context.
    fn reload(&mut self, context: &Self::Context, keyboard: &Keyboard);

    /// Releases all GPU resources.
    fn release(&mut self);

    /// Renders a single frame.
    fn render(&self, target: &Self::Target<'_>);
}

/// Drives a renderer from a state store through the viewer lifecycle.
///
/// State updates are picked up on the next frame. A lost graphics context pauses rendering
/// while state updates keep being applied, restoring re-uploads all GPU resources.
pub struct Driver<R: Renderer> {
    controller: Controller,
    renderer: R,
    lifecycle: Lifecycle,
    context: Option<R::Context>,
    restored_context: Option<R::Context>,
    diagnostics: Option<Rc<dyn Diagnostics>>,
}

impl<R: Renderer> Driver<R> {
    /// Starts driving a renderer whose resources were already uploaded to the given context.
    pub fn new(controller: Controller, renderer: R, context: R::Context) -> Self {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start();

        Self {
            controller,
            renderer,
            lifecycle,
            context: Some(context),
            restored_context: None,
            diagnostics: None,
        }
    }

    /// Attaches a diagnostics port, it immediately receives the current status.
    pub fn set_diagnostics(&mut self, diagnostics: Rc<dyn Diagnostics>) {
        diagnostics.status_changed(self.lifecycle.status());
        self.lifecycle.observe({
            let diagnostics = Rc::clone(&diagnostics);
            move |status| diagnostics.status_changed(status)
        });
        self.diagnostics = Some(diagnostics);
    }

    /// Registers an observer called on every status transition.
    pub fn observe(&mut self, observer: impl FnMut(&Status) + 'static) {
        self.lifecycle.observe(observer);
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> &Status {
        self.lifecycle.status()
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &Store {
        self.controller.store()
    }

    /// Returns the CPU side of the keyboard scene.
    #[must_use]
    pub fn keyboard(&self) -> &Keyboard {
        self.controller.keyboard()
    }

    /// Returns the current graphics context, if it is usable.
    #[must_use]
    pub fn context(&self) -> Option<&R::Context> {
        self.context.as_ref()
    }

    /// Returns the renderer.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Runs one frame: applies pending state updates, advances the scene and renders.
    ///
    /// While the graphics context is lost, state updates are still applied and restoring is
    /// attempted once it is due.
    pub fn frame(&mut self, target: &R::Target<'_>, elapsed: f64) -> &Status {
        self.frame_at(target, elapsed, Instant::now())
    }

    fn frame_at(&mut self, target: &R::Target<'_>, elapsed: f64, now: Instant) -> &Status {
        match self.lifecycle.status().clone() {
            Status::Running => {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    self.apply_updates();
                    self.renderer.update(elapsed);
                    self.renderer.render(target);
                }));
                if let Err(payload) = result {
                    self.frame_failed(&*payload, now);
                }
            }
            Status::Lost => {
                let result = catch_unwind(AssertUnwindSafe(|| self.apply_updates()));
                match result {
                    Ok(()) => self.try_restore(now),
                    Err(payload) => {
                        self.lifecycle
                            .restore_failed(now, &panic_message(&*payload));
                    }
                }
            }
            Status::Initializing | Status::Failed(_) | Status::Disposed => {}
        }

        self.lifecycle.status()
    }

    /// Renders a single frame without applying state updates.
    ///
    /// A failing frame marks the graphics context as lost instead of unwinding further.
    pub fn render(&mut self, target: &R::Target<'_>) {
        if !self.lifecycle.is_running() {
            return;
        }

        let renderer = &self.renderer;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| renderer.render(target))) {
            self.frame_failed(&*payload, Instant::now());
        }
    }

    /// Pauses rendering after the graphics context was lost, releasing all GPU resources.
    pub fn context_lost(&mut self) {
        self.lose(Instant::now());
    }

    /// Hands over a restored graphics context, uploading to it on the next due frame.
    pub fn context_restored(&mut self, context: R::Context) {
        if *self.lifecycle.status() == Status::Lost {
            self.restored_context = Some(context);
        }
    }

    /// Releases all GPU resources and stops rendering. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.lifecycle.dispose() {
            debug!("Disposing viewer");
            self.renderer.release();
            self.context = None;
            self.restored_context = None;
        }
    }

    fn lose(&mut self, now: Instant) {
        if !self.lifecycle.is_running() {
            return;
        }

        self.renderer.release();
        self.context = None;
        self.lifecycle.lose(now);
    }

    fn frame_failed(&mut self, payload: &(dyn Any + Send), now: Instant) {
        warn!("Frame failed: {}", panic_message(payload));
        // The context itself may still be usable, retry uploading to it
        self.restored_context = self.context.clone();
        self.lose(now);
    }

    fn apply_updates(&mut self) {
        match self.controller.poll() {
            Ok(changes) if changes.is_empty() => {}
            Ok(changes) => {
                if let Some(context) = &self.context {
                    self.renderer
                        .apply(context, self.controller.keyboard(), changes);
                }
                if let Some(diagnostics) = &self.diagnostics {
                    diagnostics.rebuilt(changes, self.controller.keyboard().cache_stats());
                }
            }
            Err(error) => {
                let reason = error_chain(&error);
                warn!("Keeping previous scene, state update failed: {reason}");
                if let Some(diagnostics) = &self.diagnostics {
                    diagnostics.rejected(&reason);
                }
            }
        }
    }

    fn try_restore(&mut self, now: Instant) {
        if !self.lifecycle.restore_due(now) {
            return;
        }
        let Some(context) = self.restored_context.clone() else {
            return;
        };

        let (renderer, keyboard) = (&mut self.renderer, self.controller.keyboard());
        match catch_unwind(AssertUnwindSafe(|| renderer.reload(&context, keyboard))) {
            Ok(()) => {
                self.context = self.restored_context.take();
                self.lifecycle.restored();
            }
            Err(payload) => {
                self.renderer.release();
                self.lifecycle
                    .restore_failed(now, &panic_message(&*payload));
            }
        }
    }
}

impl<R: Renderer> Drop for Driver<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Joins an error with all of its sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
