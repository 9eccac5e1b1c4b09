use std::rc::Rc;

use store::Store;
use three_d::{
    window, FrameInput, FrameOutput, InnerSpace, MouseButton, OrbitControl, WindowSettings,
};

use crate::{
    diagnostics::LogDiagnostics,
    lifecycle::Status,
    viewer::Viewer,
    Error,
};

/// An application window.
pub struct Window {
    inner: window::Window,
}

impl Window {
    /// Creates a new window.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the window could not be created.
    pub fn try_new() -> Result<Self, Error> {
        let inner = window::Window::new(WindowSettings {
            title: "Keyboard customizer".to_owned(),
            ..Default::default()
        })?;

        Ok(Self { inner })
    }

    /// Shows the keyboard scene of the given store and runs the render loop. This is blocking
    /// until the window is closed or the viewer failed.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the keyboard scene could not be built.
    pub fn run_render_loop(self, store: Store) -> Result<(), Error> {
        let mut application = Application::new(&self.inner, store)?;

        self.inner
            .render_loop(move |frame_input| application.handle_frame(frame_input));

        Ok(())
    }
}

/// An application rendering a keyboard scene with an orbit camera.
struct Application {
    control: OrbitControl,
    viewer: Viewer,
}

impl Application {
    /// Creates a new application for the given window.
    fn new(window: &window::Window, store: Store) -> Result<Self, Error> {
        let mut viewer = Viewer::initialize(&window.gl(), window.viewport(), store)?;
        viewer.set_diagnostics(Rc::new(LogDiagnostics));
        let control = OrbitControl::new(three_d::vec3(0.0, 0.0, 0.0), 10.0, 200.0);

        Ok(Self { control, viewer })
    }

    /// Handles events and renders the given frame.
    fn handle_frame(&mut self, mut frame_input: FrameInput) -> FrameOutput {
        self.viewer.set_viewport(frame_input.viewport);
        let camera = self.viewer.camera_mut();
        self.control.handle_events(camera, &mut frame_input.events);

        // Allow translating the camera sideways when holding right mouse button
        for event in &mut frame_input.events {
            if let three_d::Event::MouseMotion { button, delta, .. } = event {
                if *button == Some(MouseButton::Right) {
                    let right = camera.right_direction().normalize();
                    let up = right.cross(camera.view_direction());
                    let translation = -delta.0 * right + delta.1 * up;
                    let speed = 0.001 * camera.position().magnitude();

                    camera.translate(speed * translation);
                }
            }
        }

        let status = self
            .viewer
            .frame(&frame_input.screen(), frame_input.elapsed_time);

        FrameOutput {
            exit: matches!(status, Status::Failed(_) | Status::Disposed),
            ..Default::default()
        }
    }
}
