//! The `viewer` crate contains everything related to rendering a keyboard scene with `three-d`.

mod diagnostics;
mod driver;
mod lifecycle;
mod material;
mod mesh;
mod objects;
mod scene;
mod viewer;
mod window;

pub use diagnostics::{Diagnostics, LogDiagnostics};
pub use driver::{Driver, Renderer};
pub use lifecycle::{Lifecycle, Status, MAX_RESTORE_ATTEMPTS, RESTORE_BACKOFF};
pub use objects::{CaseObject, Component, KeysObject, Room};
pub use viewer::Viewer;
pub use window::Window;

/// The error type for errors while setting up a viewer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The drawable surface has no area.
    #[error("cannot render to a surface of {width}x{height} pixels")]
    EmptySurface {
        /// The width of the surface in pixels.
        width: u32,
        /// The height of the surface in pixels.
        height: u32,
    },
    /// The keyboard scene could not be built.
    #[error("failed to build keyboard scene")]
    Model(#[from] model::Error),
    /// The window could not be created.
    #[error("failed to create window")]
    Window(#[from] three_d::WindowError),
}
