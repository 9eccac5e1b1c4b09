use std::sync::mpsc::{channel, Receiver};

use config::State;
use log::debug;
use store::{Store, Subscription};

use crate::{
    keyboard::{Changes, Keyboard},
    Error,
};

/// The store paths a keyboard scene reacts to.
pub const WATCHED_PATHS: [&str; 3] = ["case", "keys", "colorways"];

/// Keeps a keyboard scene in sync with a state store.
///
/// Store notifications are queued and applied on the next [`Controller::poll`], so several
/// updates in one frame result in a single rebuild.
pub struct Controller {
    store: Store,
    keyboard: Keyboard,
    receiver: Receiver<String>,
    _subscriptions: Vec<Subscription>,
}

impl Controller {
    /// Builds the keyboard scene from the current store state and subscribes to its changes.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the stored state is invalid.
    pub fn new(store: Store) -> Result<Self, Error> {
        let state: State = store.get_state().read("")?;
        let keyboard = Keyboard::from_state(&state)?;
        let (sender, receiver) = channel();

        let subscriptions = WATCHED_PATHS
            .iter()
            .map(|path| {
                let sender = sender.clone();
                store.subscribe(path, move |changed, _| {
                    // The receiver only disappears together with the subscription
                    let _ = sender.send(changed.to_owned());
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            store,
            keyboard,
            receiver,
            _subscriptions: subscriptions,
        })
    }

    /// Applies all pending store changes to the keyboard scene.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the new state is invalid, the scene then keeps its previous
    /// state.
    pub fn poll(&mut self) -> Result<Changes, Error> {
        let paths: Vec<String> = self.receiver.try_iter().collect();
        if paths.is_empty() {
            return Ok(Changes::default());
        }
        debug!("Applying changes to {paths:?}");

        let state: State = self.store.get_state().read("")?;
        self.keyboard.apply(&state)
    }

    /// Rebuilds the whole keyboard scene, rasterizing all textures again.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the scene cannot be rebuilt.
    pub fn force_rebuild(&mut self) -> Result<Changes, Error> {
        self.keyboard.force_rebuild()
    }

    /// Returns the keyboard scene.
    #[must_use]
    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }
}
