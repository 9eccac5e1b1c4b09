//! Opens a window showing the keyboard scene described by an optional state file.

use std::{env, path::PathBuf};

use color_eyre::{config::HookBuilder, Result};
use config::State;
use env_logger::Env;
use log::info;
use store::Store;
use viewer::Window;

fn main() -> Result<()> {
    HookBuilder::new().display_env_section(false).install()?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let initial_state = match env::args_os().nth(1).map(PathBuf::from) {
        Some(state_path) => {
            info!("Loading state from {}", state_path.display());
            State::try_from_path(&state_path)?
        }
        None => State::default(),
    };
    let store = Store::new(&initial_state)?;

    let window = Window::try_new()?;
    window.run_render_loop(store)?;

    Ok(())
}
