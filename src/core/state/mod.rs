pub mod settings;
pub mod updater;

pub use settings::UpdaterSettings;
pub use updater::{GameReport, UpdatePass, Updater};
