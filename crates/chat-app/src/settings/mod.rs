pub mod state;

pub use state::{ChatSettings, SettingsChanged, SettingsError, SettingsState, SettingsStore};
