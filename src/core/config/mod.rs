pub mod local;
pub mod remote;
pub mod store;

pub use local::{LocalConfig, LocalGameRecord};
pub use remote::{RemoteConfig, RemoteGameDescriptor};
pub use store::{ConfigField, ConfigStore, ConfigUpdate, GameUpdate};
