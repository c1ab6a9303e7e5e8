mod settings;

pub use settings::{
    Command, Config, PlatformSettings, RelaySettings, Settings, SourceSettings, StoreCommand,
};
