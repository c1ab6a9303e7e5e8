mod poller;

pub use poller::{Poller, DEFAULT_POLL_INTERVAL};
