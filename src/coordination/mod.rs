mod presence;
mod store;

pub use presence::{register_presence, PresenceError, PresenceGuard, PresenceOptions};
pub use store::{CoordinationStore, InMemoryCoordinationStore, StoreError};
