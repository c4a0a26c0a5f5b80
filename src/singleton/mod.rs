mod error;
mod handle;
mod instance;
mod key;
mod lifecycle;
mod registry;

pub use error::{DeregisterError, RegisterError, RoleRestrictionError, SingletonFault};
pub use handle::{SingletonHandle, SingletonState, SingletonStatus};
pub use instance::{SingletonActor, SingletonContext, SingletonFactory, StartError};
pub use key::SingletonKey;
pub(crate) use lifecycle::LifecycleConfig;
pub(crate) use registry::{RegisterInput, SingletonRegistry};
