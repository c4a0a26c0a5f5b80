use crate::membership::RoleSet;
use std::time::Duration;

/// Raised at registration time when no `Up` node in the current view carries every required role.
#[derive(Debug, Clone, thiserror::Error)]
#[error("No Up node carries roles {required_roles:?} required by singleton '{name}'")]
pub struct RoleRestrictionError {
    pub name: String,
    pub required_roles: RoleSet,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    RoleRestriction(#[from] RoleRestrictionError),
    #[error("Local node has not joined the cluster yet")]
    NotJoined,
    #[error("Singleton '{0}' is already registered on this node")]
    AlreadyRegistered(String),
    #[error("Singleton registry actor is dead RIP")]
    RegistryExited,
}

#[derive(Debug, thiserror::Error)]
pub enum DeregisterError {
    #[error("Singleton '{0}' is not registered on this node")]
    NotRegistered(String),
    #[error("Singleton registry actor is dead RIP")]
    RegistryExited,
}

/// Faults are recorded on the singleton's handle and logged. They are never retried on their own.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SingletonFault {
    #[error("Instance did not finish starting within {0:?}")]
    StartTimeout(Duration),
    #[error("Instance failed to start: {0}")]
    StartFailed(String),
    #[error("Instance terminated abnormally: {0}")]
    InstanceFailed(String),
    // The instance was aborted and may have leaked resources.
    #[error("Instance did not stop within the {grace_period:?} grace period")]
    HandoffFault { grace_period: Duration },
}
