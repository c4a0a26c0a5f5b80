use crate::membership::RoleSet;

/// SingletonKey names a singleton and the roles a node must carry to host it. Immutable once
/// registered.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SingletonKey {
    name: String,
    required_roles: RoleSet,
}

impl SingletonKey {
    pub fn new<S: Into<String>>(name: S, required_roles: RoleSet) -> Self {
        SingletonKey {
            name: name.into(),
            required_roles,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_roles(&self) -> &RoleSet {
        &self.required_roles
    }
}
