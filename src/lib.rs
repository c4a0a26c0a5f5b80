mod actor;
mod api;
mod bus;
mod coordination;
mod membership;
mod singleton;

pub use api::try_create_cluster_services;
pub use api::ClusterOptions;
pub use api::ClusterServices;
pub use api::ClusterServicesConfig;
pub use api::ClusterServicesCreationError;
pub use bus::mailbox;
pub use bus::BroadcastBus;
pub use bus::BusError;
pub use bus::BusHandle;
pub use bus::BusTransport;
pub use bus::Envelope;
pub use bus::InMemoryBusTransport;
pub use bus::InboundDispatch;
pub use bus::Mailbox;
pub use bus::MailboxId;
pub use bus::MailboxRef;
pub use bus::ReplyError;
pub use bus::TransportMessage;
pub use bus::WeakMailboxRef;
pub use coordination::register_presence;
pub use coordination::CoordinationStore;
pub use coordination::InMemoryCoordinationStore;
pub use coordination::PresenceError;
pub use coordination::PresenceGuard;
pub use coordination::PresenceOptions;
pub use coordination::StoreError;
pub use membership::eligible;
pub use membership::leader;
pub use membership::roles;
pub use membership::InMemoryCluster;
pub use membership::InMemoryMembership;
pub use membership::JoinGate;
pub use membership::JoinOrdinal;
pub use membership::JoinTimeoutError;
pub use membership::MembershipEvent;
pub use membership::MembershipEventKind;
pub use membership::MembershipEventStream;
pub use membership::MembershipProvider;
pub use membership::MembershipReader;
pub use membership::MembershipView;
pub use membership::Node;
pub use membership::NodeId;
pub use membership::NodeStatus;
pub use membership::ProviderError;
pub use membership::RoleSet;
pub use singleton::DeregisterError;
pub use singleton::RegisterError;
pub use singleton::RoleRestrictionError;
pub use singleton::SingletonActor;
pub use singleton::SingletonContext;
pub use singleton::SingletonFactory;
pub use singleton::SingletonFault;
pub use singleton::SingletonHandle;
pub use singleton::SingletonKey;
pub use singleton::SingletonState;
pub use singleton::SingletonStatus;
pub use singleton::StartError;

// Root mods hold no code, only `mod` and `pub use` statements. No `mod` is `pub`; everything
// public is exported individually from here.
