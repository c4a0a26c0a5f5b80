//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod options;
mod wiring;

pub use client::ClusterServices;
pub use options::ClusterOptions;
pub use wiring::try_create_cluster_services;
pub use wiring::ClusterServicesConfig;
pub use wiring::ClusterServicesCreationError;
