//! Everything concerning the connection to a MockServer instance lives in this module.
//!
//! `MockServerClient`, in the `exposed_client` sub-module, owns the local registry of mounted
//! expectations and drives a [`Transport`](crate::Transport) to keep the MockServer in sync
//! with it. `MockServerClientBuilder` gathers its configuration.
mod builder;
mod exposed_client;

pub use builder::MockServerClientBuilder;
pub use exposed_client::MockServerClient;
