//! Native-messaging host: the external process that performs confirmed
//! saves and executions on behalf of a viewer.
pub mod handlers;
pub mod protocol;
pub mod server;

pub use handlers::LocalBackend;
pub use server::HostServer;
