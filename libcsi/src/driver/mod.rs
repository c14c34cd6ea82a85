//! Identity and Node service implementations for ephemeral inline volumes.

mod identity;
mod node;

pub use identity::IdentityServer;
pub use node::NodeServer;
