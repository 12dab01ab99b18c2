//! Sink routing, subscription propagation and multi-hop publish (§5), built
//! on top of [`wsn_link`]'s single-hop ACKed unicast primitive.
//!
//! `Subnet` owns one shared [`wsn_link::ADisclose`] connection for both of
//! the original's Rime channels ([`wsn_proto::Channel`] tells them apart on
//! the wire). Unicast sends (publish-path forwarding, peer ask/reply) go
//! through its ACK/retry machinery; broadcasts (subscribe floods, LEAVING)
//! bypass it, since there's no single recipient to ACK them. Everything is
//! driven through callbacks and an explicit `on_timer` rather than blocking —
//! same sans-IO shape as `wsn_link`.

mod buffer;
mod callbacks;
mod config;
mod routing;
mod subnet;

pub use callbacks::{Existance, SubnetCallbacks};
pub use config::Config;
pub use subnet::Subnet;
