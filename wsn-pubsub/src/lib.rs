//! Pubsub: subscription storage and the existance lifecycle layered over
//! [`wsn_net::Subnet`] (§4.4), plus the concrete sensor/filter/aggregator
//! vocabulary (§4.5) the distilled spec leaves abstract.
//!
//! [`Store`] implements `wsn_net`'s `SubnetCallbacks` against its own
//! subscription tables; [`Pubsub`] wraps a `Subnet<R, Clk, Store<Clk>>` and
//! exposes the `pubsub.c` operations against typed [`Subscription`] records.

mod pubsub;
mod sensor;
mod store;
mod subscription;

pub use pubsub::Pubsub;
pub use sensor::{Aggregator, CmpOp, Filter, Location, Reading, Sensor};
pub use store::{Config, PubsubEvent, Store};
pub use subscription::Subscription;
