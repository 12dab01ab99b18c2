//! Facade over the `wsn-*` stack: re-exports the wire types, the sans-IO
//! link/subnet/pubsub layers, and the publisher/subscriber roles, then
//! assembles them into a [`Node`]. [`sim`] is an in-memory mesh used by
//! `demos` and this crate's `tests/scenarios.rs`.

mod node;
pub mod sim;

pub use wsn_hal::{Clock, Millis, Radio, RadioError, Timer, TimerHandle, TxStatus};
pub use wsn_link::{ADisclose, AdiscloseConfig, AdiscloseEvent, Disclose, DiscloseEvent};
pub use wsn_net::{Config as NetConfig, Existance, SubnetCallbacks};
pub use wsn_proto::{
	Addr, Channel, DeserializeError, Fragment, FragmentHeader, FragmentIter, PacketAttrs, PacketType, PeerPacket, SerializeError, SubId,
};
pub use wsn_pubsub::{Aggregator, CmpOp, Config as PubsubConfig, Filter, Location, Pubsub, PubsubEvent, Reading, Sensor, Subscription};
pub use wsn_roles::{Publisher, Subscriber};

pub use node::Node;
