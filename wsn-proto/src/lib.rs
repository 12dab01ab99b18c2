//! Wire format for the Subnet protocol: addresses, subscription ids,
//! fragment and peer-clarification codecs, and the packetbuf attributes
//! every frame carries alongside its payload.

mod addr;
mod fragment;
mod packet;
mod peer;
pub mod serde;
mod subid;

use std::{error, fmt};

pub use addr::Addr;
pub use fragment::{Fragment, FragmentHeader, FragmentIter};
pub use packet::{Channel, PacketAttrs, PacketType};
pub use peer::{PeerPacket, PeerPacketHeader};
pub use serde::SerializeError;
pub use subid::{DLen, SubId};

/// Errors raised while decoding a wire frame.
///
/// Mirrors the shape of the teacher's `packets::DeserializeError`: a flat
/// enum of what went wrong, with manual `Display` rather than pulling in a
/// derive macro for a handful of variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeserializeError {
	/// The buffer ended before a fully-formed value could be read.
	Incomplete,
	/// A length field claimed more bytes than the packet can hold.
	MalformedPacket(&'static str),
}

impl fmt::Display for DeserializeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeserializeError::Incomplete => write!(f, "buffer ended before a value did"),
			DeserializeError::MalformedPacket(reason) => {
				write!(f, "malformed packet: {reason}")
			}
		}
	}
}

impl error::Error for DeserializeError {}
