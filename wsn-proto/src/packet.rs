use crate::Addr;

/// The Subnet-layer packet kinds, carried as a packetbuf attribute rather
/// than in the payload itself (matching the original's `PACKETBUF_ATTR`
/// scheme: the type rides alongside the frame, not inside it).
///
/// `Ask` and `Reply` share an on-the-wire value with `Subscribe` and
/// `Publish` respectively in the original (direction alone disambiguates an
/// ask from a subscribe-advertisement, and a reply from a publish); they are
/// kept as distinct variants here since Rust has no trouble giving every
/// meaning its own name, and `PacketType::code()`/`from_code()` preserve the
/// original's wire values for anyone decoding raw captures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketType {
	/// Advertises a subscription (or its revocation) to neighbors.
	Subscribe,
	/// Carries subscribed-to sensor data fragments toward a sink.
	Publish,
	/// Requests clarification about subscriptions heard from a neighbor.
	Ask,
	/// Answers an [`PacketType::Ask`] with revoked/unknown subscription ids.
	Reply,
	/// Withdraws this node as a sink for all of its subscriptions.
	Unsubscribe,
	/// Announces this node is leaving the network as a relay.
	Leaving,
}

impl PacketType {
	pub fn code(self) -> u8 {
		match self {
			PacketType::Subscribe | PacketType::Reply => 0,
			PacketType::Publish | PacketType::Ask => 1,
			PacketType::Unsubscribe => 2,
			PacketType::Leaving => 3,
		}
	}
}

/// Which of Subnet's two logical Rime channels a frame belongs to —
/// `subnet_open`'s `subchannel` (pub/sub traffic) versus `peerchannel`
/// (point-to-point ask/reply/leaving traffic). Both ride the same
/// [`wsn_hal::Radio`] in this stack; this field is how a receiving host
/// tells which of Subnet's two `Disclose` connections a frame is for,
/// standing in for the original's separate Rime channel numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
	PubSub,
	Peer,
}

/// The packetbuf attributes every Subnet-layer frame carries alongside its
/// payload: `EPACKET_TYPE`, `HOPS`, `EFRAGMENTS` and `ERECEIVER` from §6, plus
/// the link-layer `PACKETBUF_ATTR_PACKET_TYPE`/`PACKETBUF_ATTR_PACKET_ID`
/// attributes ADisclose (`adisclose.h`) adds underneath: whether this frame
/// is a data frame or an ACK, and which sequence number it ACKs or carries.
/// Kept on one struct rather than split across layers because, like the
/// original, they all ride out-of-band alongside the payload rather than
/// being encoded into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketAttrs {
	pub channel: Channel,
	pub packet_type: PacketType,
	/// Hop count since origin; incremented by every Disclose relay.
	pub hops: u8,
	/// Number of fragments present in a publish packet's body.
	pub fragments: u8,
	/// `ERECEIVER`: the sink this frame concerns, end-to-end. Unlike
	/// `receiver`, this rides unchanged across every relay.
	pub sink: Addr,
	/// `PACKETBUF_ADDR_RECEIVER`: the disclosed next hop for this specific
	/// transmission; `Addr::NULL` on a broadcast (Disclose) send. Changes at
	/// every hop, which is exactly what [`wsn_link::Disclose::classify`]
	/// switches on to tell a "for me" frame from one merely overheard.
	pub receiver: Addr,
	/// Set by ADisclose on the acknowledgement frame it sends back; clear on
	/// the original data frame.
	pub ack: bool,
	/// ADisclose's per-transmission sequence number, wrapped to
	/// `ack_bits` bits (`ADISCLOSE_PACKET_ID_BITS`).
	pub packet_id: u8,
}

impl Default for PacketAttrs {
	fn default() -> Self {
		PacketAttrs {
			channel: Channel::PubSub,
			packet_type: PacketType::Subscribe,
			hops: 0,
			fragments: 0,
			sink: Addr::NULL,
			receiver: Addr::NULL,
			ack: false,
			packet_id: 0,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ask_and_subscribe_share_a_wire_value_with_their_pair() {
		assert_eq!(PacketType::Subscribe.code(), PacketType::Reply.code());
		assert_eq!(PacketType::Publish.code(), PacketType::Ask.code());
	}
}
