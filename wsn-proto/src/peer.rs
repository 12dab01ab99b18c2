use bytes::{Buf, BufMut};

use crate::{
	serde::{self, SerializeError},
	DeserializeError, SubId,
};

/// Header of an ASK or REPLY (peer-clarification) packet.
///
/// Grounded on `subnet.c`'s `on_peer`/ask-reply exchange: a node that hears
/// unfamiliar subscriptions advertised by a neighbor ASKs about the ones it
/// doesn't recognize; the neighbor REPLYs with which of its subscriptions
/// are actually revoked versus which the asker should just learn about. Both
/// directions share this header shape, varying only in which list means
/// what.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerPacketHeader {
	pub revoked_count: u16,
	pub unknown_count: u16,
}

impl PeerPacketHeader {
	pub const ENCODED_LEN: usize = 4;

	pub fn serialize_into(&self, dst: &mut impl BufMut) -> Result<(), SerializeError> {
		serde::put_u16(dst, self.revoked_count)?;
		serde::put_u16(dst, self.unknown_count)
	}

	pub fn deserialize_from(src: &mut impl Buf) -> Result<Self, DeserializeError> {
		let revoked_count = serde::take_u16(src)?;
		let unknown_count = serde::take_u16(src)?;
		Ok(PeerPacketHeader {
			revoked_count,
			unknown_count,
		})
	}
}

/// A fully decoded ASK or REPLY packet: the header plus the two `SubId`
/// lists it announces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerPacket {
	pub revoked: Vec<SubId>,
	pub unknown: Vec<SubId>,
}

impl PeerPacket {
	pub fn serialize_into(&self, dst: &mut impl BufMut) -> Result<(), SerializeError> {
		if self.revoked.len() > u16::MAX as usize || self.unknown.len() > u16::MAX as usize {
			return Err(SerializeError);
		}
		let header = PeerPacketHeader {
			revoked_count: self.revoked.len() as u16,
			unknown_count: self.unknown.len() as u16,
		};
		header.serialize_into(dst)?;
		for subid in &self.revoked {
			serde::put_u8(dst, subid.0)?;
		}
		for subid in &self.unknown {
			serde::put_u8(dst, subid.0)?;
		}
		Ok(())
	}

	pub fn deserialize_from(src: &mut impl Buf) -> Result<Self, DeserializeError> {
		let header = PeerPacketHeader::deserialize_from(src)?;
		let revoked = (0..header.revoked_count)
			.map(|_| serde::take_u8(src).map(SubId))
			.collect::<Result<_, _>>()?;
		let unknown = (0..header.unknown_count)
			.map(|_| serde::take_u8(src).map(SubId))
			.collect::<Result<_, _>>()?;
		Ok(PeerPacket { revoked, unknown })
	}
}
