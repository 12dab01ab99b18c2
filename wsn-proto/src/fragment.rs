use bytes::{Buf, BufMut, Bytes};

use crate::{
	serde::{self, SerializeError},
	DeserializeError, DLen, SubId,
};

/// Header in front of every data fragment: which subscription the payload
/// answers, and how many bytes of payload follow.
///
/// Matches `struct fragment { short subid; unsigned char length; }` from the
/// original `subnet.h` — one of these precedes each subscription's payload
/// inside a publish packet so several subscriptions' data can share one
/// radio packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentHeader {
	pub subid: SubId,
	pub length: DLen,
}

impl FragmentHeader {
	pub const ENCODED_LEN: usize = 2;

	pub fn serialize_into(&self, dst: &mut impl BufMut) -> Result<(), SerializeError> {
		serde::put_u8(dst, self.subid.0)?;
		serde::put_u8(dst, self.length.0)
	}

	pub fn deserialize_from(src: &mut impl Buf) -> Result<Self, DeserializeError> {
		let subid = SubId(serde::take_u8(src)?);
		let length = DLen(serde::take_u8(src)?);
		Ok(FragmentHeader { subid, length })
	}
}

/// A single decoded fragment: header plus its payload slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
	pub subid: SubId,
	pub payload: Bytes,
}

impl Fragment {
	pub fn serialize_into(&self, dst: &mut impl BufMut) -> Result<(), SerializeError> {
		if self.payload.len() > u8::MAX as usize {
			return Err(SerializeError);
		}
		let header = FragmentHeader {
			subid: self.subid,
			length: DLen(self.payload.len() as u8),
		};
		header.serialize_into(dst)?;
		serde::put_slice(dst, &self.payload)
	}
}

/// Iterates the concatenated `{header, payload}*` run that makes up a
/// publish packet's body, one [`Fragment`] at a time.
///
/// Grounded on `subnet.c`'s `prepare_packetbuf`/publish-handling loop, which
/// walks a packet this way rather than framing it as a length-prefixed list;
/// bounds are re-checked on every step so a truncated or corrupt packet ends
/// the iteration with an error instead of reading out of bounds.
pub struct FragmentIter {
	buf: Bytes,
}

impl FragmentIter {
	pub fn new(buf: Bytes) -> Self {
		FragmentIter { buf }
	}
}

impl Iterator for FragmentIter {
	type Item = Result<Fragment, DeserializeError>;

	fn next(&mut self) -> Option<Self::Item> {
		if !self.buf.has_remaining() {
			return None;
		}

		let header = match FragmentHeader::deserialize_from(&mut self.buf) {
			Ok(header) => header,
			Err(e) => {
				self.buf.clear();
				return Some(Err(e));
			}
		};

		match serde::take_slice(&mut self.buf, header.length.as_usize()) {
			Ok(payload) => Some(Ok(Fragment {
				subid: header.subid,
				payload,
			})),
			Err(e) => {
				self.buf.clear();
				Some(Err(e))
			}
		}
	}
}
