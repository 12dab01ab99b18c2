use bytes::{Buf, BufMut};
use std::mem;

use crate::DeserializeError;

#[derive(Debug)]
pub struct SerializeError;

pub fn require_mut(dst: &impl BufMut, len: usize) -> Result<(), SerializeError> {
	if dst.remaining_mut() < len {
		Err(SerializeError)
	} else {
		Ok(())
	}
}

pub fn require(src: &impl Buf, len: usize) -> Result<(), DeserializeError> {
	if src.remaining() < len {
		Err(DeserializeError::Incomplete)
	} else {
		Ok(())
	}
}

pub fn put_u8(dst: &mut impl BufMut, val: u8) -> Result<(), SerializeError> {
	require_mut(dst, mem::size_of::<u8>())?;
	dst.put_u8(val);
	Ok(())
}

pub fn put_u16(dst: &mut impl BufMut, val: u16) -> Result<(), SerializeError> {
	require_mut(dst, mem::size_of::<u16>())?;
	dst.put_u16(val);
	Ok(())
}

pub fn put_slice(dst: &mut impl BufMut, slice: &[u8]) -> Result<(), SerializeError> {
	require_mut(dst, slice.len())?;
	dst.put_slice(slice);
	Ok(())
}

pub fn take_u8(src: &mut impl Buf) -> Result<u8, DeserializeError> {
	require(src, mem::size_of::<u8>())?;
	Ok(src.get_u8())
}

pub fn take_u16(src: &mut impl Buf) -> Result<u16, DeserializeError> {
	require(src, mem::size_of::<u16>())?;
	Ok(src.get_u16())
}

pub fn take_slice(src: &mut impl Buf, len: usize) -> Result<bytes::Bytes, DeserializeError> {
	require(src, len)?;
	Ok(src.copy_to_bytes(len))
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn round_trips_u16() {
		let mut buf = BytesMut::new();
		put_u16(&mut buf, 0xbeef).unwrap();
		let mut frozen = buf.freeze();
		assert_eq!(take_u16(&mut frozen).unwrap(), 0xbeef);
	}

	#[test]
	fn take_u8_reports_incomplete() {
		let mut empty = bytes::Bytes::new();
		assert!(matches!(
			take_u8(&mut empty),
			Err(DeserializeError::Incomplete)
		));
	}
}
