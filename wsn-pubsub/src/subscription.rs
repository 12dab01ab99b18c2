use bytes::{Buf, BufMut};

use wsn_hal::Millis;
use wsn_proto::serde::{require, require_mut};
use wsn_proto::{DeserializeError, SerializeError};

use crate::sensor::{Aggregator, CmpOp, Filter, Location, Sensor};

/// An immutable subscription record, matching `struct subscription` in
/// `pubsub.h`: what to sample, how often, and what to do with it on the
/// way to its sink.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Subscription {
	/// Sampling period. Encoded on the wire as milliseconds in a `u32`
	/// (4.29e9 ms, ~49 days — ample for a sensor poll interval, and half
	/// the size of carrying the full 64-bit [`Millis`] every node already
	/// uses locally for clock arithmetic).
	pub interval: Millis,
	pub soft: Filter,
	pub hard: Filter,
	pub aggregator: Aggregator,
	pub sensor: Sensor,
}

fn sensor_code(s: Sensor) -> u8 {
	match s {
		Sensor::Location => 0,
		Sensor::Humidity => 1,
		Sensor::Pressure => 2,
	}
}

fn sensor_from_code(code: u8) -> Result<Sensor, DeserializeError> {
	match code {
		0 => Ok(Sensor::Location),
		1 => Ok(Sensor::Humidity),
		2 => Ok(Sensor::Pressure),
		_ => Err(DeserializeError::MalformedPacket("unknown sensor code")),
	}
}

fn cmp_code(op: CmpOp) -> u8 {
	match op {
		CmpOp::Lt => 0,
		CmpOp::Lte => 1,
		CmpOp::Gt => 2,
		CmpOp::Gte => 3,
	}
}

fn cmp_from_code(code: u8) -> Result<CmpOp, DeserializeError> {
	match code {
		0 => Ok(CmpOp::Lt),
		1 => Ok(CmpOp::Lte),
		2 => Ok(CmpOp::Gt),
		3 => Ok(CmpOp::Gte),
		_ => Err(DeserializeError::MalformedPacket("unknown comparison operator")),
	}
}

fn put_f64(dst: &mut impl BufMut, val: f64) -> Result<(), SerializeError> {
	require_mut(dst, 8)?;
	dst.put_f64(val);
	Ok(())
}

fn take_f64(src: &mut impl Buf) -> Result<f64, DeserializeError> {
	require(src, 8)?;
	Ok(src.get_f64())
}

fn put_i16(dst: &mut impl BufMut, val: i16) -> Result<(), SerializeError> {
	require_mut(dst, 2)?;
	dst.put_i16(val);
	Ok(())
}

fn take_i16(src: &mut impl Buf) -> Result<i16, DeserializeError> {
	require(src, 2)?;
	Ok(src.get_i16())
}

fn put_location(dst: &mut impl BufMut, loc: Location) -> Result<(), SerializeError> {
	put_i16(dst, loc.x)?;
	put_i16(dst, loc.y)
}

fn take_location(src: &mut impl Buf) -> Result<Location, DeserializeError> {
	let x = take_i16(src)?;
	let y = take_i16(src)?;
	Ok(Location { x, y })
}

fn put_filter(dst: &mut impl BufMut, filter: Filter) -> Result<(), SerializeError> {
	match filter {
		Filter::None => require_mut(dst, 1).map(|()| dst.put_u8(0)),
		Filter::Scalar { op, threshold } => {
			require_mut(dst, 1)?;
			dst.put_u8(1);
			dst.put_u8(cmp_code(op));
			put_f64(dst, threshold)
		}
		Filter::Between { low, high } => {
			require_mut(dst, 1)?;
			dst.put_u8(2);
			put_f64(dst, low)?;
			put_f64(dst, high)
		}
		Filter::Distance { op, point, radius } => {
			require_mut(dst, 1)?;
			dst.put_u8(3);
			dst.put_u8(cmp_code(op));
			put_location(dst, point)?;
			put_f64(dst, radius)
		}
	}
}

fn take_filter(src: &mut impl Buf) -> Result<Filter, DeserializeError> {
	match wsn_proto::serde::take_u8(src)? {
		0 => Ok(Filter::None),
		1 => {
			let op = cmp_from_code(wsn_proto::serde::take_u8(src)?)?;
			let threshold = take_f64(src)?;
			Ok(Filter::Scalar { op, threshold })
		}
		2 => {
			let low = take_f64(src)?;
			let high = take_f64(src)?;
			Ok(Filter::Between { low, high })
		}
		3 => {
			let op = cmp_from_code(wsn_proto::serde::take_u8(src)?)?;
			let point = take_location(src)?;
			let radius = take_f64(src)?;
			Ok(Filter::Distance { op, point, radius })
		}
		_ => Err(DeserializeError::MalformedPacket("unknown filter kind")),
	}
}

fn put_aggregator(dst: &mut impl BufMut, agg: Aggregator) -> Result<(), SerializeError> {
	match agg {
		Aggregator::None => require_mut(dst, 1).map(|()| dst.put_u8(0)),
		Aggregator::LocationAvg { max_dist } => {
			require_mut(dst, 1)?;
			dst.put_u8(1);
			put_f64(dst, max_dist)
		}
	}
}

fn take_aggregator(src: &mut impl Buf) -> Result<Aggregator, DeserializeError> {
	match wsn_proto::serde::take_u8(src)? {
		0 => Ok(Aggregator::None),
		1 => Ok(Aggregator::LocationAvg { max_dist: take_f64(src)? }),
		_ => Err(DeserializeError::MalformedPacket("unknown aggregator kind")),
	}
}

impl Subscription {
	pub fn serialize_into(&self, dst: &mut impl BufMut) -> Result<(), SerializeError> {
		require_mut(dst, 4)?;
		dst.put_u32(self.interval.min(u32::MAX as Millis) as u32);
		put_filter(dst, self.soft)?;
		put_filter(dst, self.hard)?;
		put_aggregator(dst, self.aggregator)?;
		require_mut(dst, 1)?;
		dst.put_u8(sensor_code(self.sensor));
		Ok(())
	}

	pub fn deserialize_from(src: &mut impl Buf) -> Result<Self, DeserializeError> {
		require(src, 4)?;
		let interval = src.get_u32() as Millis;
		let soft = take_filter(src)?;
		let hard = take_filter(src)?;
		let aggregator = take_aggregator(src)?;
		let sensor = sensor_from_code(wsn_proto::serde::take_u8(src)?)?;
		Ok(Subscription { interval, soft, hard, aggregator, sensor })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn round_trips_a_scalar_subscription() {
		let sub = Subscription {
			interval: 5_000,
			soft: Filter::Scalar { op: CmpOp::Gte, threshold: 10.0 },
			hard: Filter::None,
			aggregator: Aggregator::None,
			sensor: Sensor::Humidity,
		};
		let mut buf = BytesMut::new();
		sub.serialize_into(&mut buf).unwrap();
		let decoded = Subscription::deserialize_from(&mut buf.freeze()).unwrap();
		assert_eq!(decoded, sub);
	}

	#[test]
	fn round_trips_a_location_aggregator_subscription() {
		let sub = Subscription {
			interval: 1_000,
			soft: Filter::None,
			hard: Filter::Distance {
				op: CmpOp::Lte,
				point: Location { x: 1, y: -1 },
				radius: 100.0,
			},
			aggregator: Aggregator::LocationAvg { max_dist: 2.5 },
			sensor: Sensor::Location,
		};
		let mut buf = BytesMut::new();
		sub.serialize_into(&mut buf).unwrap();
		let decoded = Subscription::deserialize_from(&mut buf.freeze()).unwrap();
		assert_eq!(decoded, sub);
	}

	#[test]
	fn rejects_unknown_sensor_code() {
		let mut buf = BytesMut::new();
		buf.extend_from_slice(&0u32.to_be_bytes());
		buf.extend_from_slice(&[0, 0, 0, 9]);
		assert!(matches!(
			Subscription::deserialize_from(&mut buf.freeze()),
			Err(DeserializeError::MalformedPacket(_))
		));
	}
}
