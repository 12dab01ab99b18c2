/// The reading-type tag a subscription subscribes to.
///
/// Grounded on `enum reading_type` in `pubsub-config.h`/`readings.h`; kept
/// as a concrete, closed set here (rather than an open trait object) since
/// the soft/hard filter and aggregator vocabulary below is itself concrete
/// per-variant, matching the original's `switch (rt)` dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sensor {
	Location,
	Humidity,
	Pressure,
}

/// A 2-D coordinate, the payload of a [`Sensor::Location`] reading.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
	pub x: i16,
	pub y: i16,
}

impl Location {
	pub fn distance(self, other: Location) -> f64 {
		let dx = (self.x - other.x) as f64;
		let dy = (self.y - other.y) as f64;
		(dx * dx + dy * dy).sqrt()
	}
}

/// A single sampled value, tagged by which sensor produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reading {
	Location(Location),
	Humidity(f64),
	Pressure(f64),
}

impl Reading {
	pub fn sensor(self) -> Sensor {
		match self {
			Reading::Location(_) => Sensor::Location,
			Reading::Humidity(_) => Sensor::Humidity,
			Reading::Pressure(_) => Sensor::Pressure,
		}
	}

	/// Encodes the reading's value (not its sensor tag — the subscription
	/// it is published against already carries that) onto the wire, so a
	/// sink can decode buffered fragments back into readings to aggregate.
	pub fn encode(self, dst: &mut impl bytes::BufMut) {
		match self {
			Reading::Location(loc) => {
				dst.put_i16(loc.x);
				dst.put_i16(loc.y);
			}
			Reading::Humidity(v) | Reading::Pressure(v) => dst.put_f64(v),
		}
	}

	/// Inverse of [`Reading::encode`], given the sensor type the reading was
	/// published under. `None` if `src` is too short for that sensor's
	/// shape.
	pub fn decode(sensor: Sensor, src: &mut impl bytes::Buf) -> Option<Reading> {
		match sensor {
			Sensor::Location => {
				if src.remaining() < 4 {
					return None;
				}
				let x = src.get_i16();
				let y = src.get_i16();
				Some(Reading::Location(Location { x, y }))
			}
			Sensor::Humidity => (src.remaining() >= 8).then(|| Reading::Humidity(src.get_f64())),
			Sensor::Pressure => (src.remaining() >= 8).then(|| Reading::Pressure(src.get_f64())),
		}
	}
}

/// A threshold comparison, shared by scalar and distance filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmpOp {
	Lt,
	Lte,
	Gt,
	Gte,
}

impl CmpOp {
	fn holds(self, lhs: f64, rhs: f64) -> bool {
		match self {
			CmpOp::Lt => lhs < rhs,
			CmpOp::Lte => lhs <= rhs,
			CmpOp::Gt => lhs > rhs,
			CmpOp::Gte => lhs >= rhs,
		}
	}
}

/// Soft/hard filter vocabulary (§4.5, supplemented from `readings.h`'s
/// `reading_satisfies`). A filter "fires" when it excludes the reading —
/// the caller decides what firing means (drop the sample for a soft
/// filter, ignore the subscription entirely for a hard filter).
///
/// Left open to extension: nothing in the stack requires this to be the
/// only vocabulary a caller ever uses, mirroring how `pubsub-config.h`
/// leaves `soft_filter`/`hard_filter` as project-supplied enums.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Filter {
	/// Never fires.
	None,
	/// Fires unless `op(reading, threshold)` holds. Only meaningful for
	/// `Humidity`/`Pressure` readings.
	Scalar { op: CmpOp, threshold: f64 },
	/// Fires unless `low < reading < high`. Only meaningful for
	/// `Humidity`/`Pressure` readings.
	Between { low: f64, high: f64 },
	/// Fires unless `op(distance(reading, point), radius)` holds. Only
	/// meaningful for `Location` readings.
	Distance { op: CmpOp, point: Location, radius: f64 },
}

impl Filter {
	/// Whether `reading` passes this filter, i.e. the filter does *not*
	/// fire. Mismatched sensor/filter combinations (e.g. a `Distance`
	/// filter against a `Humidity` reading) never fire, matching
	/// `reading_satisfies`'s `if (rt != filter->rt) return 0` guard acting
	/// the other way: here it means "nothing to exclude on, so pass".
	pub fn passes(self, reading: Reading) -> bool {
		match (self, reading) {
			(Filter::None, _) => true,
			(Filter::Scalar { op, threshold }, Reading::Humidity(v) | Reading::Pressure(v)) => op.holds(v, threshold),
			(Filter::Between { low, high }, Reading::Humidity(v) | Reading::Pressure(v)) => v > low && v < high,
			(Filter::Distance { op, point, radius }, Reading::Location(loc)) => op.holds(loc.distance(point), radius),
			_ => true,
		}
	}
}

/// Per-hop aggregator vocabulary (§4.4/§4.5, supplemented from
/// `pubsub-config.h`'s `aggregator_t`). Applied by the publisher role when
/// draining a sink's buffer: for `LocationAvg`, fragments for the same
/// subscription whose locations fall within `max_dist` of each other are
/// averaged into one value before re-adding (§8 scenario 4).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Aggregator {
	/// Pass every buffered value through unchanged.
	None,
	/// Average `Location` readings that cluster within `max_dist` of each
	/// other, leaving readings further away as separate groups.
	LocationAvg { max_dist: f64 },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scalar_filter_fires_outside_threshold() {
		let f = Filter::Scalar { op: CmpOp::Gte, threshold: 50.0 };
		assert!(f.passes(Reading::Humidity(55.0)));
		assert!(!f.passes(Reading::Humidity(45.0)));
	}

	#[test]
	fn between_filter_is_exclusive() {
		let f = Filter::Between { low: 10.0, high: 20.0 };
		assert!(f.passes(Reading::Pressure(15.0)));
		assert!(!f.passes(Reading::Pressure(10.0)));
		assert!(!f.passes(Reading::Pressure(20.0)));
	}

	#[test]
	fn distance_filter_measures_from_point() {
		let origin = Location { x: 0, y: 0 };
		let f = Filter::Distance { op: CmpOp::Lte, point: origin, radius: 5.0 };
		assert!(f.passes(Reading::Location(Location { x: 3, y: 4 })));
		assert!(!f.passes(Reading::Location(Location { x: 10, y: 0 })));
	}

	#[test]
	fn mismatched_sensor_and_filter_never_fires() {
		let f = Filter::Distance { op: CmpOp::Lte, point: Location { x: 0, y: 0 }, radius: 1.0 };
		assert!(f.passes(Reading::Humidity(999.0)));
	}

	#[test]
	fn reading_round_trips_through_encode_decode() {
		let mut buf = bytes::BytesMut::new();
		let loc = Reading::Location(Location { x: -4, y: 12 });
		loc.encode(&mut buf);
		assert_eq!(Reading::decode(Sensor::Location, &mut buf.freeze()), Some(loc));

		let mut buf = bytes::BytesMut::new();
		let hum = Reading::Humidity(63.5);
		hum.encode(&mut buf);
		assert_eq!(Reading::decode(Sensor::Humidity, &mut buf.freeze()), Some(hum));
	}
}
