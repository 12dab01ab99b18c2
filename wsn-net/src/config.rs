use wsn_hal::Millis;

/// Runtime tunables for a [`crate::Subnet`], standing in for the original's
/// project-wide `#define`s (`SUBNET_CONF_MAX_SINKS` and friends).
///
/// Tables are sized from these fields at construction time rather than via
/// `const` generics: the original's arrays were sized once per firmware
/// image, not per call site, so a runtime-checked capacity (rejecting only a
/// misconfigured `Config`, never ordinary operation) is the idiomatic
/// equivalent, matching the teacher's `ClientConfiguration` pattern of a
/// plain struct with a sensible `Default`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
	/// `SUBNET_MAX_SINKS`.
	pub max_sinks: usize,
	/// `SUBNET_MAX_NEIGHBORS`.
	pub max_neighbors: usize,
	/// `SUBNET_MAX_ALTERNATE_ROUTES`.
	pub max_alternate_routes: usize,
	/// `SUBNET_REVOKE_PERIOD`, in milliseconds.
	pub revoke_period: Millis,
	/// Maximum payload size of a single publish/ask/reply packet, i.e.
	/// `PACKETBUF_SIZE`.
	pub max_packet_len: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			max_sinks: 5,
			max_neighbors: 10,
			max_alternate_routes: 3,
			revoke_period: 600_000,
			max_packet_len: 128,
		}
	}
}
