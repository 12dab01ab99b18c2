use bytes::Bytes;

use wsn_proto::{Addr, SubId};

/// Whether a subscription is known to the application layer, and if so
/// whether it has since been revoked.
///
/// Replaces the original's overloaded `clock_time_t revoked` field (`0` =
/// not revoked, non-zero = revocation timestamp) with a proper tagged enum;
/// a revoked subscription is still "known" for the purposes of
/// `is_known`/route propagation, it's just no longer active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Existance {
	Unknown,
	Known,
	Revoked,
}

impl Existance {
	/// `is_known` in the original: true for anything that isn't `Unknown`,
	/// since a `Revoked` subscription is still known about.
	pub fn is_known(self) -> bool {
		!matches!(self, Existance::Unknown)
	}
}

/// The application-supplied contract Subnet calls into, mirroring
/// `subnet_callbacks`. Every method here takes the sink by its stable
/// [`Addr`] rather than the original's reusable `sinkid` index — the
/// original's own doc comment warns "this sinkid may be reused in the
/// future", which an address never is.
pub trait SubnetCallbacks {
	/// No next hop could be found to forward a publish towards `sink`.
	fn errpub(&mut self, sink: Addr);

	/// A publish for `subid` at `sink` arrived with `data`.
	fn ondata(&mut self, sink: Addr, subid: SubId, data: Bytes);

	/// A new (or resurrected) subscription was announced.
	fn subscribe(&mut self, sink: Addr, subid: SubId, data: Bytes);

	/// A subscription was withdrawn.
	fn unsubscribe(&mut self, sink: Addr, subid: SubId);

	/// Reports whether `subid` at `sink` is known to the application. Called
	/// frequently (once per fragment on every heard publish), so
	/// implementations should keep this cheap.
	fn exists(&self, sink: Addr, subid: SubId) -> Existance;

	/// Fills in up to `space` bytes describing `subid` at `sink`, for a
	/// REPLY to an ASK. Returning an empty `Bytes` means "can't describe this
	/// subscription in the space available", matching the original's
	/// "return 0" contract.
	fn inform(&self, sink: Addr, subid: SubId, space: usize) -> Bytes;

	/// `sink` has announced it is leaving for good; revoke everything
	/// associated with it.
	fn sink_left(&mut self, sink: Addr);
}
