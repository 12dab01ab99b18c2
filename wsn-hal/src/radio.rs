use bytes::Bytes;
use std::{error, fmt};

use wsn_proto::{Addr, PacketAttrs};

/// A send that could not be handed to the link layer at all.
///
/// This is distinct from an ADisclose timeout (which is reported through the
/// `timedout` callback, not an error) — `RadioError` models the local,
/// immediate failure of the underlying hardware to accept a transmission.
#[derive(Debug)]
pub struct RadioError(pub &'static str);

impl fmt::Display for RadioError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "radio error: {}", self.0)
	}
}

impl error::Error for RadioError {}

/// Link-layer outcome of a transmission, standing in for the original's
/// `MAC_TX_OK` vs. other MAC return codes.
///
/// The original's `on_sent(status)` callback fires once the underlying MAC
/// has finished its own retries for a single-hop send and reports whether it
/// got through; since this stack's core runs synchronously (§5), that
/// outcome is folded into `transmit`'s return value instead of a deferred
/// callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
	/// The single-hop send was link-layer acknowledged (or is a broadcast,
	/// which has no such concept and always reports this).
	Delivered,
	/// The intended single-hop receiver did not acknowledge the frame.
	Failed,
}

/// The host-supplied transmission primitive Disclose and ADisclose are
/// generic over.
///
/// Grounded on Rime's `broadcast_send`/packetbuf attribute model
/// (`disclose.h`/`adisclose.h`): a send is "broadcast plus an attribute"
/// rather than two distinct wire operations, so one trait covers both
/// Disclose's broadcast-with-receiver-attribute sends and ADisclose's
/// unicast-with-packet-id sends. `attrs.receiver` carries the disclosed
/// single-hop destination; leaving it `Addr::NULL` is how a pure broadcast
/// (no disclosed receiver) is expressed.
pub trait Radio {
	/// This node's own address.
	fn local_addr(&self) -> Addr;

	/// Broadcasts `payload` with the given attributes to every single-hop
	/// neighbor, returning the link-layer outcome of reaching the disclosed
	/// receiver (if any).
	fn transmit(&mut self, attrs: &PacketAttrs, payload: Bytes) -> Result<TxStatus, RadioError>;
}
