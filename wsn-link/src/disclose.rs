use bytes::Bytes;

use wsn_hal::{Radio, RadioError, TxStatus};
use wsn_proto::{Addr, PacketAttrs};

/// The two ways an incoming Disclose frame can be reported, depending on
/// whether its disclosed receiver matches this node.
///
/// Grounded on `disclose.c`'s `recv_from_broadcast`: every neighbor that
/// hears the broadcast gets a callback, but only the one actually named in
/// `PACKETBUF_ADDR_RECEIVER` gets `recv` rather than `hear`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscloseEvent {
	/// This node is the disclosed receiver of the frame.
	Recv { from: Addr },
	/// This node overheard a frame disclosed to someone else.
	Hear { from: Addr },
}

/// Broadcasts a packet while disclosing an intended single-hop receiver.
///
/// Every single-hop neighbor physically receives the frame (it's a
/// broadcast); [`Disclose::classify`] is how a caller tells whether it was
/// the intended recipient or merely an overhearing bystander, mirroring
/// `disclose_send`/`recv_from_broadcast` in the original.
pub struct Disclose<R> {
	radio: R,
}

impl<R: Radio> Disclose<R> {
	pub fn new(radio: R) -> Self {
		Disclose { radio }
	}

	pub fn local_addr(&self) -> Addr {
		self.radio.local_addr()
	}

	pub fn radio(&self) -> &R {
		&self.radio
	}

	pub fn radio_mut(&mut self) -> &mut R {
		&mut self.radio
	}

	/// Broadcasts `payload`, disclosing `receiver` as the intended
	/// single-hop destination via `attrs.receiver`.
	pub fn send(
		&mut self,
		receiver: Addr,
		mut attrs: PacketAttrs,
		payload: Bytes,
	) -> Result<TxStatus, RadioError> {
		attrs.receiver = receiver;
		self.radio.transmit(&attrs, payload)
	}

	/// Classifies an inbound frame's attributes as `Recv` (disclosed to us)
	/// or `Hear` (disclosed to someone else).
	pub fn classify(&self, attrs: &PacketAttrs, from: Addr) -> DiscloseEvent {
		if attrs.receiver == self.radio.local_addr() {
			DiscloseEvent::Recv { from }
		} else {
			DiscloseEvent::Hear { from }
		}
	}
}
