use bytes::Bytes;

use wsn_hal::{Millis, Radio, RadioError, Timer, TimerHandle, TxStatus};
use wsn_proto::{Addr, PacketAttrs};

use crate::disclose::{Disclose, DiscloseEvent};

/// Tunable for [`ADisclose`]; the original's `ADISCLOSE_CONF_TIMEOUT_TIME`
/// (default half a second) and `ADISCLOSE_PACKET_ID_BITS` (default 2, i.e. a
/// 4-value sequence-number space).
#[derive(Clone, Copy, Debug)]
pub struct AdiscloseConfig {
	pub timeout_ms: Millis,
	pub ack_bits: u8,
}

impl Default for AdiscloseConfig {
	fn default() -> Self {
		AdiscloseConfig {
			timeout_ms: 500,
			ack_bits: 2,
		}
	}
}

impl AdiscloseConfig {
	fn modulus(&self) -> u8 {
		1u8 << self.ack_bits
	}
}

/// Events an application drives off of ADisclose, one per `adisclose_callbacks`
/// member in the original.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdiscloseEvent {
	/// A data frame addressed to us arrived; its ACK has already been sent.
	Recv { from: Addr },
	/// We overheard a data frame addressed to someone else.
	Hear { from: Addr },
	/// Our outstanding send was ACKed.
	Sent { to: Addr },
	/// Our outstanding send's timer expired with no matching ACK.
	TimedOut { to: Addr },
}

/// Single transmission, ACKed unicast (§4.2).
///
/// Exactly one outstanding send at a time (`adisclose_is_transmitting`); a
/// second `send` while one is pending is rejected rather than queued, same
/// as the original. Not stubborn — a failed send is reported, never
/// silently retried.
pub struct ADisclose<R, T> {
	disclose: Disclose<R>,
	timer: T,
	config: AdiscloseConfig,
	sndnxt: u8,
	is_tx: bool,
	failed: bool,
	receiver: Addr,
	pending: Option<TimerHandle>,
}

impl<R: Radio, T: Timer> ADisclose<R, T> {
	pub fn new(radio: R, timer: T, config: AdiscloseConfig) -> Self {
		ADisclose {
			disclose: Disclose::new(radio),
			timer,
			config,
			sndnxt: 0,
			is_tx: false,
			failed: false,
			receiver: Addr::NULL,
			pending: None,
		}
	}

	pub fn local_addr(&self) -> Addr {
		self.disclose.local_addr()
	}

	pub fn is_transmitting(&self) -> bool {
		self.is_tx
	}

	/// The timer handle currently armed for an outstanding send, if any. A
	/// host compares an `on_timer` handle against this before calling
	/// [`ADisclose::on_timeout`].
	pub fn pending_handle(&self) -> Option<TimerHandle> {
		self.pending
	}

	/// Sends a frame without arming the ACK/retry state machine: for
	/// broadcasts, which have no single peer to ACK them and so must never
	/// occupy the one outstanding-send slot `send` guards.
	pub fn send_unacked(&mut self, receiver: Addr, attrs: PacketAttrs, payload: Bytes) -> Result<TxStatus, RadioError> {
		self.disclose.send(receiver, attrs, payload)
	}

	/// Sends a single data frame, arming the timeout timer. Returns `Ok(false)`
	/// without transmitting if a send is already outstanding, matching
	/// `adisclose_send`'s "return 0" early-out.
	pub fn send(
		&mut self,
		receiver: Addr,
		mut attrs: PacketAttrs,
		payload: Bytes,
	) -> Result<bool, RadioError> {
		if self.is_tx {
			tracing::trace!(%receiver, "adisclose: already transmitting");
			return Ok(false);
		}

		self.pending = Some(self.timer.schedule(self.config.timeout_ms));
		self.receiver = receiver;
		attrs.ack = false;
		attrs.packet_id = self.sndnxt;
		self.is_tx = true;

		match self.disclose.send(receiver, attrs, payload) {
			Ok(_status) => Ok(true),
			Err(e) => {
				self.is_tx = false;
				self.failed = false;
				if let Some(handle) = self.pending.take() {
					self.timer.cancel(handle);
				}
				Err(e)
			}
		}
	}

	/// Call when the timer armed by [`ADisclose::send`] fires.
	pub fn on_timeout(&mut self) -> AdiscloseEvent {
		self.failed = true;
		self.is_tx = false;
		self.pending = None;
		let to = self.receiver;
		self.sndnxt = (self.sndnxt + 1) % self.config.modulus();
		tracing::warn!(%to, "adisclose: send timed out");
		AdiscloseEvent::TimedOut { to }
	}

	/// Call with every inbound frame's attributes. Returns `None` for frames
	/// that produce no observable event (a stray or mismatched ACK).
	pub fn on_incoming(
		&mut self,
		attrs: &PacketAttrs,
		from: Addr,
		payload: Bytes,
	) -> Option<AdiscloseEvent> {
		// The payload itself is handed to the subscriber of `Recv`/`Hear` by
		// the caller (it already has it); ADisclose only needs the attrs to
		// drive its ACK state machine.
		let _ = payload;
		match self.disclose.classify(attrs, from) {
			DiscloseEvent::Recv { from } => self.on_recv(attrs, from),
			DiscloseEvent::Hear { from } => {
				if attrs.ack {
					None
				} else {
					Some(AdiscloseEvent::Hear { from })
				}
			}
		}
	}

	fn on_recv(&mut self, attrs: &PacketAttrs, from: Addr) -> Option<AdiscloseEvent> {
		if attrs.ack {
			if attrs.packet_id != self.sndnxt {
				tracing::trace!(got = attrs.packet_id, want = self.sndnxt, "adisclose: bad ack");
				return None;
			}

			if let Some(handle) = self.pending.take() {
				self.timer.cancel(handle);
			}
			if self.failed {
				// timedout() already fired for this sequence number.
				return None;
			}

			self.sndnxt = (self.sndnxt + 1) % self.config.modulus();
			self.is_tx = false;
			Some(AdiscloseEvent::Sent { to: from })
		} else {
			let ack_attrs = PacketAttrs {
				ack: true,
				packet_id: attrs.packet_id,
				..PacketAttrs::default()
			};
			if let Err(e) = self.disclose.send(from, ack_attrs, Bytes::new()) {
				tracing::warn!(%from, error = %e, "adisclose: failed to send ack");
			}
			Some(AdiscloseEvent::Recv { from })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;
	use std::rc::Rc;

	struct FakeRadio {
		addr: Addr,
		sent: Rc<RefCell<Vec<(PacketAttrs, Bytes)>>>,
	}

	impl Radio for FakeRadio {
		fn local_addr(&self) -> Addr {
			self.addr
		}

		fn transmit(&mut self, attrs: &PacketAttrs, payload: Bytes) -> Result<TxStatus, RadioError> {
			self.sent.borrow_mut().push((*attrs, payload));
			Ok(TxStatus::Delivered)
		}
	}

	#[derive(Default)]
	struct FakeTimer {
		next: u64,
		canceled: Vec<TimerHandle>,
	}

	impl Timer for FakeTimer {
		fn schedule(&mut self, _delay: Millis) -> TimerHandle {
			let h = TimerHandle(self.next);
			self.next += 1;
			h
		}

		fn cancel(&mut self, handle: TimerHandle) {
			self.canceled.push(handle);
		}
	}

	fn node(addr: Addr) -> (ADisclose<FakeRadio, FakeTimer>, Rc<RefCell<Vec<(PacketAttrs, Bytes)>>>) {
		let sent = Rc::new(RefCell::new(Vec::new()));
		let radio = FakeRadio {
			addr,
			sent: sent.clone(),
		};
		(
			ADisclose::new(radio, FakeTimer::default(), AdiscloseConfig::default()),
			sent,
		)
	}

	#[test]
	fn second_send_while_outstanding_is_rejected() {
		let (mut a, _sent) = node(Addr::new(1, 0));
		assert!(a
			.send(Addr::new(2, 0), PacketAttrs::default(), Bytes::new())
			.unwrap());
		assert!(!a
			.send(Addr::new(2, 0), PacketAttrs::default(), Bytes::new())
			.unwrap());
	}

	#[test]
	fn matching_ack_fires_sent_and_frees_the_slot() {
		let (mut a, _sent) = node(Addr::new(1, 0));
		a.send(Addr::new(2, 0), PacketAttrs::default(), Bytes::new())
			.unwrap();

		let ack = PacketAttrs {
			ack: true,
			packet_id: 0,
			receiver: Addr::new(1, 0),
			..PacketAttrs::default()
		};
		let event = a.on_incoming(&ack, Addr::new(2, 0), Bytes::new());
		assert_eq!(
			event,
			Some(AdiscloseEvent::Sent {
				to: Addr::new(2, 0)
			})
		);
		assert!(!a.is_transmitting());
	}

	#[test]
	fn late_ack_after_timeout_is_suppressed() {
		let (mut a, _sent) = node(Addr::new(1, 0));
		a.send(Addr::new(2, 0), PacketAttrs::default(), Bytes::new())
			.unwrap();
		assert_eq!(
			a.on_timeout(),
			AdiscloseEvent::TimedOut {
				to: Addr::new(2, 0)
			}
		);

		let ack = PacketAttrs {
			ack: true,
			packet_id: 0,
			receiver: Addr::new(1, 0),
			..PacketAttrs::default()
		};
		// sndnxt already advanced past 0 by the timeout, so this late ack
		// for the old sequence number no longer matches and is dropped.
		assert_eq!(a.on_incoming(&ack, Addr::new(2, 0), Bytes::new()), None);
	}

	#[test]
	fn data_frame_triggers_an_ack_reply() {
		let (mut a, sent) = node(Addr::new(1, 0));
		let data = PacketAttrs {
			ack: false,
			packet_id: 3,
			receiver: Addr::new(1, 0),
			..PacketAttrs::default()
		};
		let event = a.on_incoming(&data, Addr::new(5, 0), Bytes::from_static(b"hi"));
		assert_eq!(
			event,
			Some(AdiscloseEvent::Recv {
				from: Addr::new(5, 0)
			})
		);
		let (ack_attrs, _) = &sent.borrow()[0];
		assert!(ack_attrs.ack);
		assert_eq!(ack_attrs.packet_id, 3);
	}
}
