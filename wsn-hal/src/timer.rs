use crate::Millis;

/// A single pending timer, as returned by [`Timer::schedule`].
///
/// Carries no data of its own; it exists purely so a caller can
/// [`Timer::cancel`] the specific timer it armed, mirroring `struct ctimer`
/// being addressed by pointer in the original (`ctimer_stop(&c->t)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// One-shot timer scheduling, standing in for Contiki's `ctimer_set` /
/// `ctimer_restart` / `ctimer_stop` family.
///
/// Unlike `ctimer`, which fires a C function pointer on an interrupt/process
/// context the caller doesn't control, this trait only *arms* a deadline;
/// firing it back into the stack is the host's job (call the relevant
/// `on_*_timer` method when `now() >= deadline`), keeping every core crate
/// free of callback registration machinery and matching §5's "suspension
/// points" model — a timer fire is just another synchronous re-entry, same
/// as a radio receive.
pub trait Timer {
	/// Arms a new timer to fire `delay` milliseconds from now and returns a
	/// handle to it. Scheduling over an existing handle does not cancel it;
	/// call [`Timer::cancel`] first if that's the intent (this mirrors
	/// `ctimer_set`, which the original always pairs with an explicit
	/// `ctimer_stop` when restarting with a new duration rather than
	/// `ctimer_restart`'s same-duration reuse).
	fn schedule(&mut self, delay: Millis) -> TimerHandle;

	/// Cancels a previously scheduled timer. Canceling a handle that has
	/// already fired or been canceled is a no-op.
	fn cancel(&mut self, handle: TimerHandle);
}
