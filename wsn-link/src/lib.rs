//! Single-hop link primitives: Disclose (§4.1) and ADisclose (§4.2).
//!
//! Both are generic over [`wsn_hal::Radio`] and, for ADisclose, over
//! [`wsn_hal::Timer`] — they never touch a real socket or interrupt vector,
//! matching the teacher's sans-IO protocol crates which never import an
//! async runtime either.

mod adisclose;
mod disclose;

pub use adisclose::{ADisclose, AdiscloseConfig, AdiscloseEvent};
pub use disclose::{Disclose, DiscloseEvent};
