use std::fmt;

/// A node address, matching Rime's 2-byte `rimeaddr_t`.
///
/// Ordering is byte-lexicographic; it only exists so [`Addr`] can serve as
/// the deterministic tie-break key the route table sorts on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Addr(pub [u8; 2]);

impl Addr {
	/// The null address (`rimeaddr_t` all-zero), used as the "no route"/"no
	/// sink" sentinel throughout the stack.
	pub const NULL: Addr = Addr([0, 0]);

	pub const fn new(hi: u8, lo: u8) -> Self {
		Addr([hi, lo])
	}

	pub fn is_null(&self) -> bool {
		*self == Self::NULL
	}

	pub fn bytes(&self) -> [u8; 2] {
		self.0
	}
}

impl From<[u8; 2]> for Addr {
	fn from(bytes: [u8; 2]) -> Self {
		Addr(bytes)
	}
}

impl fmt::Display for Addr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.0[0], self.0[1])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_is_all_zero() {
		assert_eq!(Addr::NULL, Addr::new(0, 0));
		assert!(Addr::NULL.is_null());
		assert!(!Addr::new(1, 0).is_null());
	}

	#[test]
	fn ordering_is_lexicographic() {
		assert!(Addr::new(1, 0) < Addr::new(1, 1));
		assert!(Addr::new(1, 255) < Addr::new(2, 0));
	}
}
