use bytes::{Bytes, BytesMut};

use wsn_proto::{Fragment, FragmentHeader, SubId};

/// Appends a `{subid, payload}` fragment to a publish buffer, matching
/// `inject_packetbuf` in `subnet.c`: refuses and leaves `buf`/`fragments`
/// untouched if the fragment wouldn't fit within `max_len`.
pub(crate) fn inject_fragment(
	buf: &mut BytesMut,
	fragments: &mut u8,
	max_len: usize,
	subid: SubId,
	payload: &[u8],
) -> bool {
	if payload.len() > u8::MAX as usize {
		return false;
	}
	if buf.len() + FragmentHeader::ENCODED_LEN + payload.len() > max_len {
		return false;
	}

	let frag = Fragment {
		subid,
		payload: Bytes::copy_from_slice(payload),
	};
	if frag.serialize_into(buf).is_err() {
		return false;
	}
	*fragments += 1;
	true
}
