//! Integration coverage for larger RLP shapes than the unit tests in
//! `decode.rs`/`encode.rs` bother with: a long-form list whose payload
//! spills past the single-byte length prefix.

use p2pkit_rlp::decode::RLPDecode;
use p2pkit_rlp::encode::RLPEncode;

fn triple() -> (String, String, String) {
    ("asdf".to_string(), "qwer".to_string(), "zxcv".to_string())
}

/// One triple encodes as a 16-byte list: `0xcf` (0xc0 + 15) followed by
/// three 5-byte strings (`0x84` + 4 ASCII bytes each).
fn encoded_triple() -> Vec<u8> {
    triple().encode_to_vec()
}

/// A list of 31 repeated triples decodes back into 31 identical triples,
/// and re-encoding the decoded value reproduces the exact input bytes.
#[test]
fn list_of_31_triples_round_trips() {
    let triple_bytes = encoded_triple();
    assert_eq!(triple_bytes.len(), 16);
    assert_eq!(triple_bytes[0], 0xcf);

    let payload_len = triple_bytes.len() * 31;
    // payload_len (496) exceeds 55 bytes, so the list uses the long form:
    // 0xf7 + length-of-length, followed by the big-endian length itself.
    let mut input = vec![0xf7 + 2, (payload_len >> 8) as u8, payload_len as u8];
    for _ in 0..31 {
        input.extend_from_slice(&triple_bytes);
    }

    let decoded: Vec<(String, String, String)> = Vec::decode(&input).unwrap();
    assert_eq!(decoded.len(), 31);
    for item in &decoded {
        assert_eq!(item, &triple());
    }

    let mut re_encoded = Vec::new();
    decoded.encode(&mut re_encoded);
    assert_eq!(re_encoded, input);
}
