//! Length limits of the 16-bit prefix.

use crate::encoding::*;

#[test]
fn longest_ascii_string_fits() {
    let s = "x".repeat(MAX_ENCODED_LEN);
    let bytes = encode_to_vec(s.as_str()).unwrap();
    assert_eq!(bytes.len(), LEN_PREFIX_SIZE + MAX_ENCODED_LEN);
    assert_eq!(&bytes[..2], &[0xFF, 0xFF]);
    let (decoded, _) = decode_from_slice::<String>(&bytes).unwrap();
    assert_eq!(decoded.len(), MAX_ENCODED_LEN);
}

#[test]
fn one_byte_over_is_rejected() {
    let s = "x".repeat(MAX_ENCODED_LEN + 1);
    let err = encode_to_vec(s.as_str()).unwrap_err();
    assert!(matches!(err, EncodingError::TooLong(n) if n == MAX_ENCODED_LEN + 1));
}

#[test]
fn limit_counts_encoded_bytes_not_chars() {
    // 30_000 three-byte chars = 90_000 encoded bytes.
    let s = "€".repeat(30_000);
    assert_eq!(encoded_len(&s), 90_000);
    assert!(matches!(
        encode_to_vec(s.as_str()),
        Err(EncodingError::TooLong(90_000))
    ));
}

#[test]
fn nothing_is_appended_on_error() {
    let s = "y".repeat(MAX_ENCODED_LEN + 10);
    let mut buf = vec![1, 2, 3];
    assert!(s.as_str().encode_to(&mut buf).is_err());
    assert_eq!(buf, [1, 2, 3]);
}
