//! Opaque pagination cursors.
//!
//! A cursor is the base64url (unpadded) encoding of the last key emitted in
//! the previous page. Keeping the decoded form a plain key lets every
//! backend resume with a `key > cursor_key` comparison, and keeps the wire
//! format identical across backends. Callers must treat cursors as opaque.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::error::{StoreError, StoreResult};

/// Encodes the last emitted key as an opaque cursor.
#[must_use]
pub fn encode(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

/// Decodes a cursor back into the key it encodes.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when the cursor is not valid
/// base64url or does not decode to UTF-8. Malformed cursors are a caller
/// error, not a precondition failure.
pub fn decode(cursor: &str) -> StoreResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.as_bytes())
        .map_err(|_| StoreError::validation("cursor is not valid base64url"))?;
    String::from_utf8(bytes)
        .map_err(|_| StoreError::validation("cursor does not decode to a valid key"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_url_safe_and_unpadded() {
        // A key whose standard base64 form would contain '+', '/' and '='.
        let cursor = encode("user:~\u{7f}?");
        assert!(!cursor.contains('+'));
        assert!(!cursor.contains('/'));
        assert!(!cursor.contains('='));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let err = decode("not base64!").unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
    }

    #[test]
    fn decode_rejects_non_utf8_payload() {
        let cursor = URL_SAFE_NO_PAD.encode([0xFFu8, 0xFE, 0xFD]);
        let err = decode(&cursor).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Encoding then decoding any key yields the original key bytes.
            #[test]
            fn encode_decode_round_trip(key in "\\PC{0,64}") {
                let cursor = encode(&key);
                prop_assert_eq!(decode(&cursor).unwrap(), key);
            }

            /// Cursors never contain characters needing URL escaping.
            #[test]
            fn cursors_are_url_safe(key in "\\PC{0,64}") {
                let cursor = encode(&key);
                prop_assert!(
                    cursor
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                );
            }
        }
    }
}
