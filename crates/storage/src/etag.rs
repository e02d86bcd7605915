//! ETag encoding and `If-Match` parsing.
//!
//! The concurrency token on the wire is the quoted decimal version:
//! `version 3` ↔ `"3"`. Callers may send the precondition either in the
//! quoted form or as a bare decimal; both are accepted.

use crate::error::{StoreError, StoreResult};

/// Formats a version as its wire-format ETag: `"<version>"`.
#[must_use]
pub fn format_etag(version: i64) -> String {
    format!("\"{version}\"")
}

/// Parses an `If-Match` header value into a version precondition.
///
/// Accepts the quoted form `"N"` or the bare decimal `N`, with surrounding
/// whitespace trimmed. An absent or empty value means "no precondition" and
/// yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`StoreError::Precondition`] (not a validation error) when a
/// value is present but is not a positive decimal integer. `"0"`, negative
/// numbers, `*`, and weak validators (`W/"1"`) are all rejected.
pub fn parse_if_match(raw: Option<&str>) -> StoreResult<Option<i64>> {
    let Some(raw) = raw else { return Ok(None) };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let digits = match trimmed.strip_prefix('"') {
        Some(rest) => rest
            .strip_suffix('"')
            .ok_or_else(|| malformed(trimmed))?,
        None => trimmed,
    };

    let version: i64 = digits.parse().map_err(|_| malformed(trimmed))?;
    if version < 1 {
        return Err(malformed(trimmed));
    }
    Ok(Some(version))
}

fn malformed(raw: &str) -> StoreError {
    StoreError::precondition(format!("If-Match must be a positive integer version, got {raw:?}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_quotes_the_version() {
        assert_eq!(format_etag(1), "\"1\"");
        assert_eq!(format_etag(999), "\"999\"");
    }

    #[rstest]
    #[case::quoted("\"7\"", Some(7))]
    #[case::bare("7", Some(7))]
    #[case::whitespace("  \"12\"  ", Some(12))]
    #[case::bare_whitespace(" 3 ", Some(3))]
    fn accepts_quoted_and_bare_forms(#[case] raw: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_if_match(Some(raw)).unwrap(), expected);
    }

    #[test]
    fn absent_and_empty_mean_no_precondition() {
        assert_eq!(parse_if_match(None).unwrap(), None);
        assert_eq!(parse_if_match(Some("")).unwrap(), None);
        assert_eq!(parse_if_match(Some("   ")).unwrap(), None);
    }

    #[rstest]
    #[case::zero("\"0\"")]
    #[case::bare_zero("0")]
    #[case::negative("-3")]
    #[case::alpha("\"abc\"")]
    #[case::star("*")]
    #[case::weak("W/\"1\"")]
    #[case::unterminated_quote("\"5")]
    #[case::trailing_garbage("5x")]
    fn rejects_non_positive_and_malformed(#[case] raw: &str) {
        let err = parse_if_match(Some(raw)).unwrap_err();
        assert!(
            matches!(err, StoreError::Precondition { .. }),
            "malformed If-Match must be a precondition failure, got: {err:?}"
        );
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Formatting any positive version then parsing it yields the
            /// original version back.
            #[test]
            fn format_parse_round_trip(version in 1i64..=i64::MAX) {
                let etag = format_etag(version);
                prop_assert_eq!(parse_if_match(Some(&etag)).unwrap(), Some(version));
            }

            /// The bare decimal form parses identically to the quoted form.
            #[test]
            fn bare_equals_quoted(version in 1i64..=i64::MAX) {
                let quoted = parse_if_match(Some(&format!("\"{version}\""))).unwrap();
                let bare = parse_if_match(Some(&version.to_string())).unwrap();
                prop_assert_eq!(quoted, bare);
            }
        }
    }
}
