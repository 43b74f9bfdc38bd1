//! Property-based tests for admission
//!
//! Tests for:
//! - Version comparator: total order laws, zero padding, suffix tolerance
//! - Ping parsing: arbitrary release tokens survive the document round-trip

use super::probe::parse_ping_document;
use super::version::{compare, Version};
use proptest::prelude::*;
use std::cmp::Ordering;

fn version_string() -> impl Strategy<Value = String> {
    prop::collection::vec(0u64..1000, 1..6).prop_map(|segments| {
        segments
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    })
}

// ============================================================================
// VERSION COMPARATOR
// ============================================================================

proptest! {
    /// Property: Reflexive
    #[test]
    fn compare_is_reflexive(a in version_string()) {
        prop_assert_eq!(compare(&a, &a).unwrap(), Ordering::Equal);
    }

    /// Property: Antisymmetric
    #[test]
    fn compare_is_antisymmetric(a in version_string(), b in version_string()) {
        let ab = compare(&a, &b).unwrap();
        let ba = compare(&b, &a).unwrap();
        prop_assert_eq!(ab, ba.reverse());
    }

    /// Property: Transitive
    #[test]
    fn compare_is_transitive(
        a in version_string(),
        b in version_string(),
        c in version_string(),
    ) {
        let mut sorted = vec![
            Version::parse(&a).unwrap(),
            Version::parse(&b).unwrap(),
            Version::parse(&c).unwrap(),
        ];
        sorted.sort();
        prop_assert!(sorted[0] <= sorted[1]);
        prop_assert!(sorted[1] <= sorted[2]);
        prop_assert!(sorted[0] <= sorted[2]);
    }

    /// Property: Trailing zero segments never change the order
    #[test]
    fn zero_padding_is_neutral(a in version_string(), zeros in 1usize..4) {
        let padded = format!("{}{}", a, ".0".repeat(zeros));
        prop_assert_eq!(compare(&a, &padded).unwrap(), Ordering::Equal);
    }

    /// Property: Bumping any segment makes the version strictly greater
    #[test]
    fn bump_is_greater(
        segments in prop::collection::vec(0u64..1000, 1..6),
        index in any::<prop::sample::Index>(),
    ) {
        let i = index.index(segments.len());
        let mut bumped = segments.clone();
        bumped[i] += 1;

        let render = |s: &[u64]| s.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
        prop_assert_eq!(compare(&render(&segments), &render(&bumped)).unwrap(), Ordering::Less);
    }

    /// Property: A non-numeric suffix on the last segment is ignored
    #[test]
    fn suffix_is_ignored(a in version_string(), suffix in "-[a-z0-9]{1,6}") {
        let suffixed = format!("{}{}", a, suffix);
        prop_assert_eq!(compare(&a, &suffixed).unwrap(), Ordering::Equal);
    }

    /// Property: Display round-trips through parse
    #[test]
    fn display_round_trips(a in version_string()) {
        let version = Version::parse(&a).unwrap();
        prop_assert_eq!(Version::parse(&version.to_string()).unwrap(), version);
    }
}

// ============================================================================
// PING DOCUMENT
// ============================================================================

proptest! {
    /// Property: Any release token is reported as written (trimmed)
    #[test]
    fn release_token_is_extracted(release in "[0-9A-Za-z.\\-]{1,20}") {
        let body = format!(
            "<plnplugin><ojsInfo><release>{}</release></ojsInfo></plnplugin>",
            release
        );
        let doc = parse_ping_document(&body).unwrap();
        prop_assert_eq!(doc.ojs_release, Some(release));
    }

    /// Property: Titles with markup characters survive escaping
    #[test]
    fn escaped_title_is_unescaped(title in "[a-zA-Z &<>]{1,30}") {
        let escaped = title
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let body = format!(
            "<plnplugin><journalInfo><title>{}</title></journalInfo></plnplugin>",
            escaped
        );
        let doc = parse_ping_document(&body).unwrap();
        let expected = title.trim().to_string();
        if expected.is_empty() {
            prop_assert_eq!(doc.journal_title, None);
        } else {
            prop_assert_eq!(doc.journal_title, Some(expected));
        }
    }
}
