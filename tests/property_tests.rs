//! Property-based tests for invariants using proptest
//!
//! - Trigram similarity is a symmetric score in `[0, 1]`
//! - Query normalisation is idempotent and yields lowercase alphanumeric terms
//! - Status classification never reports better health than the success rate allows
//! - Status code lists accept exactly the codes they name

use inframirror::model::{HttpMonitor, MonitorHealth, NewHttpMonitor, StatusThresholds};
use inframirror::search::SearchQuery;
use inframirror::search::trigram::similarity;
use inframirror::services::status_pages::classify;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_similarity_is_symmetric_and_bounded(a in "[a-zA-Z0-9 ._-]{0,30}", b in "[a-zA-Z0-9 ._-]{0,30}") {
        let ab = similarity(&a, &b);
        let ba = similarity(&b, &a);

        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));
    }
}

proptest! {
    #[test]
    fn prop_identical_words_score_one(word in "[a-z0-9]{1,20}") {
        prop_assert_eq!(similarity(&word, &word), 1.0);
        prop_assert_eq!(similarity(&word, &word.to_uppercase()), 1.0);
    }
}

proptest! {
    #[test]
    fn prop_query_terms_are_normalised(raw in "[a-zA-Z0-9 ._*@\"-]{0,80}") {
        let query = SearchQuery::parse(&raw).unwrap();

        for term in query.terms() {
            prop_assert!(!term.is_empty());
            prop_assert!(term.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        }

        let again = SearchQuery::parse(&query.normalized()).unwrap();
        prop_assert_eq!(again, query);
    }
}

proptest! {
    #[test]
    fn prop_low_success_rate_is_down(rate in 0.0f64..0.6, avg in 0.0f64..5000.0) {
        let thresholds = StatusThresholds::default();
        prop_assert_eq!(classify(rate, avg, &thresholds), MonitorHealth::Down);
    }
}

proptest! {
    #[test]
    fn prop_fast_healthy_monitors_are_up(rate in 0.8f64..=1.0, avg in 0.0f64..=500.0) {
        let thresholds = StatusThresholds::default();
        prop_assert_eq!(classify(rate, avg, &thresholds), MonitorHealth::Up);
    }
}

proptest! {
    #[test]
    fn prop_status_range_accepts_its_bounds(low in 100u16..500, width in 0u16..50, probe in 100u16..600) {
        let high = low + width;
        let mut fields = NewHttpMonitor::new("edge", "http://localhost/");
        fields.expected_status_codes = Some(format!("{low}-{high}"));
        let monitor = HttpMonitor { id: 1, fields };

        prop_assert!(monitor.accepts_status(low));
        prop_assert!(monitor.accepts_status(high));
        prop_assert_eq!(monitor.accepts_status(probe), (low..=high).contains(&probe));
    }
}
