//! Active-set resolution.

use crate::store::ApprovalRecord;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Identifiers permitted at `now`: records that never expire or expire
/// strictly after `now`. Pure; ordered so the rendered artifact is stable.
pub fn resolve(records: &[ApprovalRecord], now: DateTime<Utc>) -> BTreeSet<String> {
    records
        .iter()
        .filter(|r| r.is_active(now))
        .map(|r| r.identifier.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(id: &str, expires_at: Option<DateTime<Utc>>) -> ApprovalRecord {
        ApprovalRecord {
            identifier: id.to_string(),
            label: None,
            requester: None,
            expires_at,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_resolve_excludes_expired_and_includes_never_expiring() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let records = vec![
            record("past", Some(now - Duration::seconds(1))),
            record("future", Some(now + Duration::seconds(1))),
            record("forever", None),
        ];

        let active = resolve(&records, now);

        assert_eq!(
            active.into_iter().collect::<Vec<_>>(),
            vec!["forever".to_string(), "future".to_string()]
        );
    }

    #[test]
    fn test_resolve_expiry_equal_to_now_is_inactive() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let active = resolve(&[record("edge", Some(now))], now);
        assert!(active.is_empty());
    }

    #[test]
    fn test_resolve_abc123_day_pass() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let records = vec![record("abc123", Some(t0 + Duration::hours(24)))];

        assert!(resolve(&records, t0 + Duration::hours(23)).contains("abc123"));
        assert!(!resolve(&records, t0 + Duration::hours(25)).contains("abc123"));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(resolve(&[], Utc::now()).is_empty());
    }
}
