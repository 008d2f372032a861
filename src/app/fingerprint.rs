use sha2::{Digest, Sha256};
use std::net::IpAddr;
use time::OffsetDateTime;

use crate::domain::anonymous::AnonymousReport;

/// Submission-time signals from an anonymous client. Nothing here is tied
/// to an account.
#[derive(Debug, Clone, Default)]
pub struct ClientSignals {
    pub device_fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<IpAddr>,
}

/// Derives salted, non-reversible reporter fingerprints.
#[derive(Clone)]
pub struct FingerprintGuard {
    salt: [u8; 32],
}

impl FingerprintGuard {
    pub fn new(salt: [u8; 32]) -> Self {
        Self { salt }
    }

    pub fn derive(&self, signals: &ClientSignals) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        for part in [
            signals.device_fingerprint.as_deref().map(str::trim),
            signals.user_agent.as_deref().map(str::trim),
        ] {
            hasher.update([0x1fu8]);
            hasher.update(part.unwrap_or("").as_bytes());
        }
        hasher.update([0x1fu8]);
        hasher.update(network_prefix(signals.ip).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Shortened form safe for log lines.
pub fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(8)]
}

/// IPv4 collapses to /24 and IPv6 to /48 so address churn inside one
/// network still maps to the same reporter.
fn network_prefix(ip: Option<IpAddr>) -> String {
    match ip {
        Some(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.0/24")
        }
        Some(IpAddr::V6(v6)) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2])
        }
        None => String::new(),
    }
}

/// Matches a new anonymous submission against an existing open one.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGuard {
    pub since: OffsetDateTime,
    pub radius_meters: f64,
}

impl DuplicateGuard {
    pub fn is_duplicate(&self, existing: &AnonymousReport, candidate: &AnonymousReport) -> bool {
        existing.status.is_open()
            && existing.reporter_fingerprint == candidate.reporter_fingerprint
            && existing.content.category == candidate.content.category
            && existing.created_at >= self.since
            && existing
                .content
                .location
                .distance_meters(&candidate.content.location)
                <= self.radius_meters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anonymous::AnonymousStatus;
    use crate::domain::geo::GeoPoint;
    use crate::domain::report::{IncidentCategory, ReportContent};
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    fn signals(ip: [u8; 4]) -> ClientSignals {
        ClientSignals {
            device_fingerprint: Some("fp-abc".into()),
            user_agent: Some("Mozilla/5.0".into()),
            ip: Some(IpAddr::V4(Ipv4Addr::from(ip))),
        }
    }

    fn anon(fingerprint: &str, lat: f64, at: OffsetDateTime) -> AnonymousReport {
        AnonymousReport {
            id: Uuid::new_v4(),
            content: ReportContent {
                category: IncidentCategory::Fire,
                title: "Fogo no terreno".into(),
                description: "Smoke visible from the avenue since this morning".into(),
                location: GeoPoint::new(lat, -46.63),
                address: None,
                media_refs: vec![],
            },
            urgent: false,
            severity: None,
            status: AnonymousStatus::Pending,
            reporter_fingerprint: fingerprint.into(),
            tracking_secret_hash: String::new(),
            public_response: None,
            internal_notes: None,
            reviewed_by: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn fingerprint_is_stable_and_salted() {
        let a = FingerprintGuard::new([1u8; 32]);
        let b = FingerprintGuard::new([2u8; 32]);
        let s = signals([10, 0, 0, 5]);
        assert_eq!(a.derive(&s), a.derive(&s));
        assert_ne!(a.derive(&s), b.derive(&s));
        assert_eq!(a.derive(&s).len(), 64);
    }

    #[test]
    fn fingerprint_ignores_host_part_of_ipv4() {
        let guard = FingerprintGuard::new([1u8; 32]);
        assert_eq!(
            guard.derive(&signals([10, 0, 0, 5])),
            guard.derive(&signals([10, 0, 0, 200]))
        );
        assert_ne!(
            guard.derive(&signals([10, 0, 0, 5])),
            guard.derive(&signals([10, 0, 1, 5]))
        );
    }

    #[test]
    fn fingerprint_does_not_contain_raw_signals() {
        let guard = FingerprintGuard::new([1u8; 32]);
        let fp = guard.derive(&signals([10, 0, 0, 5]));
        assert!(!fp.contains("fp-abc"));
        assert_eq!(short(&fp).len(), 8);
    }

    #[test]
    fn duplicate_requires_same_fingerprint_category_place_and_window() {
        let now = OffsetDateTime::now_utc();
        let guard = DuplicateGuard {
            since: now - time::Duration::minutes(30),
            radius_meters: 150.0,
        };
        let existing = anon("f1", -23.5500, now - time::Duration::minutes(5));

        assert!(guard.is_duplicate(&existing, &anon("f1", -23.5505, now)));
        assert!(!guard.is_duplicate(&existing, &anon("f2", -23.5505, now)));
        assert!(!guard.is_duplicate(&existing, &anon("f1", -23.5600, now)));

        let stale = anon("f1", -23.5500, now - time::Duration::hours(2));
        assert!(!guard.is_duplicate(&stale, &anon("f1", -23.5500, now)));

        let mut closed = existing.clone();
        closed.status = AnonymousStatus::Resolved;
        assert!(!guard.is_duplicate(&closed, &anon("f1", -23.5500, now)));

        let mut other_category = anon("f1", -23.5500, now);
        other_category.content.category = IncidentCategory::Flood;
        assert!(!guard.is_duplicate(&existing, &other_category));
    }
}
