/// Time window for rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Hour,
    Day,
}

impl RateWindow {
    pub fn seconds(&self) -> u64 {
        match self {
            RateWindow::Hour => 3600,
            RateWindow::Day => 86400,
        }
    }
}

/// Pipeline actions that are rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateAction {
    SubmitReport,
    Vote,
    AnonymousSubmit,
    TrackingLookup,
}

impl RateAction {
    pub fn as_key(&self) -> &'static str {
        match self {
            RateAction::SubmitReport => "submit_report",
            RateAction::Vote => "vote",
            RateAction::AnonymousSubmit => "anonymous_submit",
            RateAction::TrackingLookup => "tracking_lookup",
        }
    }
}

/// Caps per action, checked against every listed window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub reports_per_hour: u32,
    pub reports_per_day: u32,
    pub votes_per_hour: u32,
    // Per client IP
    pub anonymous_reports_per_hour: u32,
    pub anonymous_reports_per_day: u32,
    pub tracking_lookups_per_hour: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            reports_per_hour: 10,
            reports_per_day: 40,
            votes_per_hour: 200,
            anonymous_reports_per_hour: 3,
            anonymous_reports_per_day: 10,
            tracking_lookups_per_hour: 60,
        }
    }
}

impl RateLimits {
    pub fn windows_for(&self, action: RateAction) -> Vec<(u32, RateWindow)> {
        match action {
            RateAction::SubmitReport => vec![
                (self.reports_per_hour, RateWindow::Hour),
                (self.reports_per_day, RateWindow::Day),
            ],
            RateAction::Vote => vec![(self.votes_per_hour, RateWindow::Hour)],
            RateAction::AnonymousSubmit => vec![
                (self.anonymous_reports_per_hour, RateWindow::Hour),
                (self.anonymous_reports_per_day, RateWindow::Day),
            ],
            RateAction::TrackingLookup => vec![(self.tracking_lookups_per_hour, RateWindow::Hour)],
        }
    }
}

/// Calculate current window timestamp for rate limiting
pub fn current_window(window_seconds: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    now / window_seconds
}
