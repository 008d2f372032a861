pub mod anonymous;
pub mod auth;
pub mod community;
pub mod error;
pub mod fingerprint;
pub mod publisher;
pub mod rate_limiter;
pub mod reports;
pub mod review;
pub mod triage;
pub mod validation;
