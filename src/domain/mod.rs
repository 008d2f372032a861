pub mod anonymous;
pub mod geo;
pub mod incident;
pub mod report;
pub mod triage;
