pub mod triage_worker;
