//! sea-orm entities owned by the auth service.

pub mod audit_logs;
pub mod one_time_codes;
pub mod outbox_events;
pub mod refresh_tokens;
pub mod users;
