pub mod auth;
pub mod extractor;
pub mod health;
pub mod two_factor;
