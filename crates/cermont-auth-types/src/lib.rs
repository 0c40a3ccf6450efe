//! Auth types shared across Cermont services.
//!
//! Provides access-token signing and validation, bearer extraction, the
//! normalized [`identity::Principal`], and refresh-token cookie builders.

pub mod cookie;
pub mod identity;
pub mod token;
