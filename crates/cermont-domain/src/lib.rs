//! Value types shared across Cermont crates: user roles, email
//! normalization and session-family ids. No framework dependencies.

pub mod id;
pub mod user;
