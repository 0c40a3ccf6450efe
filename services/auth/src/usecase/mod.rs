pub mod account;
pub mod guard;
pub mod login;
pub mod logout;
pub mod refresh;
pub mod session;
pub mod two_factor;
