//! Accounts and sessions: password hashing, token generation, the
//! [`AuthService`](service::AuthService) and the bearer-token extractors.

pub mod handlers;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

pub use service::AuthService;
