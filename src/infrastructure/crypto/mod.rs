//! Cryptographic utilities

pub mod jwt;

pub use jwt::{create_token, verify_token, JwtConfig, TokenClaims};
