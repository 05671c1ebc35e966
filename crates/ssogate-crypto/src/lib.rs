//! Cryptography utilities for ssogate

pub mod seal;

pub use seal::*;
