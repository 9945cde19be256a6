//! # aegis_core
//!
//! Domain core of the Aegis identity provider: credential storage and
//! verification, the JWT token subsystem, the authorization-code grant,
//! and the persistence ports everything runs against.
//!
//! The HTTP edge lives in `aegis_api`; this crate takes already-parsed
//! inputs and returns outcomes.

pub mod auth;
pub mod crypto;
pub mod models;
pub mod oauth;
pub mod repo;
pub mod token;
