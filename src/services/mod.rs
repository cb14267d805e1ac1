//! Gateways between local state and the hosted backend.
//!
//! ARCHITECTURE
//! ============
//! Each gateway owns the writes to one state holder and talks to the backend
//! only through the traits in `crate::backend`. Guards read the auth holder
//! and may ask the auth gateway to bootstrap the session.

pub mod auth;
pub mod guard;
pub mod subscriptions;
