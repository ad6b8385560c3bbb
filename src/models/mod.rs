//! Data models and serialization helpers.
//!
//! This module contains the typed records scraped out of Compass, the
//! validation applied to them, and custom deserializers for Compass's loosely
//! typed JSON.
pub mod hierarchy;
pub mod logon;
pub mod member;
pub mod serde_helpers;
pub mod validation;
