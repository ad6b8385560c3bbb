//! Page and API scrapers.
//!
//! Scrapers do the raw talking to Compass: build requests, check for access
//! denied pages and turn HTML or JSON into model records. The interfaces in
//! [`crate::people`], [`crate::hierarchy`] and [`crate::reports`] sit on top.
pub mod hierarchy;
pub mod member;
pub mod reports;
