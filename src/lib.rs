//! Unofficial API to the TSA Compass membership database.
//!
//! Log in with [`logon::Logon`], then read member data with
//! [`people::People`], walk the organisation with [`hierarchy::Hierarchy`]
//! and export reports with [`reports::Reports`].

pub mod batch;
pub mod client;
pub mod error;
pub mod hierarchy;
pub mod logon;
pub mod models;
pub mod parser;
pub mod people;
pub mod reports;
pub mod scrapers;
pub mod settings;
pub mod ui;
pub mod utility;

pub use error::{CompassError, Result};
pub use logon::Logon;
pub use settings::Settings;
