//! Student dropout (DO) classification service.
//!
//! Uploaded CSV batches are normalized ([`data`]), scored by a pretrained SVM
//! pipeline ([`model`]), evaluated ([`analytics`]) and stored
//! ([`database`]); [`report`] aggregates what has been stored and [`api`]
//! exposes all of it over HTTP.

pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod ingest;
pub mod model;
pub mod report;

pub use error::{Error, Result};
