//! cram-core - Core library for Cram
//!
//! This crate contains the models, the local store, the SRS scheduler, and
//! the sync engine that reconciles local records with the remote store.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{QuestionId, SrsState, UserId};
