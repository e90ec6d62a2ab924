//! Lead Intake Reconciliation Library
//!
//! Decides, for every lead captured by a dealer's intake form, whether to
//! insert it, overwrite a matching older lead, or drop it as a stale duplicate.
//!
//! # Modules
//!
//! - `api`: API-layer namespace.
//! - `core`: Domain-layer namespace.
//! - `data`: Data access namespace.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema.
//! - `db_storage`: Postgres lead store.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `lead_store`: Store gateway trait and in-memory store.
//! - `models`: Lead data models.
//! - `reconciliation`: Matching and recency arbitration.
//! - `routes`: Router assembly and OpenAPI document.
//! - `validation`: Contact validation.

pub mod api;
pub mod core;
pub mod data;

pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod lead_store;
pub mod models;
pub mod reconciliation;
pub mod routes;
pub mod validation;
