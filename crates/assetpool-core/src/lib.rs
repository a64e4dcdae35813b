//! Remote-asset resolution and local caching.
//!
//! Rewrites learning-site file URLs into fetchable forms, probes which form a
//! site supports, downloads assets into a local store and binds rendered
//! elements to the best available URL.

pub mod config;
pub mod error;
pub mod logging;

pub mod binding;
pub mod fetch;
pub mod filepool;
pub mod probe;
pub mod retry;
pub mod site;
pub mod store;
pub mod url_model;
pub mod url_rewrite;
