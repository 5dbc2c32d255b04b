// Library exports for Avera
// The CLI and integration tests build on these modules

pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod feed;
pub mod feedback;
pub mod ingest;
pub mod profile;
pub mod reviews;
pub mod state;
pub mod stats;

#[cfg(test)]
mod test_helpers;
