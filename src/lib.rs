//! Purgeline: cache invalidation for a content site behind a purgeable proxy.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
