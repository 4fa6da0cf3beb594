// Library exports for SafeWalk
// This allows integration tests and external code to use SafeWalk modules

pub mod accounts;
pub mod auth;
pub mod blob;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod graphql;
pub mod notifications;
pub mod posts;
pub mod routes;
pub mod state;
pub mod store;
