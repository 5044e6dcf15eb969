// Library exports for squadfeed
// Integration tests drive the planner, reconciler and router through these

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod interactions;
pub mod routes;
pub mod state;
