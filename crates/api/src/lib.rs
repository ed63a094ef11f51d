//! HTTP API: route dispatch, authentication, and the annotation service
//! built on top of them.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod identity;
pub mod params;
pub mod route;
