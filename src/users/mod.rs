//! User-facing profile and access-control surface.

pub mod routes;
