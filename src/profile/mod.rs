//! User profile domain: the locked profile and its child preference rows.

pub mod model;

pub use model::*;
