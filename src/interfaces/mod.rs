//! Shapes exchanged with callers.

pub mod request;
