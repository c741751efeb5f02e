//! Built-in format backends.
//!
//! Each submodule is one implementation of the
//! [`crate::backend::ImageBackend`] contract. Built-ins register before any
//! externally loaded backend, so they win probe ties by registration order.

pub mod elf;
