//! Core data types for the imago image abstraction.
//!
//! This module contains the normalized, format-agnostic data model that a
//! successful backend parse is reduced to: the architecture triple, sections,
//! segments, symbols, and the queryable [`image::Image`] aggregate.

pub mod arch;
pub mod image;
pub mod section;
pub mod segment;
pub mod symbol;
