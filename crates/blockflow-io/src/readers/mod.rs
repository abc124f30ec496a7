//! Readers that load whole tables for `Source` nodes.

pub mod csv;
