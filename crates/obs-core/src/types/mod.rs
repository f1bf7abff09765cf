//! Core data types: raw snapshot tables, joined rates, market quotes and
//! label tuples.
//!
//! Everything here is cycle-scoped. Values are built, consumed and dropped
//! within one ingestion cycle; nothing is cached across cycles.

pub mod enums;
pub mod labels;
pub mod quote;
pub mod snapshot;

pub use enums::*;
pub use labels::*;
pub use quote::*;
pub use snapshot::*;
