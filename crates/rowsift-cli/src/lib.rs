//! Support code for the `rowsift` binary: input loading, log setup and the
//! per-origin settings store.

pub mod input;
pub mod logging;
pub mod settings;
