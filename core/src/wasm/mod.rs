//! WASM bindings for TextSync
//!
//! This module provides JavaScript-friendly bindings for the replicated document.

pub mod bindings;
pub mod utils;

// Re-export main types
pub use bindings::{WasmDocument, WasmUndoResult};
