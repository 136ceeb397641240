//! JavaScript bindings for TextSync core types
//!
//! Operations cross the boundary as an array of `Uint8Array`s, one encoded
//! protocol message per operation. Everything else (text updates, markers,
//! history) crosses as JSON strings.

use super::utils::set_panic_hook;
use crate::crdt::{
    CheckpointOptions, Document, GroupOptions, LayerUpdates, MarkerLayers, Operation, Point,
    RevertOptions, UndoResult,
};
use crate::protocol::{deserialize_operation, serialize_operation};
use js_sys::{Array, Uint8Array};
use wasm_bindgen::prelude::*;

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn encode_operations(operations: &[Operation]) -> Result<Array, JsValue> {
    let array = Array::new();
    for operation in operations {
        let bytes = serialize_operation(operation).map_err(to_js_error)?;
        array.push(&Uint8Array::from(bytes.as_ref()));
    }
    Ok(array)
}

fn parse_markers(markers_json: Option<String>) -> Result<Option<MarkerLayers>, JsValue> {
    markers_json
        .map(|json| {
            serde_json::from_str(&json).map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))
        })
        .transpose()
}

/// JavaScript-friendly wrapper for Document
#[wasm_bindgen]
pub struct WasmDocument {
    inner: Document,
}

#[wasm_bindgen]
impl WasmDocument {
    /// Create an empty document for a site (site 0 is reserved)
    #[wasm_bindgen(constructor)]
    pub fn new(site_id: u32) -> Result<WasmDocument, JsValue> {
        set_panic_hook();
        Ok(Self {
            inner: Document::new(site_id).map_err(to_js_error)?,
        })
    }

    /// Replace a range of text; returns the encoded operations to broadcast
    #[wasm_bindgen(js_name = setTextInRange)]
    pub fn set_text_in_range(
        &mut self,
        start_row: u32,
        start_column: u32,
        end_row: u32,
        end_column: u32,
        text: &str,
    ) -> Result<Array, JsValue> {
        let operations = self
            .inner
            .set_text_in_range(
                Point::new(start_row, start_column),
                Point::new(end_row, end_column),
                text,
            )
            .map_err(to_js_error)?;
        encode_operations(&operations)
    }

    /// Integrate encoded remote operations; returns the integration result as JSON
    #[wasm_bindgen(js_name = integrateOperations)]
    pub fn integrate_operations(&mut self, operations: Array) -> Result<String, JsValue> {
        let operations = operations
            .iter()
            .map(|value| {
                let bytes = Uint8Array::new(&value).to_vec();
                deserialize_operation(&bytes).map_err(to_js_error)
            })
            .collect::<Result<Vec<_>, JsValue>>()?;

        let result = self
            .inner
            .integrate_operations(operations)
            .map_err(to_js_error)?;
        serde_json::to_string(&result).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = undo)]
    pub fn undo(&mut self) -> Option<WasmUndoResult> {
        self.inner.undo().map(WasmUndoResult::from)
    }

    #[wasm_bindgen(js_name = redo)]
    pub fn redo(&mut self) -> Option<WasmUndoResult> {
        self.inner.redo().map(WasmUndoResult::from)
    }

    /// Push a checkpoint; `markers_json` is an optional marker-layers object
    #[wasm_bindgen(js_name = createCheckpoint)]
    pub fn create_checkpoint(
        &mut self,
        is_barrier: bool,
        markers_json: Option<String>,
    ) -> Result<u32, JsValue> {
        let markers = parse_markers(markers_json)?;
        self.inner
            .create_checkpoint(CheckpointOptions {
                is_barrier,
                markers,
            })
            .map_err(to_js_error)
    }

    /// Group everything since a checkpoint; returns the changes as JSON, or
    /// `undefined` if the checkpoint is gone or behind a barrier
    #[wasm_bindgen(js_name = groupChangesSinceCheckpoint)]
    pub fn group_changes_since_checkpoint(
        &mut self,
        checkpoint_id: u32,
        delete_checkpoint: bool,
        markers_json: Option<String>,
    ) -> Result<Option<String>, JsValue> {
        let markers = parse_markers(markers_json)?;
        let changes = self
            .inner
            .group_changes_since_checkpoint(
                checkpoint_id,
                GroupOptions {
                    delete_checkpoint,
                    markers,
                },
            )
            .map_err(to_js_error)?;

        changes
            .map(|changes| serde_json::to_string(&changes).map_err(to_js_error))
            .transpose()
    }

    #[wasm_bindgen(js_name = revertToCheckpoint)]
    pub fn revert_to_checkpoint(
        &mut self,
        checkpoint_id: u32,
        delete_checkpoint: bool,
    ) -> Option<WasmUndoResult> {
        self.inner
            .revert_to_checkpoint(checkpoint_id, RevertOptions { delete_checkpoint })
            .map(WasmUndoResult::from)
    }

    #[wasm_bindgen(js_name = groupLastChanges)]
    pub fn group_last_changes(&mut self) -> bool {
        self.inner.group_last_changes()
    }

    #[wasm_bindgen(js_name = applyGroupingInterval)]
    pub fn apply_grouping_interval(&mut self, grouping_interval: u32) {
        self.inner.apply_grouping_interval(u64::from(grouping_interval));
    }

    #[wasm_bindgen(js_name = getText)]
    pub fn get_text(&self) -> String {
        self.inner.get_text()
    }

    /// Every site's markers as JSON
    #[wasm_bindgen(js_name = getMarkers)]
    pub fn get_markers(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.get_markers()).map_err(to_js_error)
    }

    /// Update this site's marker layers from JSON; returns encoded operations
    #[wasm_bindgen(js_name = updateMarkers)]
    pub fn update_markers(&mut self, updates_json: String) -> Result<Array, JsValue> {
        let updates: LayerUpdates = serde_json::from_str(&updates_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))?;
        let operations = self.inner.update_markers(updates).map_err(to_js_error)?;
        encode_operations(&operations)
    }

    /// Export undo/redo history as JSON
    #[wasm_bindgen(js_name = getHistory)]
    pub fn get_history(&mut self, max_entries: usize) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.get_history(max_entries)).map_err(to_js_error)
    }
}

/// JavaScript-friendly wrapper for the outcome of undo, redo and revert
#[wasm_bindgen]
pub struct WasmUndoResult {
    inner: UndoResult,
}

impl From<UndoResult> for WasmUndoResult {
    fn from(inner: UndoResult) -> Self {
        Self { inner }
    }
}

#[wasm_bindgen]
impl WasmUndoResult {
    /// Encoded undo operations to broadcast
    #[wasm_bindgen(js_name = operations)]
    pub fn operations(&self) -> Result<Array, JsValue> {
        encode_operations(&self.inner.operations)
    }

    /// Text changes as JSON
    #[wasm_bindgen(js_name = textUpdates)]
    pub fn text_updates(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.text_updates).map_err(to_js_error)
    }

    /// Restored markers as JSON, if the transaction captured any
    #[wasm_bindgen(js_name = markers)]
    pub fn markers(&self) -> Result<Option<String>, JsValue> {
        self.inner
            .markers
            .as_ref()
            .map(|markers| serde_json::to_string(markers).map_err(to_js_error))
            .transpose()
    }
}
