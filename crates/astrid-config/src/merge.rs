//! Top-level-key replacement merging.
//!
//! Unlike the full deep-merge systems some configuration layouts use, this
//! one replaces whole top-level sections (`[model]`, `[runtime]`, ...)
//! wholesale when a higher-precedence layer defines them, rather than
//! merging individual leaf fields within a section. A project config that
//! sets `[sandbox]` at all must repeat every field it cares about; fields
//! it omits fall back to that section's `Default`, not to the user layer's
//! value for the same field.

use toml::Value;

/// Merge `overlay` onto `base`, replacing each top-level table entry in
/// `base` with the corresponding entry in `overlay` when present.
pub fn replace_top_level(base: &mut Value, overlay: &Value) {
    let (Value::Table(base_table), Value::Table(overlay_table)) = (base, overlay) else {
        return;
    };
    for (key, value) in overlay_table {
        base_table.insert(key.clone(), value.clone());
    }
}
