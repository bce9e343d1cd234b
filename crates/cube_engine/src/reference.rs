//! Global and per-item reference values.
//!
//! References are named scalars or series (discount rate, escalation rate,
//! project life, ...) pulled from the scenario document. Registries declare
//! global references; items may declare local ones that override globals
//! with the same id. A reference that fails to load is counted, never fatal:
//! it is simply absent from the resulting [`ReferenceSet`].

use crate::scenario::{to_path, ScenarioStore};
use cube_core::types::CubeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Resolved reference values by id.
pub type ReferenceSet = BTreeMap<String, Value>;

/// A named path into the scenario document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Reference identifier
    pub id: String,
    /// Path into the scenario document
    pub path: Vec<String>,
}

impl Reference {
    /// Create a reference from string segments.
    pub fn new(id: impl Into<String>, path: &[&str]) -> Self {
        Self {
            id: id.into(),
            path: to_path(path),
        }
    }
}

/// Outcome of loading a list of references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedReferences {
    /// Successfully loaded values
    pub values: ReferenceSet,
    /// One error per reference that failed to load
    pub failures: Vec<CubeError>,
}

/// Load every reference from the store.
pub fn load_references(references: &[Reference], store: &dyn ScenarioStore) -> ResolvedReferences {
    let mut resolved = ResolvedReferences::default();
    for reference in references {
        match store.value_by_path(&reference.path) {
            Some(value) => {
                resolved.values.insert(reference.id.clone(), value);
            }
            None => {
                warn!(reference = %reference.id, path = ?reference.path, "reference failed to load");
                resolved.failures.push(CubeError::ReferenceLoading {
                    id: reference.id.clone(),
                    path: reference.path.clone(),
                });
            }
        }
    }
    resolved
}

/// Overlay `local` on `global`; local ids win.
pub fn merge_references(global: &ReferenceSet, local: ReferenceSet) -> ReferenceSet {
    let mut merged = global.clone();
    merged.extend(local);
    merged
}

/// Load global and item-local references and overlay them.
///
/// Failures from both lists are reported together.
pub fn resolve_references(
    global: &[Reference],
    local: &[Reference],
    store: &dyn ScenarioStore,
) -> ResolvedReferences {
    let global = load_references(global, store);
    let local = load_references(local, store);
    let mut failures = global.failures;
    failures.extend(local.failures);
    ResolvedReferences {
        values: merge_references(&global.values, local.values),
        failures,
    }
}

/// Read a JSON value as a number.
///
/// Numbers are taken as-is and numeric strings are parsed; everything else
/// is `None`.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric reference value by id.
pub fn reference_number(references: &ReferenceSet, id: &str) -> Option<f64> {
    references.get(id).and_then(as_number)
}
