//! Evidence type normalization.
//!
//! Translates warehouse-native column types into the small set of logical
//! types the analytics layer understands, and gives rows stable lower-case keys.

mod columns;
mod rows;
mod typemap;

pub use columns::map_columns_to_evidence_types;
pub use rows::standardize_rows;
pub use typemap::native_type_to_evidence_type;

use serde::{Deserialize, Serialize};

/// Logical column type used by the analytics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Boolean,
    Number,
    String,
    Date,
}

/// Whether an evidence type was read from the native type or assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFidelity {
    /// The native type mapped to the evidence type exactly.
    Precise,
    /// The native type was unrecognized; the evidence type is a default.
    Inferred,
}

/// Evidence type of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceColumnType {
    /// Lower-cased column name.
    pub name: String,
    pub evidence_type: EvidenceType,
    pub type_fidelity: TypeFidelity,
}
