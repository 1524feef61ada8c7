//! Column classification.

use super::{native_type_to_evidence_type, EvidenceColumnType, EvidenceType, TypeFidelity};
use crate::db::RawColumnMeta;

/// Classifies result columns, or returns `None` when there was no column metadata.
///
/// Unrecognized native types are reported as `string` with `inferred` fidelity.
pub fn map_columns_to_evidence_types(
    columns: Option<&[RawColumnMeta]>,
) -> Option<Vec<EvidenceColumnType>> {
    columns.map(|columns| columns.iter().map(classify_column).collect())
}

fn classify_column(column: &RawColumnMeta) -> EvidenceColumnType {
    let (evidence_type, type_fidelity) =
        match native_type_to_evidence_type(Some(column.data_type.as_str()), None) {
            Some(evidence_type) => (evidence_type, TypeFidelity::Precise),
            None => (EvidenceType::String, TypeFidelity::Inferred),
        };

    EvidenceColumnType {
        name: column.name.to_lowercase(),
        evidence_type,
        type_fidelity,
    }
}
