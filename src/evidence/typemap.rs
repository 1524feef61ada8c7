//! Native Snowflake type names to evidence types.

use super::EvidenceType;

/// Maps a native type name to an evidence type, or `fallback` if it has none.
///
/// Matching is case-insensitive and ignores any precision or length suffix, so
/// `NUMBER(38,0)` maps like `NUMBER`. Semi-structured types (`VARIANT`,
/// `ARRAY`, `OBJECT`) never resolve.
pub fn native_type_to_evidence_type(
    native_type: Option<&str>,
    fallback: Option<EvidenceType>,
) -> Option<EvidenceType> {
    let Some(native_type) = native_type.filter(|t| !t.is_empty()) else {
        return fallback;
    };

    let mut standardized = native_type.to_uppercase();
    if let Some(paren) = standardized.find('(') {
        standardized = standardized[..paren].trim().to_string();
    }

    match standardized.as_str() {
        "BOOLEAN" => Some(EvidenceType::Boolean),
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "NUMBER" | "DECIMAL" | "NUMERIC" | "FLOAT"
        | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" | "FIXED" => {
            Some(EvidenceType::Number)
        }
        "VARCHAR" | "CHAR" | "CHARACTER" | "STRING" | "TEXT" | "TIME" => {
            Some(EvidenceType::String)
        }
        "TIMESTAMP" | "TIMESTAMP_LTZ" | "TIMESTAMP_NTZ" | "TIMESTAMP_TZ" | "DATE" => {
            Some(EvidenceType::Date)
        }
        // Semi-structured values are not inspected.
        "VARIANT" | "ARRAY" | "OBJECT" => fallback,
        _ => fallback,
    }
}
