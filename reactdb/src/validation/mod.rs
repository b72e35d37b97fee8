use crate::error::{ReactDbError, Result};
use crate::model::{ModelCore, Row, RowKey};
use crate::value::{Input, Scalar, ScalarKind, Value};

/// Validate a value for a scalar column. Types must match exactly; null is
/// never a valid scalar.
pub(crate) fn verify_scalar(kind: ScalarKind, input: &Input) -> Result<Scalar> {
    match input.as_scalar() {
        Some(scalar) if scalar.kind() == kind => Ok(scalar),
        _ => Err(ReactDbError::TypeMismatch {
            expected: kind.as_str(),
            found: input.type_name(),
        }),
    }
}

/// Validate a row assigned to a `ref` cell or listed in a `refs` insert.
pub(crate) fn verify_ref(column: &str, target: &ModelCore, row: &Row) -> Result<RowKey> {
    if row.model_id != target.id {
        return Err(ReactDbError::RefInvalidType {
            column: column.to_string(),
        });
    }
    if !target.contains(row) {
        return Err(ReactDbError::RefRowDeleted {
            column: column.to_string(),
            id: row.id().to_string(),
        });
    }
    Ok(row.key)
}

/// Validate a row passed to `add_refs`.
pub(crate) fn verify_member(column: &str, target: &ModelCore, row: &Row) -> Result<RowKey> {
    if row.model_id != target.id {
        return Err(ReactDbError::RefsAddModelMismatch {
            column: column.to_string(),
            id: row.id().to_string(),
        });
    }
    verify_ref(column, target, row)
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Scalar(scalar) => scalar.kind().as_str(),
        Value::Ref(_) => "ref",
        Value::Refs(_) => "refs",
    }
}
