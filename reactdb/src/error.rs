use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReactDbError {
    #[error("Model '{name}' already exists")]
    ModelExists { name: String },

    #[error("Model '{name}' does not exist")]
    ModelNotExists { name: String },

    #[error("No model specified to select from")]
    ModelNotSpecified,

    #[error("Model '{model}' is still waiting for model '{waiting_for}' to be created")]
    ModelRefUnresolved { model: String, waiting_for: String },

    #[error("Model referenced by '{model}' has been dropped")]
    ModelRefInvalidated { model: String },

    #[error("Column '{column}' already exists on model '{model}'")]
    ColumnExists { column: String, model: String },

    #[error("Column '{column}' does not exist on model '{model}'")]
    ColumnNotExists { column: String, model: String },

    #[error("Column '{column}' on model '{model}' cannot be modified while rows exist")]
    ColumnInDanger { column: String, model: String },

    #[error("Row '{id}' already exists in model '{model}'")]
    RowExists { id: String, model: String },

    #[error("Row '{id}' has been deleted")]
    RowDeleted { id: String },

    #[error("Invalid column '{column}' when inserting into model '{model}'")]
    InsertInvalidColumn { column: String, model: String },

    #[error("Column '{column}' (ref) expects null, a row or a nested object")]
    InsertInvalidRef { column: String },

    #[error("Column '{column}' (refs) expects a list of rows or nested objects")]
    InsertInvalidRefs { column: String },

    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid column type '{descriptor}'")]
    InvalidType { descriptor: String },

    #[error("Reference target of column '{column}' is not resolved")]
    RefFailed { column: String },

    #[error("Column '{column}' only accepts a row of its target model or null")]
    RefInvalidType { column: String },

    #[error("Row '{id}' assigned to column '{column}' was deleted from its model")]
    RefRowDeleted { column: String, id: String },

    #[error("Column '{column}' is a reference set; use add_refs/delete_refs instead of set")]
    IllegalRefsSet { column: String },

    #[error("Column '{column}' is not a reference")]
    NotAReference { column: String },

    #[error("Not a valid column '{column}'")]
    NotValidColumn { column: String },

    #[error("Cannot add references: column '{column}' is not a reference set")]
    RefsAddFailed { column: String },

    #[error("Row '{id}' does not belong to the target model of column '{column}'")]
    RefsAddModelMismatch { column: String, id: String },

    #[error("Cannot delete references: column '{column}' is not a reference set")]
    RefsDeleteFailed { column: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Broken invariant: {0}")]
    Impossible(String),

    #[error("Unexpected state: {0}")]
    WhatIsHappening(String),
}

impl ReactDbError {
    /// Stable, machine-readable tag for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ReactDbError::ModelExists { .. } => "MODEL_EXISTS",
            ReactDbError::ModelNotExists { .. } => "MODEL_NOT_EXISTS",
            ReactDbError::ModelNotSpecified => "MODEL_NOT_SPECIFIED",
            ReactDbError::ModelRefUnresolved { .. } => "MODEL_REF_UNRESOLVED",
            ReactDbError::ModelRefInvalidated { .. } => "MODEL_REF_INVALIDATED",
            ReactDbError::ColumnExists { .. } => "COLUMN_EXISTS",
            ReactDbError::ColumnNotExists { .. } => "COLUMN_NOT_EXISTS",
            ReactDbError::ColumnInDanger { .. } => "COLUMN_IN_DANGER",
            ReactDbError::RowExists { .. } => "ROW_EXISTS",
            ReactDbError::RowDeleted { .. } => "ROW_DELETED",
            ReactDbError::InsertInvalidColumn { .. } => "INSERT_INVALID_COLUMN",
            ReactDbError::InsertInvalidRef { .. } => "INSERT_INVALID_REF",
            ReactDbError::InsertInvalidRefs { .. } => "INSERT_INVALID_REFS",
            ReactDbError::TypeMismatch { .. } => "TYPE_MISMATCH",
            ReactDbError::InvalidType { .. } => "INVALID_TYPE",
            ReactDbError::RefFailed { .. } => "REF_FAILED",
            ReactDbError::RefInvalidType { .. } => "REF_INVALID_TYPE",
            ReactDbError::RefRowDeleted { .. } => "REF_ROW_DELETED",
            ReactDbError::IllegalRefsSet { .. } => "ILLEGAL_REFS_SET",
            ReactDbError::NotAReference { .. } => "NOT_A_REFERENCE",
            ReactDbError::NotValidColumn { .. } => "NOT_VALID_COLUMN",
            ReactDbError::RefsAddFailed { .. } => "REFS_ADD_FAILED",
            ReactDbError::RefsAddModelMismatch { .. } => "REFS_ADD_MODEL_MISMATCH",
            ReactDbError::RefsDeleteFailed { .. } => "REFS_DELETE_FAILED",
            ReactDbError::Schema(_) => "SCHEMA",
            ReactDbError::Io(_) => "IO",
            ReactDbError::Json(_) => "JSON",
            ReactDbError::Yaml(_) => "YAML",
            ReactDbError::Impossible(_) => "IMPOSSIBLE",
            ReactDbError::WhatIsHappening(_) => "WHAT_IS_HAPPENING",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReactDbError>;
