use super::types::SchemaDefinition;
use crate::error::{ReactDbError, Result};
use std::path::Path;

/// Parse a schema YAML file into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    check_targets(&schema)?;
    Ok(schema)
}

// Every relation must name a model declared in the same document.
fn check_targets(schema: &SchemaDefinition) -> Result<()> {
    for (model, structure) in &schema.models {
        for (column, column_type) in structure.iter() {
            if let Some(target) = column_type.target() {
                if schema.model(target).is_none() {
                    return Err(ReactDbError::Schema(format!(
                        "column '{model}.{column}' references undeclared model '{target}'"
                    )));
                }
            }
        }
    }
    Ok(())
}
