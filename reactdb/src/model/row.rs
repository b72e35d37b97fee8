use super::{ready_target, ColumnKind, Model, ModelCore, ModelEvent, RowKey, Stored};
use crate::error::{ReactDbError, Result};
use crate::validation;
use crate::value::{Input, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Handle to one record. Values live in the model, not here.
///
/// Two handles are equal when they name the same row of the same model.
#[derive(Clone)]
pub struct Row {
    model: Weak<ModelCore>,
    pub(crate) model_id: u64,
    pub(crate) key: RowKey,
    pub(crate) id: Rc<str>,
}

impl Row {
    pub(crate) fn new(model: &Rc<ModelCore>, key: RowKey, id: Rc<str>) -> Row {
        Row {
            model: Rc::downgrade(model),
            model_id: model.id,
            key,
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning model, as long as it is still held somewhere.
    pub fn model(&self) -> Option<Model> {
        self.model.upgrade().map(Model::from_core)
    }

    pub fn is_alive(&self) -> bool {
        self.model
            .upgrade()
            .map(|core| core.contains(self))
            .unwrap_or(false)
    }

    fn core(&self) -> Result<Rc<ModelCore>> {
        match self.model.upgrade() {
            Some(core) if core.contains(self) => Ok(core),
            _ => Err(ReactDbError::RowDeleted {
                id: self.id.to_string(),
            }),
        }
    }

    fn column(&self, core: &ModelCore, name: &str) -> Result<Rc<super::Column>> {
        core.column(name).ok_or_else(|| ReactDbError::ColumnNotExists {
            column: name.to_string(),
            model: core.name(),
        })
    }

    pub fn has(&self, column: &str) -> bool {
        self.model
            .upgrade()
            .map(|core| core.column(column).is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, column: &str) -> Result<Value> {
        let core = self.core()?;
        Ok(self.column(&core, column)?.read(self.key))
    }

    pub fn get_string(&self, column: &str) -> Result<String> {
        match self.get(column)? {
            Value::Scalar(scalar) => match scalar.as_str() {
                Some(s) => Ok(s.to_string()),
                None => Err(mismatch("string", &Value::Scalar(scalar))),
            },
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn get_number(&self, column: &str) -> Result<f64> {
        let value = self.get(column)?;
        value.as_number().ok_or_else(|| mismatch("number", &value))
    }

    pub fn get_bool(&self, column: &str) -> Result<bool> {
        let value = self.get(column)?;
        value.as_bool().ok_or_else(|| mismatch("boolean", &value))
    }

    pub fn get_ref(&self, column: &str) -> Result<Option<Row>> {
        match self.get(column)? {
            Value::Ref(row) => Ok(row),
            other => Err(mismatch("ref", &other)),
        }
    }

    pub fn get_refs(&self, column: &str) -> Result<Vec<Row>> {
        match self.get(column)? {
            Value::Refs(rows) => Ok(rows),
            other => Err(mismatch("refs", &other)),
        }
    }

    /// Assign a scalar or a single reference. Reference sets go through
    /// [`Row::add_refs`] and [`Row::delete_refs`].
    pub fn set(&self, column: &str, value: impl Into<Input>) -> Result<()> {
        let core = self.core()?;
        let cell = self.column(&core, column)?;
        let input = value.into();

        let (old, new) = match &cell.kind {
            ColumnKind::Scalar(kind) => {
                let scalar = validation::verify_scalar(*kind, &input)?;
                let old = cell.read(self.key);
                cell.store(self.key, Stored::Scalar(scalar.clone()));
                (old, Value::Scalar(scalar))
            }
            ColumnKind::Ref(target) => {
                let target = match ready_target(target, &core.name()) {
                    Ok(target) => target,
                    Err(ReactDbError::ModelRefUnresolved { .. }) => {
                        return Err(ReactDbError::RefFailed {
                            column: column.to_string(),
                        })
                    }
                    Err(e) => return Err(e),
                };
                let key = match &input {
                    Input::Null => None,
                    Input::Row(row) => Some(validation::verify_ref(column, &target, row)?),
                    _ => {
                        return Err(ReactDbError::RefInvalidType {
                            column: column.to_string(),
                        })
                    }
                };
                let old = cell.read(self.key);
                cell.store(self.key, Stored::Ref(key));
                (old, Value::Ref(key.and_then(|k| target.handle(k))))
            }
            ColumnKind::Refs(_) => {
                return Err(ReactDbError::IllegalRefsSet {
                    column: column.to_string(),
                })
            }
        };

        core.events.emit(&ModelEvent::Updated {
            row: self.clone(),
            column: column.to_string(),
            old,
            new,
        });
        Ok(())
    }

    /// Add members to a reference set. Rows already present are skipped.
    /// Returns how many were added.
    pub fn add_refs(&self, column: &str, rows: &[Row]) -> Result<usize> {
        let core = self.core()?;
        let cell = self.column(&core, column)?;
        let target = match &cell.kind {
            ColumnKind::Refs(target) => match ready_target(target, &core.name()) {
                Ok(target) => target,
                Err(ReactDbError::ModelRefUnresolved { .. }) => {
                    return Err(ReactDbError::RefFailed {
                        column: column.to_string(),
                    })
                }
                Err(e) => return Err(e),
            },
            _ => {
                return Err(ReactDbError::RefsAddFailed {
                    column: column.to_string(),
                })
            }
        };

        for row in rows {
            validation::verify_member(column, &target, row)?;
        }

        let mut added = 0;
        for row in rows {
            if cell.push_member(self.key, row.key) {
                added += 1;
                core.events.emit(&ModelEvent::RefsAdded {
                    row: self.clone(),
                    column: column.to_string(),
                    target: row.clone(),
                });
            }
        }
        Ok(added)
    }

    /// Remove members of a reference set matching `filter`. Returns how many
    /// were removed.
    pub fn delete_refs(&self, column: &str, filter: impl Fn(&Row) -> bool) -> Result<usize> {
        let core = self.core()?;
        let cell = self.column(&core, column)?;
        if !cell.is_refs() {
            return Err(ReactDbError::RefsDeleteFailed {
                column: column.to_string(),
            });
        }

        let members = match cell.read(self.key) {
            Value::Refs(members) => members,
            _ => Vec::new(),
        };
        let mut removed = 0;
        for member in members.iter().filter(|m| filter(m)) {
            if cell.remove_member(self.key, member.key) {
                removed += 1;
                core.events.emit(&ModelEvent::RefsRemoved {
                    row: self.clone(),
                    column: column.to_string(),
                    target: member.clone(),
                });
            }
        }
        Ok(removed)
    }

    /// Whether a `ref` cell points at `row` or a `refs` cell contains it.
    pub fn has_ref(&self, column: &str, row: &Row) -> Result<bool> {
        let core = self.core()?;
        let cell = self.column(&core, column)?;
        let target_id = match cell.target().map(|t| t.status()) {
            Some(super::TargetStatus::Ready(target)) => target.id,
            Some(_) => return Ok(false),
            None => {
                return Err(ReactDbError::NotAReference {
                    column: column.to_string(),
                })
            }
        };
        if row.model_id != target_id {
            return Ok(false);
        }
        Ok(match cell.stored(self.key) {
            Stored::Ref(key) => key == Some(row.key),
            Stored::Refs(members) => members.contains(&row.key),
            Stored::Scalar(_) => false,
        })
    }

    /// Plain JSON snapshot: scalars as values, relations as ids.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let core = self.core()?;
        let mut object = serde_json::Map::new();
        object.insert("id".into(), serde_json::Value::String(self.id.to_string()));
        let columns: Vec<(String, Rc<super::Column>)> = core.columns.borrow().clone();
        for (name, cell) in columns {
            let value = match cell.read(self.key) {
                Value::Scalar(scalar) => scalar.to_json(),
                Value::Ref(row) => row
                    .map(|r| serde_json::Value::String(r.id().to_string()))
                    .unwrap_or(serde_json::Value::Null),
                Value::Refs(rows) => serde_json::Value::Array(
                    rows.iter()
                        .map(|r| serde_json::Value::String(r.id().to_string()))
                        .collect(),
                ),
            };
            object.insert(name, value);
        }
        Ok(serde_json::Value::Object(object))
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ReactDbError {
    ReactDbError::TypeMismatch {
        expected,
        found: validation::value_type_name(found),
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.model_id == other.model_id && self.key == other.key
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model_id.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.model.upgrade().map(|m| m.name()).unwrap_or_default();
        write!(f, "Row({}:{})", model, self.id)
    }
}
