// Models: typed columns, row collection, insert/delete and column lifecycle

mod column;
mod row;

pub(crate) use column::{Column, ColumnKind, Stored, TargetStatus};
pub use row::Row;

use crate::database::{Database, DatabaseCore};
use crate::error::{ReactDbError, Result};
use crate::event::{Listeners, Subscription};
use crate::schema::{ColumnType, IdConfig, Structure};
use crate::validation;
use crate::value::{Fields, Input, Scalar, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Arena key of a row inside its model. Never reused.
pub(crate) type RowKey = u64;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Row lifecycle and value changes on one model.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    Inserted {
        row: Row,
    },
    Deleted {
        row: Row,
    },
    Updated {
        row: Row,
        column: String,
        old: Value,
        new: Value,
    },
    RefsAdded {
        row: Row,
        column: String,
        target: Row,
    },
    RefsRemoved {
        row: Row,
        column: String,
        target: Row,
    },
}

impl ModelEvent {
    pub fn row(&self) -> &Row {
        match self {
            ModelEvent::Inserted { row }
            | ModelEvent::Deleted { row }
            | ModelEvent::Updated { row, .. }
            | ModelEvent::RefsAdded { row, .. }
            | ModelEvent::RefsRemoved { row, .. } => row,
        }
    }

    /// Column touched by a value change.
    pub fn column(&self) -> Option<&str> {
        match self {
            ModelEvent::Updated { column, .. }
            | ModelEvent::RefsAdded { column, .. }
            | ModelEvent::RefsRemoved { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// Structural change to a model's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnEvent {
    Added {
        name: String,
        column_type: ColumnType,
    },
    Dropped {
        name: String,
        column_type: ColumnType,
    },
    Renamed {
        old: String,
        new: String,
    },
    Modified {
        name: String,
        old_type: ColumnType,
        new_type: ColumnType,
    },
}

#[derive(Default)]
pub(crate) struct RowTable {
    pub(crate) order: Vec<RowKey>,
    pub(crate) ids: HashMap<RowKey, Rc<str>>,
    pub(crate) by_id: HashMap<Rc<str>, RowKey>,
}

pub(crate) struct ModelCore {
    pub(crate) id: u64,
    name: RefCell<String>,
    pub(crate) db: Weak<DatabaseCore>,
    pub(crate) columns: RefCell<Vec<(String, Rc<Column>)>>,
    pub(crate) rows: RefCell<RowTable>,
    pub(crate) events: Listeners<ModelEvent>,
    pub(crate) column_events: Listeners<ColumnEvent>,
    next_key: Cell<RowKey>,
    pub(crate) dropped: Cell<bool>,
}

impl ModelCore {
    pub(crate) fn new(name: &str, db: Weak<DatabaseCore>) -> Rc<ModelCore> {
        Rc::new(ModelCore {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            name: RefCell::new(name.to_string()),
            db,
            columns: RefCell::new(Vec::new()),
            rows: RefCell::new(RowTable::default()),
            events: Listeners::new(),
            column_events: Listeners::new(),
            next_key: Cell::new(0),
            dropped: Cell::new(false),
        })
    }

    pub(crate) fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    pub(crate) fn column(&self, name: &str) -> Option<Rc<Column>> {
        self.columns
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }

    pub(crate) fn column_name(&self, column: &Rc<Column>) -> Option<String> {
        self.columns
            .borrow()
            .iter()
            .find(|(_, c)| Rc::ptr_eq(c, column))
            .map(|(n, _)| n.clone())
    }

    /// Handle to a row whose storage still exists, alive or mid-deletion.
    pub(crate) fn handle(self: &Rc<Self>, key: RowKey) -> Option<Row> {
        let id = self.rows.borrow().ids.get(&key).cloned()?;
        Some(Row::new(self, key, id))
    }

    pub(crate) fn live_handle(self: &Rc<Self>, key: RowKey) -> Option<Row> {
        self.handle(key).filter(|row| self.contains(row))
    }

    pub(crate) fn contains(&self, row: &Row) -> bool {
        row.model_id == self.id && self.rows.borrow().by_id.get(&*row.id) == Some(&row.key)
    }

    fn id_config(&self) -> IdConfig {
        self.db
            .upgrade()
            .map(|db| db.config.id.clone())
            .unwrap_or_default()
    }

    fn fresh_id(&self) -> String {
        let config = self.id_config();
        loop {
            let id = config.generate();
            if !self.rows.borrow().by_id.contains_key(id.as_str()) {
                return id;
            }
        }
    }

    fn next_key(&self) -> RowKey {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        key
    }

    /// Every relation column must point at a live model before rows can go in.
    fn ensure_resolved(&self) -> Result<()> {
        for (_, column) in self.columns.borrow().iter() {
            if let Some(target) = column.target() {
                ready_target(target, &self.name())?;
            }
        }
        Ok(())
    }

    /// Unlink a row, announce it, then erase its storage.
    pub(crate) fn remove_row(self: &Rc<Self>, row: &Row) -> bool {
        {
            let mut rows = self.rows.borrow_mut();
            if row.model_id != self.id || rows.by_id.get(&*row.id) != Some(&row.key) {
                return false;
            }
            rows.by_id.remove(&*row.id);
            rows.order.retain(|k| *k != row.key);
        }

        self.events.emit(&ModelEvent::Deleted { row: row.clone() });

        let columns: Vec<Rc<Column>> = self.columns.borrow().iter().map(|(_, c)| c.clone()).collect();
        for column in columns {
            column.erase(row.key);
        }
        self.rows.borrow_mut().ids.remove(&row.key);
        true
    }
}

pub(crate) fn ready_target(
    target: &column::Target,
    model: &str,
) -> Result<Rc<ModelCore>> {
    match target.status() {
        TargetStatus::Ready(core) => Ok(core),
        TargetStatus::Pending(waiting_for) => Err(ReactDbError::ModelRefUnresolved {
            model: model.to_string(),
            waiting_for,
        }),
        TargetStatus::Invalidated => Err(ReactDbError::ModelRefInvalidated {
            model: model.to_string(),
        }),
    }
}

/// A named table of typed columns and rows. Clones share the same model.
#[derive(Clone)]
pub struct Model {
    pub(crate) core: Rc<ModelCore>,
}

impl Model {
    pub(crate) fn from_core(core: Rc<ModelCore>) -> Model {
        Model { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelCore> {
        Rc::downgrade(&self.core)
    }

    /// Name currently registered in the database.
    pub fn name(&self) -> String {
        self.core.name()
    }

    pub fn database(&self) -> Option<Database> {
        self.core.db.upgrade().map(Database::from_core)
    }

    pub fn is_dropped(&self) -> bool {
        self.core.dropped.get()
    }

    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    fn live(&self) -> Result<&Rc<ModelCore>> {
        if self.core.dropped.get() {
            return Err(ReactDbError::ModelNotExists { name: self.name() });
        }
        Ok(&self.core)
    }

    // ── Rows ────────────────────────────────────────────────────────

    /// Insert one row. Nested objects in relation columns are inserted into
    /// the target model first. Nothing changes unless the whole tree is valid.
    pub fn insert(&self, fields: Fields) -> Result<Row> {
        let core = self.live()?;
        let mut planner = Planner::default();
        let plan = planner.plan(core, fields)?;
        Ok(commit(plan))
    }

    /// Insert a previously persisted row. Relation columns may still be
    /// waiting for their model, so only scalar fields are accepted for them.
    pub(crate) fn restore(&self, fields: Fields) -> Result<Row> {
        let core = self.live()?;
        let mut planner = Planner {
            restoring: true,
            ..Planner::default()
        };
        let plan = planner.plan(core, fields)?;
        Ok(commit(plan))
    }

    /// Insert from a JSON object.
    pub fn insert_json(&self, value: serde_json::Value) -> Result<Row> {
        self.insert(Fields::from_json(value)?)
    }

    /// Insert in order, stopping at the first failure.
    pub fn insert_all(&self, rows: impl IntoIterator<Item = Fields>) -> Result<Vec<Row>> {
        rows.into_iter().map(|fields| self.insert(fields)).collect()
    }

    /// Delete every row matching `filter`. Returns how many were deleted.
    pub fn delete_where(&self, filter: impl Fn(&Row) -> bool) -> usize {
        let matched: Vec<Row> = self.rows().into_iter().filter(|row| filter(row)).collect();
        matched
            .iter()
            .filter(|row| self.core.remove_row(row))
            .count()
    }

    pub fn delete_all(&self) -> usize {
        self.delete_where(|_| true)
    }

    pub fn get(&self, id: &str) -> Option<Row> {
        let key = *self.core.rows.borrow().by_id.get(id)?;
        self.core.handle(key)
    }

    pub fn has_row(&self, row: &Row) -> bool {
        self.core.contains(row)
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> Vec<Row> {
        let keys = self.core.rows.borrow().order.clone();
        keys.into_iter().filter_map(|k| self.core.handle(k)).collect()
    }

    pub fn select_rows(&self, filter: impl Fn(&Row) -> bool) -> Vec<Row> {
        self.rows().into_iter().filter(|row| filter(row)).collect()
    }

    pub fn select_row(&self, filter: impl Fn(&Row) -> bool) -> Option<Row> {
        self.rows().into_iter().find(|row| filter(row))
    }

    pub fn len(&self) -> usize {
        self.core.rows.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Columns ─────────────────────────────────────────────────────

    pub fn has_column(&self, name: &str) -> bool {
        self.core.column(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.core.column(name).map(|c| c.column_type())
    }

    /// Columns in declaration order, relation targets by current name.
    pub fn columns(&self) -> Vec<(String, ColumnType)> {
        self.core
            .columns
            .borrow()
            .iter()
            .map(|(n, c)| (n.clone(), c.column_type()))
            .collect()
    }

    pub fn each_column(&self, mut f: impl FnMut(&str, &ColumnType)) {
        for (name, column_type) in self.columns() {
            f(&name, &column_type);
        }
    }

    pub fn structure(&self) -> Structure {
        self.columns()
            .into_iter()
            .fold(Structure::new(), |s, (name, column_type)| s.column(name, column_type))
    }

    /// Add a column; existing rows get the column default.
    pub fn add_column(&self, name: &str, column_type: ColumnType) -> Result<()> {
        let core = self.live()?;
        if core.column(name).is_some() {
            return Err(ReactDbError::ColumnExists {
                column: name.to_string(),
                model: core.name(),
            });
        }

        let column = Column::new(Rc::downgrade(core), &column_type);
        let keys = core.rows.borrow().order.clone();
        for key in keys {
            column.store(key, column.default_stored());
        }
        core.columns
            .borrow_mut()
            .push((name.to_string(), column.clone()));
        if let Some(db) = core.db.upgrade() {
            db.link_column(&column);
        }

        log::debug!("added column '{}.{}' ({})", core.name(), name, column_type);
        core.column_events.emit(&ColumnEvent::Added {
            name: name.to_string(),
            column_type: column.column_type(),
        });
        Ok(())
    }

    pub fn drop_column(&self, name: &str) -> Result<()> {
        let core = self.live()?;
        let column = {
            let mut columns = core.columns.borrow_mut();
            let index = columns.iter().position(|(n, _)| n == name).ok_or_else(|| {
                ReactDbError::ColumnNotExists {
                    column: name.to_string(),
                    model: core.name(),
                }
            })?;
            columns.remove(index).1
        };
        let column_type = column.column_type();
        column.clear();

        log::debug!("dropped column '{}.{}'", core.name(), name);
        core.column_events.emit(&ColumnEvent::Dropped {
            name: name.to_string(),
            column_type,
        });
        Ok(())
    }

    pub fn rename_column(&self, old: &str, new: &str) -> Result<()> {
        let core = self.live()?;
        {
            let mut columns = core.columns.borrow_mut();
            if columns.iter().any(|(n, _)| n == new) {
                return Err(ReactDbError::ColumnExists {
                    column: new.to_string(),
                    model: core.name(),
                });
            }
            let entry = columns.iter_mut().find(|(n, _)| n == old).ok_or_else(|| {
                ReactDbError::ColumnNotExists {
                    column: old.to_string(),
                    model: core.name(),
                }
            })?;
            entry.0 = new.to_string();
        }

        core.column_events.emit(&ColumnEvent::Renamed {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(())
    }

    /// Change a column's type. Refused while the model holds rows.
    pub fn modify_column(&self, name: &str, column_type: ColumnType) -> Result<()> {
        let core = self.live()?;
        let old = core.column(name).ok_or_else(|| ReactDbError::ColumnNotExists {
            column: name.to_string(),
            model: core.name(),
        })?;
        if !self.is_empty() {
            return Err(ReactDbError::ColumnInDanger {
                column: name.to_string(),
                model: core.name(),
            });
        }

        let column = Column::new(Rc::downgrade(core), &column_type);
        {
            let mut columns = core.columns.borrow_mut();
            if let Some(entry) = columns.iter_mut().find(|(n, _)| n == name) {
                entry.1 = column.clone();
            }
        }
        let old_type = old.column_type();
        old.clear();
        if let Some(db) = core.db.upgrade() {
            db.link_column(&column);
        }

        core.column_events.emit(&ColumnEvent::Modified {
            name: name.to_string(),
            old_type,
            new_type: column.column_type(),
        });
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────

    pub fn subscribe(&self, handler: impl Fn(&ModelEvent) + 'static) -> Subscription {
        self.core.events.subscribe(handler)
    }

    pub fn on_insert(&self, handler: impl Fn(&Row) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let ModelEvent::Inserted { row } = event {
                handler(row);
            }
        })
    }

    pub fn on_delete(&self, handler: impl Fn(&Row) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let ModelEvent::Deleted { row } = event {
                handler(row);
            }
        })
    }

    /// Fires for `set` and for refs cleared by a deleted target.
    pub fn on_update(&self, handler: impl Fn(&Row, &str, &Value, &Value) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let ModelEvent::Updated {
                row,
                column,
                old,
                new,
            } = event
            {
                handler(row, column, old, new);
            }
        })
    }

    pub fn on_column_change(&self, handler: impl Fn(&ColumnEvent) + 'static) -> Subscription {
        self.core.column_events.subscribe(handler)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name())
            .field("rows", &self.len())
            .finish()
    }
}

// ── Insert planning ─────────────────────────────────────────────────

struct PlannedRow {
    model: Rc<ModelCore>,
    id: Option<String>,
    values: Vec<(Rc<Column>, PlannedValue)>,
}

enum PlannedValue {
    Scalar(Scalar),
    Ref(Option<PlannedTarget>),
    Refs(Vec<PlannedTarget>),
}

enum PlannedTarget {
    Existing(RowKey),
    Nested(Box<PlannedRow>),
}

/// Validates a field tree without touching any model.
#[derive(Default)]
struct Planner {
    reserved: HashMap<u64, HashSet<String>>,
    restoring: bool,
}

impl Planner {
    fn plan(&mut self, model: &Rc<ModelCore>, fields: Fields) -> Result<PlannedRow> {
        let model_name = model.name();
        if model.dropped.get() {
            return Err(ReactDbError::ModelNotExists { name: model_name });
        }
        if !self.restoring {
            model.ensure_resolved()?;
        }

        let mut id = None;
        let mut values = Vec::new();
        for (name, input) in fields {
            if name == "id" {
                id = Some(self.reserve_id(model, &model_name, input)?);
                continue;
            }

            let column = model.column(&name).ok_or_else(|| ReactDbError::InsertInvalidColumn {
                column: name.clone(),
                model: model_name.clone(),
            })?;
            let planned = match &column.kind {
                ColumnKind::Scalar(kind) => {
                    PlannedValue::Scalar(validation::verify_scalar(*kind, &input)?)
                }
                ColumnKind::Ref(target) => {
                    let target = ready_target(target, &model_name)?;
                    match input {
                        Input::Null => PlannedValue::Ref(None),
                        Input::Row(row) => PlannedValue::Ref(Some(PlannedTarget::Existing(
                            validation::verify_ref(&name, &target, &row)?,
                        ))),
                        Input::Object(nested) => PlannedValue::Ref(Some(PlannedTarget::Nested(
                            Box::new(self.plan(&target, nested)?),
                        ))),
                        _ => return Err(ReactDbError::InsertInvalidRef { column: name }),
                    }
                }
                ColumnKind::Refs(target) => {
                    let target = ready_target(target, &model_name)?;
                    let items = match input {
                        Input::List(items) => items,
                        _ => return Err(ReactDbError::InsertInvalidRefs { column: name }),
                    };
                    let mut members = Vec::new();
                    let mut seen = HashSet::new();
                    for item in items {
                        match item {
                            Input::Row(row) => {
                                let key = validation::verify_ref(&name, &target, &row)?;
                                if seen.insert(key) {
                                    members.push(PlannedTarget::Existing(key));
                                }
                            }
                            Input::Object(nested) => {
                                members.push(PlannedTarget::Nested(Box::new(
                                    self.plan(&target, nested)?,
                                )));
                            }
                            _ => return Err(ReactDbError::InsertInvalidRefs { column: name }),
                        }
                    }
                    PlannedValue::Refs(members)
                }
            };
            values.push((column, planned));
        }

        Ok(PlannedRow {
            model: model.clone(),
            id,
            values,
        })
    }

    fn reserve_id(&mut self, model: &ModelCore, model_name: &str, input: Input) -> Result<String> {
        let id = match input {
            Input::String(id) => id,
            other => {
                return Err(ReactDbError::TypeMismatch {
                    expected: "string",
                    found: other.type_name(),
                })
            }
        };
        let reserved = self.reserved.entry(model.id).or_default();
        if model.rows.borrow().by_id.contains_key(id.as_str()) || reserved.contains(&id) {
            return Err(ReactDbError::RowExists {
                id,
                model: model_name.to_string(),
            });
        }
        reserved.insert(id.clone());
        Ok(id)
    }
}

/// Apply a validated plan. Nested rows go in first.
fn commit(plan: PlannedRow) -> Row {
    let PlannedRow { model, id, values } = plan;

    let mut resolved: Vec<(Rc<Column>, Stored)> = Vec::with_capacity(values.len());
    for (column, value) in values {
        let stored = match value {
            PlannedValue::Scalar(scalar) => Stored::Scalar(scalar),
            PlannedValue::Ref(target) => Stored::Ref(target.map(commit_target)),
            PlannedValue::Refs(targets) => {
                let mut keys = Vec::with_capacity(targets.len());
                for key in targets.into_iter().map(commit_target) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                Stored::Refs(keys)
            }
        };
        resolved.push((column, stored));
    }

    let id: Rc<str> = Rc::from(id.unwrap_or_else(|| model.fresh_id()));
    let key = model.next_key();
    let columns: Vec<Rc<Column>> = model.columns.borrow().iter().map(|(_, c)| c.clone()).collect();
    for column in columns {
        let stored = resolved
            .iter()
            .position(|(c, _)| Rc::ptr_eq(c, &column))
            .map(|index| resolved.swap_remove(index).1)
            .unwrap_or_else(|| column.default_stored());
        column.store(key, stored);
    }
    {
        let mut rows = model.rows.borrow_mut();
        rows.order.push(key);
        rows.ids.insert(key, id.clone());
        rows.by_id.insert(id.clone(), key);
    }

    let row = Row::new(&model, key, id);
    model.events.emit(&ModelEvent::Inserted { row: row.clone() });
    row
}

fn commit_target(target: PlannedTarget) -> RowKey {
    match target {
        PlannedTarget::Existing(key) => key,
        PlannedTarget::Nested(plan) => commit(*plan).key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup_people() -> (Database, Model, Model) {
        let db = Database::new();
        let person = db
            .create_model(
                "person",
                Structure::from_pairs([
                    ("name", "string"),
                    ("age", "number"),
                    ("phone", "ref:phone"),
                    ("friends", "refs:person"),
                ])
                .unwrap(),
            )
            .unwrap();
        let phone = db
            .create_model("phone", Structure::from_pairs([("model", "string")]).unwrap())
            .unwrap();
        (db, person, phone)
    }

    fn names(model: &Model) -> Vec<String> {
        model
            .rows()
            .iter()
            .map(|r| r.get_string("name").unwrap())
            .collect()
    }

    #[test]
    fn test_insert_fills_defaults() {
        let (_db, person, _phone) = setup_people();
        let row = person.insert(Fields::new().with("name", "aldi")).unwrap();

        assert_eq!(row.get_string("name").unwrap(), "aldi");
        assert_eq!(row.get_number("age").unwrap(), 0.0);
        assert_eq!(row.get_ref("phone").unwrap(), None);
        assert!(row.get_refs("friends").unwrap().is_empty());
        assert_eq!(row.id().len(), crate::schema::DEFAULT_NANOID_LENGTH);
    }

    #[test]
    fn test_insert_with_supplied_id() {
        let (_db, person, _phone) = setup_people();
        let row = person.insert(Fields::new().with("id", "p1").with("name", "aldi")).unwrap();
        assert_eq!(row.id(), "p1");
        assert_eq!(person.get("p1"), Some(row));

        let err = person.insert(Fields::new().with("id", "p1")).unwrap_err();
        assert_eq!(err.code(), "ROW_EXISTS");
        assert_eq!(person.len(), 1);
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let (_db, person, _phone) = setup_people();
        let err = person.insert(Fields::new().with("height", 170)).unwrap_err();
        assert_eq!(err.code(), "INSERT_INVALID_COLUMN");
    }

    #[test]
    fn test_insert_type_mismatch() {
        let (_db, person, _phone) = setup_people();
        let err = person.insert(Fields::new().with("age", "old")).unwrap_err();
        assert_eq!(err.code(), "TYPE_MISMATCH");

        let err = person.insert(Fields::new().with("phone", 12)).unwrap_err();
        assert_eq!(err.code(), "INSERT_INVALID_REF");

        let err = person.insert(Fields::new().with("friends", "bayu")).unwrap_err();
        assert_eq!(err.code(), "INSERT_INVALID_REFS");
    }

    #[test]
    fn test_insert_nested_json() {
        let (_db, person, phone) = setup_people();
        let row = person
            .insert_json(json!({
                "name": "ookie",
                "phone": { "model": "nookiea" },
                "friends": [{ "name": "ennaur" }]
            }))
            .unwrap();

        assert_eq!(phone.len(), 1);
        assert_eq!(person.len(), 2);
        let p = row.get_ref("phone").unwrap().unwrap();
        assert_eq!(p.get_string("model").unwrap(), "nookiea");
        let friends = row.get_refs("friends").unwrap();
        assert_eq!(friends[0].get_string("name").unwrap(), "ennaur");
        // nested rows are committed before their parent
        assert_eq!(names(&person), vec!["ennaur", "ookie"]);
    }

    #[test]
    fn test_insert_is_atomic() {
        let (_db, person, phone) = setup_people();
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        let _sub = phone.on_insert(move |_| s.set(s.get() + 1));

        let err = person
            .insert_json(json!({
                "name": "ookie",
                "phone": { "model": "nookiea" },
                "friends": [{ "name": "ennaur", "age": "twelve" }]
            }))
            .unwrap_err();

        assert_eq!(err.code(), "TYPE_MISMATCH");
        assert!(person.is_empty());
        assert!(phone.is_empty());
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn test_insert_refs_skips_duplicates() {
        let (_db, person, _phone) = setup_people();
        let bayu = person.insert(Fields::new().with("name", "bayu")).unwrap();
        let row = person
            .insert(Fields::new().with("name", "aldi").with(
                "friends",
                vec![Input::from(&bayu), Input::from(&bayu)],
            ))
            .unwrap();
        assert_eq!(row.get_refs("friends").unwrap(), vec![bayu]);
    }

    #[test]
    fn test_insert_all_stops_at_failure() {
        let (_db, _person, phone) = setup_people();
        let err = phone
            .insert_all(vec![
                Fields::new().with("model", "a"),
                Fields::new().with("model", 1),
                Fields::new().with("model", "c"),
            ])
            .unwrap_err();
        assert_eq!(err.code(), "TYPE_MISMATCH");
        assert_eq!(phone.len(), 1);
    }

    #[test]
    fn test_insert_with_unresolved_reference() {
        let db = Database::new();
        let person = db
            .create_model("person", Structure::from_pairs([("name", "string"), ("pet", "ref:pet")]).unwrap())
            .unwrap();
        let err = person.insert(Fields::new().with("name", "aldi")).unwrap_err();
        assert_eq!(err.code(), "MODEL_REF_UNRESOLVED");
    }

    #[test]
    fn test_delete_where() {
        let (_db, person, _phone) = setup_people();
        for (name, age) in [("aldi", 25), ("nina", 13), ("bayu", 32)] {
            person.insert(Fields::new().with("name", name).with("age", age)).unwrap();
        }
        let deleted = Rc::new(RefCell::new(Vec::new()));
        let d = deleted.clone();
        let _sub = person.on_delete(move |row| d.borrow_mut().push(row.id().to_string()));

        let count = person.delete_where(|row| row.get_number("age").unwrap_or(0.0) > 20.0);
        assert_eq!(count, 2);
        assert_eq!(names(&person), vec!["nina"]);
        assert_eq!(deleted.borrow().len(), 2);
    }

    #[test]
    fn test_delete_nulls_ref() {
        let (_db, person, phone) = setup_people();
        let millei = person.insert(Fields::new().with("name", "millei")).unwrap();
        let p = phone.insert(Fields::new().with("model", "ifone")).unwrap();
        millei.set("phone", &p).unwrap();

        let updates = Rc::new(Cell::new(0));
        let u = updates.clone();
        let _sub = person.on_update(move |_, column, _, new| {
            assert_eq!(column, "phone");
            assert!(new.is_null());
            u.set(u.get() + 1);
        });

        assert_eq!(phone.delete_all(), 1);
        assert_eq!(millei.get_ref("phone").unwrap(), None);
        assert_eq!(updates.get(), 1);
    }

    #[test]
    fn test_delete_removes_refs_members() {
        let (_db, person, _phone) = setup_people();
        let aldi = person.insert(Fields::new().with("name", "aldi")).unwrap();
        let nina = person.insert(Fields::new().with("name", "nina")).unwrap();
        aldi.add_refs("friends", &[nina.clone(), aldi.clone()]).unwrap();

        person.delete_where(|row| *row == nina);
        assert_eq!(aldi.get_refs("friends").unwrap(), vec![aldi.clone()]);

        person.delete_where(|row| *row == aldi);
        assert!(person.is_empty());
    }

    #[test]
    fn test_selection_helpers() {
        let (_db, person, _phone) = setup_people();
        let aldi = person.insert(Fields::new().with("name", "aldi").with("age", 25)).unwrap();
        person.insert(Fields::new().with("name", "nina").with("age", 13)).unwrap();

        assert!(person.has_row(&aldi));
        assert_eq!(person.select_rows(|r| r.get_number("age").unwrap() < 20.0).len(), 1);
        assert_eq!(
            person.select_row(|r| r.get_string("name").unwrap() == "aldi"),
            Some(aldi)
        );
        assert_eq!(person.select_row(|r| r.get_string("name").unwrap() == "x"), None);
    }

    #[test]
    fn test_add_column_fills_existing_rows() {
        let (_db, _person, phone) = setup_people();
        let p = phone.insert(Fields::new().with("model", "ifone")).unwrap();
        phone.add_column("price", ColumnType::number()).unwrap();
        assert_eq!(p.get_number("price").unwrap(), 0.0);

        let err = phone.add_column("price", ColumnType::string()).unwrap_err();
        assert_eq!(err.code(), "COLUMN_EXISTS");
    }

    #[test]
    fn test_column_lifecycle_events() {
        let (_db, _person, phone) = setup_people();
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let _sub = phone.on_column_change(move |event| e.borrow_mut().push(event.clone()));

        phone.add_column("brand", ColumnType::string()).unwrap();
        phone.rename_column("brand", "maker").unwrap();
        phone.modify_column("maker", ColumnType::reference("person")).unwrap();
        phone.drop_column("maker").unwrap();

        assert_eq!(
            *events.borrow(),
            vec![
                ColumnEvent::Added {
                    name: "brand".into(),
                    column_type: ColumnType::string()
                },
                ColumnEvent::Renamed {
                    old: "brand".into(),
                    new: "maker".into()
                },
                ColumnEvent::Modified {
                    name: "maker".into(),
                    old_type: ColumnType::string(),
                    new_type: ColumnType::reference("person")
                },
                ColumnEvent::Dropped {
                    name: "maker".into(),
                    column_type: ColumnType::reference("person")
                },
            ]
        );
        assert_eq!(phone.columns(), vec![("model".to_string(), ColumnType::string())]);
    }

    #[test]
    fn test_column_errors() {
        let (_db, person, phone) = setup_people();
        assert_eq!(phone.drop_column("nope").unwrap_err().code(), "COLUMN_NOT_EXISTS");
        assert_eq!(
            person.rename_column("name", "age").unwrap_err().code(),
            "COLUMN_EXISTS"
        );
        assert_eq!(
            person.rename_column("nope", "x").unwrap_err().code(),
            "COLUMN_NOT_EXISTS"
        );

        phone.insert(Fields::new().with("model", "ifone")).unwrap();
        assert_eq!(
            phone.modify_column("model", ColumnType::number()).unwrap_err().code(),
            "COLUMN_IN_DANGER"
        );
    }

    #[test]
    fn test_structure_reflects_columns() {
        let (_db, person, _phone) = setup_people();
        assert_eq!(
            serde_json::to_value(person.structure()).unwrap(),
            json!({
                "name": "string",
                "age": "number",
                "phone": "ref:phone",
                "friends": "refs:person"
            })
        );
    }
}
