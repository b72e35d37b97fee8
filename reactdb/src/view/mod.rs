// Live views: incrementally maintained projections, filters and sorts
//
// A view owns one projector per selector node. Each projector watches its
// model's events and keeps a memo of the rows it has projected, so the same
// related row always maps to the same ViewRow inside one view.

mod builder;

pub use builder::{Order, ViewBuilder};

use crate::database::Database;
use crate::error::{ReactDbError, Result};
use crate::event::Subscription;
use crate::model::{Model, ModelEvent, Row, RowKey, TargetStatus};
use crate::schema::ColumnType;
use crate::state::{ListChange, State, StateList};
use crate::value::{Scalar, Value};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) type Filter = Rc<dyn Fn(&Row) -> bool>;

/// One entry of a projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// The row id.
    Id,
    /// The id and every scalar column.
    All,
    /// A column by name. Relation columns project their rows with `*`.
    Column(String),
    /// A relation column projected with nested selectors.
    Relation { column: String, select: Vec<Selector> },
    /// Every relation column, each projected with the same selectors.
    AllRelations { select: Vec<Selector> },
    /// Rows of `model` whose `column` points at the projected row.
    Reverse {
        model: String,
        column: String,
        select: Vec<Selector>,
    },
}

impl Selector {
    /// Nested selector: `"*"` for every relation, `"model#column"` or a
    /// relation column name.
    pub fn nested<S: Into<Selector>>(spec: &str, select: impl IntoIterator<Item = S>) -> Selector {
        let select: Vec<Selector> = select.into_iter().map(Into::into).collect();
        if spec == "*" {
            return Selector::AllRelations { select };
        }
        match spec.split_once('#') {
            Some((model, column)) => Selector::Reverse {
                model: model.to_string(),
                column: column.to_string(),
                select,
            },
            None => Selector::Relation {
                column: spec.to_string(),
                select,
            },
        }
    }
}

impl From<&str> for Selector {
    fn from(spec: &str) -> Self {
        match spec {
            "id" => Selector::Id,
            "*" => Selector::All,
            _ if spec.contains('#') => Selector::nested(spec, Vec::<Selector>::new()),
            _ => Selector::Column(spec.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(spec: String) -> Self {
        Selector::from(spec.as_str())
    }
}

/// A projected field of a [`ViewRow`].
#[derive(Debug, Clone)]
pub enum ViewField {
    Id(String),
    Value(State<Scalar>),
    Ref(State<Option<ViewRow>>),
    Refs(StateList<ViewRow>),
}

impl ViewField {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ViewField::Id(id) => serde_json::Value::String(id.clone()),
            ViewField::Value(state) => state.with(Scalar::to_json),
            ViewField::Ref(state) => state.with(|row| {
                row.as_ref()
                    .map(ViewRow::to_json)
                    .unwrap_or(serde_json::Value::Null)
            }),
            ViewField::Refs(list) => {
                serde_json::Value::Array(list.to_vec().iter().map(ViewRow::to_json).collect())
            }
        }
    }
}

struct ViewRowInner {
    row: Row,
    fields: Vec<(String, ViewField)>,
}

/// A projected row. Scalar fields are live states, relations live rows and lists.
#[derive(Clone)]
pub struct ViewRow {
    inner: Rc<ViewRowInner>,
}

impl ViewRow {
    fn new(row: Row, fields: Vec<(String, ViewField)>) -> Self {
        ViewRow {
            inner: Rc::new(ViewRowInner { row, fields }),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.row.id()
    }

    pub fn row(&self) -> &Row {
        &self.inner.row
    }

    pub fn field(&self, name: &str) -> Option<&ViewField> {
        self.inner
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ViewField)> {
        self.inner.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Current value of a scalar field.
    pub fn value(&self, name: &str) -> Option<Scalar> {
        self.state(name).map(|s| s.get())
    }

    pub fn state(&self, name: &str) -> Option<State<Scalar>> {
        match self.field(name)? {
            ViewField::Value(state) => Some(state.clone()),
            _ => None,
        }
    }

    pub fn related(&self, name: &str) -> Option<State<Option<ViewRow>>> {
        match self.field(name)? {
            ViewField::Ref(state) => Some(state.clone()),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<StateList<ViewRow>> {
        match self.field(name)? {
            ViewField::Refs(list) => Some(list.clone()),
            _ => None,
        }
    }

    /// Frozen copy with every state unwrapped.
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .inner
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json()))
            .collect();
        serde_json::Value::Object(object)
    }

    pub fn ptr_eq(&self, other: &ViewRow) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ViewRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, field) in &self.inner.fields {
            map.entry(name, field);
        }
        map.finish()
    }
}

// ── Projection ──────────────────────────────────────────────────────

enum FieldSpec {
    Id,
    Scalar(String),
    Ref {
        column: String,
        child: Rc<Projector>,
    },
    Refs {
        column: String,
        child: Rc<Projector>,
    },
    Reverse {
        field: String,
        model: Model,
        column: String,
        child: Rc<Projector>,
    },
}

impl FieldSpec {
    fn name(&self) -> &str {
        match self {
            FieldSpec::Id => "id",
            FieldSpec::Scalar(column)
            | FieldSpec::Ref { column, .. }
            | FieldSpec::Refs { column, .. } => column,
            FieldSpec::Reverse { field, .. } => field,
        }
    }

    fn children(&self) -> Option<&Rc<Projector>> {
        match self {
            FieldSpec::Id | FieldSpec::Scalar(_) => None,
            FieldSpec::Ref { child, .. }
            | FieldSpec::Refs { child, .. }
            | FieldSpec::Reverse { child, .. } => Some(child),
        }
    }
}

struct Projector {
    model: Model,
    fields: Vec<FieldSpec>,
    memo: RefCell<HashMap<RowKey, ViewRow>>,
    subs: RefCell<Vec<Subscription>>,
}

impl Projector {
    /// Validate selectors against `model` and build the projector tree.
    fn compile(db: &Database, model: &Model, selectors: &[Selector]) -> Result<Rc<Projector>> {
        let selectors: Vec<Selector> = if selectors.is_empty() {
            vec![Selector::All]
        } else {
            selectors.to_vec()
        };

        let mut fields: Vec<FieldSpec> = Vec::new();
        let mut push = |spec: FieldSpec| {
            if !fields.iter().any(|f| f.name() == spec.name()) {
                fields.push(spec);
            }
        };

        for selector in selectors {
            match selector {
                Selector::Id => push(FieldSpec::Id),
                Selector::All => {
                    push(FieldSpec::Id);
                    for (name, column_type) in model.columns() {
                        if !column_type.is_relation() {
                            push(FieldSpec::Scalar(name));
                        }
                    }
                }
                Selector::Column(column) => match column_of(model, &column)? {
                    ColumnType::Scalar(_) => push(FieldSpec::Scalar(column)),
                    _ => push(relation(db, model, column, &[])?),
                },
                Selector::Relation { column, select } => {
                    if !column_of(model, &column)?.is_relation() {
                        return Err(ReactDbError::NotAReference { column });
                    }
                    push(relation(db, model, column, &select)?);
                }
                Selector::AllRelations { select } => {
                    for (name, column_type) in model.columns() {
                        if column_type.is_relation() {
                            push(relation(db, model, name, &select)?);
                        }
                    }
                }
                Selector::Reverse {
                    model: source_name,
                    column,
                    select,
                } => {
                    let source = db.select_model(&source_name)?;
                    let points_here = match column_of(&source, &column)? {
                        ColumnType::Scalar(_) => {
                            return Err(ReactDbError::NotAReference { column });
                        }
                        _ => source
                            .core
                            .column(&column)
                            .and_then(|c| c.target().map(|t| t.status()))
                            .map(|status| matches!(status, TargetStatus::Ready(t) if Rc::ptr_eq(&t, &model.core)))
                            .unwrap_or(false),
                    };
                    if !points_here {
                        return Err(ReactDbError::NotValidColumn {
                            column: format!("{source_name}#{column}"),
                        });
                    }
                    let child = Projector::compile(db, &source, &select)?;
                    push(FieldSpec::Reverse {
                        field: format!("{source_name}#{column}"),
                        model: source,
                        column,
                        child,
                    });
                }
            }
        }

        let projector = Rc::new(Projector {
            model: model.clone(),
            fields,
            memo: RefCell::new(HashMap::new()),
            subs: RefCell::new(Vec::new()),
        });
        projector.watch();
        Ok(projector)
    }

    fn watch(self: &Rc<Self>) {
        let mut subs = Vec::new();

        let weak: Weak<Projector> = Rc::downgrade(self);
        subs.push(self.model.subscribe(move |event| {
            if let Some(projector) = weak.upgrade() {
                projector.on_model_event(event);
            }
        }));

        for (index, spec) in self.fields.iter().enumerate() {
            if let FieldSpec::Reverse { model, .. } = spec {
                let weak: Weak<Projector> = Rc::downgrade(self);
                subs.push(model.subscribe(move |event| {
                    if let Some(projector) = weak.upgrade() {
                        projector.on_reverse_event(index, event);
                    }
                }));
            }
        }

        *self.subs.borrow_mut() = subs;
    }

    fn stop(&self) {
        self.subs.borrow_mut().clear();
        self.memo.borrow_mut().clear();
        for spec in &self.fields {
            if let Some(child) = spec.children() {
                child.stop();
            }
        }
    }

    fn memoized(&self, row: &Row) -> Option<ViewRow> {
        if row.model_id != self.model.core.id {
            return None;
        }
        self.memo.borrow().get(&row.key).cloned()
    }

    fn spec(&self, column: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| match spec {
            FieldSpec::Scalar(c) | FieldSpec::Ref { column: c, .. } | FieldSpec::Refs { column: c, .. } => {
                c == column
            }
            _ => false,
        })
    }

    /// Project a row, reusing the memoized ViewRow when there is one.
    fn project(self: &Rc<Self>, row: &Row) -> ViewRow {
        if let Some(view_row) = self.memoized(row) {
            return view_row;
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            let field = match spec {
                FieldSpec::Id => Some(ViewField::Id(row.id().to_string())),
                FieldSpec::Scalar(column) => match row.get(column) {
                    Ok(Value::Scalar(scalar)) => Some(ViewField::Value(State::new(scalar))),
                    other => skip(row, column, other),
                },
                FieldSpec::Ref { column, child } => match row.get(column) {
                    Ok(Value::Ref(target)) => Some(ViewField::Ref(State::new(
                        target.map(|t| child.project(&t)),
                    ))),
                    other => skip(row, column, other),
                },
                FieldSpec::Refs { column, child } => match row.get(column) {
                    Ok(Value::Refs(members)) => Some(ViewField::Refs(StateList::from_vec(
                        members.iter().map(|m| child.project(m)).collect(),
                    ))),
                    other => skip(row, column, other),
                },
                FieldSpec::Reverse {
                    model,
                    column,
                    child,
                    ..
                } => Some(ViewField::Refs(StateList::from_vec(
                    reverse_sources(model, column, row)
                        .iter()
                        .map(|source| child.project(source))
                        .collect(),
                ))),
            };
            if let Some(field) = field {
                fields.push((spec.name().to_string(), field));
            }
        }

        let view_row = ViewRow::new(row.clone(), fields);
        if row.is_alive() {
            self.memo.borrow_mut().insert(row.key, view_row.clone());
        }
        view_row
    }

    fn on_model_event(self: &Rc<Self>, event: &ModelEvent) {
        match event {
            ModelEvent::Deleted { row } => {
                self.memo.borrow_mut().remove(&row.key);
            }
            ModelEvent::Updated {
                row, column, new, ..
            } => {
                let view_row = match self.memoized(row) {
                    Some(view_row) => view_row,
                    None => return,
                };
                match (self.spec(column), new) {
                    (Some(FieldSpec::Scalar(_)), Value::Scalar(scalar)) => {
                        match view_row.state(column) {
                            Some(state) => state.set(scalar.clone()),
                            None => log::warn!("view row {} has no field '{}'", row.id(), column),
                        }
                    }
                    (Some(FieldSpec::Ref { child, .. }), Value::Ref(target)) => {
                        match view_row.related(column) {
                            Some(state) => state.set(target.as_ref().map(|t| child.project(t))),
                            None => log::warn!("view row {} has no field '{}'", row.id(), column),
                        }
                    }
                    (Some(_), _) => {
                        log::warn!("column '{}' changed type under a live view", column)
                    }
                    (None, _) => {}
                }
            }
            ModelEvent::RefsAdded {
                row,
                column,
                target,
            } => {
                if let (Some(view_row), Some(FieldSpec::Refs { child, .. })) =
                    (self.memoized(row), self.spec(column))
                {
                    if let Some(list) = view_row.list(column) {
                        if list.position(|v| v.row() == target).is_none() {
                            list.push(child.project(target));
                        }
                    }
                }
            }
            ModelEvent::RefsRemoved {
                row,
                column,
                target,
            } => {
                if let Some(list) = self.memoized(row).and_then(|v| v.list(column)) {
                    list.remove_first(|v| v.row() == target);
                }
            }
            ModelEvent::Inserted { .. } => {}
        }
    }

    fn on_reverse_event(self: &Rc<Self>, index: usize, event: &ModelEvent) {
        let (field, column, child) = match &self.fields[index] {
            FieldSpec::Reverse {
                field,
                column,
                child,
                ..
            } => (field, column, child),
            _ => return,
        };

        match event {
            ModelEvent::Inserted { row } => match row.get(column) {
                Ok(Value::Ref(Some(owner))) => self.reverse_add(field, &owner, row, child),
                Ok(Value::Refs(owners)) => {
                    for owner in &owners {
                        self.reverse_add(field, owner, row, child);
                    }
                }
                Ok(_) => {}
                Err(e) => log::warn!("cannot read '{}' of row {}: {}", column, row.id(), e),
            },
            ModelEvent::Updated {
                row,
                column: changed,
                old,
                new,
            } if changed == column => {
                if let Some(owner) = old.as_row() {
                    self.reverse_remove(field, owner, row);
                }
                if let Some(owner) = new.as_row() {
                    self.reverse_add(field, owner, row, child);
                }
            }
            ModelEvent::RefsAdded {
                row,
                column: changed,
                target,
            } if changed == column => self.reverse_add(field, target, row, child),
            ModelEvent::RefsRemoved {
                row,
                column: changed,
                target,
            } if changed == column => self.reverse_remove(field, target, row),
            ModelEvent::Deleted { row } => {
                let view_rows: Vec<ViewRow> = self.memo.borrow().values().cloned().collect();
                for view_row in view_rows {
                    if let Some(list) = view_row.list(field) {
                        list.remove_first(|v| v.row() == row);
                    }
                }
            }
            _ => {}
        }
    }

    fn reverse_add(&self, field: &str, owner: &Row, source: &Row, child: &Rc<Projector>) {
        if let Some(list) = self.memoized(owner).and_then(|v| v.list(field)) {
            if list.position(|v| v.row() == source).is_none() {
                // keep insertion order of the source rows
                let index = list
                    .position(|v| v.row().key > source.key)
                    .unwrap_or_else(|| list.len());
                list.insert(index, child.project(source));
            }
        }
    }

    fn reverse_remove(&self, field: &str, owner: &Row, source: &Row) {
        if let Some(list) = self.memoized(owner).and_then(|v| v.list(field)) {
            list.remove_first(|v| v.row() == source);
        }
    }
}

fn column_of(model: &Model, column: &str) -> Result<ColumnType> {
    model
        .column_type(column)
        .ok_or_else(|| ReactDbError::NotValidColumn {
            column: column.to_string(),
        })
}

fn relation(db: &Database, model: &Model, column: String, select: &[Selector]) -> Result<FieldSpec> {
    let cell = model
        .core
        .column(&column)
        .ok_or_else(|| ReactDbError::NotValidColumn {
            column: column.clone(),
        })?;
    let target = match cell.target() {
        Some(target) => crate::model::ready_target(target, &model.name())?,
        None => return Err(ReactDbError::NotAReference { column }),
    };
    let child = Projector::compile(db, &Model::from_core(target), select)?;
    Ok(if cell.is_refs() {
        FieldSpec::Refs { column, child }
    } else {
        FieldSpec::Ref { column, child }
    })
}

/// Rows of `model` whose `column` currently points at `owner`, in insertion order.
fn reverse_sources(model: &Model, column: &str, owner: &Row) -> Vec<Row> {
    let cell = match model.core.column(column) {
        Some(cell) => cell,
        None => return Vec::new(),
    };
    let targets_owner = matches!(
        cell.target().map(|t| t.status()),
        Some(TargetStatus::Ready(target)) if target.id == owner.model_id
    );
    if !targets_owner {
        return Vec::new();
    }
    let mut keys = cell.backrefs.borrow().get(&owner.key).cloned().unwrap_or_default();
    keys.sort_unstable();
    keys.into_iter()
        .filter_map(|key| model.core.live_handle(key))
        .collect()
}

fn skip(row: &Row, column: &str, found: Result<Value>) -> Option<ViewField> {
    match found {
        Ok(value) => log::warn!(
            "column '{}' of row {} no longer matches its projection ({:?})",
            column,
            row.id(),
            value
        ),
        Err(e) => log::warn!("cannot project '{}' of row {}: {}", column, row.id(), e),
    }
    None
}

// ── Views ───────────────────────────────────────────────────────────

struct ViewCore {
    model: Model,
    projector: Rc<Projector>,
    filter: Option<Filter>,
    order: Option<(String, Order)>,
    output: StateList<ViewRow>,
    present: RefCell<HashSet<RowKey>>,
    subs: RefCell<Vec<Subscription>>,
    stopped: Cell<bool>,
}

impl ViewCore {
    fn passes(&self, row: &Row) -> bool {
        self.filter.as_ref().map(|f| f(row)).unwrap_or(true)
    }

    fn sorts_by(&self, column: &str) -> bool {
        matches!(&self.order, Some((c, _)) if c == column)
    }

    fn attach(&self, row: &Row) {
        if !self.present.borrow_mut().insert(row.key) {
            return;
        }
        let view_row = self.projector.project(row);
        let index = self.position_for(row);
        self.output.insert(index, view_row);
    }

    fn detach(&self, row: &Row) {
        if !self.present.borrow_mut().remove(&row.key) {
            return;
        }
        self.output.remove_first(|v| v.row() == row);
    }

    /// First entry the new key strictly precedes, else the end.
    fn position_for(&self, row: &Row) -> usize {
        let (column, order) = match &self.order {
            Some(order) => order,
            None => return self.output.len(),
        };
        let key = match sort_key(row, column) {
            Some(key) => key,
            None => return self.output.len(),
        };
        let wanted = match order {
            Order::Asc => Ordering::Less,
            Order::Desc => Ordering::Greater,
        };
        let entries = self.output.to_vec();
        entries
            .iter()
            .position(|entry| {
                sort_key(entry.row(), column)
                    .and_then(|existing| key.compare(&existing))
                    == Some(wanted)
            })
            .unwrap_or(entries.len())
    }

    fn on_event(&self, event: &ModelEvent) {
        match event {
            ModelEvent::Inserted { row } => {
                if row.is_alive() && self.passes(row) {
                    self.attach(row);
                }
            }
            ModelEvent::Deleted { row } => self.detach(row),
            ModelEvent::Updated { row, column, .. }
            | ModelEvent::RefsAdded { row, column, .. }
            | ModelEvent::RefsRemoved { row, column, .. } => {
                let present = self.present.borrow().contains(&row.key);
                let passes = row.is_alive() && self.passes(row);
                match (present, passes) {
                    (true, false) => self.detach(row),
                    (false, true) => self.attach(row),
                    (true, true) if self.sorts_by(column) => {
                        self.detach(row);
                        self.attach(row);
                    }
                    _ => {}
                }
            }
        }
    }
}

fn sort_key(row: &Row, column: &str) -> Option<Scalar> {
    row.get(column).ok()?.as_scalar().cloned()
}

/// A live, ordered result of a query. Dropping every handle or calling
/// [`View::stop`] tears it down.
#[derive(Clone)]
pub struct View {
    core: Rc<ViewCore>,
}

impl View {
    fn new(
        model: Model,
        projector: Rc<Projector>,
        filter: Option<Filter>,
        order: Option<(String, Order)>,
    ) -> View {
        let core = Rc::new(ViewCore {
            model,
            projector,
            filter,
            order,
            output: StateList::new(),
            present: RefCell::new(HashSet::new()),
            subs: RefCell::new(Vec::new()),
            stopped: Cell::new(false),
        });

        for row in core.model.rows() {
            if core.passes(&row) {
                core.attach(&row);
            }
        }

        let weak: Weak<ViewCore> = Rc::downgrade(&core);
        let sub = core.model.subscribe(move |event| {
            if let Some(core) = weak.upgrade() {
                core.on_event(event);
            }
        });
        core.subs.borrow_mut().push(sub);

        View { core }
    }

    pub fn model(&self) -> &Model {
        &self.core.model
    }

    pub fn len(&self) -> usize {
        self.core.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.output.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ViewRow> {
        self.core.output.get(index)
    }

    pub fn rows(&self) -> Vec<ViewRow> {
        self.core.output.to_vec()
    }

    /// The underlying observable list.
    pub fn list(&self) -> StateList<ViewRow> {
        self.core.output.clone()
    }

    pub fn on_change(&self, handler: impl Fn(&ListChange<ViewRow>) + 'static) -> Subscription {
        self.core.output.on_change(handler)
    }

    /// Frozen snapshot of the current rows.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.rows().iter().map(ViewRow::to_json).collect())
    }

    /// Stop tracking the source. The view keeps its last contents.
    pub fn stop(&self) {
        if self.core.stopped.replace(true) {
            return;
        }
        self.core.subs.borrow_mut().clear();
        self.core.projector.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.core.stopped.get()
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("model", &self.core.model.name())
            .field("rows", &self.core.output)
            .finish()
    }
}
