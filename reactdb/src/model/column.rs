// Per-column value storage, relation targets and delete hooks

use super::{ModelCore, ModelEvent, Row, RowKey};
use crate::event::Subscription;
use crate::schema::ColumnType;
use crate::value::{Scalar, ScalarKind, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

enum TargetState {
    Pending(String),
    /// `name` is the model's name when it was last seen alive.
    Resolved { model: Weak<ModelCore>, name: String },
}

/// Lazily resolved handle to the model a relation column points at.
pub(crate) struct Target {
    state: RefCell<TargetState>,
}

/// What a relation target currently looks like from the column's side.
pub(crate) enum TargetStatus {
    Pending(String),
    Invalidated,
    Ready(Rc<ModelCore>),
}

impl Target {
    fn pending(name: &str) -> Self {
        Target {
            state: RefCell::new(TargetState::Pending(name.to_string())),
        }
    }

    pub(crate) fn status(&self) -> TargetStatus {
        match &*self.state.borrow() {
            TargetState::Pending(name) => TargetStatus::Pending(name.clone()),
            TargetState::Resolved { model, .. } => match model.upgrade() {
                Some(model) if !model.dropped.get() => TargetStatus::Ready(model),
                _ => TargetStatus::Invalidated,
            },
        }
    }

    /// Name the target is known by right now.
    pub(crate) fn name(&self) -> String {
        match &mut *self.state.borrow_mut() {
            TargetState::Pending(name) => name.clone(),
            TargetState::Resolved { model, name } => {
                if let Some(model) = model.upgrade() {
                    *name = model.name();
                }
                name.clone()
            }
        }
    }
}

pub(crate) enum ColumnKind {
    Scalar(ScalarKind),
    Ref(Target),
    Refs(Target),
}

/// Raw cell contents, keyed by row keys of the target model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stored {
    Scalar(Scalar),
    Ref(Option<RowKey>),
    Refs(Vec<RowKey>),
}

pub(crate) struct Column {
    pub(crate) owner: Weak<ModelCore>,
    pub(crate) kind: ColumnKind,
    pub(crate) values: RefCell<HashMap<RowKey, Stored>>,
    /// target row key -> source rows currently pointing at it
    pub(crate) backrefs: RefCell<HashMap<RowKey, Vec<RowKey>>>,
    hook: RefCell<Option<Subscription>>,
}

impl Column {
    pub(crate) fn new(owner: Weak<ModelCore>, column_type: &ColumnType) -> Rc<Column> {
        let kind = match column_type {
            ColumnType::Scalar(kind) => ColumnKind::Scalar(*kind),
            ColumnType::Ref(target) => ColumnKind::Ref(Target::pending(target)),
            ColumnType::Refs(target) => ColumnKind::Refs(Target::pending(target)),
        };
        Rc::new(Column {
            owner,
            kind,
            values: RefCell::new(HashMap::new()),
            backrefs: RefCell::new(HashMap::new()),
            hook: RefCell::new(None),
        })
    }

    pub(crate) fn target(&self) -> Option<&Target> {
        match &self.kind {
            ColumnKind::Scalar(_) => None,
            ColumnKind::Ref(target) | ColumnKind::Refs(target) => Some(target),
        }
    }

    pub(crate) fn is_refs(&self) -> bool {
        matches!(self.kind, ColumnKind::Refs(_))
    }

    /// Descriptor using the target's current name.
    pub(crate) fn column_type(&self) -> ColumnType {
        match &self.kind {
            ColumnKind::Scalar(kind) => ColumnType::Scalar(*kind),
            ColumnKind::Ref(target) => ColumnType::Ref(target.name()),
            ColumnKind::Refs(target) => ColumnType::Refs(target.name()),
        }
    }

    pub(crate) fn default_stored(&self) -> Stored {
        match &self.kind {
            ColumnKind::Scalar(kind) => Stored::Scalar(kind.default_value()),
            ColumnKind::Ref(_) => Stored::Ref(None),
            ColumnKind::Refs(_) => Stored::Refs(Vec::new()),
        }
    }

    /// Bind a pending target to `model` and start watching it for deletions.
    /// A resolved target never changes again.
    pub(crate) fn resolve(self: &Rc<Self>, model: &Rc<ModelCore>) {
        let target = match self.target() {
            Some(target) => target,
            None => return,
        };
        if matches!(&*target.state.borrow(), TargetState::Resolved { .. }) {
            return;
        }
        *target.state.borrow_mut() = TargetState::Resolved {
            model: Rc::downgrade(model),
            name: model.name(),
        };

        let column = Rc::downgrade(self);
        let hook = model.events.subscribe(move |event| {
            if let ModelEvent::Deleted { row } = event {
                if let Some(column) = column.upgrade() {
                    if let Some(owner) = column.owner.upgrade() {
                        owner.retract(&column, row);
                    }
                }
            }
        });
        *self.hook.borrow_mut() = Some(hook);
    }

    pub(crate) fn stored(&self, key: RowKey) -> Stored {
        self.values
            .borrow()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_stored())
    }

    /// Write a whole cell, keeping the reverse index in step.
    pub(crate) fn store(&self, key: RowKey, value: Stored) -> Stored {
        let old = self
            .values
            .borrow_mut()
            .insert(key, value.clone())
            .unwrap_or_else(|| self.default_stored());
        for target in targets_of(&old) {
            self.unlink(target, key);
        }
        for target in targets_of(&value) {
            self.link(target, key);
        }
        old
    }

    /// Append a member to a refs cell. Returns false when already present.
    pub(crate) fn push_member(&self, key: RowKey, target: RowKey) -> bool {
        let added = match self.values.borrow_mut().get_mut(&key) {
            Some(Stored::Refs(members)) if !members.contains(&target) => {
                members.push(target);
                true
            }
            _ => false,
        };
        if added {
            self.link(target, key);
        }
        added
    }

    /// Remove a member from a refs cell. Returns false when it was absent.
    pub(crate) fn remove_member(&self, key: RowKey, target: RowKey) -> bool {
        let removed = match self.values.borrow_mut().get_mut(&key) {
            Some(Stored::Refs(members)) => match members.iter().position(|m| *m == target) {
                Some(index) => {
                    members.remove(index);
                    true
                }
                None => false,
            },
            _ => false,
        };
        if removed {
            self.unlink(target, key);
        }
        removed
    }

    /// Drop a deleted row's cell and its entries in the reverse index.
    pub(crate) fn erase(&self, key: RowKey) {
        let old = self.values.borrow_mut().remove(&key);
        if let Some(old) = old {
            for target in targets_of(&old) {
                self.unlink(target, key);
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.values.borrow_mut().clear();
        self.backrefs.borrow_mut().clear();
        self.hook.borrow_mut().take();
    }

    fn link(&self, target: RowKey, source: RowKey) {
        let mut backrefs = self.backrefs.borrow_mut();
        let sources = backrefs.entry(target).or_default();
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    fn unlink(&self, target: RowKey, source: RowKey) {
        let mut backrefs = self.backrefs.borrow_mut();
        if let Some(sources) = backrefs.get_mut(&target) {
            sources.retain(|s| *s != source);
            if sources.is_empty() {
                backrefs.remove(&target);
            }
        }
    }

    /// Turn a stored cell into a value with live row handles.
    pub(crate) fn read(&self, key: RowKey) -> Value {
        let stored = self.stored(key);
        let target = self.target().and_then(|t| match t.status() {
            TargetStatus::Ready(model) => Some(model),
            _ => None,
        });
        let handle = |k: RowKey| target.as_ref().and_then(|model| model.handle(k));
        match stored {
            Stored::Scalar(scalar) => Value::Scalar(scalar),
            Stored::Ref(cell) => Value::Ref(cell.and_then(handle)),
            Stored::Refs(members) => Value::Refs(members.into_iter().filter_map(handle).collect()),
        }
    }
}

fn targets_of(stored: &Stored) -> Vec<RowKey> {
    match stored {
        Stored::Scalar(_) => Vec::new(),
        Stored::Ref(cell) => cell.iter().copied().collect(),
        Stored::Refs(members) => members.clone(),
    }
}

impl ModelCore {
    /// Retract every reference `column` holds to the deleted row `target`.
    pub(crate) fn retract(self: &Rc<Self>, column: &Rc<Column>, target: &Row) {
        let sources = column
            .backrefs
            .borrow_mut()
            .remove(&target.key)
            .unwrap_or_default();
        let name = match self.column_name(column) {
            Some(name) => name,
            None => return,
        };

        for source in sources {
            match &column.kind {
                ColumnKind::Ref(_) => {
                    let changed = {
                        let mut values = column.values.borrow_mut();
                        match values.get_mut(&source) {
                            Some(Stored::Ref(cell)) if *cell == Some(target.key) => {
                                *cell = None;
                                true
                            }
                            _ => false,
                        }
                    };
                    if changed {
                        if let Some(row) = self.live_handle(source) {
                            self.events.emit(&ModelEvent::Updated {
                                row,
                                column: name.clone(),
                                old: Value::Ref(Some(target.clone())),
                                new: Value::Ref(None),
                            });
                        }
                    }
                }
                ColumnKind::Refs(_) => {
                    let changed = match column.values.borrow_mut().get_mut(&source) {
                        Some(Stored::Refs(members)) => {
                            let before = members.len();
                            members.retain(|m| *m != target.key);
                            members.len() != before
                        }
                        _ => false,
                    };
                    if changed {
                        if let Some(row) = self.live_handle(source) {
                            self.events.emit(&ModelEvent::RefsRemoved {
                                row,
                                column: name.clone(),
                                target: target.clone(),
                            });
                        }
                    }
                }
                ColumnKind::Scalar(_) => {}
            }
        }
    }
}
