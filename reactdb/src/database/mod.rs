// Database: registry of named models and forward-reference wait-list

use crate::error::{ReactDbError, Result};
use crate::event::{Listeners, Subscription};
use crate::model::{Column, Model, ModelCore};
use crate::schema::{DatabaseConfig, SchemaDefinition, Structure};
use crate::view::ViewBuilder;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Model lifecycle on a database.
#[derive(Debug, Clone)]
pub enum DatabaseEvent {
    ModelCreated { name: String, model: Model },
    ModelDropped { name: String, model: Model },
    ModelRenamed { old: String, new: String, model: Model },
}

type Waiter = Box<dyn FnOnce(&Rc<ModelCore>)>;

pub(crate) struct DatabaseCore {
    pub(crate) config: DatabaseConfig,
    models: RefCell<Vec<(String, Model)>>,
    waitlist: RefCell<HashMap<String, Vec<Waiter>>>,
    events: Listeners<DatabaseEvent>,
}

impl DatabaseCore {
    fn find(&self, name: &str) -> Option<Model> {
        self.models
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.clone())
    }

    /// Resolve a relation column now, or park it until its target exists.
    pub(crate) fn link_column(&self, column: &Rc<Column>) {
        let target = match column.target() {
            Some(target) => target.name(),
            None => return,
        };
        match self.find(&target) {
            Some(model) => column.resolve(&model.core),
            None => {
                log::debug!("column waiting for model '{target}'");
                let waiting = Rc::downgrade(column);
                self.waitlist
                    .borrow_mut()
                    .entry(target)
                    .or_default()
                    .push(Box::new(move |model| {
                        if let Some(column) = waiting.upgrade() {
                            column.resolve(model);
                        }
                    }));
            }
        }
    }
}

/// A registry of named models. Clones share the same database.
#[derive(Clone)]
pub struct Database {
    core: Rc<DatabaseCore>,
}

impl Database {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Database {
            core: Rc::new(DatabaseCore {
                config,
                models: RefCell::new(Vec::new()),
                waitlist: RefCell::new(HashMap::new()),
                events: Listeners::new(),
            }),
        }
    }

    /// Build a database and create every model the schema declares.
    pub fn from_schema(schema: &SchemaDefinition) -> Result<Self> {
        let db = Self::with_config(schema.config());
        for (name, structure) in &schema.models {
            db.create_model(name, structure.clone())?;
        }
        Ok(db)
    }

    pub(crate) fn from_core(core: Rc<DatabaseCore>) -> Self {
        Database { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<DatabaseCore> {
        Rc::downgrade(&self.core)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.core.config
    }

    /// Create a model. Relation columns naming models that do not exist yet
    /// resolve the moment those models are created.
    pub fn create_model(&self, name: &str, structure: Structure) -> Result<Model> {
        if self.has_model(name) {
            return Err(ReactDbError::ModelExists {
                name: name.to_string(),
            });
        }

        let core = ModelCore::new(name, self.downgrade());
        let mut columns = Vec::with_capacity(structure.len());
        for (column, column_type) in structure {
            let cell = Column::new(Rc::downgrade(&core), &column_type);
            columns.push(cell.clone());
            core.columns.borrow_mut().push((column, cell));
        }
        let model = Model::from_core(core);
        self.core
            .models
            .borrow_mut()
            .push((name.to_string(), model.clone()));

        for column in &columns {
            self.core.link_column(column);
        }
        let waiters = self.core.waitlist.borrow_mut().remove(name).unwrap_or_default();
        if !waiters.is_empty() {
            log::debug!("resolving {} reference(s) to model '{}'", waiters.len(), name);
        }
        for waiter in waiters {
            waiter(&model.core);
        }

        log::debug!("created model '{name}'");
        self.core.events.emit(&DatabaseEvent::ModelCreated {
            name: name.to_string(),
            model: model.clone(),
        });
        Ok(model)
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.core.find(name).is_some()
    }

    pub fn select_model(&self, name: &str) -> Result<Model> {
        self.core.find(name).ok_or_else(|| ReactDbError::ModelNotExists {
            name: name.to_string(),
        })
    }

    /// Delete every row of a model, then remove it. Relation columns that
    /// pointed at it fail with MODEL_REF_INVALIDATED from then on.
    pub fn drop_model(&self, name: &str) -> Result<()> {
        let model = self.select_model(name)?;
        model.delete_all();

        self.core.models.borrow_mut().retain(|(n, _)| n != name);
        let columns: Vec<Rc<Column>> = model
            .core
            .columns
            .borrow_mut()
            .drain(..)
            .map(|(_, c)| c)
            .collect();
        for column in columns {
            column.clear();
        }
        model.core.dropped.set(true);

        log::debug!("dropped model '{name}'");
        self.core.events.emit(&DatabaseEvent::ModelDropped {
            name: name.to_string(),
            model: model.clone(),
        });
        model.core.events.clear();
        model.core.column_events.clear();
        Ok(())
    }

    /// Rename a model. Resolved relation handles keep pointing at it.
    pub fn rename_model(&self, old: &str, new: &str) -> Result<()> {
        let model = self.select_model(old)?;
        if self.has_model(new) {
            return Err(ReactDbError::ModelExists {
                name: new.to_string(),
            });
        }
        if let Some(entry) = self.core.models.borrow_mut().iter_mut().find(|(n, _)| n == old) {
            entry.0 = new.to_string();
        }
        model.core.set_name(new);

        log::debug!("renamed model '{old}' to '{new}'");
        self.core.events.emit(&DatabaseEvent::ModelRenamed {
            old: old.to_string(),
            new: new.to_string(),
            model,
        });
        Ok(())
    }

    pub fn model_name(&self, model: &Model) -> Option<String> {
        self.core
            .models
            .borrow()
            .iter()
            .find(|(_, m)| m.ptr_eq(model))
            .map(|(n, _)| n.clone())
    }

    /// Models in registration order.
    pub fn models(&self) -> Vec<Model> {
        self.core.models.borrow().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.core.models.borrow().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn each_model(&self, mut f: impl FnMut(&str, &Model)) {
        let models = self.core.models.borrow().clone();
        for (name, model) in &models {
            f(name, model);
        }
    }

    /// Names still awaited by relation columns, with how many columns wait on each.
    pub fn pending_references(&self) -> Vec<(String, usize)> {
        let mut pending: Vec<(String, usize)> = self
            .core
            .waitlist
            .borrow()
            .iter()
            .map(|(name, waiters)| (name.clone(), waiters.len()))
            .collect();
        pending.sort();
        pending
    }

    /// Start a query over this database.
    pub fn query(&self) -> ViewBuilder {
        ViewBuilder::new(self.clone())
    }

    pub fn subscribe(&self, handler: impl Fn(&DatabaseEvent) + 'static) -> Subscription {
        self.core.events.subscribe(handler)
    }

    pub fn on_model_created(&self, handler: impl Fn(&str, &Model) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let DatabaseEvent::ModelCreated { name, model } = event {
                handler(name, model);
            }
        })
    }

    pub fn on_model_dropped(&self, handler: impl Fn(&str, &Model) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let DatabaseEvent::ModelDropped { name, model } = event {
                handler(name, model);
            }
        })
    }

    pub fn on_model_renamed(&self, handler: impl Fn(&str, &str, &Model) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let DatabaseEvent::ModelRenamed { old, new, model } = event {
                handler(old, new, model);
            }
        })
    }

    pub fn ptr_eq(&self, other: &Database) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("models", &self.model_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_schema_str, ColumnType};
    use crate::value::{Fields, Input};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn test_create_and_select() {
        let db = Database::new();
        let phone = db
            .create_model("phone", Structure::from_pairs([("model", "string")]).unwrap())
            .unwrap();
        assert!(db.has_model("phone"));
        assert!(db.select_model("phone").unwrap().ptr_eq(&phone));
        assert_eq!(db.model_name(&phone).as_deref(), Some("phone"));

        let err = db.create_model("phone", Structure::new()).unwrap_err();
        assert_eq!(err.code(), "MODEL_EXISTS");
        assert_eq!(db.select_model("tablet").unwrap_err().code(), "MODEL_NOT_EXISTS");
    }

    #[test]
    fn test_forward_references_resolve_in_any_order() {
        for order in [["person", "phone"], ["phone", "person"]] {
            let db = Database::new();
            for name in order {
                let structure = match name {
                    "person" => Structure::from_pairs([
                        ("name", "string"),
                        ("phone", "ref:phone"),
                        ("friends", "refs:person"),
                    ]),
                    _ => Structure::from_pairs([("model", "string"), ("owner", "ref:person")]),
                }
                .unwrap();
                db.create_model(name, structure).unwrap();
            }
            assert!(db.pending_references().is_empty());

            let person = db.select_model("person").unwrap();
            let phone = db.select_model("phone").unwrap();
            let aldi = person.insert(Fields::new().with("name", "aldi")).unwrap();
            let p = phone
                .insert(Fields::new().with("model", "ifone").with("owner", &aldi))
                .unwrap();
            aldi.set("phone", &p).unwrap();
            assert_eq!(p.get_ref("owner").unwrap(), Some(aldi.clone()));
            assert_eq!(aldi.get_ref("phone").unwrap(), Some(p));
        }
    }

    #[test]
    fn test_pending_references() {
        let db = Database::new();
        db.create_model("person", Structure::from_pairs([("pet", "ref:pet")]).unwrap())
            .unwrap();
        db.create_model("house", Structure::from_pairs([("pets", "refs:pet")]).unwrap())
            .unwrap();
        assert_eq!(db.pending_references(), vec![("pet".to_string(), 2)]);

        db.create_model("pet", Structure::new()).unwrap();
        assert!(db.pending_references().is_empty());
    }

    #[test]
    fn test_rename_keeps_resolved_handles() {
        let db = Database::new();
        let person = db
            .create_model("person", Structure::from_pairs([("phone", "ref:phone")]).unwrap())
            .unwrap();
        let phone = db
            .create_model("phone", Structure::from_pairs([("model", "string")]).unwrap())
            .unwrap();

        db.rename_model("phone", "handphone").unwrap();
        assert!(!db.has_model("phone"));
        assert_eq!(phone.name(), "handphone");
        assert_eq!(person.column_type("phone"), Some(ColumnType::reference("handphone")));

        let p = phone.insert(Fields::new().with("model", "ifone")).unwrap();
        let row = person.insert(Fields::new().with("phone", &p)).unwrap();
        assert_eq!(row.get_ref("phone").unwrap(), Some(p));

        assert_eq!(
            db.rename_model("phone", "x").unwrap_err().code(),
            "MODEL_NOT_EXISTS"
        );
        assert_eq!(
            db.rename_model("person", "handphone").unwrap_err().code(),
            "MODEL_EXISTS"
        );
    }

    #[test]
    fn test_drop_model_cascades() {
        let db = Database::new();
        let person = db
            .create_model("person", Structure::from_pairs([("phone", "ref:phone")]).unwrap())
            .unwrap();
        let phone = db
            .create_model("phone", Structure::from_pairs([("model", "string")]).unwrap())
            .unwrap();
        let p = phone.insert(Fields::new().with("model", "ifone")).unwrap();
        let millei = person.insert(Fields::new().with("phone", &p)).unwrap();

        let dropped = Rc::new(Cell::new(false));
        let d = dropped.clone();
        let _sub = db.on_model_dropped(move |name, _| {
            assert_eq!(name, "phone");
            d.set(true);
        });

        db.drop_model("phone").unwrap();
        assert!(dropped.get());
        assert!(!db.has_model("phone"));
        assert!(phone.is_dropped());
        assert_eq!(millei.get_ref("phone").unwrap(), None);

        let err = person.insert(Fields::new()).unwrap_err();
        assert_eq!(err.code(), "MODEL_REF_INVALIDATED");
        assert_eq!(millei.set("phone", Input::Null).unwrap_err().code(), "MODEL_REF_INVALIDATED");
        assert_eq!(db.drop_model("phone").unwrap_err().code(), "MODEL_NOT_EXISTS");
    }

    #[test]
    fn test_from_schema() {
        let schema = parse_schema_str(
            r#"
id:
  auto: uuid
models:
  person:
    name: string
    phone: ref:phone
  phone:
    model: string
"#,
        )
        .unwrap();
        let db = Database::from_schema(&schema).unwrap();
        assert_eq!(db.model_names(), vec!["person", "phone"]);

        let row = db
            .select_model("person")
            .unwrap()
            .insert(Fields::new().with("name", "aldi"))
            .unwrap();
        assert_eq!(row.id().len(), 36);
    }

    #[test]
    fn test_model_events() {
        let db = Database::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let _sub = db.subscribe(move |event| {
            let entry = match event {
                DatabaseEvent::ModelCreated { name, .. } => format!("+{name}"),
                DatabaseEvent::ModelDropped { name, .. } => format!("-{name}"),
                DatabaseEvent::ModelRenamed { old, new, .. } => format!("{old}>{new}"),
            };
            l.borrow_mut().push(entry);
        });

        db.create_model("a", Structure::new()).unwrap();
        db.rename_model("a", "b").unwrap();
        db.drop_model("b").unwrap();
        assert_eq!(*log.borrow(), vec!["+a", "a>b", "-b"]);
    }
}
