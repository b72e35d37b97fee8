// File persistence: mirror a database into a directory tree and restore it
//
// Layout under `<dir>/_rdb_<name>/`:
//
//   structures/<model>.json          column name -> type descriptor, in order
//   values/<model>/<column>/<row id> text value of one cell

use crate::database::{Database, DatabaseEvent};
use crate::error::{ReactDbError, Result};
use crate::event::Subscription;
use crate::model::{ColumnEvent, Model, ModelEvent, Row};
use crate::schema::{ColumnType, DatabaseConfig, Structure};
use crate::value::{Fields, Scalar};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

type ModelSubscriptions = Rc<RefCell<HashMap<u64, Vec<Subscription>>>>;

/// Keeps a directory tree in sync with a [`Database`]. Persistence stops when
/// the driver is dropped; the database itself stays usable.
pub struct FileDriver {
    db: Database,
    root: PathBuf,
    _subs: Vec<Subscription>,
    model_subs: ModelSubscriptions,
}

impl FileDriver {
    /// Open `<dir>/_rdb_<name>`, restoring its contents if it exists.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<FileDriver> {
        Self::open_with_config(dir, name, DatabaseConfig::default())
    }

    pub fn open_with_config(
        dir: impl AsRef<Path>,
        name: &str,
        config: DatabaseConfig,
    ) -> Result<FileDriver> {
        let root = dir.as_ref().join(format!("_rdb_{name}"));
        let db = Database::with_config(config);

        if root.exists() {
            log::debug!("restoring database from {}", root.display());
            rehydrate(&db, &root)?;
        } else {
            std::fs::create_dir_all(root.join("structures"))?;
            std::fs::create_dir_all(root.join("values"))?;
        }

        let model_subs: ModelSubscriptions = Rc::new(RefCell::new(HashMap::new()));
        for model in db.models() {
            let subs = watch_model(&root, &model);
            model_subs.borrow_mut().insert(model.core.id, subs);
        }
        let subs = vec![watch_database(&root, &db, model_subs.clone())];

        Ok(FileDriver {
            db,
            root,
            _subs: subs,
            model_subs,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the model, creating it with `structure` only if it is missing.
    pub fn ensure_model(&self, name: &str, structure: Structure) -> Result<Model> {
        if self.db.has_model(name) {
            return self.db.select_model(name);
        }
        self.db.create_model(name, structure)
    }

    /// Number of models currently mirrored.
    pub fn watched_models(&self) -> usize {
        self.model_subs.borrow().len()
    }
}

impl std::fmt::Debug for FileDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDriver")
            .field("root", &self.root)
            .field("models", &self.db.model_names())
            .finish()
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn structure_path(root: &Path, model: &str) -> PathBuf {
    root.join("structures").join(format!("{model}.json"))
}

fn model_dir(root: &Path, model: &str) -> PathBuf {
    root.join("values").join(model)
}

fn column_dir(root: &Path, model: &str, column: &str) -> PathBuf {
    model_dir(root, model).join(column)
}

/// Row ids become file names, so they must be a single path component.
/// Hidden names are reserved for in-flight temp files.
fn value_path(root: &Path, model: &str, column: &str, id: &str) -> Result<PathBuf> {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        return Err(ReactDbError::WhatIsHappening(format!(
            "row id '{id}' cannot be stored as a file name"
        )));
    }
    Ok(column_dir(root, model, column).join(id))
}

// ── Writing ─────────────────────────────────────────────────────────

/// Replace `path` atomically through a temp file in the same directory.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        ReactDbError::WhatIsHappening(format!("{} has no parent directory", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn write_structure(root: &Path, model: &Model) -> Result<()> {
    let json = serde_json::to_string_pretty(&model.structure())?;
    write_atomic(&structure_path(root, &model.name()), &json)
}

fn write_cell(root: &Path, model: &str, column: &str, row: &Row) -> Result<()> {
    let text = row.get(column)?.to_text();
    write_atomic(&value_path(root, model, column, row.id())?, &text)
}

fn write_model(root: &Path, model: &Model) -> Result<()> {
    write_structure(root, model)?;
    let name = model.name();
    for (column, _) in model.columns() {
        std::fs::create_dir_all(column_dir(root, &name, &column))?;
    }
    for row in model.rows() {
        for (column, _) in model.columns() {
            write_cell(root, &name, &column, &row)?;
        }
    }
    Ok(())
}

fn persist_row_event(root: &Path, model: &Model, event: &ModelEvent) -> Result<()> {
    let name = model.name();
    match event {
        ModelEvent::Inserted { row } => {
            for (column, _) in model.columns() {
                write_cell(root, &name, &column, row)?;
            }
        }
        ModelEvent::Updated { row, column, new, .. } => {
            write_atomic(&value_path(root, &name, column, row.id())?, &new.to_text())?;
        }
        ModelEvent::RefsAdded { row, column, .. } | ModelEvent::RefsRemoved { row, column, .. } => {
            if row.is_alive() {
                write_cell(root, &name, column, row)?;
            }
        }
        ModelEvent::Deleted { row } => {
            for (column, _) in model.columns() {
                remove_if_exists(&value_path(root, &name, &column, row.id())?)?;
            }
        }
    }
    Ok(())
}

fn persist_column_event(root: &Path, model: &Model, event: &ColumnEvent) -> Result<()> {
    let name = model.name();
    write_structure(root, model)?;
    match event {
        ColumnEvent::Added { name: column, .. } => {
            std::fs::create_dir_all(column_dir(root, &name, column))?;
            for row in model.rows() {
                write_cell(root, &name, column, &row)?;
            }
        }
        ColumnEvent::Dropped { name: column, .. } => {
            remove_if_exists(&column_dir(root, &name, column))?;
        }
        ColumnEvent::Renamed { old, new } => {
            let from = column_dir(root, &name, old);
            if from.exists() {
                std::fs::rename(from, column_dir(root, &name, new))?;
            }
        }
        ColumnEvent::Modified { name: column, .. } => {
            remove_if_exists(&column_dir(root, &name, column))?;
            std::fs::create_dir_all(column_dir(root, &name, column))?;
        }
    }
    Ok(())
}

fn persist_database_event(root: &Path, db: &Database, event: &DatabaseEvent) -> Result<()> {
    match event {
        DatabaseEvent::ModelCreated { model, .. } => write_model(root, model)?,
        DatabaseEvent::ModelDropped { name, .. } => {
            remove_if_exists(&structure_path(root, name))?;
            remove_if_exists(&model_dir(root, name))?;
            for model in db.models() {
                write_structure(root, &model)?;
            }
        }
        DatabaseEvent::ModelRenamed { old, new, .. } => {
            let from = model_dir(root, old);
            if from.exists() {
                std::fs::rename(from, model_dir(root, new))?;
            }
            remove_if_exists(&structure_path(root, old))?;
            // relation descriptors elsewhere name the model by its new name
            for model in db.models() {
                write_structure(root, &model)?;
            }
        }
    }
    Ok(())
}

// ── Watching ────────────────────────────────────────────────────────

fn watch_model(root: &Path, model: &Model) -> Vec<Subscription> {
    let rows = {
        let root = root.to_path_buf();
        let weak = model.downgrade();
        model.subscribe(move |event| {
            let model = match weak.upgrade() {
                Some(core) => Model::from_core(core),
                None => return,
            };
            if let Err(e) = persist_row_event(&root, &model, event) {
                log::error!(
                    "failed to persist row {} of model '{}': {}",
                    event.row().id(),
                    model.name(),
                    e
                );
            }
        })
    };
    let columns = {
        let root = root.to_path_buf();
        let weak = model.downgrade();
        model.on_column_change(move |event| {
            let model = match weak.upgrade() {
                Some(core) => Model::from_core(core),
                None => return,
            };
            if let Err(e) = persist_column_event(&root, &model, event) {
                log::error!("failed to persist columns of model '{}': {}", model.name(), e);
            }
        })
    };
    vec![rows, columns]
}

fn watch_database(root: &Path, db: &Database, model_subs: ModelSubscriptions) -> Subscription {
    let root = root.to_path_buf();
    let weak = db.downgrade();
    db.subscribe(move |event| {
        let db = match weak.upgrade() {
            Some(core) => Database::from_core(core),
            None => return,
        };
        if let Err(e) = persist_database_event(&root, &db, event) {
            log::error!("failed to persist database change: {}", e);
        }
        match event {
            DatabaseEvent::ModelCreated { model, .. } => {
                let subs = watch_model(&root, model);
                model_subs.borrow_mut().insert(model.core.id, subs);
            }
            DatabaseEvent::ModelDropped { model, .. } => {
                model_subs.borrow_mut().remove(&model.core.id);
            }
            DatabaseEvent::ModelRenamed { .. } => {}
        }
    })
}

// ── Restoring ───────────────────────────────────────────────────────

/// Files directly inside `dir`, sorted by name, skipping hidden ones.
fn list_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| ReactDbError::WhatIsHappening(format!("Glob error: {e}")))?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| !n.starts_with('.'))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| ReactDbError::WhatIsHappening(format!("unreadable file name {}", path.display())))
}

/// `(row id, text)` for every cell stored under one column.
fn read_column(root: &Path, model: &str, column: &str) -> Result<Vec<(String, String)>> {
    list_files(&column_dir(root, model, column), "*")?
        .into_iter()
        .map(|path| Ok((file_name(&path)?, std::fs::read_to_string(&path)?)))
        .collect()
}

/// Create every model, insert every row with its scalar values, then link
/// relations once all rows exist.
fn rehydrate(db: &Database, root: &Path) -> Result<()> {
    let mut models = Vec::new();
    for path in list_files(&root.join("structures"), "*.json")? {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(String::from)
            .ok_or_else(|| ReactDbError::WhatIsHappening(format!("unreadable file name {}", path.display())))?;
        let structure: Structure = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        models.push(db.create_model(&name, structure)?);
    }

    for model in &models {
        let name = model.name();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut rows: Vec<Fields> = Vec::new();
        for (column, column_type) in model.columns() {
            for (id, text) in read_column(root, &name, &column)? {
                let slot = *index.entry(id.clone()).or_insert_with(|| {
                    rows.push(Fields::new().with("id", id.as_str()));
                    rows.len() - 1
                });
                if let Some(kind) = column_type.scalar_kind() {
                    rows[slot].set(column.clone(), Scalar::from_text(kind, &text)?);
                }
            }
        }
        let count = rows.len();
        for fields in rows {
            model.restore(fields)?;
        }
        log::debug!("restored {} row(s) into model '{}'", count, name);
    }

    for model in &models {
        let name = model.name();
        for (column, column_type) in model.columns() {
            let target = match column_type.target() {
                Some(target) => target,
                None => continue,
            };
            let cells = read_column(root, &name, &column)?;
            let target = match db.select_model(target) {
                Ok(model) => model,
                Err(_) => {
                    if cells.iter().any(|(_, text)| !text.trim().is_empty()) {
                        log::warn!(
                            "{}.{} points at missing model '{}'; its values were not restored",
                            name,
                            column,
                            target
                        );
                    }
                    continue;
                }
            };
            for (id, text) in cells {
                let row = match model.get(&id) {
                    Some(row) => row,
                    None => continue,
                };
                let members: Vec<Row> = text
                    .lines()
                    .filter(|line| !line.is_empty())
                    .filter_map(|target_id| {
                        let found = target.get(target_id);
                        if found.is_none() {
                            log::warn!(
                                "{}.{} of row {} points at unknown row '{}' in '{}'",
                                name,
                                column,
                                id,
                                target_id,
                                target.name()
                            );
                        }
                        found
                    })
                    .collect();
                match column_type {
                    ColumnType::Ref(_) => {
                        if let Some(member) = members.first() {
                            row.set(&column, member)?;
                        }
                    }
                    ColumnType::Refs(_) if !members.is_empty() => {
                        row.add_refs(&column, &members)?;
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Input;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn people() -> Structure {
        Structure::from_pairs([
            ("name", "string"),
            ("age", "number"),
            ("phone", "ref:phone"),
            ("friends", "refs:person"),
        ])
        .unwrap()
    }

    fn phones() -> Structure {
        Structure::from_pairs([("model", "string"), ("active", "boolean")]).unwrap()
    }

    fn read(path: PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_open_creates_tree() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::open(tmp.path(), "test").unwrap();
        assert_eq!(driver.root(), tmp.path().join("_rdb_test"));
        assert!(driver.root().join("structures").is_dir());
        assert!(driver.root().join("values").is_dir());
        assert!(driver.database().models().is_empty());
    }

    #[test]
    fn test_writes_structure_and_values() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::open(tmp.path(), "test").unwrap();
        let db = driver.database();
        let person = db.create_model("person", people()).unwrap();
        let phone = db.create_model("phone", phones()).unwrap();

        let p = phone
            .insert(Fields::new().with("id", "p1").with("model", "ifone").with("active", true))
            .unwrap();
        person
            .insert(Fields::new().with("id", "a").with("name", "aldi").with("age", 25).with("phone", &p))
            .unwrap();

        let root = driver.root();
        let structure: serde_json::Value =
            serde_json::from_str(&read(root.join("structures/person.json"))).unwrap();
        assert_eq!(
            structure,
            json!({ "name": "string", "age": "number", "phone": "ref:phone", "friends": "refs:person" })
        );
        assert_eq!(read(root.join("values/person/name/a")), "aldi");
        assert_eq!(read(root.join("values/person/age/a")), "25");
        assert_eq!(read(root.join("values/person/phone/a")), "p1");
        assert_eq!(read(root.join("values/person/friends/a")), "");
        assert_eq!(read(root.join("values/phone/active/p1")), "true");

        phone.delete_all();
        assert_eq!(read(root.join("values/person/phone/a")), "");
        assert!(!root.join("values/phone/model/p1").exists());
    }

    #[test]
    fn test_restart_round_trip() {
        let tmp = TempDir::new().unwrap();
        {
            let driver = FileDriver::open(tmp.path(), "rt").unwrap();
            let db = driver.database();
            let person = db.create_model("person", people()).unwrap();
            db.create_model("phone", phones()).unwrap();

            let aldi = person
                .insert_json(json!({
                    "id": "aldi",
                    "name": "aldi",
                    "age": 25,
                    "phone": { "id": "p1", "model": "ifone", "active": true }
                }))
                .unwrap();
            let nina = person
                .insert(Fields::new().with("id", "nina").with("name", "nina").with("age", 13))
                .unwrap();
            let gone = person
                .insert(Fields::new().with("id", "gone").with("name", "x").with("age", 1))
                .unwrap();
            aldi.add_refs("friends", &[nina.clone(), gone.clone()]).unwrap();
            nina.set("age", 14).unwrap();
            person.delete_where(|r| *r == gone);
        }

        let driver = FileDriver::open(tmp.path(), "rt").unwrap();
        let db = driver.database();
        assert_eq!(db.model_names(), vec!["person", "phone"]);

        let person = db.select_model("person").unwrap();
        assert_eq!(person.len(), 2);
        let aldi = person.get("aldi").unwrap();
        let nina = person.get("nina").unwrap();
        assert_eq!(nina.get_number("age").unwrap(), 14.0);
        assert_eq!(aldi.get_refs("friends").unwrap(), vec![nina.clone()]);

        let phone = aldi.get_ref("phone").unwrap().unwrap();
        assert_eq!(phone.get_string("model").unwrap(), "ifone");
        assert!(phone.get_bool("active").unwrap());

        // relations stay live after restoring
        db.select_model("phone").unwrap().delete_all();
        assert_eq!(aldi.get_ref("phone").unwrap(), None);
    }

    #[test]
    fn test_column_lifecycle_persisted() {
        let tmp = TempDir::new().unwrap();
        {
            let driver = FileDriver::open(tmp.path(), "cols").unwrap();
            let phone = driver.database().create_model("phone", phones()).unwrap();
            phone.insert(Fields::new().with("id", "p1").with("model", "ifone").with("active", false)).unwrap();

            phone.add_column("price", ColumnType::number()).unwrap();
            assert_eq!(read(driver.root().join("values/phone/price/p1")), "0");

            phone.rename_column("model", "brand").unwrap();
            phone.drop_column("active").unwrap();
            assert!(!driver.root().join("values/phone/active").exists());
            assert!(driver.root().join("values/phone/brand/p1").exists());
        }

        let driver = FileDriver::open(tmp.path(), "cols").unwrap();
        let phone = driver.database().select_model("phone").unwrap();
        assert_eq!(
            phone.columns(),
            vec![
                ("brand".to_string(), ColumnType::string()),
                ("price".to_string(), ColumnType::number()),
            ]
        );
        assert_eq!(phone.get("p1").unwrap().get_string("brand").unwrap(), "ifone");
    }

    #[test]
    fn test_model_rename_and_drop() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::open(tmp.path(), "models").unwrap();
        let db = driver.database();
        db.create_model("person", people()).unwrap();
        let phone = db.create_model("phone", phones()).unwrap();
        phone.insert(Fields::new().with("id", "p1").with("model", "ifone").with("active", true)).unwrap();
        assert_eq!(driver.watched_models(), 2);

        db.rename_model("phone", "device").unwrap();
        let root = driver.root();
        assert!(!root.join("structures/phone.json").exists());
        assert!(root.join("values/device/model/p1").exists());
        let person: serde_json::Value =
            serde_json::from_str(&read(root.join("structures/person.json"))).unwrap();
        assert_eq!(person["phone"], json!("ref:device"));

        db.drop_model("person").unwrap();
        assert!(!root.join("structures/person.json").exists());
        assert!(!root.join("values/person").exists());
        assert_eq!(driver.watched_models(), 1);
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("_rdb_broken");
        std::fs::create_dir_all(root.join("structures")).unwrap();
        std::fs::write(
            root.join("structures/tag.json"),
            r#"{ "label": "string", "parent": "ref:tag", "related": "refs:tag" }"#,
        )
        .unwrap();
        for (column, id, text) in [
            ("label", "t1", "rust"),
            ("parent", "t1", "missing"),
            ("related", "t1", "t2\nnope"),
            ("label", "t2", "db"),
        ] {
            let dir = root.join("values/tag").join(column);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(id), text).unwrap();
        }

        let driver = FileDriver::open(tmp.path(), "broken").unwrap();
        let tag = driver.database().select_model("tag").unwrap();
        let t1 = tag.get("t1").unwrap();
        let t2 = tag.get("t2").unwrap();
        assert_eq!(t1.get_ref("parent").unwrap(), None);
        assert_eq!(t1.get_refs("related").unwrap(), vec![t2.clone()]);
        assert_eq!(t2.get_refs("related").unwrap(), Vec::<Row>::new());
    }

    #[test]
    fn test_ensure_model() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::open(tmp.path(), "ensure").unwrap();
        let first = driver.ensure_model("phone", phones()).unwrap();
        let second = driver
            .ensure_model("phone", Structure::from_pairs([("other", "string")]).unwrap())
            .unwrap();
        assert!(first.ptr_eq(&second));
        assert!(second.has_column("model"));
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::open(tmp.path(), "ids").unwrap();
        let phone = driver.database().create_model("phone", phones()).unwrap();
        // the row still goes in; only the file write is refused
        phone
            .insert(Fields::new().with("id", "../escape").with("model", "x").with("active", Input::from(true)))
            .unwrap();
        assert!(!tmp.path().join("_rdb_ids/values/phone/escape").exists());
        assert!(value_path(driver.root(), "phone", "model", "a/b").is_err());
    }

    #[test]
    fn test_hidden_ids_are_refused() {
        let tmp = TempDir::new().unwrap();
        let driver = FileDriver::open(tmp.path(), "hidden").unwrap();
        let phone = driver.database().create_model("phone", phones()).unwrap();
        phone
            .insert(Fields::new().with("id", ".hidden").with("model", "x").with("active", true))
            .unwrap();
        assert!(!driver.root().join("values/phone/model/.hidden").exists());
        assert!(value_path(driver.root(), "phone", "model", ".hidden").is_err());
        assert!(value_path(driver.root(), "phone", "model", "v1.2").is_ok());
    }

    #[test]
    fn test_restart_with_pending_reference() {
        let tmp = TempDir::new().unwrap();
        {
            let driver = FileDriver::open(tmp.path(), "pending").unwrap();
            driver
                .database()
                .create_model("person", Structure::from_pairs([("name", "string"), ("pet", "ref:pet")]).unwrap())
                .unwrap();
        }
        // a row written while the relation still waits for its model
        let values = tmp.path().join("_rdb_pending/values/person");
        std::fs::write(values.join("name/a"), "aldi").unwrap();
        std::fs::write(values.join("pet/a"), "rex").unwrap();

        let driver = FileDriver::open(tmp.path(), "pending").unwrap();
        let db = driver.database();
        let person = db.select_model("person").unwrap();
        assert_eq!(person.get("a").unwrap().get_string("name").unwrap(), "aldi");
        assert_eq!(db.pending_references(), vec![("pet".to_string(), 1)]);

        let err = person.insert(Fields::new().with("name", "nina")).unwrap_err();
        assert_eq!(err.code(), "MODEL_REF_UNRESOLVED");

        db.create_model("pet", Structure::from_pairs([("kind", "string")]).unwrap())
            .unwrap();
        person.insert(Fields::new().with("name", "nina")).unwrap();
        assert_eq!(person.len(), 2);
    }

    #[test]
    fn test_restart_after_target_dropped() {
        let tmp = TempDir::new().unwrap();
        {
            let driver = FileDriver::open(tmp.path(), "dropped").unwrap();
            let db = driver.database();
            let person = db.create_model("person", people()).unwrap();
            let phone = db.create_model("phone", phones()).unwrap();
            let p = phone
                .insert(Fields::new().with("id", "p1").with("model", "ifone").with("active", true))
                .unwrap();
            person
                .insert(Fields::new().with("id", "a").with("name", "aldi").with("phone", &p))
                .unwrap();
            db.drop_model("phone").unwrap();

            let structure: serde_json::Value =
                serde_json::from_str(&read(driver.root().join("structures/person.json"))).unwrap();
            assert_eq!(structure["phone"], json!("ref:phone"));
            assert_eq!(read(driver.root().join("values/person/phone/a")), "");
        }

        let driver = FileDriver::open(tmp.path(), "dropped").unwrap();
        let db = driver.database();
        assert_eq!(db.model_names(), vec!["person"]);
        let aldi = db.select_model("person").unwrap().get("a").unwrap();
        assert_eq!(aldi.get_string("name").unwrap(), "aldi");
        assert_eq!(aldi.get_ref("phone").unwrap(), None);
        assert_eq!(db.pending_references(), vec![("phone".to_string(), 1)]);
    }
}
