use super::{Filter, Projector, Selector, View};
use crate::database::Database;
use crate::error::{ReactDbError, Result};
use crate::model::Row;
use std::fmt;
use std::rc::Rc;

/// Sort direction for [`ViewBuilder::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Immutable query description. Every step returns a new builder, so a
/// partially built query can be shared and extended in different ways.
#[derive(Clone)]
pub struct ViewBuilder {
    db: Database,
    model: Option<String>,
    selectors: Vec<Selector>,
    filter: Option<Filter>,
    order: Option<(String, Order)>,
}

impl ViewBuilder {
    pub(crate) fn new(db: Database) -> Self {
        ViewBuilder {
            db,
            model: None,
            selectors: Vec::new(),
            filter: None,
            order: None,
        }
    }

    pub fn from(&self, model: &str) -> Self {
        let mut next = self.clone();
        next.model = Some(model.to_string());
        next
    }

    /// Replace the projection. An empty projection selects `*`.
    pub fn select<S: Into<Selector>>(&self, selectors: impl IntoIterator<Item = S>) -> Self {
        let mut next = self.clone();
        next.selectors = selectors.into_iter().map(Into::into).collect();
        next
    }

    pub fn filter(&self, predicate: impl Fn(&Row) -> bool + 'static) -> Self {
        let mut next = self.clone();
        next.filter = Some(Rc::new(predicate));
        next
    }

    pub fn order_by(&self, column: &str, order: Order) -> Self {
        let mut next = self.clone();
        next.order = Some((column.to_string(), order));
        next
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Validate the query against the current schema and start a live view.
    pub fn build(&self) -> Result<View> {
        let name = self.model.as_deref().ok_or(ReactDbError::ModelNotSpecified)?;
        let model = self.db.select_model(name)?;

        if let Some((column, _)) = &self.order {
            if !model.has_column(column) {
                return Err(ReactDbError::NotValidColumn {
                    column: column.clone(),
                });
            }
        }

        let projector = Projector::compile(&self.db, &model, &self.selectors)?;
        log::debug!(
            "view on '{}' built with {} selector(s)",
            name,
            self.selectors.len()
        );
        Ok(View::new(
            model,
            projector,
            self.filter.clone(),
            self.order.clone(),
        ))
    }
}

impl fmt::Debug for ViewBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBuilder")
            .field("model", &self.model)
            .field("selectors", &self.selectors)
            .field("filtered", &self.filter.is_some())
            .field("order", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Structure;
    use crate::value::Fields;
    use pretty_assertions::assert_eq;

    fn setup_db() -> Database {
        let db = Database::new();
        let person = db
            .create_model(
                "person",
                Structure::from_pairs([("name", "string"), ("age", "number")]).unwrap(),
            )
            .unwrap();
        person
            .insert_all([
                Fields::new().with("name", "aldi").with("age", 25),
                Fields::new().with("name", "nina").with("age", 13),
            ])
            .unwrap();
        db
    }

    #[test]
    fn test_builder_steps_are_immutable() {
        let db = setup_db();
        let base = db.query().from("person");
        let narrowed = base.select(["name"]);
        let filtered = base.filter(|row| row.get_number("age").unwrap_or(0.0) > 20.0);

        assert!(base.selectors().is_empty());
        assert_eq!(narrowed.selectors(), &[Selector::Column("name".into())]);
        assert_eq!(base.build().unwrap().len(), 2);
        assert_eq!(filtered.build().unwrap().len(), 1);
        assert_eq!(narrowed.model_name(), Some("person"));
    }

    #[test]
    fn test_build_errors() {
        let db = setup_db();

        let err = db.query().build().unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_SPECIFIED");

        let err = db.query().from("pet").build().unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_EXISTS");

        let err = db
            .query()
            .from("person")
            .order_by("height", Order::Desc)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "NOT_VALID_COLUMN");
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(Selector::from("id"), Selector::Id);
        assert_eq!(Selector::from("*"), Selector::All);
        assert_eq!(Selector::from("age"), Selector::Column("age".into()));
        assert_eq!(
            Selector::from("person#phone"),
            Selector::Reverse {
                model: "person".into(),
                column: "phone".into(),
                select: vec![],
            }
        );
        assert_eq!(
            Selector::nested("*", ["id"]),
            Selector::AllRelations {
                select: vec![Selector::Id]
            }
        );
    }

    #[test]
    fn test_unresolved_relation_fails_build() {
        let db = Database::new();
        db.create_model("person", Structure::from_pairs([("pet", "ref:pet")]).unwrap())
            .unwrap();

        let err = db
            .query()
            .from("person")
            .select(["pet"])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "MODEL_REF_UNRESOLVED");

        // scalar projections still work while the target is pending
        assert_eq!(db.query().from("person").build().unwrap().len(), 0);
    }
}
