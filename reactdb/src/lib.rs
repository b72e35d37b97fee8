pub mod error;
pub mod event;
pub mod state;
pub mod value;
pub mod schema;
mod validation;
pub mod model;
pub mod database;
pub mod view;
pub mod driver;

pub use error::{ReactDbError, Result};
pub use event::{Listeners, Subscription};
pub use state::{ListChange, State, StateList};
pub use value::{Fields, Input, Scalar, ScalarKind, Value};
pub use schema::{
    parse_schema, parse_schema_str, AutoIdStrategy, ColumnType, DatabaseConfig, IdConfig,
    SchemaDefinition, Structure,
};
pub use model::{ColumnEvent, Model, ModelEvent, Row};
pub use database::{Database, DatabaseEvent};
pub use view::{Order, Selector, View, ViewBuilder, ViewField, ViewRow};
pub use driver::FileDriver;
