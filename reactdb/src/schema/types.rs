use crate::error::{ReactDbError, Result};
use crate::value::ScalarKind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Top-level schema document parsed from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub id: IdConfig,
    /// Models in declaration order
    #[serde(default, with = "ordered")]
    pub models: Vec<(String, Structure)>,
}

impl SchemaDefinition {
    pub fn config(&self) -> DatabaseConfig {
        DatabaseConfig {
            id: self.id.clone(),
        }
    }

    pub fn model(&self, name: &str) -> Option<&Structure> {
        self.models.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}

/// Settings that apply to a whole database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub id: IdConfig,
}

pub const DEFAULT_NANOID_LENGTH: usize = 8;

/// How row ids are generated when an insert does not supply one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default)]
    pub auto: AutoIdStrategy,
    /// Nanoid length; ignored by the other strategies
    #[serde(default)]
    pub length: Option<usize>,
}

impl IdConfig {
    pub fn generate(&self) -> String {
        match self.auto {
            AutoIdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            AutoIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            AutoIdStrategy::Nanoid => {
                let size = self.length.unwrap_or(DEFAULT_NANOID_LENGTH);
                nanoid::nanoid!(size)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    Ulid,
    Uuid,
    #[default]
    Nanoid,
}

/// Column type, written as `string`, `number`, `boolean`, `ref:<model>` or `refs:<model>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Scalar(ScalarKind),
    Ref(String),
    Refs(String),
}

impl ColumnType {
    pub fn string() -> Self {
        ColumnType::Scalar(ScalarKind::String)
    }

    pub fn number() -> Self {
        ColumnType::Scalar(ScalarKind::Number)
    }

    pub fn boolean() -> Self {
        ColumnType::Scalar(ScalarKind::Boolean)
    }

    pub fn reference(target: impl Into<String>) -> Self {
        ColumnType::Ref(target.into())
    }

    pub fn references(target: impl Into<String>) -> Self {
        ColumnType::Refs(target.into())
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self, ColumnType::Scalar(_))
    }

    /// Name of the target model for relation columns
    pub fn target(&self) -> Option<&str> {
        match self {
            ColumnType::Scalar(_) => None,
            ColumnType::Ref(t) | ColumnType::Refs(t) => Some(t),
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            ColumnType::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(kind) => f.write_str(kind.as_str()),
            ColumnType::Ref(target) => write!(f, "ref:{target}"),
            ColumnType::Refs(target) => write!(f, "refs:{target}"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = ReactDbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ReactDbError::InvalidType {
            descriptor: s.to_string(),
        };
        match s.trim() {
            "string" => Ok(ColumnType::string()),
            "number" => Ok(ColumnType::number()),
            "boolean" => Ok(ColumnType::boolean()),
            other => {
                let (kind, target) = other.split_once(':').ok_or_else(invalid)?;
                let target = target.trim();
                if target.is_empty() {
                    return Err(invalid());
                }
                match kind.trim() {
                    "ref" => Ok(ColumnType::reference(target)),
                    "refs" => Ok(ColumnType::references(target)),
                    _ => Err(invalid()),
                }
            }
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let descriptor = String::deserialize(deserializer)?;
        descriptor.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered column declarations of one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structure {
    #[serde(with = "ordered")]
    columns: Vec<(String, ColumnType)>,
}

impl Structure {
    pub fn new() -> Self {
        Structure::default()
    }

    /// Builder form; a repeated name replaces the earlier type in place.
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = column_type,
            None => self.columns.push((name, column_type)),
        }
        self
    }

    /// Parse `(name, descriptor)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut structure = Structure::new();
        for (name, descriptor) in pairs {
            structure = structure.column(name, descriptor.parse()?);
        }
        Ok(structure)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnType> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnType)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for Structure {
    type Item = (String, ColumnType);
    type IntoIter = std::vec::IntoIter<(String, ColumnType)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Serde helpers for `Vec<(String, T)>` written as a mapping in order.
mod ordered {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<S, T>(entries: &[(String, T)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Vec<(String, T)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(Vec::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, T)> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(serde::de::Error::custom(format!("duplicate key '{key}'")));
                    }
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}
