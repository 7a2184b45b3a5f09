//! Active-record models.
//!
//! An [`Entity`] describes a table. [`Model<E>`] is one row of it: an
//! attribute bag plus the snapshot last seen in the database, which drives
//! dirty tracking.

use std::fmt;
use std::marker::PhantomData;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::query::{FromRow, Operator, QueryBuilder};
use super::{timestamp_now, Attributes, Db, Value};
use crate::error::{Error, Result};

/// Table-level metadata for a [`Model`].
///
/// ```rust
/// use hearth::db::{Entity, Model};
///
/// pub struct TagEntity;
///
/// impl Entity for TagEntity {
///     const TABLE: &'static str = "tags";
///     const NAME: &'static str = "Tag";
///     const TIMESTAMPS: bool = false;
///     const FILLABLE: &'static [&'static str] = &["name", "slug"];
/// }
///
/// pub type Tag = Model<TagEntity>;
/// ```
pub trait Entity: Send + Sync + 'static {
    const TABLE: &'static str;
    /// Used in "not found" errors.
    const NAME: &'static str = Self::TABLE;
    const PRIMARY_KEY: &'static str = "id";
    const TIMESTAMPS: bool = true;
    /// Keys accepted by [`Model::fill`]. Empty accepts everything.
    const FILLABLE: &'static [&'static str] = &[];
    /// Keys left out when the model is serialized.
    const HIDDEN: &'static [&'static str] = &[];
}

pub struct Model<E: Entity> {
    attributes: Attributes,
    original: Attributes,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Model<E> {
    /// An unsaved model holding the fillable subset of `attributes`.
    pub fn new(attributes: Attributes) -> Self {
        let mut model = Self { attributes: Attributes::new(), original: Attributes::new(), _entity: PhantomData };
        model.fill(attributes);
        model.original = model.attributes.clone();
        model
    }

    /// Merges `attributes`, keeping only fillable keys.
    pub fn fill(&mut self, attributes: Attributes) -> &mut Self {
        for (key, value) in attributes {
            if E::FILLABLE.is_empty() || E::FILLABLE.contains(&key.as_str()) {
                self.attributes.insert(key, value);
            }
        }
        self
    }

    /// Assigns one attribute, bypassing the fillable whitelist.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Primary key value, when set and not null.
    pub fn id(&self) -> Option<&Value> {
        self.attributes.get(E::PRIMARY_KEY).filter(|v| !v.is_null())
    }

    pub fn to_array(&self) -> &Attributes {
        &self.attributes
    }

    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }

    /// Attributes that differ from the last saved or loaded state.
    pub fn dirty(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    pub fn query(db: &Db) -> QueryBuilder<Self> {
        QueryBuilder::new(db.clone(), E::TABLE).with_timestamps(E::TIMESTAMPS)
    }

    pub async fn all(db: &Db) -> Result<Vec<Self>> {
        Self::query(db).get().await
    }

    pub async fn find(db: &Db, id: impl Into<Value>) -> Result<Option<Self>> {
        Self::query(db).where_eq(E::PRIMARY_KEY, id).first().await
    }

    pub async fn find_or_fail(db: &Db, id: impl Into<Value>) -> Result<Self> {
        Self::find(db, id).await?.ok_or_else(|| Error::ModelNotFound(E::NAME.to_owned()))
    }

    pub fn where_eq(db: &Db, column: &str, value: impl Into<Value>) -> QueryBuilder<Self> {
        Self::query(db).where_eq(column, value)
    }

    pub fn where_op(db: &Db, column: &str, op: Operator, value: impl Into<Value>) -> QueryBuilder<Self> {
        Self::query(db).where_op(column, op, value)
    }

    /// INSERTs when there is no primary key, otherwise UPDATEs the dirty
    /// attributes. `Ok(false)` means the insert produced no id.
    pub async fn save(&mut self, db: &Db) -> Result<bool> {
        if self.id().is_none() {
            return self.insert(db).await;
        }

        let mut changed = self.dirty();
        if changed.is_empty() {
            return Ok(true);
        }
        if E::TIMESTAMPS {
            let now = timestamp_now();
            self.attributes.insert("updated_at".to_owned(), now.clone());
            changed.insert("updated_at".to_owned(), now);
        }

        let id = self.id().cloned().unwrap_or(Value::Null);
        Self::query(db).where_eq(E::PRIMARY_KEY, id).update(changed).await?;
        self.original = self.attributes.clone();
        Ok(true)
    }

    /// The model is only touched once the row has an id.
    async fn insert(&mut self, db: &Db) -> Result<bool> {
        let mut data = self.attributes.clone();
        data.remove(E::PRIMARY_KEY);
        if E::TIMESTAMPS {
            let now = timestamp_now();
            data.insert("created_at".to_owned(), now.clone());
            data.insert("updated_at".to_owned(), now);
        }

        let Some(id) = Self::query(db).insert(data.clone()).await? else {
            return Ok(false);
        };
        data.insert(E::PRIMARY_KEY.to_owned(), Value::Int(id));
        self.attributes = data;
        self.original = self.attributes.clone();
        Ok(true)
    }

    /// Builds, fills and saves a new model.
    pub async fn create(db: &Db, attributes: Attributes) -> Result<Self> {
        let mut model = Self::new(attributes);
        if model.save(db).await? {
            Ok(model)
        } else {
            Err(Error::Persistence(format!("{} could not be created", E::NAME)))
        }
    }

    pub async fn update(&mut self, db: &Db, attributes: Attributes) -> Result<bool> {
        self.fill(attributes);
        self.save(db).await
    }

    /// Deletes the row. `Ok(false)` when the model has no primary key.
    pub async fn delete(&self, db: &Db) -> Result<bool> {
        let Some(id) = self.id().cloned() else {
            return Ok(false);
        };
        Self::query(db).where_eq(E::PRIMARY_KEY, id).delete().await?;
        Ok(true)
    }
}

impl<E: Entity> FromRow for Model<E> {
    fn from_row(row: Attributes) -> Self {
        Self { original: row.clone(), attributes: row, _entity: PhantomData }
    }
}

impl<E: Entity> Clone for Model<E> {
    fn clone(&self) -> Self {
        Self { attributes: self.attributes.clone(), original: self.original.clone(), _entity: PhantomData }
    }
}

impl<E: Entity> PartialEq for Model<E> {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl<E: Entity> fmt::Debug for Model<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table", &E::TABLE)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl<E: Entity> Serialize for Model<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let visible: Vec<_> = self.attributes.iter().filter(|(k, _)| !E::HIDDEN.contains(&k.as_str())).collect();
        let mut map = serializer.serialize_map(Some(visible.len()))?;
        for (key, value) in visible {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
