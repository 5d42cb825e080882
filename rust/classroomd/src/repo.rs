use std::marker::PhantomData;

use crate::model::Entity;
use crate::store::{Fields, Query, RecordStore, Row, StoreError};

/// Typed view of one table.
pub struct Repository<'a, E> {
    store: &'a dyn RecordStore,
    _entity: PhantomData<E>,
}

impl<'a, E: Entity> Repository<'a, E> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn list(&self, query: &Query) -> Result<Vec<E>, StoreError> {
        self.store
            .fetch_records(E::TABLE, query)?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<E, StoreError> {
        decode(self.store.get_record_by_id(E::TABLE, id)?)
    }

    pub fn create(&self, fields: Fields) -> Result<E, StoreError> {
        let rows = self
            .store
            .create_records(E::TABLE, vec![fields])?
            .into_rows(E::TABLE)?;
        single(rows)
    }

    pub fn update(&self, id: &str, fields: Fields) -> Result<E, StoreError> {
        // Surface a missing id as NotFound rather than a batch failure.
        self.store.get_record_by_id(E::TABLE, id)?;
        let rows = self
            .store
            .update_records(E::TABLE, vec![(id.to_string(), fields)])?
            .into_rows(E::TABLE)?;
        single(rows)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.get_record_by_id(E::TABLE, id)?;
        self.store
            .delete_records(E::TABLE, &[id.to_string()])?
            .into_rows(E::TABLE)?;
        Ok(())
    }
}

fn decode<E: Entity>(row: Row) -> Result<E, StoreError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
        StoreError::remote(format!("malformed {} record: {}", E::TABLE.label(), e))
    })
}

fn single<E: Entity>(rows: Vec<Row>) -> Result<E, StoreError> {
    match rows.into_iter().next() {
        Some(row) => decode(row),
        None => Err(StoreError::remote(format!(
            "{} write returned no record",
            E::TABLE.label()
        ))),
    }
}
