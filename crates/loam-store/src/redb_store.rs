//! Durable record storage backed by redb.
//!
//! Layout:
//! - `records`: id (i64) → bincode-encoded [`DnsRecord`]
//! - `name_index`: (name, type value) → bincode-encoded `Vec<i64>`
//! - `meta`: string key → u64 (`next_id`)
//!
//! Every read operation runs inside a single read transaction, so
//! `lookup_group` observes one consistent snapshot: the minimum-priority
//! scan and the row fetch cannot interleave with a writer.

use crate::{min_priority_group, sort_records, RecordStore, Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use loam_model::{DnsRecord, LookupQuery, RecordType};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const RECORDS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("records");
const NAME_INDEX_TABLE: TableDefinition<(&str, u16), &[u8]> = TableDefinition::new("name_index");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_ID_KEY: &str = "next_id";

/// Embedded durable record store.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens or creates the store at `path`, initializing tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = if path.exists() {
            Database::open(path).map_err(|e| StoreError::backend(e.to_string()))?
        } else {
            Database::create(path).map_err(|e| StoreError::backend(e.to_string()))?
        };

        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            write_txn
                .open_table(NAME_INDEX_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            write_txn
                .open_table(META_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        info!(path = %path.display(), "record store opened");
        Ok(Self { db: Arc::new(db) })
    }

    fn begin_read(&self) -> Result<ReadTransaction> {
        self.db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<DnsRecord> {
        bincode::deserialize(bytes).map_err(|e| StoreError::backend(format!("decode: {e}")))
    }

    fn encode(record: &DnsRecord) -> Result<Vec<u8>> {
        bincode::serialize(record).map_err(|e| StoreError::backend(format!("encode: {e}")))
    }

    fn decode_ids(bytes: &[u8]) -> Result<Vec<i64>> {
        bincode::deserialize(bytes).map_err(|e| StoreError::backend(format!("decode index: {e}")))
    }

    fn encode_ids(ids: &[i64]) -> Result<Vec<u8>> {
        bincode::serialize(ids).map_err(|e| StoreError::backend(format!("encode index: {e}")))
    }

    /// Loads all records for (name, type) within one read transaction,
    /// unsorted.
    fn load_records(&self, txn: &ReadTransaction, name: &str, rtype: RecordType) -> Result<Vec<DnsRecord>> {
        let index = txn
            .open_table(NAME_INDEX_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let records_table = txn
            .open_table(RECORDS_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;

        let Some(ids) = index
            .get(&(name, rtype.to_u16()))
            .map_err(|e| StoreError::backend(e.to_string()))?
        else {
            return Ok(Vec::new());
        };

        let ids = Self::decode_ids(ids.value())?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(raw) = records_table
                .get(id)
                .map_err(|e| StoreError::backend(e.to_string()))?
            {
                records.push(Self::decode(raw.value())?);
            }
        }
        Ok(records)
    }

    /// Adds `id` to the (name, type) index entry.
    fn index_insert(
        table: &mut redb::Table<'_, (&'static str, u16), &'static [u8]>,
        name: &str,
        rtype: RecordType,
        id: i64,
    ) -> Result<()> {
        let mut ids = match table
            .get(&(name, rtype.to_u16()))
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(raw) => Self::decode_ids(raw.value())?,
            None => Vec::new(),
        };
        if !ids.contains(&id) {
            ids.push(id);
            ids.sort_unstable();
        }
        let encoded = Self::encode_ids(&ids)?;
        table
            .insert(&(name, rtype.to_u16()), encoded.as_slice())
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    /// Removes `id` from the (name, type) index entry, dropping the entry
    /// when it empties.
    fn index_remove(
        table: &mut redb::Table<'_, (&'static str, u16), &'static [u8]>,
        name: &str,
        rtype: RecordType,
        id: i64,
    ) -> Result<()> {
        let ids = match table
            .get(&(name, rtype.to_u16()))
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(raw) => Self::decode_ids(raw.value())?,
            None => return Ok(()),
        };
        let ids: Vec<i64> = ids.into_iter().filter(|&other| other != id).collect();
        if ids.is_empty() {
            table
                .remove(&(name, rtype.to_u16()))
                .map_err(|e| StoreError::backend(e.to_string()))?;
        } else {
            let encoded = Self::encode_ids(&ids)?;
            table
                .insert(&(name, rtype.to_u16()), encoded.as_slice())
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RedbStore {
    async fn lookup_group(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>> {
        let txn = self.begin_read()?;
        let mut records = self.load_records(&txn, &query.name, query.rtype)?;
        sort_records(&mut records);
        Ok(min_priority_group(records))
    }

    async fn lookup_all(&self, query: &LookupQuery) -> Result<Vec<DnsRecord>> {
        let txn = self.begin_read()?;
        let mut records = self.load_records(&txn, &query.name, query.rtype)?;
        sort_records(&mut records);
        Ok(records)
    }

    async fn lookup_by_id(&self, id: i64) -> Result<Option<DnsRecord>> {
        let txn = self.begin_read()?;
        let table = txn
            .open_table(RECORDS_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;
        match table
            .get(id)
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(raw) => Ok(Some(Self::decode(raw.value())?)),
            None => Ok(None),
        }
    }

    async fn create(&self, record: &mut DnsRecord) -> Result<()> {
        record.normalize();
        record.validate()?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let next_id = meta
                .get(NEXT_ID_KEY)
                .map_err(|e| StoreError::backend(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(1);
            meta.insert(NEXT_ID_KEY, next_id + 1)
                .map_err(|e| StoreError::backend(e.to_string()))?;

            record.id = next_id as i64;
            let now = Utc::now();
            record.created_at = now;
            record.updated_at = now;

            let mut records_table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let encoded = Self::encode(record)?;
            records_table
                .insert(record.id, encoded.as_slice())
                .map_err(|e| StoreError::backend(e.to_string()))?;

            let mut index = write_txn
                .open_table(NAME_INDEX_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            Self::index_insert(&mut index, &record.name, record.rtype, record.id)?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    async fn update(&self, record: &DnsRecord) -> Result<()> {
        let mut record = record.clone();
        record.normalize();
        record.validate()?;
        record.updated_at = Utc::now();

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut records_table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let old = match records_table
                .get(record.id)
                .map_err(|e| StoreError::backend(e.to_string()))?
            {
                Some(raw) => Self::decode(raw.value())?,
                None => {
                    return Err(StoreError::NotFound {
                        what: format!("record id {}", record.id),
                    })
                }
            };

            let encoded = Self::encode(&record)?;
            records_table
                .insert(record.id, encoded.as_slice())
                .map_err(|e| StoreError::backend(e.to_string()))?;

            if old.name != record.name || old.rtype != record.rtype {
                let mut index = write_txn
                    .open_table(NAME_INDEX_TABLE)
                    .map_err(|e| StoreError::backend(e.to_string()))?;
                Self::index_remove(&mut index, &old.name, old.rtype, old.id)?;
                Self::index_insert(&mut index, &record.name, record.rtype, record.id)?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<DnsRecord> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let removed = {
            let mut records_table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let removed = match records_table
                .remove(id)
                .map_err(|e| StoreError::backend(e.to_string()))?
            {
                Some(raw) => Self::decode(raw.value())?,
                None => {
                    return Err(StoreError::NotFound {
                        what: format!("record id {id}"),
                    })
                }
            };

            let mut index = write_txn
                .open_table(NAME_INDEX_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            Self::index_remove(&mut index, &removed.name, removed.rtype, id)?;
            removed
        };
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(removed)
    }

    async fn delete_name_type(&self, name: &str, rtype: Option<RecordType>) -> Result<u64> {
        let name = loam_model::normalize_name(name);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let mut removed = 0u64;
        {
            let mut index = write_txn
                .open_table(NAME_INDEX_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;
            let mut records_table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(|e| StoreError::backend(e.to_string()))?;

            let types: Vec<u16> = match rtype {
                Some(rtype) => vec![rtype.to_u16()],
                None => {
                    // Collect every indexed type for this name.
                    let range = index
                        .range((name.as_str(), 0u16)..=(name.as_str(), u16::MAX))
                        .map_err(|e| StoreError::backend(e.to_string()))?;
                    let mut types = Vec::new();
                    for entry in range {
                        let (key, _) = entry.map_err(|e| StoreError::backend(e.to_string()))?;
                        types.push(key.value().1);
                    }
                    types
                }
            };

            for type_value in types {
                let ids = match index
                    .remove(&(name.as_str(), type_value))
                    .map_err(|e| StoreError::backend(e.to_string()))?
                {
                    Some(raw) => Self::decode_ids(raw.value())?,
                    None => continue,
                };
                for id in ids {
                    if records_table
                        .remove(id)
                        .map_err(|e| StoreError::backend(e.to_string()))?
                        .is_some()
                    {
                        removed += 1;
                    }
                }
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        if removed == 0 {
            return Err(StoreError::NotFound {
                what: format!("records for {name} {rtype:?}"),
            });
        }
        Ok(removed)
    }

    async fn list_wildcards(&self) -> Result<Vec<DnsRecord>> {
        let txn = self.begin_read()?;
        let table = txn
            .open_table(RECORDS_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let mut wildcards = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            let (_, raw) = entry.map_err(|e| StoreError::backend(e.to_string()))?;
            let record = Self::decode(raw.value())?;
            if record.is_wildcard {
                wildcards.push(record);
            }
        }
        Ok(wildcards)
    }

    async fn health(&self) -> Result<()> {
        let txn = self.begin_read()?;
        txn.open_table(RECORDS_TABLE)
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }
}
