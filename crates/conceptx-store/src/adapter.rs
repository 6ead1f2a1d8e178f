//! SQLite Concept Store Adapter
//!
//! One `IMMEDIATE` transaction per batch: the writer lock is taken up front so
//! revision allocation and the revision log are serialised across processes.
//! Dropping the transaction without committing rolls everything back.

#![allow(clippy::result_large_err)]

use crate::db;
use crate::errors::{from_rusqlite, Result};
use crate::migrations::apply_migrations;
use crate::repo::sqlite_repo::{from_millis, to_millis};
use crate::repo::SqliteRepo;
use chrono::{DateTime, Utc};
use conceptx_core::errors::{ExError, ExErrorKind, ExResult};
use conceptx_core::model::{AsOf, Concept, ConceptId, Partition, RevisionRecord};
use conceptx_core::schema::ConceptType;
use conceptx_core::store::{ConceptStore, StoreAdapter};
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;

pub struct SqliteStoreAdapter {
    conn: Connection,
}

impl SqliteStoreAdapter {
    /// Open (or create) the database file and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(db::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_in_memory()?)
    }

    /// Wrap an existing connection, applying pending migrations
    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn concept_count(&self) -> Result<usize> {
        SqliteRepo::count_concepts(&self.conn)
    }

    pub fn revision_count(&self) -> Result<usize> {
        SqliteRepo::count_records(&self.conn)
    }
}

/// Current time at the resolution stored in the revision log
fn now_millis() -> i64 {
    to_millis(Utc::now())
}

impl StoreAdapter for SqliteStoreAdapter {
    fn transact<T, F>(&mut self, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(from_rusqlite)?;

        // Commit times strictly increase so instant reads split batches exactly
        let floor = SqliteRepo::last_commit_millis(&tx)?.map_or(i64::MIN, |ms| ms + 1);
        let time = from_millis(now_millis().max(floor))?;

        let value = f(&SqliteConceptStore {
            conn: &tx,
            time,
            writable: true,
        })?;
        tx.commit().map_err(from_rusqlite)?;
        Ok(value)
    }

    fn snapshot<T, F>(&mut self, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>,
    {
        let tx = self.conn.transaction().map_err(from_rusqlite)?;
        let time = from_millis(now_millis())?;
        f(&SqliteConceptStore {
            conn: &tx,
            time,
            writable: false,
        })
    }
}

/// Transaction-scoped view handed to the pipeline
struct SqliteConceptStore<'c> {
    conn: &'c Connection,
    time: DateTime<Utc>,
    writable: bool,
}

impl SqliteConceptStore<'_> {
    fn ensure_writable(&self, op: &str) -> ExResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(ExError::new(ExErrorKind::Persistence)
                .with_op(op)
                .with_message("write attempted on a read-only snapshot"))
        }
    }
}

impl ConceptStore for SqliteConceptStore<'_> {
    fn read(
        &self,
        partition: &Partition,
        concept_type: Option<ConceptType>,
        ids: Option<&[ConceptId]>,
    ) -> ExResult<Vec<Concept>> {
        let Some(ids) = ids else {
            return SqliteRepo::list_concepts(self.conn, partition, concept_type);
        };
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(concept) = SqliteRepo::get_concept(self.conn, partition, *id)? {
                if concept_type.map_or(true, |t| concept.concept_type == t) {
                    found.push(concept);
                }
            }
        }
        Ok(found)
    }

    fn read_cached(&self, partition: &Partition, ids: &[ConceptId]) -> ExResult<Vec<Concept>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(state) = SqliteRepo::latest_record(self.conn, partition, *id, None)?
                .and_then(|r| r.state)
            {
                found.push(state);
            }
        }
        Ok(found)
    }

    fn write(&self, partition: &Partition, concept: &Concept) -> ExResult<bool> {
        self.ensure_writable("write")?;
        SqliteRepo::insert_concept(self.conn, partition, concept)
    }

    fn update(&self, partition: &Partition, concept: &Concept) -> ExResult<bool> {
        self.ensure_writable("update")?;
        SqliteRepo::update_concept(self.conn, partition, concept)
    }

    fn delete(&self, partition: &Partition, id: ConceptId) -> ExResult<bool> {
        self.ensure_writable("delete")?;
        SqliteRepo::delete_concept(self.conn, partition, id)
    }

    fn current_revision(&self, partition: &Partition) -> ExResult<u64> {
        SqliteRepo::current_revision(self.conn, partition)
    }

    fn allocate_revision(&self, partition: &Partition) -> ExResult<u64> {
        self.ensure_writable("allocate_revision")?;
        SqliteRepo::allocate_revision(self.conn, partition)
    }

    fn append_revisions(&self, records: &[RevisionRecord]) -> ExResult<()> {
        self.ensure_writable("append_revisions")?;
        for record in records {
            SqliteRepo::append_record(self.conn, record)
                .map_err(|e| e.with_concept_id(record.concept_id.to_string()))?;
        }
        Ok(())
    }

    fn revisions_as_of(
        &self,
        partition: &Partition,
        ids: &[ConceptId],
        as_of: AsOf,
    ) -> ExResult<Vec<RevisionRecord>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let record = SqliteRepo::latest_record(self.conn, partition, *id, Some(as_of))?;
            if let Some(record) = record {
                found.push(record);
            }
        }
        Ok(found)
    }

    fn history(&self, partition: &Partition, id: ConceptId) -> ExResult<Vec<RevisionRecord>> {
        SqliteRepo::history(self.conn, partition, id)
    }

    fn transaction_time(&self) -> DateTime<Utc> {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_transaction_rolls_back() {
        let mut store = SqliteStoreAdapter::open_in_memory().unwrap();
        let p = Partition::site_directory();
        let concept = Concept::new(ConceptType::SiteDirectory);
        let result: ExResult<()> = store.transact(|s| {
            assert!(s.write(&p, &concept)?);
            s.allocate_revision(&p)?;
            Err(ExError::new(ExErrorKind::Validation))
        });
        assert!(result.is_err());
        assert_eq!(store.concept_count().unwrap(), 0);
        let revision = store.snapshot(|s| s.current_revision(&p)).unwrap();
        assert_eq!(revision, 0);
    }

    #[test]
    fn test_snapshot_is_read_only() {
        let mut store = SqliteStoreAdapter::open_in_memory().unwrap();
        let p = Partition::site_directory();
        let err = store
            .snapshot(|s| s.write(&p, &Concept::new(ConceptType::SiteDirectory)))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Persistence);
    }

    #[test]
    fn test_writes_visible_within_transaction() {
        let mut store = SqliteStoreAdapter::open_in_memory().unwrap();
        let p = Partition::site_directory();
        let concept = Concept::new(ConceptType::SiteDirectory);
        let seen = store
            .transact(|s| {
                s.write(&p, &concept)?;
                s.get(&p, concept.id)
            })
            .unwrap();
        assert_eq!(seen, Some(concept));
    }
}
