//! SQLite repository implementation
//!
//! Maps concepts, revision records, and partition counters to rows. Every
//! function takes a plain `Connection`; a `Transaction` derefs to one, so the
//! adapter runs these inside its batch transaction.

#![allow(clippy::result_large_err)]

use crate::errors::{corrupt_row, from_rusqlite, Result};
use chrono::{DateTime, TimeZone, Utc};
use conceptx_core::model::{AccessOverride, AsOf, Concept, ConceptId, Partition, RevisionRecord};
use conceptx_core::schema::ConceptType;
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const CONCEPT_COLUMNS: &str =
    "id, concept_type, container_id, revision_number, properties_json, access_override_json";

const RECORD_COLUMNS: &str =
    "partition, concept_id, revision, concept_type, snapshot_json, committed_at";

/// Raw `concepts` row before decoding
struct ConceptRow {
    id: String,
    concept_type: String,
    container_id: Option<String>,
    revision_number: i64,
    properties_json: String,
    access_override_json: String,
}

impl ConceptRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            concept_type: row.get(1)?,
            container_id: row.get(2)?,
            revision_number: row.get(3)?,
            properties_json: row.get(4)?,
            access_override_json: row.get(5)?,
        })
    }

    fn into_concept(self) -> Result<Concept> {
        let properties: BTreeMap<_, _> = serde_json::from_str(&self.properties_json)
            .map_err(|e| corrupt_row("concepts", e))?;
        let access_override: AccessOverride = serde_json::from_str(&self.access_override_json)
            .map_err(|e| corrupt_row("concepts", e))?;
        Ok(Concept {
            id: parse_id(&self.id)?,
            concept_type: parse_type(&self.concept_type)?,
            revision_number: self.revision_number as u64,
            container: self.container_id.as_deref().map(parse_id).transpose()?,
            properties,
            access_override,
        })
    }
}

/// Raw `revision_log` row before decoding
struct RecordRow {
    partition: String,
    concept_id: String,
    revision: i64,
    concept_type: String,
    snapshot_json: Option<String>,
    committed_at: i64,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            partition: row.get(0)?,
            concept_id: row.get(1)?,
            revision: row.get(2)?,
            concept_type: row.get(3)?,
            snapshot_json: row.get(4)?,
            committed_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<RevisionRecord> {
        let state = self
            .snapshot_json
            .as_deref()
            .map(serde_json::from_str::<Concept>)
            .transpose()
            .map_err(|e| corrupt_row("revision_log", e))?;
        Ok(RevisionRecord {
            partition: self
                .partition
                .parse::<Partition>()
                .map_err(|e| corrupt_row("revision_log", e))?,
            concept_id: parse_id(&self.concept_id)?,
            concept_type: parse_type(&self.concept_type)?,
            revision: self.revision as u64,
            state,
            committed_at: from_millis(self.committed_at)?,
        })
    }
}

fn parse_id(raw: &str) -> Result<ConceptId> {
    raw.parse().map_err(|e| corrupt_row("concepts", e))
}

fn parse_type(raw: &str) -> Result<ConceptType> {
    raw.parse().map_err(|e| corrupt_row("concepts", e))
}

/// Milliseconds since the epoch, the resolution of `committed_at`
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt_row("revision_log", format!("timestamp {} out of range", ms)))
}

fn collect<T, R>(
    rows: impl Iterator<Item = rusqlite::Result<R>>,
    decode: impl Fn(R) -> Result<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row.map_err(from_rusqlite)?)?);
    }
    Ok(out)
}

/// SQLite repository for concepts and their revision log
pub struct SqliteRepo;

impl SqliteRepo {
    /// Insert a new concept; `false` if the id is already taken in the partition
    pub fn insert_concept(
        conn: &Connection,
        partition: &Partition,
        concept: &Concept,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "INSERT INTO concepts (partition, id, concept_type, container_id, revision_number,
                                       properties_json, access_override_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(partition, id) DO NOTHING",
                rusqlite::params![
                    partition.name(),
                    concept.id.to_string(),
                    concept.concept_type.name(),
                    concept.container.map(|c| c.to_string()),
                    concept.revision_number as i64,
                    serde_json::to_string(&concept.properties)?,
                    serde_json::to_string(&concept.access_override)?,
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(changed == 1)
    }

    /// Replace a stored concept; `false` if it does not exist
    pub fn update_concept(
        conn: &Connection,
        partition: &Partition,
        concept: &Concept,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE concepts SET
                    concept_type = ?3,
                    container_id = ?4,
                    revision_number = ?5,
                    properties_json = ?6,
                    access_override_json = ?7
                 WHERE partition = ?1 AND id = ?2",
                rusqlite::params![
                    partition.name(),
                    concept.id.to_string(),
                    concept.concept_type.name(),
                    concept.container.map(|c| c.to_string()),
                    concept.revision_number as i64,
                    serde_json::to_string(&concept.properties)?,
                    serde_json::to_string(&concept.access_override)?,
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(changed == 1)
    }

    pub fn delete_concept(conn: &Connection, partition: &Partition, id: ConceptId) -> Result<bool> {
        let changed = conn
            .execute(
                "DELETE FROM concepts WHERE partition = ?1 AND id = ?2",
                rusqlite::params![partition.name(), id.to_string()],
            )
            .map_err(from_rusqlite)?;
        Ok(changed == 1)
    }

    pub fn get_concept(
        conn: &Connection,
        partition: &Partition,
        id: ConceptId,
    ) -> Result<Option<Concept>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM concepts WHERE partition = ?1 AND id = ?2",
                    CONCEPT_COLUMNS
                ),
                rusqlite::params![partition.name(), id.to_string()],
                ConceptRow::from_row,
            )
            .optional()
            .map_err(from_rusqlite)?;
        row.map(ConceptRow::into_concept).transpose()
    }

    /// Every concept in the partition, optionally of one type, ordered by id
    pub fn list_concepts(
        conn: &Connection,
        partition: &Partition,
        concept_type: Option<ConceptType>,
    ) -> Result<Vec<Concept>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM concepts
                 WHERE partition = ?1 AND (?2 IS NULL OR concept_type = ?2)
                 ORDER BY id",
                CONCEPT_COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(
                rusqlite::params![partition.name(), concept_type.map(|t| t.name())],
                ConceptRow::from_row,
            )
            .map_err(from_rusqlite)?;
        collect(rows, ConceptRow::into_concept)
    }

    pub fn current_revision(conn: &Connection, partition: &Partition) -> Result<u64> {
        let revision: Option<i64> = conn
            .query_row(
                "SELECT revision FROM partition_revision WHERE partition = ?1",
                [partition.name()],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        Ok(revision.unwrap_or(0) as u64)
    }

    /// Bump and return the partition's revision counter
    pub fn allocate_revision(conn: &Connection, partition: &Partition) -> Result<u64> {
        conn.execute(
            "INSERT INTO partition_revision (partition, revision) VALUES (?1, 1)
             ON CONFLICT(partition) DO UPDATE SET revision = revision + 1",
            [partition.name()],
        )
        .map_err(from_rusqlite)?;
        Self::current_revision(conn, partition)
    }

    pub fn append_record(conn: &Connection, record: &RevisionRecord) -> Result<()> {
        let snapshot = record.state.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            "INSERT INTO revision_log (partition, concept_id, revision, concept_type,
                                       snapshot_json, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.partition.name(),
                record.concept_id.to_string(),
                record.revision as i64,
                record.concept_type.name(),
                snapshot,
                to_millis(record.committed_at),
            ],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }

    /// Newest record for one concept, optionally bounded by `as_of`
    pub fn latest_record(
        conn: &Connection,
        partition: &Partition,
        id: ConceptId,
        as_of: Option<AsOf>,
    ) -> Result<Option<RevisionRecord>> {
        let (max_revision, max_time) = match as_of {
            None => (None, None),
            // Stored revisions never exceed i64::MAX, so a larger bound means every record
            Some(AsOf::Revision(r)) => (Some(i64::try_from(r).unwrap_or(i64::MAX)), None),
            Some(AsOf::Instant(t)) => (None, Some(to_millis(t))),
        };
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM revision_log
                     WHERE partition = ?1 AND concept_id = ?2
                       AND (?3 IS NULL OR revision <= ?3)
                       AND (?4 IS NULL OR committed_at <= ?4)
                     ORDER BY revision DESC
                     LIMIT 1",
                    RECORD_COLUMNS
                ),
                rusqlite::params![partition.name(), id.to_string(), max_revision, max_time],
                RecordRow::from_row,
            )
            .optional()
            .map_err(from_rusqlite)?;
        row.map(RecordRow::into_record).transpose()
    }

    /// Every record for one concept, oldest first
    pub fn history(
        conn: &Connection,
        partition: &Partition,
        id: ConceptId,
    ) -> Result<Vec<RevisionRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM revision_log
                 WHERE partition = ?1 AND concept_id = ?2
                 ORDER BY revision",
                RECORD_COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(
                rusqlite::params![partition.name(), id.to_string()],
                RecordRow::from_row,
            )
            .map_err(from_rusqlite)?;
        collect(rows, RecordRow::into_record)
    }

    /// Latest commit time across the whole log, in milliseconds
    pub fn last_commit_millis(conn: &Connection) -> Result<Option<i64>> {
        conn.query_row("SELECT MAX(committed_at) FROM revision_log", [], |row| {
            row.get(0)
        })
        .map_err(from_rusqlite)
    }

    pub fn count_concepts(conn: &Connection) -> Result<usize> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM concepts", [], |row| row.get(0))
            .map_err(from_rusqlite)?;
        Ok(count as usize)
    }

    pub fn count_records(conn: &Connection) -> Result<usize> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM revision_log", [], |row| row.get(0))
            .map_err(from_rusqlite)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrations::apply_migrations;
    use conceptx_core::model::PropertyValue;

    fn migrated() -> Connection {
        let mut conn = db::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_then_get() {
        let conn = migrated();
        let p = Partition::site_directory();
        let concept = Concept::new(ConceptType::Alias)
            .contained_by(ConceptId::new())
            .with_property("content", PropertyValue::Text("hello".into()));

        assert!(SqliteRepo::insert_concept(&conn, &p, &concept).unwrap());
        assert!(!SqliteRepo::insert_concept(&conn, &p, &concept).unwrap());
        assert_eq!(
            SqliteRepo::get_concept(&conn, &p, concept.id).unwrap(),
            Some(concept)
        );
    }

    #[test]
    fn test_same_id_in_two_partitions() {
        let conn = migrated();
        let concept = Concept::new(ConceptType::Alias);
        let model = Partition::engineering_model(uuid::Uuid::new_v4());
        assert!(SqliteRepo::insert_concept(&conn, &Partition::site_directory(), &concept).unwrap());
        assert!(SqliteRepo::insert_concept(&conn, &model, &concept).unwrap());
        assert_eq!(SqliteRepo::count_concepts(&conn).unwrap(), 2);
    }

    #[test]
    fn test_allocate_revision_counts_per_partition() {
        let conn = migrated();
        let sd = Partition::site_directory();
        let model = Partition::engineering_model(uuid::Uuid::new_v4());
        assert_eq!(SqliteRepo::current_revision(&conn, &sd).unwrap(), 0);
        assert_eq!(SqliteRepo::allocate_revision(&conn, &sd).unwrap(), 1);
        assert_eq!(SqliteRepo::allocate_revision(&conn, &sd).unwrap(), 2);
        assert_eq!(SqliteRepo::allocate_revision(&conn, &model).unwrap(), 1);
    }

    #[test]
    fn test_revision_log_rejects_rewrites() {
        let conn = migrated();
        let p = Partition::site_directory();
        let record = RevisionRecord {
            partition: p.clone(),
            concept_id: ConceptId::new(),
            concept_type: ConceptType::Alias,
            revision: 1,
            state: None,
            committed_at: from_millis(1_700_000_000_000).unwrap(),
        };
        SqliteRepo::append_record(&conn, &record).unwrap();
        assert!(SqliteRepo::append_record(&conn, &record).is_err());
        assert!(conn
            .execute("DELETE FROM revision_log", [])
            .is_err());
        assert_eq!(
            SqliteRepo::history(&conn, &p, record.concept_id).unwrap(),
            vec![record]
        );
    }

    #[test]
    fn test_as_of_beyond_signed_range_reads_latest() {
        let conn = migrated();
        let p = Partition::site_directory();
        let record = RevisionRecord {
            partition: p.clone(),
            concept_id: ConceptId::new(),
            concept_type: ConceptType::Alias,
            revision: 3,
            state: None,
            committed_at: from_millis(1_700_000_000_000).unwrap(),
        };
        SqliteRepo::append_record(&conn, &record).unwrap();

        for bound in [3, i64::MAX as u64, i64::MAX as u64 + 1, u64::MAX] {
            let found = SqliteRepo::latest_record(
                &conn,
                &p,
                record.concept_id,
                Some(AsOf::Revision(bound)),
            )
            .unwrap();
            assert_eq!(found.as_ref(), Some(&record), "bound {}", bound);
        }
        let before = SqliteRepo::latest_record(
            &conn,
            &p,
            record.concept_id,
            Some(AsOf::Revision(2)),
        )
        .unwrap();
        assert_eq!(before, None);
    }
}
