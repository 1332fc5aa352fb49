// Persisted work index: work ID -> extracted tree path, ordered by last access.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::error::{Result, WorkerError};
use crate::source::traits::WorkId;

/// One cached submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkEntry {
    pub work_id: WorkId,
    pub path: PathBuf,
    pub last_access: DateTime<Utc>,
}

pub struct WorkIndex {
    conn: Connection,
}

impl WorkIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS works (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                work_id INTEGER NOT NULL UNIQUE,
                path TEXT NOT NULL,
                last_access INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS works_by_access ON works (last_access, seq);
            ",
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, work_id: WorkId) -> Result<Option<WorkEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT work_id, path, last_access FROM works WHERE work_id = ?1",
                params![to_sql_id(work_id)?],
                map_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert a new record. Fails with `Conflict` if the work is already indexed.
    pub fn save(&self, work_id: WorkId, path: &Path, ts: DateTime<Utc>) -> Result<()> {
        let inserted = self.conn.execute(
            "INSERT INTO works (work_id, path, last_access) VALUES (?1, ?2, ?3)",
            params![
                to_sql_id(work_id)?,
                path.to_string_lossy().into_owned(),
                ts.timestamp_millis()
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(WorkerError::Conflict(work_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Bump last access for every known ID. Unknown IDs are ignored.
    pub fn touch(&mut self, work_ids: &[WorkId], ts: DateTime<Utc>) -> Result<()> {
        if work_ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE works SET last_access = ?1 WHERE work_id = ?2")?;
            for id in work_ids {
                stmt.execute(params![ts.timestamp_millis(), to_sql_id(*id)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Up to `n` records, least recently accessed first, ties in insertion order.
    pub fn oldest(&self, n: usize) -> Result<Vec<WorkEntry>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT work_id, path, last_access FROM works ORDER BY last_access ASC, seq ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], map_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn delete(&mut self, work_ids: &[WorkId]) -> Result<()> {
        if work_ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM works WHERE work_id = ?1")?;
            for id in work_ids {
                stmt.execute(params![to_sql_id(*id)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn contains(&self, work_id: WorkId) -> Result<bool> {
        Ok(self.get(work_id)?.is_some())
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM works", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn to_sql_id(work_id: WorkId) -> Result<i64> {
    i64::try_from(work_id)
        .map_err(|_| WorkerError::Config(format!("work id {} does not fit the index", work_id)))
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<WorkEntry> {
    let id: i64 = row.get(0)?;
    let path: String = row.get(1)?;
    let millis: i64 = row.get(2)?;
    let last_access = Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Ok(WorkEntry {
        work_id: id as WorkId,
        path: PathBuf::from(path),
        last_access,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn save_then_get() {
        let index = WorkIndex::in_memory().unwrap();
        index.save(5, Path::new("/store/works/5"), at(0)).unwrap();

        let entry = index.get(5).unwrap().unwrap();
        assert_eq!(entry.work_id, 5);
        assert_eq!(entry.path, PathBuf::from("/store/works/5"));
        assert_eq!(entry.last_access, at(0));
        assert!(index.get(6).unwrap().is_none());
    }

    #[test]
    fn duplicate_save_is_conflict() {
        let index = WorkIndex::in_memory().unwrap();
        index.save(5, Path::new("/a"), at(0)).unwrap();
        let err = index.save(5, Path::new("/b"), at(1)).unwrap_err();
        assert!(matches!(err, WorkerError::Conflict(5)));
    }

    #[test]
    fn oldest_orders_by_access_then_insertion() {
        let mut index = WorkIndex::in_memory().unwrap();
        index.save(1, Path::new("/1"), at(10)).unwrap();
        index.save(2, Path::new("/2"), at(5)).unwrap();
        index.save(3, Path::new("/3"), at(5)).unwrap();
        index.save(4, Path::new("/4"), at(20)).unwrap();

        let ids: Vec<_> = index.oldest(3).unwrap().iter().map(|e| e.work_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        index.touch(&[2], at(30)).unwrap();
        let all = index.oldest(10).unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.work_id).collect();
        assert_eq!(ids, vec![3, 1, 4, 2]);
        assert!(all.windows(2).all(|w| w[0].last_access <= w[1].last_access));
    }

    #[test]
    fn touch_and_delete_ignore_unknown_ids() {
        let mut index = WorkIndex::in_memory().unwrap();
        index.save(1, Path::new("/1"), at(0)).unwrap();
        index.touch(&[], at(1)).unwrap();
        index.touch(&[1, 99], at(1) + Duration::seconds(1)).unwrap();
        assert_eq!(index.get(1).unwrap().unwrap().last_access, at(2));

        index.delete(&[99]).unwrap();
        assert_eq!(index.len().unwrap(), 1);
        index.delete(&[1]).unwrap();
        assert!(index.is_empty().unwrap());
    }
}
