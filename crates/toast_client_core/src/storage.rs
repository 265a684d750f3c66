//! SQLite storage: config and the local event table.
//! One connection behind a mutex, so the store can be shared across threads (sync worker,
//! connectivity callbacks, UI calls). Each write is a single statement.

use crate::error::{CoreError, Result};
use crate::ids::EventId;
use crate::models::{join_list, split_list, EventRecord, Origin};
use crate::rust_log;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DB_FILE: &str = "toast.db";

const EVENT_COLUMNS: &str = "id, owner_id, title, description, date, time, location, category, drive_link, dietary_options, music_suggestions, created_at, synced, owner_email";

pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open (or create) `toast.db` under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::Storage(e.to_string()))?;
        let db_path = dir.join(DB_FILE);
        rust_log!("[toast_rs] storage::open db={:?}", db_path);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    // Config

    pub fn config_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row.get(0)?));
        }
        Ok(None)
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn config_remove(&self, key: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM config WHERE key = ?1", params![key])?;
        Ok(())
    }

    // Events

    /// Insert or replace by id.
    pub fn insert(&self, e: &EventRecord) -> Result<()> {
        rust_log!(
            debug,
            "[toast_rs] storage::insert id={} owner={} synced={}",
            e.id,
            e.owner_id,
            e.synced
        );
        self.lock().execute(
            r#"
            INSERT OR REPLACE INTO events (id, owner_id, title, description, date, time, location, category, drive_link, dietary_options, music_suggestions, created_at, synced, owner_email)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                e.id.as_str(),
                e.owner_id,
                e.title,
                e.description,
                e.date,
                e.time,
                e.location,
                e.category,
                e.drive_link,
                join_list(&e.dietary_options),
                join_list(&e.music_suggestions),
                e.created_at,
                if e.synced { 1 } else { 0 },
                e.owner_email
            ],
        )?;
        Ok(())
    }

    /// Rewrite the user fields of an existing row. `synced` only moves false -> true.
    pub fn update(&self, e: &EventRecord) -> Result<bool> {
        let affected = self.lock().execute(
            r#"
            UPDATE events SET title = ?2, description = ?3, date = ?4, time = ?5, location = ?6,
                category = ?7, drive_link = ?8, dietary_options = ?9, music_suggestions = ?10,
                synced = MAX(synced, ?11)
            WHERE id = ?1
            "#,
            params![
                e.id.as_str(),
                e.title,
                e.description,
                e.date,
                e.time,
                e.location,
                e.category,
                e.drive_link,
                join_list(&e.dietary_options),
                join_list(&e.music_suggestions),
                if e.synced { 1 } else { 0 }
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get(&self, id: &EventId) -> Result<Option<EventRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS))?;
        let mut rows = stmt.query(params![id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_to_record(row)?));
        }
        Ok(None)
    }

    /// All records, newest first.
    pub fn list_all(&self) -> Result<Vec<EventRecord>> {
        self.query_events(&format!(
            "SELECT {} FROM events ORDER BY created_at DESC, id ASC",
            EVENT_COLUMNS
        ))
    }

    /// Records not yet accepted by the remote store, oldest first (upload order).
    pub fn list_unsynced(&self) -> Result<Vec<EventRecord>> {
        self.query_events(&format!(
            "SELECT {} FROM events WHERE synced = 0 ORDER BY created_at ASC, id ASC",
            EVENT_COLUMNS
        ))
    }

    fn query_events(&self, sql: &str) -> Result<Vec<EventRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Returns false when no row has that id.
    pub fn mark_synced(&self, id: &EventId) -> Result<bool> {
        let affected = self
            .lock()
            .execute("UPDATE events SET synced = 1 WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }

    pub fn count_unsynced(&self) -> Result<i64> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM events WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS config (key TEXT PRIMARY KEY, value TEXT);
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            location TEXT NOT NULL,
            category TEXT NOT NULL,
            drive_link TEXT NOT NULL,
            dietary_options TEXT NOT NULL,
            music_suggestions TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            owner_email TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_events_synced ON events(synced);
        CREATE INDEX IF NOT EXISTS idx_events_owner ON events(owner_id);
        "#,
    )?;
    // Databases written before the owner's email was kept.
    let has_email = conn
        .prepare("SELECT 1 FROM pragma_table_info('events') WHERE name = 'owner_email'")?
        .exists([])?;
    if !has_email {
        conn.execute("ALTER TABLE events ADD COLUMN owner_email TEXT NOT NULL DEFAULT ''", [])?;
    }
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let id: String = row.get(0)?;
    let id = EventId::parse(&id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(EventRecord {
        id,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        date: row.get(4)?,
        time: row.get(5)?,
        location: row.get(6)?,
        category: row.get(7)?,
        drive_link: row.get(8)?,
        dietary_options: split_list(&row.get::<_, String>(9)?),
        music_suggestions: split_list(&row.get::<_, String>(10)?),
        created_at: row.get(11)?,
        synced: row.get::<_, i32>(12)? != 0,
        owner_email: row.get(13)?,
        origin: Origin::Local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEvent;

    fn record(title: &str, created_at: i64) -> EventRecord {
        EventRecord::from_new(
            NewEvent {
                title: title.to_string(),
                dietary_options: vec!["Vegan".into(), "Kosher".into()],
                ..Default::default()
            },
            "host-1",
            created_at,
        )
    }

    #[test]
    fn open_creates_db_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("toast.db");
        assert!(!db_path.exists());
        LocalStore::open(dir.path()).expect("open");
        assert!(db_path.exists(), "toast.db should exist after open");
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rec = record("Picnic", 1);
        {
            let store = LocalStore::open(dir.path()).expect("open");
            store.insert(&rec).expect("insert");
        }
        let store = LocalStore::open(dir.path()).expect("reopen");
        let got = store.get(&rec.id).expect("get").expect("present");
        assert_eq!(got, rec);
    }

    #[test]
    fn list_all_is_newest_first() {
        let store = LocalStore::open_in_memory().expect("open");
        store.insert(&record("old", 10)).unwrap();
        store.insert(&record("new", 30)).unwrap();
        store.insert(&record("mid", 20)).unwrap();
        let titles: Vec<String> = store.list_all().unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[test]
    fn insert_with_existing_id_replaces() {
        let store = LocalStore::open_in_memory().expect("open");
        let mut rec = record("first", 1);
        store.insert(&rec).unwrap();
        rec.title = "second".into();
        store.insert(&rec).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(&rec.id).unwrap().unwrap().title, "second");
    }

    #[test]
    fn mark_synced_removes_from_unsynced() {
        let store = LocalStore::open_in_memory().expect("open");
        let a = record("a", 1);
        let b = record("b", 2);
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();
        assert_eq!(store.list_unsynced().unwrap().len(), 2);
        assert!(store.mark_synced(&a.id).unwrap());
        let pending = store.list_unsynced().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert!(!store.mark_synced(&EventId::parse("missing").unwrap()).unwrap());
    }

    #[test]
    fn update_never_clears_synced() {
        let store = LocalStore::open_in_memory().expect("open");
        let mut rec = record("a", 1);
        store.insert(&rec).unwrap();
        store.mark_synced(&rec.id).unwrap();
        rec.title = "renamed".into();
        rec.synced = false;
        assert!(store.update(&rec).unwrap());
        let got = store.get(&rec.id).unwrap().unwrap();
        assert_eq!(got.title, "renamed");
        assert!(got.synced);
    }

    #[test]
    fn opens_database_without_email_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = Connection::open(dir.path().join(DB_FILE)).expect("raw open");
            conn.execute_batch(
                r#"
                CREATE TABLE events (
                    id TEXT PRIMARY KEY, owner_id TEXT NOT NULL, title TEXT NOT NULL,
                    description TEXT NOT NULL, date TEXT NOT NULL, time TEXT NOT NULL,
                    location TEXT NOT NULL, category TEXT NOT NULL, drive_link TEXT NOT NULL,
                    dietary_options TEXT NOT NULL, music_suggestions TEXT NOT NULL,
                    created_at INTEGER NOT NULL, synced INTEGER NOT NULL DEFAULT 0
                );
                INSERT INTO events VALUES ('old1', 'host-1', 'Old', '', '', '', '', '', '', '', '', 5, 1);
                "#,
            )
            .expect("old schema");
        }
        let store = LocalStore::open(dir.path()).expect("open");
        let old = store.get(&EventId::parse("old1").unwrap()).unwrap().expect("kept");
        assert_eq!(old.owner_email, "");
        let mut rec = record("new", 6);
        rec.owner_email = "host@example.com".into();
        store.insert(&rec).unwrap();
        assert_eq!(store.get(&rec.id).unwrap().unwrap().owner_email, "host@example.com");
    }

    #[test]
    fn failed_insert_is_reported() {
        let store = LocalStore::open_in_memory().expect("open");
        store
            .execute_batch(
                "CREATE TRIGGER reject_events BEFORE INSERT ON events BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        let err = store.insert(&record("lost", 1)).unwrap_err();
        assert!(matches!(err, CoreError::Storage(ref m) if m.contains("disk full")), "{}", err);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn config_set_get_remove() {
        let store = LocalStore::open_in_memory().expect("open");
        assert_eq!(store.config_get("token").unwrap(), None);
        store.config_set("token", "abc").unwrap();
        store.config_set("token", "def").unwrap();
        assert_eq!(store.config_get("token").unwrap().as_deref(), Some("def"));
        store.config_remove("token").unwrap();
        assert_eq!(store.config_get("token").unwrap(), None);
    }

    #[test]
    fn concurrent_inserts_from_threads() {
        let store = std::sync::Arc::new(LocalStore::open_in_memory().expect("open"));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        store.insert(&record(&format!("t{}-{}", i, j), j)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count().unwrap(), 40);
    }
}
