//! SQLite store backend — chat sessions, used questions, and daily
//! counters in one database file. Survives restarts; the scheduler
//! queue itself is rebuilt from the `chats` table at startup.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use quizpulse_core::error::{QuizPulseError, Result};
use quizpulse_core::traits::{ChatStore, CounterStore, UsageStore};
use quizpulse_core::types::{ChatId, ChatKind, ChatRecord};
use rusqlite::{Connection, OptionalExtension};

/// SQLite-backed implementation of ChatStore, UsageStore, CounterStore.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            -- Per-chat quiz session state
            CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY,
                active INTEGER NOT NULL DEFAULT 0,
                paused INTEGER NOT NULL DEFAULT 0,
                kind TEXT NOT NULL DEFAULT 'direct',
                category TEXT NOT NULL DEFAULT '',
                interval_secs INTEGER NOT NULL DEFAULT 30,
                last_fired_at TEXT
            );
            CREATE INDEX IF NOT EXISTS chats_active_idx ON chats(active);

            -- Questions already served in the current cycle
            CREATE TABLE IF NOT EXISTS used_questions (
                chat_id INTEGER NOT NULL,
                question_id TEXT NOT NULL,
                PRIMARY KEY (chat_id, question_id)
            );

            -- Quizzes sent per chat per calendar day
            CREATE TABLE IF NOT EXISTS quizzes_sent (
                chat_id INTEGER NOT NULL,
                day TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, day)
            );

            -- One-shot daily limit notice flag
            CREATE TABLE IF NOT EXISTS message_status (
                chat_id INTEGER NOT NULL,
                day TEXT NOT NULL,
                limit_reached INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (chat_id, day)
            );
            ",
            )
            .map_err(store_err)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| QuizPulseError::Store(e.to_string()))
    }
}

fn store_err(e: rusqlite::Error) -> QuizPulseError {
    QuizPulseError::Store(e.to_string())
}

fn kind_to_str(kind: ChatKind) -> &'static str {
    match kind {
        ChatKind::Direct => "direct",
        ChatKind::Group => "group",
    }
}

fn kind_from_str(s: &str) -> ChatKind {
    match s {
        "direct" => ChatKind::Direct,
        _ => ChatKind::Group,
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRecord> {
    let kind: String = row.get(3)?;
    let last_fired: Option<String> = row.get(6)?;
    Ok(ChatRecord {
        chat_id: row.get(0)?,
        active: row.get::<_, i64>(1)? != 0,
        paused: row.get::<_, i64>(2)? != 0,
        kind: kind_from_str(&kind),
        category: row.get(4)?,
        interval_secs: row.get::<_, i64>(5)? as u64,
        last_fired_at: last_fired
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    })
}

const RECORD_COLUMNS: &str =
    "chat_id, active, paused, kind, category, interval_secs, last_fired_at";

impl ChatStore for SqliteStore {
    fn get(&self, chat_id: ChatId) -> Result<Option<ChatRecord>> {
        self.lock()?
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM chats WHERE chat_id = ?1"),
                [chat_id],
                row_to_record,
            )
            .optional()
            .map_err(store_err)
    }

    fn put(&self, record: &ChatRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO chats
                 (chat_id, active, paused, kind, category, interval_secs, last_fired_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.chat_id,
                    record.active as i64,
                    record.paused as i64,
                    kind_to_str(record.kind),
                    record.category,
                    record.interval_secs as i64,
                    record.last_fired_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn set_active(&self, chat_id: ChatId, active: bool) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE chats SET active = ?1 WHERE chat_id = ?2",
                rusqlite::params![active as i64, chat_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn set_paused(&self, chat_id: ChatId, paused: bool) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE chats SET paused = ?1 WHERE chat_id = ?2",
                rusqlite::params![paused as i64, chat_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn set_interval(&self, chat_id: ChatId, interval_secs: u64) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE chats SET interval_secs = ?1 WHERE chat_id = ?2",
                rusqlite::params![interval_secs as i64, chat_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn record_fire(&self, chat_id: ChatId, at: DateTime<Utc>) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE chats SET last_fired_at = ?1 WHERE chat_id = ?2",
                rusqlite::params![at.to_rfc3339(), chat_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn list_active(&self) -> Result<Vec<ChatRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM chats WHERE active = 1 AND paused = 0"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(store_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

impl UsageStore for SqliteStore {
    fn used(&self, chat_id: ChatId) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT question_id FROM used_questions WHERE chat_id = ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([chat_id], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn record(&self, chat_id: ChatId, question_id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR IGNORE INTO used_questions (chat_id, question_id) VALUES (?1, ?2)",
                rusqlite::params![chat_id, question_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn reset(&self, chat_id: ChatId) -> Result<()> {
        self.lock()?
            .execute(
                "DELETE FROM used_questions WHERE chat_id = ?1",
                [chat_id],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

impl CounterStore for SqliteStore {
    fn day_count(&self, chat_id: ChatId, day: NaiveDate) -> Result<u32> {
        let count: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT count FROM quizzes_sent WHERE chat_id = ?1 AND day = ?2",
                rusqlite::params![chat_id, day.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(count.unwrap_or(0) as u32)
    }

    fn increment(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO quizzes_sent (chat_id, day, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(chat_id, day) DO UPDATE SET count = count + 1",
                rusqlite::params![chat_id, day.to_string()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn limit_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<bool> {
        let notified: Option<i64> = self
            .lock()?
            .query_row(
                "SELECT limit_reached FROM message_status WHERE chat_id = ?1 AND day = ?2",
                rusqlite::params![chat_id, day.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(notified.unwrap_or(0) != 0)
    }

    fn mark_notified(&self, chat_id: ChatId, day: NaiveDate) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO message_status (chat_id, day, limit_reached) VALUES (?1, ?2, 1)
                 ON CONFLICT(chat_id, day) DO UPDATE SET limit_reached = 1",
                rusqlite::params![chat_id, day.to_string()],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> (SqliteStore, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("quizpulse-store-{name}"));
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("test.db");
        std::fs::remove_file(&path).ok();
        (SqliteStore::open(&path).unwrap(), dir)
    }

    #[test]
    fn open_and_migrate() {
        let (store, dir) = temp_store("migrate");
        assert!(store.list_active().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn chat_record_round_trip() {
        let (store, dir) = temp_store("chats");
        let mut record = ChatRecord::new(-100123, ChatKind::Group, "rrb", 300);
        record.active = true;
        record.last_fired_at = Some(Utc::now());
        store.put(&record).unwrap();

        let loaded = store.get(-100123).unwrap().unwrap();
        assert!(loaded.active);
        assert_eq!(loaded.kind, ChatKind::Group);
        assert_eq!(loaded.category, "rrb");
        assert_eq!(loaded.interval_secs, 300);
        assert!(loaded.last_fired_at.is_some());

        assert!(store.get(42).unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn list_active_excludes_paused_and_stopped() {
        let (store, dir) = temp_store("active");
        let mut running = ChatRecord::new(1, ChatKind::Direct, "ssc", 30);
        running.active = true;
        store.put(&running).unwrap();

        let mut paused = ChatRecord::new(2, ChatKind::Direct, "ssc", 30);
        paused.active = true;
        paused.paused = true;
        store.put(&paused).unwrap();

        store.put(&ChatRecord::new(3, ChatKind::Group, "ssc", 30)).unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].chat_id, 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn updates_touch_single_fields() {
        let (store, dir) = temp_store("updates");
        let mut record = ChatRecord::new(1, ChatKind::Direct, "ssc", 30);
        record.active = true;
        store.put(&record).unwrap();

        store.set_paused(1, true).unwrap();
        store.set_interval(1, 120).unwrap();
        let at = Utc::now();
        store.record_fire(1, at).unwrap();

        let loaded = store.get(1).unwrap().unwrap();
        assert!(loaded.active);
        assert!(loaded.paused);
        assert_eq!(loaded.interval_secs, 120);
        assert_eq!(
            loaded.last_fired_at.unwrap().timestamp(),
            at.timestamp()
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn usage_round_trip_and_reset() {
        let (store, dir) = temp_store("usage");
        store.record(1, "q0").unwrap();
        store.record(1, "q1").unwrap();
        store.record(1, "q1").unwrap(); // duplicate ignored

        let mut used = store.used(1).unwrap();
        used.sort();
        assert_eq!(used, vec!["q0".to_string(), "q1".to_string()]);

        store.reset(1).unwrap();
        assert!(store.used(1).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn counters_accumulate_per_day() {
        let (store, dir) = temp_store("counters");
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(store.day_count(1, day).unwrap(), 0);

        for _ in 0..5 {
            store.increment(1, day).unwrap();
        }
        assert_eq!(store.day_count(1, day).unwrap(), 5);

        let tomorrow = day.succ_opt().unwrap();
        assert_eq!(store.day_count(1, tomorrow).unwrap(), 0);

        assert!(!store.limit_notified(1, day).unwrap());
        store.mark_notified(1, day).unwrap();
        assert!(store.limit_notified(1, day).unwrap());
        assert!(!store.limit_notified(1, tomorrow).unwrap());
        std::fs::remove_dir_all(&dir).ok();
    }
}
