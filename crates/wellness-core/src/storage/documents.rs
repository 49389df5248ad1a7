//! Typed JSON tables over [`KvStore`].
//!
//! Every table is a key prefix. Time-ordered tables embed a zero-padded
//! millisecond timestamp so lexicographic order equals chronological order.
//! Tables with retention also write an `exp:` index entry per row, ordered by
//! expiry, so purging is a range scan that never decodes documents.

use super::kv::KvStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use wellness_common::{
    EmotionContext, InsightTask, JournalEntry, NotificationLog, TaskStatus, TrackingRecord, User,
};

const USER_PREFIX: &str = "user:";
const EMAIL_PREFIX: &str = "user_email:";
const TRACK_PREFIX: &str = "track:";
const JOURNAL_PREFIX: &str = "journal:";
const CONTEXT_PREFIX: &str = "ctx:";
const TASK_PREFIX: &str = "task:";
const NOTIF_LOG_PREFIX: &str = "notif_log:";
const EXPIRY_PREFIX: &str = "exp:";

fn ts_segment(ms: i64) -> String {
    format!("{:020}", ms.max(0))
}

fn user_key(user_id: &str) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}

fn email_key(email: &str) -> String {
    format!("{}{}", EMAIL_PREFIX, email.trim().to_lowercase())
}

fn journal_prefix(user_id: &str) -> String {
    format!("{}{}:", JOURNAL_PREFIX, user_id)
}

fn journal_key(user_id: &str, entry_id: &str) -> Option<String> {
    let ms: i64 = entry_id.parse().ok()?;
    Some(format!("{}{}", journal_prefix(user_id), ts_segment(ms)))
}

fn track_prefix(user_id: &str) -> String {
    format!("{}{}:", TRACK_PREFIX, user_id)
}

fn task_key(user_id: &str, task_id: &str) -> String {
    format!("{}{}:{}", TASK_PREFIX, user_id, task_id)
}

fn notif_log_prefix(user_id: &str) -> String {
    format!("{}{}:", NOTIF_LOG_PREFIX, user_id)
}

/// Index key for `row_key` in `table`, ordered by expiry time.
fn expiry_key(table: &str, expires_at: DateTime<Utc>, row_key: &str) -> String {
    format!("{}{}{}:{}", EXPIRY_PREFIX, table, ts_segment(expires_at.timestamp_millis()), row_key)
}

#[derive(Clone)]
pub struct DocumentStore {
    kv: KvStore,
    write_lock: Arc<Mutex<()>>,
}

impl DocumentStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv, write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(Self::new(KvStore::open(path)?))
    }

    /// Serialises read-modify-write cycles.
    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| anyhow!("document store lock poisoned"))
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.kv.put(key.as_bytes(), &bytes)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key.as_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt document at {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn decode_rows<T: DeserializeOwned>(rows: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<T>> {
        rows.into_iter()
            .map(|(k, v)| {
                serde_json::from_slice(&v)
                    .with_context(|| format!("corrupt document at {}", String::from_utf8_lossy(&k)))
            })
            .collect()
    }

    // ── Users ─────────────────────────────────────────────────────

    /// Inserts a user and its email index. Returns false when the email is taken.
    pub fn create_user(&self, user: &User) -> Result<bool> {
        let _guard = self.lock()?;
        let email_key = email_key(&user.email);
        if self.kv.get(email_key.as_bytes())?.is_some() {
            return Ok(false);
        }
        self.kv.write_batch(
            vec![
                (user_key(&user.user_id).into_bytes(), serde_json::to_vec(user)?),
                (email_key.into_bytes(), user.user_id.clone().into_bytes()),
            ],
            Vec::new(),
        )?;
        Ok(true)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.get_json(&user_key(user_id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.kv.get(email_key(email).as_bytes())? {
            Some(id) => self.get_user(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    /// Applies `f` to the stored user and bumps `updated_at`.
    pub fn update_user<F>(&self, user_id: &str, f: F) -> Result<Option<User>>
    where
        F: FnOnce(&mut User),
    {
        let _guard = self.lock()?;
        let key = user_key(user_id);
        let Some(mut user) = self.get_json::<User>(&key)? else {
            return Ok(None);
        };
        f(&mut user);
        user.updated_at = Utc::now();
        self.put_json(&key, &user)?;
        Ok(Some(user))
    }

    /// Users that can receive a notification on at least one channel.
    pub fn users_with_channel(&self) -> Result<Vec<User>> {
        let users: Vec<User> = Self::decode_rows(self.kv.scan(USER_PREFIX.as_bytes())?)?;
        Ok(users.into_iter().filter(User::has_notification_channel).collect())
    }

    // ── Tracking ──────────────────────────────────────────────────

    pub fn put_tracking(&self, record: &TrackingRecord) -> Result<()> {
        let key = format!(
            "{}{}:{}",
            track_prefix(&record.user_id),
            ts_segment(record.timestamp.timestamp_millis()),
            record.record_id
        );
        self.put_json(&key, record)
    }

    /// Records with `start <= timestamp <= end`, most recent first.
    pub fn tracking_between(&self, user_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<TrackingRecord>> {
        let prefix = track_prefix(user_id);
        let from = format!("{}{}", prefix, ts_segment(start.timestamp_millis()));
        let to = format!("{}{}", prefix, ts_segment(end.timestamp_millis() + 1));
        let mut records: Vec<TrackingRecord> = Self::decode_rows(self.kv.scan_range(from.as_bytes(), to.as_bytes())?)?;
        records.reverse();
        Ok(records)
    }

    // ── Journal ───────────────────────────────────────────────────

    /// Stores a new entry keyed by creation time in milliseconds, bumping the
    /// id until it is unique for the user.
    pub fn create_journal(
        &self,
        user_id: &str,
        encrypted_content: String,
        metadata: serde_json::Map<String, serde_json::Value>,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<JournalEntry> {
        let _guard = self.lock()?;
        let mut id = now.timestamp_millis();
        let prefix = journal_prefix(user_id);
        while self.kv.get(format!("{}{}", prefix, ts_segment(id)).as_bytes())?.is_some() {
            id += 1;
        }

        let entry = JournalEntry {
            user_id: user_id.to_string(),
            entry_id: id.to_string(),
            encrypted_content,
            metadata,
            created_at: now,
            updated_at: now,
            expires_at: now + retention,
            extracted_insights: None,
            embedding: Vec::new(),
        };
        let key = format!("{}{}", prefix, ts_segment(id));
        self.put_expiring(JOURNAL_PREFIX, &key, entry.expires_at, &entry)?;
        Ok(entry)
    }

    /// Unexpired entry by id.
    pub fn get_journal(&self, user_id: &str, entry_id: &str, now: DateTime<Utc>) -> Result<Option<JournalEntry>> {
        let Some(key) = journal_key(user_id, entry_id) else {
            return Ok(None);
        };
        let entry: Option<JournalEntry> = self.get_json(&key)?;
        Ok(entry.filter(|e| !e.is_expired(now)))
    }

    /// Applies `f` to an unexpired entry and bumps `updated_at`.
    pub fn update_journal<F>(&self, user_id: &str, entry_id: &str, now: DateTime<Utc>, f: F) -> Result<Option<JournalEntry>>
    where
        F: FnOnce(&mut JournalEntry),
    {
        let _guard = self.lock()?;
        let Some(key) = journal_key(user_id, entry_id) else {
            return Ok(None);
        };
        let Some(mut entry) = self.get_json::<JournalEntry>(&key)?.filter(|e| !e.is_expired(now)) else {
            return Ok(None);
        };
        f(&mut entry);
        entry.updated_at = now;
        self.put_json(&key, &entry)?;
        Ok(Some(entry))
    }

    /// Deleting a missing entry is not an error.
    pub fn delete_journal(&self, user_id: &str, entry_id: &str) -> Result<()> {
        let _guard = self.lock()?;
        let Some(key) = journal_key(user_id, entry_id) else {
            return Ok(());
        };
        let Some(entry) = self.get_json::<JournalEntry>(&key)? else {
            return Ok(());
        };
        let index = expiry_key(JOURNAL_PREFIX, entry.expires_at, &key);
        self.kv.write_batch(Vec::new(), vec![key.into_bytes(), index.into_bytes()])
    }

    /// One page of entries, newest first, starting strictly before
    /// `before_entry_id`. The second value is the cursor for the next page.
    pub fn journal_page(
        &self,
        user_id: &str,
        limit: usize,
        before_entry_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<JournalEntry>, Option<String>)> {
        let prefix = journal_prefix(user_id);
        let before = match before_entry_id {
            Some(id) => Some(journal_key(user_id, id).ok_or_else(|| anyhow!("invalid cursor"))?),
            None => None,
        };
        let mut rows = self.kv.scan_reverse(prefix.as_bytes(), before.as_deref().map(str::as_bytes), limit + 1)?;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let entries: Vec<JournalEntry> = Self::decode_rows(rows)?;
        let next = if has_more { entries.last().map(|e| e.entry_id.clone()) } else { None };
        Ok((entries.into_iter().filter(|e| !e.is_expired(now)).collect(), next))
    }

    /// Up to `limit` unexpired entries, newest first.
    pub fn recent_journal(&self, user_id: &str, limit: usize, now: DateTime<Utc>) -> Result<Vec<JournalEntry>> {
        let rows = self.kv.scan_reverse(journal_prefix(user_id).as_bytes(), None, limit)?;
        let entries: Vec<JournalEntry> = Self::decode_rows(rows)?;
        Ok(entries.into_iter().filter(|e| !e.is_expired(now)).collect())
    }

    pub fn purge_expired_journal(&self, now: DateTime<Utc>) -> Result<usize> {
        self.purge_expired(JOURNAL_PREFIX, now)
    }

    // ── Emotion context ───────────────────────────────────────────

    pub fn get_emotion_context(&self, user_id: &str) -> Result<EmotionContext> {
        Ok(self.get_json(&format!("{}{}", CONTEXT_PREFIX, user_id))?.unwrap_or_default())
    }

    /// Read-modify-write of the user's context, creating it when absent.
    pub fn update_emotion_context<F>(&self, user_id: &str, f: F) -> Result<EmotionContext>
    where
        F: FnOnce(&mut EmotionContext),
    {
        let _guard = self.lock()?;
        let key = format!("{}{}", CONTEXT_PREFIX, user_id);
        let mut ctx: EmotionContext = self.get_json(&key)?.unwrap_or_default();
        f(&mut ctx);
        ctx.last_updated = Some(Utc::now());
        self.put_json(&key, &ctx)?;
        Ok(ctx)
    }

    // ── Insight queue ─────────────────────────────────────────────

    pub fn put_task(&self, task: &InsightTask) -> Result<()> {
        self.put_json(&task_key(&task.user_id, &task.task_id), task)
    }

    /// Pending tasks for a user, earliest scheduled first.
    pub fn pending_tasks(&self, user_id: &str, limit: usize) -> Result<Vec<InsightTask>> {
        let prefix = format!("{}{}:", TASK_PREFIX, user_id);
        let mut tasks: Vec<InsightTask> = Self::decode_rows(self.kv.scan(prefix.as_bytes())?)?;
        tasks.retain(|t| t.status == TaskStatus::Pending);
        tasks.sort_by_key(|t| t.scheduled_for);
        tasks.truncate(limit);
        Ok(tasks)
    }

    /// Pending tasks across all users whose slot has arrived.
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<InsightTask>> {
        let mut tasks: Vec<InsightTask> = Self::decode_rows(self.kv.scan(TASK_PREFIX.as_bytes())?)?;
        tasks.retain(|t| t.status == TaskStatus::Pending && t.scheduled_for <= now);
        tasks.sort_by_key(|t| t.scheduled_for);
        Ok(tasks)
    }

    /// Applies `f` to a stored task. `None` when it does not exist.
    pub fn update_task<F>(&self, user_id: &str, task_id: &str, f: F) -> Result<Option<InsightTask>>
    where
        F: FnOnce(&mut InsightTask),
    {
        let _guard = self.lock()?;
        let key = task_key(user_id, task_id);
        let Some(mut task) = self.get_json::<InsightTask>(&key)? else {
            return Ok(None);
        };
        f(&mut task);
        self.put_json(&key, &task)?;
        Ok(Some(task))
    }

    pub fn set_task_status(&self, user_id: &str, task_id: &str, status: TaskStatus) -> Result<bool> {
        Ok(self.update_task(user_id, task_id, |t| t.status = status)?.is_some())
    }

    // ── Notification log ──────────────────────────────────────────

    pub fn put_notification_log(&self, log: &NotificationLog) -> Result<()> {
        let key = format!(
            "{}{}:{}",
            notif_log_prefix(&log.user_id),
            ts_segment(log.timestamp.timestamp_millis()),
            log.log_id
        );
        self.put_expiring(NOTIF_LOG_PREFIX, &key, log.expires_at, log)
    }

    pub fn notification_logs(&self, user_id: &str, limit: usize) -> Result<Vec<NotificationLog>> {
        Self::decode_rows(self.kv.scan_reverse(notif_log_prefix(user_id).as_bytes(), None, limit)?)
    }

    pub fn purge_expired_notification_logs(&self, now: DateTime<Utc>) -> Result<usize> {
        self.purge_expired(NOTIF_LOG_PREFIX, now)
    }

    // ── Expiry index ──────────────────────────────────────────────

    /// Writes the document and its expiry index entry in one batch.
    fn put_expiring<T: Serialize>(&self, table: &str, key: &str, expires_at: DateTime<Utc>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let index = expiry_key(table, expires_at, key);
        self.kv.write_batch(
            vec![(key.as_bytes().to_vec(), bytes), (index.into_bytes(), key.as_bytes().to_vec())],
            Vec::new(),
        )
    }

    /// Deletes every row of `table` whose expiry is at or before `now`,
    /// together with its index entries. Returns the number of rows removed.
    fn purge_expired(&self, table: &str, now: DateTime<Utc>) -> Result<usize> {
        let start = format!("{}{}", EXPIRY_PREFIX, table);
        let end = format!("{}{}", start, ts_segment(now.timestamp_millis().saturating_add(1)));
        let rows = self.kv.scan_range(start.as_bytes(), end.as_bytes())?;
        let count = rows.len();
        if count > 0 {
            let mut deletes = Vec::with_capacity(count * 2);
            for (index, row_key) in rows {
                deletes.push(row_key);
                deletes.push(index);
            }
            self.kv.write_batch(Vec::new(), deletes)?;
        }
        Ok(count)
    }
}
