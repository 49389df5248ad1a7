use crate::notify::NotificationDispatcher;
use crate::storage::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use tokio::time::Duration;
use wellness_common::config::WorkerConfig;
use wellness_common::NotificationKind;

/// Parses `kind -> "HH:MM"` pairs. Unknown kinds and malformed times are
/// logged and dropped.
pub fn parse_schedules<'a>(entries: impl IntoIterator<Item = (&'a String, &'a String)>) -> Vec<(NotificationKind, NaiveTime)> {
    let mut schedules = Vec::new();
    for (kind, at) in entries {
        let Some(parsed_kind) = NotificationKind::parse(kind) else {
            tracing::warn!(kind = %kind, "Ignoring schedule for unknown notification kind");
            continue;
        };
        match NaiveTime::parse_from_str(at, "%H:%M") {
            Ok(time) => schedules.push((parsed_kind, time)),
            Err(e) => tracing::warn!(kind = %kind, at = %at, "Ignoring malformed schedule time: {}", e),
        }
    }
    schedules
}

/// Kinds whose daily slot falls in `(last, now]`.
pub fn crossed_slots(schedules: &[(NotificationKind, NaiveTime)], last: DateTime<Utc>, now: DateTime<Utc>) -> Vec<NotificationKind> {
    if now <= last {
        return Vec::new();
    }
    let mut fired = Vec::new();
    let mut day = last.date_naive();
    while day <= now.date_naive() {
        for (kind, time) in schedules {
            let slot = day.and_time(*time).and_utc();
            if slot > last && slot <= now && !fired.contains(kind) {
                fired.push(*kind);
            }
        }
        day += ChronoDuration::days(1);
    }
    fired
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub fired: Vec<NotificationKind>,
    pub tasks_sent: usize,
    pub journal_purged: usize,
    pub logs_purged: usize,
}

pub struct ReminderWorker {
    store: DocumentStore,
    dispatcher: NotificationDispatcher,
    schedules: Vec<(NotificationKind, NaiveTime)>,
    tick_interval: Duration,
}

impl ReminderWorker {
    pub fn new(store: DocumentStore, dispatcher: NotificationDispatcher, config: &WorkerConfig) -> Self {
        Self {
            store,
            dispatcher,
            schedules: parse_schedules(&config.schedules),
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
        }
    }

    pub async fn run(&self) {
        tracing::info!(schedules = self.schedules.len(), "Reminder worker started.");
        let mut interval = tokio::time::interval(self.tick_interval);
        let mut last = Utc::now();

        loop {
            interval.tick().await;
            let now = Utc::now();
            let report = self.tick(last, now).await;
            if report != TickReport::default() {
                tracing::info!(?report, "Reminder tick");
            }
            last = now;
        }
    }

    /// One pass of the loop. Each step is independent; failures are logged.
    pub async fn tick(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for kind in crossed_slots(&self.schedules, last, now) {
            match self.dispatcher.dispatch_scheduled(kind, now).await {
                Ok(_) => report.fired.push(kind),
                Err(e) => tracing::error!(kind = kind.as_str(), "Scheduled dispatch failed: {:?}", e),
            }
        }

        match self.dispatcher.dispatch_due_tasks(now).await {
            Ok(sent) => report.tasks_sent = sent,
            Err(e) => tracing::error!("Task reminder cycle failed: {:?}", e),
        }

        match self.purge(now).await {
            Ok((journal, logs)) => {
                report.journal_purged = journal;
                report.logs_purged = logs;
            }
            Err(e) => tracing::error!("Retention purge failed: {:?}", e),
        }

        report
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || -> Result<(usize, usize)> {
            let journal = store.purge_expired_journal(now)?;
            let logs = store.purge_expired_notification_logs(now)?;
            Ok((journal, logs))
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextAggregator;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use wellness_common::config::{AppConfig, ContextConfig};

    fn default_schedules() -> Vec<(NotificationKind, NaiveTime)> {
        parse_schedules(&AppConfig::default().worker.schedules)
    }

    #[test]
    fn test_parse_schedules_drops_bad_entries() {
        let mut raw = BTreeMap::new();
        raw.insert("morning".to_string(), "07:30".to_string());
        raw.insert("brunch".to_string(), "10:00".to_string());
        raw.insert("lunch".to_string(), "noon".to_string());
        let parsed = parse_schedules(&raw);
        assert_eq!(parsed, vec![(NotificationKind::Morning, NaiveTime::from_hms_opt(7, 30, 0).unwrap())]);
        assert_eq!(default_schedules().len(), 4);
    }

    #[test]
    fn test_crossed_slots() {
        let schedules = default_schedules();
        let at = |d, h, m| Utc.with_ymd_and_hms(2026, 6, d, h, m, 0).unwrap();

        assert_eq!(crossed_slots(&schedules, at(1, 6, 59), at(1, 7, 0)), vec![NotificationKind::Morning]);
        assert!(crossed_slots(&schedules, at(1, 7, 0), at(1, 7, 1)).is_empty());
        assert!(crossed_slots(&schedules, at(1, 8, 0), at(1, 8, 0)).is_empty());

        let mut overnight = crossed_slots(&schedules, at(1, 20, 30), at(2, 7, 30));
        overnight.sort_by_key(|k| k.as_str());
        assert_eq!(overnight, vec![NotificationKind::Evening, NotificationKind::Morning]);
    }

    #[tokio::test]
    async fn test_tick_purges_expired_rows() -> Result<()> {
        let dir = tempdir()?;
        let store = DocumentStore::open(dir.path())?;
        let config = AppConfig::default();
        let context = ContextAggregator::new(store.clone(), ContextConfig::default());
        let dispatcher = NotificationDispatcher::new(store.clone(), context, None, None, config.notifications.clone());
        let worker = ReminderWorker::new(store.clone(), dispatcher, &config.worker);

        let past = Utc::now() - ChronoDuration::days(40);
        store.create_journal("u1", "wc1.old".into(), Default::default(), past, ChronoDuration::days(30))?;
        let now = Utc::now();
        store.create_journal("u1", "wc1.new".into(), Default::default(), now, ChronoDuration::days(30))?;

        let report = worker.tick(now - ChronoDuration::seconds(1), now).await;
        assert_eq!(report.journal_purged, 1);
        assert_eq!(report.tasks_sent, 0);
        assert_eq!(store.recent_journal("u1", 10, now)?.len(), 1);
        Ok(())
    }
}
