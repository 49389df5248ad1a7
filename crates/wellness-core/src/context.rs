use crate::storage::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use moka::future::Cache;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use wellness_common::config::ContextConfig;
use wellness_common::{
    BehaviorPattern, EmotionRecord, JournalEntry, MoodTrend, PendingTaskSummary, RecentMood, UserContext,
};

const MIN_PATTERN_OCCURRENCES: u32 = 3;
const STREAK_MIN_DAYS: u32 = 3;
const ACTIVE_TOPIC_LIMIT: usize = 5;
const TOPIC_MIN_WORD_LEN: usize = 5;

/// Most frequent value, ties going to whichever appears first in `items`.
pub(crate) fn most_frequent<'a, I>(items: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(k, _)| k.to_string())
}

pub fn analyze_mood_trend(emotions: &[EmotionRecord]) -> RecentMood {
    if emotions.is_empty() {
        return RecentMood { dominant: "neutral".into(), average: 5.0, trend: MoodTrend::Stable };
    }

    let dominant = most_frequent(emotions.iter().map(|e| e.emotion.as_str())).unwrap_or_else(|| "neutral".into());
    let mean = |xs: &[EmotionRecord]| xs.iter().map(|e| e.intensity).sum::<f32>() / xs.len() as f32;
    let average = mean(emotions);

    let midpoint = emotions.len() / 2;
    let trend = if midpoint == 0 {
        MoodTrend::Stable
    } else {
        let first = mean(&emotions[..midpoint]);
        let second = mean(&emotions[midpoint..]);
        if second > first + 1.0 {
            MoodTrend::Improving
        } else if second < first - 1.0 {
            MoodTrend::Declining
        } else {
            MoodTrend::Stable
        }
    };

    RecentMood { dominant, average, trend }
}

/// Primary emotions and long words from task contexts, top five by count.
pub fn extract_active_topics(entries: &[JournalEntry]) -> Vec<String> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for insights in entries.iter().filter_map(|e| e.extracted_insights.as_ref()) {
        if let Some(emotion) = &insights.emotion {
            *counts.entry(emotion.primary_emotion.clone()).or_default() += 1;
        }
        for task in &insights.tasks {
            for word in task.context.to_lowercase().split_whitespace() {
                if word.chars().count() >= TOPIC_MIN_WORD_LEN {
                    *counts.entry(word.to_string()).or_default() += 1;
                }
            }
        }
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    // BTreeMap order is alphabetical and the sort is stable, so ties stay alphabetical.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(ACTIVE_TOPIC_LIMIT).map(|(t, _)| t).collect()
}

fn time_of_day(ts: DateTime<Utc>) -> &'static str {
    match ts.hour() {
        h if h < 12 => "morning",
        h if h < 17 => "afternoon",
        _ => "evening",
    }
}

pub fn identify_patterns(entries: &[JournalEntry], now: DateTime<Utc>) -> Vec<BehaviorPattern> {
    let mut buckets: BTreeMap<&str, (u32, DateTime<Utc>)> = BTreeMap::new();
    for entry in entries {
        let slot = buckets.entry(time_of_day(entry.created_at)).or_insert((0, entry.created_at));
        slot.0 += 1;
        slot.1 = slot.1.max(entry.created_at);
    }

    let mut patterns: Vec<BehaviorPattern> = buckets
        .into_iter()
        .filter(|(_, (count, _))| *count >= MIN_PATTERN_OCCURRENCES)
        .map(|(bucket, (count, last))| BehaviorPattern {
            kind: format!("{}_journaling", bucket),
            frequency: count,
            last_occurrence: last,
        })
        .collect();

    if let Some(streak) = journaling_streak(entries, now) {
        patterns.push(streak);
    }
    patterns
}

/// Consecutive journaling days ending today or yesterday.
fn journaling_streak(entries: &[JournalEntry], now: DateTime<Utc>) -> Option<BehaviorPattern> {
    let days: BTreeSet<NaiveDate> = entries.iter().map(|e| e.created_at.date_naive()).collect();
    let today = now.date_naive();
    let mut day = if days.contains(&today) { today } else { today.pred_opt()? };

    let mut length = 0u32;
    while days.contains(&day) {
        length += 1;
        day = day.pred_opt()?;
    }

    if length < STREAK_MIN_DAYS {
        return None;
    }
    let last = entries.iter().map(|e| e.created_at).max()?;
    Some(BehaviorPattern { kind: "streak".into(), frequency: length, last_occurrence: last })
}

/// Builds and caches the per-user wellness summary.
#[derive(Clone)]
pub struct ContextAggregator {
    store: DocumentStore,
    cache: Cache<String, UserContext>,
    config: ContextConfig,
}

impl ContextAggregator {
    pub fn new(store: DocumentStore, config: ContextConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(std::time::Duration::from_secs(config.cache_ttl_secs))
            .build();
        Self { store, cache, config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub async fn user_context(&self, user_id: &str) -> Result<UserContext> {
        if let Some(cached) = self.cache.get(user_id).await {
            return Ok(cached);
        }
        let context = self.build(user_id, Utc::now())?;
        self.cache.insert(user_id.to_string(), context.clone()).await;
        Ok(context)
    }

    pub async fn invalidate(&self, user_id: &str) {
        self.cache.invalidate(user_id).await;
    }

    pub fn build(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserContext> {
        let emotion_ctx = self.store.get_emotion_context(user_id)?;

        let window_start = now - Duration::days(self.config.window_days);
        let recent: Vec<JournalEntry> = self
            .store
            .recent_journal(user_id, self.config.recent_entry_limit, now)?
            .into_iter()
            .filter(|e| e.created_at > window_start)
            .collect();

        let pending_tasks = self
            .store
            .pending_tasks(user_id, self.config.pending_task_limit)?
            .into_iter()
            .map(|t| PendingTaskSummary {
                description: t.description,
                priority: t.priority,
                scheduled_for: t.scheduled_for,
            })
            .collect();

        Ok(UserContext {
            recent_mood: analyze_mood_trend(&emotion_ctx.recent_emotions),
            active_topics: extract_active_topics(&recent),
            behavior_patterns: identify_patterns(&recent, now),
            pending_tasks,
        })
    }
}
