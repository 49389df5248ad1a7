use crate::context::{most_frequent, ContextAggregator};
use crate::llm::{extract_json_object, LLMClient};
use crate::storage::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use wellness_common::config::ContextConfig;
use wellness_common::{
    EmotionAnalysis, EmotionContext, EmotionRecord, EmotionalProfile, ExtractedTask, InsightTask, Insights,
    TaskPriority, TaskStatus,
};

const SYSTEM_PROMPT: &str = "You are a supportive wellness journaling assistant. Respond with a single JSON object and nothing else.";

const EMOTION_PROMPT: &str = "Analyze this journal entry and provide emotional insights.

Journal entry: {entry}

Respond with ONLY a JSON object containing:
- primaryEmotion: string (the main emotion, e.g. happy, sad, anxious, excited, frustrated, calm, grateful)
- emotionIntensity: number (1-10)
- sentiment: string (positive/negative/neutral/mixed)
- suggestedSupport: string (brief supportive message)";

const TASK_PROMPT: &str = "Extract any implicit or explicit tasks from this journal entry.

Journal entry: {entry}

Respond with ONLY a JSON object containing:
- tasks: array of objects with:
  - description: string (what needs to be done)
  - context: string (why this is important)
  - priority: string (high/medium/low)

If no tasks are found, return {\"tasks\": []}";

#[derive(Debug, Deserialize)]
struct TaskList {
    #[serde(default)]
    tasks: Vec<ExtractedTask>,
}

/// Result of enriching one journal entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub emotion: Option<EmotionAnalysis>,
    pub task_count: usize,
    pub suggested_support: Option<String>,
}

/// When an extracted task should be surfaced to the user.
pub fn schedule_for(priority: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let (days, hour) = match TaskPriority::parse(priority) {
        Some(TaskPriority::High) => (1, 9),
        Some(TaskPriority::Medium) => (3, 14),
        Some(TaskPriority::Low) => (7, 10),
        None => return now,
    };
    let date = (now + Duration::days(days)).date_naive();
    match NaiveTime::from_hms_opt(hour, 0, 0) {
        Some(time) => date.and_time(time).and_utc(),
        None => now,
    }
}

/// Folds a new analysis into the rolling emotion history and recomputes the profile.
pub fn apply_emotion(
    ctx: &mut EmotionContext,
    analysis: &EmotionAnalysis,
    now: DateTime<Utc>,
    retention_days: i64,
    max_emotions: usize,
) {
    ctx.recent_emotions.insert(0, EmotionRecord {
        emotion: analysis.primary_emotion.clone(),
        intensity: analysis.emotion_intensity,
        sentiment: analysis.sentiment.clone(),
        timestamp: now,
    });
    let cutoff = now - Duration::days(retention_days);
    ctx.recent_emotions.retain(|e| e.timestamp > cutoff);
    ctx.recent_emotions.truncate(max_emotions);

    let mut distribution: BTreeMap<String, u32> = BTreeMap::new();
    for e in &ctx.recent_emotions {
        *distribution.entry(e.emotion.clone()).or_default() += 1;
    }
    let total: f32 = ctx.recent_emotions.iter().map(|e| e.intensity).sum();
    let average_intensity = if ctx.recent_emotions.is_empty() {
        0.0
    } else {
        total / ctx.recent_emotions.len() as f32
    };

    ctx.emotional_profile = Some(EmotionalProfile {
        dominant_emotion: most_frequent(ctx.recent_emotions.iter().map(|e| e.emotion.as_str())),
        average_intensity,
        emotion_distribution: distribution,
        last_updated: now,
    });
}

fn parse_emotion(completion: &str) -> Option<EmotionAnalysis> {
    let mut analysis: EmotionAnalysis = serde_json::from_str(extract_json_object(completion)?).ok()?;
    if analysis.primary_emotion.trim().is_empty() {
        return None;
    }
    analysis.primary_emotion = analysis.primary_emotion.trim().to_lowercase();
    analysis.sentiment = analysis.sentiment.trim().to_lowercase();
    analysis.emotion_intensity = analysis.emotion_intensity.clamp(1.0, 10.0);
    Some(analysis)
}

fn parse_tasks(completion: &str) -> Vec<ExtractedTask> {
    extract_json_object(completion)
        .and_then(|json| serde_json::from_str::<TaskList>(json).ok())
        .map(|list| {
            list.tasks
                .into_iter()
                .filter(|t| !t.description.trim().is_empty())
                .map(|mut t| {
                    t.priority = t.priority.trim().to_lowercase();
                    t
                })
                .collect()
        })
        .unwrap_or_default()
}

fn task_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{}_{}", now.timestamp_millis(), suffix.to_lowercase())
}

#[derive(Clone)]
pub struct EnrichmentPipeline {
    store: DocumentStore,
    llm: Option<Arc<dyn LLMClient>>,
    context: ContextAggregator,
    config: ContextConfig,
}

impl EnrichmentPipeline {
    pub fn new(store: DocumentStore, llm: Option<Arc<dyn LLMClient>>, context: ContextAggregator) -> Self {
        let config = context.config().clone();
        Self { store, llm, context, config }
    }

    pub async fn analyze_emotion(&self, content: &str) -> Option<EmotionAnalysis> {
        let llm = self.llm.as_ref()?;
        let prompt = EMOTION_PROMPT.replace("{entry}", content);
        match llm.generate(Some(SYSTEM_PROMPT), &prompt).await {
            Ok(res) => {
                let parsed = parse_emotion(&res.data);
                if parsed.is_none() {
                    tracing::warn!("Emotion analysis returned no usable JSON");
                }
                parsed
            }
            Err(e) => {
                tracing::error!("Emotion analysis failed: {:?}", e);
                None
            }
        }
    }

    pub async fn extract_tasks(&self, content: &str) -> Vec<ExtractedTask> {
        let Some(llm) = self.llm.as_ref() else {
            return Vec::new();
        };
        let prompt = TASK_PROMPT.replace("{entry}", content);
        match llm.generate(Some(SYSTEM_PROMPT), &prompt).await {
            Ok(res) => parse_tasks(&res.data),
            Err(e) => {
                tracing::error!("Task extraction failed: {:?}", e);
                Vec::new()
            }
        }
    }

    pub async fn embed(&self, content: &str) -> Option<Vec<f32>> {
        let llm = self.llm.as_ref()?;
        match llm.embed(content).await {
            Ok(res) if !res.data.is_empty() => Some(res.data),
            Ok(_) => None,
            Err(e) => {
                tracing::error!("Embedding generation failed: {:?}", e);
                None
            }
        }
    }

    /// Enriches a journal entry with the decrypted `content` supplied by the
    /// client. Returns `None` when the entry does not exist.
    pub async fn process_entry(&self, user_id: &str, entry_id: &str, content: &str) -> Result<Option<ProcessOutcome>> {
        let now = Utc::now();
        if self.store.get_journal(user_id, entry_id, now)?.is_none() {
            return Ok(None);
        }
        if self.llm.is_none() {
            tracing::warn!(user_id, entry_id, "No AI provider configured; entry left unenriched");
        }

        let (emotion, tasks, embedding) = tokio::join!(
            self.analyze_emotion(content),
            self.extract_tasks(content),
            self.embed(content),
        );

        if emotion.is_some() || !tasks.is_empty() || embedding.is_some() {
            let insights = Insights { emotion: emotion.clone(), tasks: tasks.clone(), processed_at: now };
            let task_count = tasks.len();
            let updated = self.store.update_journal(user_id, entry_id, now, |entry| {
                if let Some(e) = &insights.emotion {
                    entry.metadata.insert("emotion".into(), Value::from(e.primary_emotion.clone()));
                    entry.metadata.insert("emotionIntensity".into(), Value::from(e.emotion_intensity));
                    entry.metadata.insert("sentiment".into(), Value::from(e.sentiment.clone()));
                }
                entry.metadata.insert("hasInsights".into(), Value::Bool(true));
                entry.metadata.insert("taskCount".into(), Value::from(task_count));
                entry.extracted_insights = Some(insights);
                entry.embedding = embedding.unwrap_or_default();
            })?;
            if updated.is_none() {
                // Deleted or expired while the provider calls were in flight.
                return Ok(None);
            }
        }

        for task in &tasks {
            let record = InsightTask {
                user_id: user_id.to_string(),
                task_id: task_id(now),
                task_type: "journal_task".into(),
                description: task.description.clone(),
                context: task.context.clone(),
                priority: task.priority.clone(),
                scheduled_for: schedule_for(&task.priority, now),
                status: TaskStatus::Pending,
                source_entry_id: entry_id.to_string(),
                created_at: now,
                attempts: 0,
            };
            self.store.put_task(&record)?;
        }

        if let Some(analysis) = &emotion {
            let retention = self.config.emotion_retention_days;
            let max = self.config.max_emotions;
            self.store.update_emotion_context(user_id, |ctx| apply_emotion(ctx, analysis, now, retention, max))?;
        }

        self.context.invalidate(user_id).await;
        tracing::info!(user_id, entry_id, tasks = tasks.len(), has_emotion = emotion.is_some(), "Journal entry enriched");

        Ok(Some(ProcessOutcome {
            suggested_support: emotion.as_ref().and_then(|e| e.suggested_support.clone()),
            emotion,
            task_count: tasks.len(),
        }))
    }
}
