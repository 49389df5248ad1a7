//! Reminder and insight delivery over push with SMS fallback.

pub mod gateway;
pub mod templates;

pub use gateway::{HttpPushGateway, HttpSmsGateway, PushError, PushGateway, SmsGateway};

use crate::context::ContextAggregator;
use crate::storage::DocumentStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use wellness_common::config::NotificationConfig;
use wellness_common::{
    DeliveryChannel, EmotionContext, InsightTask, NotificationContent, NotificationKind, NotificationLog, QuietHours,
    TaskStatus, Urgency, User,
};

const HIGH_PRIORITY_TYPES: [&str; 2] = ["crisis_support", "medication_reminder"];
const MAX_RETRY_DELAY_SECS: u64 = 7 * 24 * 3600;

/// Whether a scheduled reminder is still useful for this user right now.
pub fn should_send(kind: NotificationKind, ctx: &EmotionContext, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    match kind {
        NotificationKind::Morning if ctx.last_check_in.is_some_and(|t| t.date_naive() == today) => return false,
        NotificationKind::Supplement if ctx.supplements_taken.is_some_and(|t| t.date_naive() == today) => return false,
        NotificationKind::Evening => {
            let average = ctx.emotional_profile.as_ref().map_or(5.0, |p| p.average_intensity);
            if average > 8.0 {
                return false;
            }
        }
        _ => {}
    }

    if let Some(prefs) = &ctx.notification_preferences {
        if prefs.disabled_types.iter().any(|t| t == kind.as_str()) {
            return false;
        }
        if prefs.quiet_hours.is_some_and(|q| in_quiet_hours(q, now.hour())) {
            return false;
        }
    }
    true
}

/// Windows with `start > end` wrap past midnight. `start == end` is empty.
fn in_quiet_hours(quiet: QuietHours, hour: u32) -> bool {
    if quiet.start > quiet.end {
        hour >= quiet.start || hour < quiet.end
    } else {
        hour >= quiet.start && hour < quiet.end
    }
}

/// High-priority notifications may fall back to SMS.
pub fn is_high_priority(notification_type: &str, ctx: &EmotionContext) -> bool {
    if ctx.emotional_profile.as_ref().is_some_and(|p| p.average_intensity > 7.0) {
        return true;
    }
    HIGH_PRIORITY_TYPES.contains(&notification_type) || notification_type == NotificationKind::Supplement.as_str()
}

/// Wait before retry number `attempt` (1-based): the base delay doubled per
/// earlier failure, capped at a week.
pub fn retry_delay(base_secs: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    let secs = base_secs.saturating_mul(factor).min(MAX_RETRY_DELAY_SECS);
    Duration::seconds(secs as i64)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub sent: bool,
    pub channel: DeliveryChannel,
    pub content: NotificationContent,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub considered: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum UserOutcome {
    Sent,
    Skipped,
    Failed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: DocumentStore,
    context: ContextAggregator,
    push: Option<Arc<dyn PushGateway>>,
    sms: Option<Arc<dyn SmsGateway>>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: DocumentStore,
        context: ContextAggregator,
        push: Option<Arc<dyn PushGateway>>,
        sms: Option<Arc<dyn SmsGateway>>,
        config: NotificationConfig,
    ) -> Self {
        Self { store, context, push, sms, config }
    }

    fn push_payload(content: &NotificationContent, now: DateTime<Utc>) -> Result<String> {
        let mut value = serde_json::to_value(content)?;
        if let Some(obj) = value.as_object_mut() {
            obj.entry("icon").or_insert_with(|| templates::DEFAULT_ICON.into());
            obj.entry("badge").or_insert_with(|| templates::DEFAULT_ICON.into());
            obj.insert("timestamp".into(), now.timestamp_millis().into());
        }
        Ok(serde_json::to_string(&value)?)
    }

    /// Push first, then SMS when push did not succeed and the notification is
    /// high priority. Every attempt is written to the notification log.
    pub async fn deliver(
        &self,
        user: &User,
        notification_type: &str,
        content: NotificationContent,
        urgency: Urgency,
        high_priority: bool,
    ) -> Result<DeliveryReport> {
        let now = Utc::now();
        let mut channel = DeliveryChannel::None;

        if let Some(subscription) = &user.push_subscription {
            match &self.push {
                Some(push) => {
                    let payload = Self::push_payload(&content, now)?;
                    match push.send(subscription, &payload, self.config.push_ttl_secs, urgency).await {
                        Ok(()) => channel = DeliveryChannel::Push,
                        Err(PushError::Expired) => {
                            tracing::info!(user_id = %user.user_id, "Push subscription expired; removing it");
                            self.store.update_user(&user.user_id, |u| u.push_subscription = None)?;
                        }
                        Err(e) => tracing::warn!(user_id = %user.user_id, "Push notification failed: {}", e),
                    }
                }
                None => tracing::warn!("Push relay not configured; cannot deliver push notifications"),
            }
        }

        if channel == DeliveryChannel::None && high_priority {
            if let (Some(phone), Some(sms)) = (&user.phone, &self.sms) {
                let message = format!("{}: {}", content.title, content.body);
                match sms.send(phone, &message).await {
                    Ok(()) => channel = DeliveryChannel::Sms,
                    Err(e) => tracing::error!(user_id = %user.user_id, "SMS fallback failed: {:?}", e),
                }
            }
        }

        let sent = channel != DeliveryChannel::None;
        let log = NotificationLog {
            user_id: user.user_id.clone(),
            log_id: Uuid::new_v4().to_string(),
            notification_type: notification_type.to_string(),
            sent,
            channel,
            content: content.clone(),
            timestamp: now,
            expires_at: now + Duration::days(self.config.log_retention_days),
        };
        if let Err(e) = self.store.put_notification_log(&log) {
            tracing::error!(user_id = %user.user_id, "Failed to log notification: {:?}", e);
        }

        Ok(DeliveryReport { sent, channel, content })
    }

    /// Ad-hoc notification to one user. `None` when the user does not exist.
    pub async fn send_direct(&self, user_id: &str, content: NotificationContent, urgency: Urgency) -> Result<Option<DeliveryReport>> {
        let Some(user) = self.store.get_user(user_id)? else {
            return Ok(None);
        };
        let report = self.deliver(&user, "direct", content, urgency, urgency == Urgency::High).await?;
        Ok(Some(report))
    }

    async fn has_streak(&self, user_id: &str) -> bool {
        match self.context.user_context(user_id).await {
            Ok(ctx) => ctx.behavior_patterns.iter().any(|p| p.kind == "streak"),
            Err(e) => {
                tracing::warn!(user_id, "Could not load user context: {:?}", e);
                false
            }
        }
    }

    async fn dispatch_to_user(&self, user: &User, kind: NotificationKind, now: DateTime<Utc>) -> Result<UserOutcome> {
        let ctx = self.store.get_emotion_context(&user.user_id)?;
        if !should_send(kind, &ctx, now) {
            tracing::debug!(user_id = %user.user_id, kind = kind.as_str(), "Skipping notification based on context");
            return Ok(UserOutcome::Skipped);
        }

        let (mut content, urgency) = templates::scheduled_template(kind);
        if let Some(personal) = templates::personalized_type(kind) {
            let mood = ctx
                .emotional_profile
                .as_ref()
                .and_then(|p| p.dominant_emotion.clone())
                .unwrap_or_else(|| "neutral".into());
            let streak = self.has_streak(&user.user_id).await;
            content = templates::personalize(content, personal, &mood, streak);
        }

        let high_priority = is_high_priority(kind.as_str(), &ctx);
        let report = self.deliver(user, kind.as_str(), content, urgency, high_priority).await?;
        Ok(if report.sent { UserOutcome::Sent } else { UserOutcome::Failed })
    }

    /// Sends a scheduled reminder to every reachable user. Users are handled
    /// independently; one failure does not stop the others.
    pub async fn dispatch_scheduled(&self, kind: NotificationKind, now: DateTime<Utc>) -> Result<DispatchSummary> {
        let store = self.store.clone();
        let users = tokio::task::spawn_blocking(move || store.users_with_channel()).await??;
        tracing::info!(kind = kind.as_str(), users = users.len(), "Processing scheduled notifications");

        let outcomes = join_all(users.iter().map(|user| async move {
            let outcome = self.dispatch_to_user(user, kind, now).await;
            if let Err(e) = &outcome {
                tracing::error!(user_id = %user.user_id, "Failed to process notification: {:?}", e);
            }
            outcome
        }))
        .await;

        let mut summary = DispatchSummary { considered: users.len(), ..Default::default() };
        for outcome in outcomes {
            match outcome {
                Ok(UserOutcome::Sent) => summary.sent += 1,
                Ok(UserOutcome::Skipped) => summary.skipped += 1,
                Ok(UserOutcome::Failed) | Err(_) => summary.failed += 1,
            }
        }
        tracing::info!(kind = kind.as_str(), ?summary, "Completed scheduled notifications");
        Ok(summary)
    }

    /// Counts a failed delivery. The task is pushed back by the backoff, or
    /// dismissed once it has used up its attempts.
    fn record_task_failure(&self, task: &InsightTask, now: DateTime<Utc>) -> Result<()> {
        let max_attempts = self.config.task_max_attempts.max(1);
        let backoff_secs = self.config.task_retry_backoff_secs;
        let updated = self.store.update_task(&task.user_id, &task.task_id, |t| {
            t.attempts += 1;
            if t.attempts >= max_attempts {
                t.status = TaskStatus::Dismissed;
            } else {
                t.scheduled_for = now + retry_delay(backoff_secs, t.attempts);
            }
        })?;
        match updated {
            Some(t) if t.status == TaskStatus::Dismissed => {
                tracing::warn!(user_id = %t.user_id, task_id = %t.task_id, attempts = t.attempts, "Task reminder dismissed after repeated failures");
            }
            Some(t) => {
                tracing::debug!(user_id = %t.user_id, task_id = %t.task_id, retry_at = %t.scheduled_for, "Task reminder rescheduled");
            }
            None => {}
        }
        Ok(())
    }

    async fn dispatch_task(&self, task: &InsightTask, now: DateTime<Utc>) -> Result<bool> {
        let user = match self.store.get_user(&task.user_id)? {
            Some(u) if u.has_notification_channel() => u,
            _ => {
                self.store.set_task_status(&task.user_id, &task.task_id, TaskStatus::Dismissed)?;
                return Ok(false);
            }
        };
        let ctx = self.store.get_emotion_context(&user.user_id)?;
        let streak = self.has_streak(&user.user_id).await;
        let content = templates::task_reminder(&task.task_id, &task.description, &task.context, streak);
        let high_priority = is_high_priority(templates::TASK_REMINDER, &ctx);

        let report = self.deliver(&user, templates::TASK_REMINDER, content, Urgency::Normal, high_priority).await?;
        if report.sent {
            self.store.set_task_status(&task.user_id, &task.task_id, TaskStatus::Sent)?;
        } else {
            self.record_task_failure(task, now)?;
        }
        Ok(report.sent)
    }

    /// Delivers pending insight tasks whose slot has arrived. Returns how many
    /// were sent. Undelivered tasks are retried with backoff.
    pub async fn dispatch_due_tasks(&self, now: DateTime<Utc>) -> Result<usize> {
        let store = self.store.clone();
        let due = tokio::task::spawn_blocking(move || store.due_tasks(now)).await??;
        let mut sent = 0;
        for task in &due {
            match self.dispatch_task(task, now).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(user_id = %task.user_id, task_id = %task.task_id, "Task reminder failed: {:?}", e),
            }
        }
        if !due.is_empty() {
            tracing::info!(due = due.len(), sent, "Dispatched task reminders");
        }
        Ok(sent)
    }
}
