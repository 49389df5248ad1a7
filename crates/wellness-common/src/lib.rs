use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::collections::BTreeMap;

pub mod config;
pub mod crypto;

pub const DEFAULT_TIMEZONE: &str = "America/New_York";

fn default_morning() -> String { "07:00".to_string() }
fn default_lunch() -> String { "12:00".to_string() }
fn default_evening() -> String { "18:00".to_string() }
fn default_night() -> String { "21:00".to_string() }
fn default_timezone() -> String { DEFAULT_TIMEZONE.to_string() }

// ── Users ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationTimes {
    #[serde(default = "default_morning")]
    pub morning: String,
    #[serde(default = "default_lunch")]
    pub lunch: String,
    #[serde(default = "default_evening")]
    pub evening: String,
    #[serde(default = "default_night")]
    pub night: String,
}

impl Default for NotificationTimes {
    fn default() -> Self {
        Self {
            morning: default_morning(),
            lunch: default_lunch(),
            evening: default_evening(),
            night: default_night(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub notifications: NotificationTimes,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: NotificationTimes::default(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Browser push subscription as produced by `PushSubscription.toJSON()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: PushSubscriptionKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_subscription: Option<PushSubscription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Hex salt for client-side key derivation. Shared across devices.
    pub encryption_salt: String,
}

impl User {
    pub fn new(email: &str, password_hash: String, encryption_salt: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4().to_string(),
            email: email.trim().to_lowercase(),
            password_hash,
            created_at: now,
            updated_at: now,
            last_login: None,
            preferences: Preferences::default(),
            push_subscription: None,
            phone: None,
            encryption_salt,
        }
    }

    pub fn has_notification_channel(&self) -> bool {
        self.push_subscription.is_some() || self.phone.is_some()
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login: self.last_login,
            preferences: self.preferences.clone(),
            push_subscription: self.push_subscription.clone(),
            phone: self.phone.clone(),
            encryption_salt: self.encryption_salt.clone(),
        }
    }
}

/// A user record without the password hash, safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub user_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub preferences: Preferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_subscription: Option<PushSubscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub encryption_salt: String,
}

// ── Tracking ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackingKind {
    Checkin,
    Weight,
    Supplement,
    Photo,
}

impl TrackingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingKind::Checkin => "checkin",
            TrackingKind::Weight => "weight",
            TrackingKind::Supplement => "supplement",
            TrackingKind::Photo => "photo",
        }
    }
}

/// Append-only tracking event. Exactly one of `data` / `encrypted_data` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub record_id: String,
    #[serde(rename = "type")]
    pub kind: TrackingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<String>,
}

impl TrackingRecord {
    pub fn plain(user_id: &str, kind: TrackingKind, timestamp: DateTime<Utc>, data: serde_json::Value) -> Self {
        Self {
            user_id: user_id.to_string(),
            timestamp,
            record_id: Uuid::new_v4().to_string(),
            kind,
            data: Some(data),
            encrypted_data: None,
        }
    }

    pub fn encrypted(user_id: &str, kind: TrackingKind, timestamp: DateTime<Utc>, envelope: String) -> Self {
        Self {
            user_id: user_id.to_string(),
            timestamp,
            record_id: Uuid::new_v4().to_string(),
            kind,
            data: None,
            encrypted_data: Some(envelope),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckinPeriod {
    Morning,
    Evening,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinData {
    #[serde(rename = "type")]
    pub period: CheckinPeriod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub happiness_reflection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_reflection: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Lbs,
    Kg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightData {
    pub weight: f64,
    pub unit: WeightUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementData {
    pub taken: bool,
    #[serde(default)]
    pub supplements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhotoType {
    Selfie,
    Food,
}

impl PhotoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoType::Selfie => "selfie",
            PhotoType::Food => "food",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoData {
    pub photo_type: PhotoType,
    pub photo_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ── Journal ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmotionAnalysis {
    pub primary_emotion: String,
    pub emotion_intensity: f32,
    pub sentiment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_support: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedTask {
    pub description: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub priority: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(TaskPriority::High),
            "medium" => Some(TaskPriority::Medium),
            "low" => Some(TaskPriority::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub emotion: Option<EmotionAnalysis>,
    #[serde(default)]
    pub tasks: Vec<ExtractedTask>,
    pub processed_at: DateTime<Utc>,
}

/// Stored journal record. Content is an opaque client-side envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub user_id: String,
    pub entry_id: String,
    pub encrypted_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_insights: Option<Insights>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl JournalEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn view(&self) -> JournalEntryView {
        JournalEntryView {
            entry_id: self.entry_id.clone(),
            encrypted_content: self.encrypted_content.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing projection of a journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntryView {
    pub entry_id: String,
    pub encrypted_content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Insight queue ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Sent,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightTask {
    pub user_id: String,
    pub task_id: String,
    pub task_type: String,
    pub description: String,
    pub context: String,
    pub priority: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
    pub source_entry_id: String,
    pub created_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

// ── Emotion context ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionRecord {
    pub emotion: String,
    pub intensity: f32,
    pub sentiment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalProfile {
    pub dominant_emotion: Option<String>,
    pub average_intensity: f32,
    pub emotion_distribution: BTreeMap<String, u32>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    #[serde(default)]
    pub disabled_types: Vec<String>,
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
}

/// Rolling per-user state written by enrichment and tracking, read by
/// the context aggregator and the notification dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmotionContext {
    #[serde(default)]
    pub recent_emotions: Vec<EmotionRecord>,
    #[serde(default)]
    pub emotional_profile: Option<EmotionalProfile>,
    #[serde(default)]
    pub last_check_in: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supplements_taken: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notification_preferences: Option<NotificationPreferences>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

// ── Aggregated user context ───────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoodTrend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentMood {
    pub dominant: String,
    pub average: f32,
    pub trend: MoodTrend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorPattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub frequency: u32,
    pub last_occurrence: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingTaskSummary {
    pub description: String,
    pub priority: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub recent_mood: RecentMood,
    pub active_topics: Vec<String>,
    pub behavior_patterns: Vec<BehaviorPattern>,
    pub pending_tasks: Vec<PendingTaskSummary>,
}

// ── Notifications ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub require_interaction: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::VeryLow => "very-low",
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

/// Scheduled reminder slots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Morning,
    Lunch,
    Supplement,
    Evening,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Morning,
        NotificationKind::Lunch,
        NotificationKind::Supplement,
        NotificationKind::Evening,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Morning => "morning",
            NotificationKind::Lunch => "lunch",
            NotificationKind::Supplement => "supplement",
            NotificationKind::Evening => "evening",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Push,
    Sms,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub user_id: String,
    pub log_id: String,
    pub notification_type: String,
    pub sent: bool,
    pub channel: DeliveryChannel,
    pub content: NotificationContent,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("  Someone@Example.COM ", "hash".into(), "00ff".into());
        assert_eq!(user.email, "someone@example.com");
        assert_eq!(user.preferences.notifications.morning, "07:00");
        assert_eq!(user.preferences.notifications.night, "21:00");
        assert_eq!(user.preferences.timezone, DEFAULT_TIMEZONE);
        assert!(!user.has_notification_channel());

        let public = serde_json::to_value(user.to_public()).unwrap();
        assert!(public.get("passwordHash").is_none());
        assert_eq!(public["encryptionSalt"], "00ff");
    }

    #[test]
    fn test_tracking_record_wire_shape() {
        let record = TrackingRecord::plain("u1", TrackingKind::Weight, Utc::now(), json!({"weight": 70.5, "unit": "kg"}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "weight");
        assert_eq!(value["userId"], "u1");
        assert!(value.get("encryptedData").is_none());
    }

    #[test]
    fn test_checkin_data_uses_type_field() {
        let data: CheckinData = serde_json::from_value(json!({
            "type": "evening",
            "mood": 7,
            "happinessReflection": "a long walk"
        })).unwrap();
        assert_eq!(data.period, CheckinPeriod::Evening);
        assert_eq!(data.mood, Some(7));
        assert_eq!(data.happiness_reflection.as_deref(), Some("a long walk"));
    }

    #[test]
    fn test_task_priority_parse() {
        assert_eq!(TaskPriority::parse("HIGH"), Some(TaskPriority::High));
        assert_eq!(TaskPriority::parse(" low "), Some(TaskPriority::Low));
        assert_eq!(TaskPriority::parse("urgent"), None);
    }

    #[test]
    fn test_notification_kind_parse() {
        assert_eq!(NotificationKind::parse("supplement"), Some(NotificationKind::Supplement));
        assert_eq!(NotificationKind::parse("Morning"), None);
        assert_eq!(serde_json::to_value(NotificationKind::Evening).unwrap(), "evening");
    }

    #[test]
    fn test_emotion_context_tolerates_missing_fields() {
        let ctx: EmotionContext = serde_json::from_value(json!({})).unwrap();
        assert!(ctx.recent_emotions.is_empty());
        assert!(ctx.emotional_profile.is_none());
    }
}
