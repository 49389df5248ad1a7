use serde_json::json;
use wellness_common::{NotificationAction, NotificationContent, NotificationKind, Urgency};

pub const DEFAULT_ICON: &str = "/icon-192x192.png";
pub const STREAK_SUFFIX: &str = " 🔥 Keep your streak going!";

pub const MORNING_CHECKIN: &str = "morning_checkin";
pub const EVENING_REFLECTION: &str = "evening_reflection";
pub const TASK_REMINDER: &str = "task_reminder";

fn actions(complete: &str, snooze: &str) -> Vec<NotificationAction> {
    vec![
        NotificationAction { action: "complete".into(), title: complete.into() },
        NotificationAction { action: "snooze".into(), title: snooze.into() },
    ]
}

/// Fixed content for a scheduled reminder slot.
pub fn scheduled_template(kind: NotificationKind) -> (NotificationContent, Urgency) {
    let (title, body, complete, snooze, data) = match kind {
        NotificationKind::Morning => (
            "Good Morning! 🌅",
            "How are you feeling today? Log your morning mood and energy.",
            "Check In",
            "Later",
            json!({ "type": "checkin", "url": "/checkin" }),
        ),
        NotificationKind::Lunch => (
            "Lunch Time! 🍽️",
            "Don't forget to take a photo of your meal.",
            "Take Photo",
            "Skip",
            json!({ "type": "photo", "url": "/photo" }),
        ),
        NotificationKind::Supplement => (
            "Supplement Reminder 💊",
            "Time for your evening supplements!",
            "Taken",
            "Remind Later",
            json!({ "type": "supplement", "url": "/quick-log" }),
        ),
        NotificationKind::Evening => (
            "Evening Reflection 🌙",
            "What brought you joy today? Take a moment to reflect.",
            "Journal",
            "Later",
            json!({ "type": "journal", "url": "/checkin?type=evening" }),
        ),
    };
    let urgency = if kind == NotificationKind::Supplement { Urgency::High } else { Urgency::Normal };
    let content = NotificationContent {
        title: title.into(),
        body: body.into(),
        icon: Some(DEFAULT_ICON.into()),
        badge: Some(DEFAULT_ICON.into()),
        actions: actions(complete, snooze),
        data: Some(data),
        require_interaction: false,
    };
    (content, urgency)
}

/// Mood-aware wording. Unknown moods use the neutral variant.
fn mood_copy(notification_type: &str, mood: &str) -> Option<(&'static str, &'static str)> {
    let copy = match (notification_type, mood) {
        (MORNING_CHECKIN, "happy") => ("Rise and shine! 🌟", "Yesterday was great! Let's capture today's energy too."),
        (MORNING_CHECKIN, "anxious") => ("Good morning 💙", "New day, fresh start. How are you feeling?"),
        (MORNING_CHECKIN, "sad") => ("Morning check-in", "Taking it one day at a time. How's today looking?"),
        (MORNING_CHECKIN, _) => ("Good morning! ☀️", "How are you feeling today? Take a moment to check in."),
        (EVENING_REFLECTION, "happy") => ("Capture today's joy! ✨", "What moments brought you happiness today?"),
        (EVENING_REFLECTION, "anxious") => ("Wind down time", "Let's process today together. What's on your mind?"),
        (EVENING_REFLECTION, "sad") => ("Gentle evening check-in", "How was your day? Remember, tomorrow is a new beginning."),
        (EVENING_REFLECTION, _) => ("Evening reflection time", "What made today meaningful for you?"),
        (TASK_REMINDER, _) => ("Gentle reminder", "You mentioned this was important to you"),
        _ => return None,
    };
    Some(copy)
}

/// Personalised title and body for `notification_type` given the user's
/// dominant mood. `base` supplies icon, actions and data.
pub fn personalize(
    mut base: NotificationContent,
    notification_type: &str,
    mood: &str,
    has_streak: bool,
) -> NotificationContent {
    let (title, body) = mood_copy(notification_type, mood)
        .unwrap_or(("Wellness Check", "Time for your wellness check-in"));
    base.title = title.into();
    base.body = body.into();
    if has_streak {
        base.body.push_str(STREAK_SUFFIX);
    }
    base
}

/// Reminder for an extracted journal task.
pub fn task_reminder(task_id: &str, description: &str, context: &str, has_streak: bool) -> NotificationContent {
    let base = NotificationContent {
        icon: Some(DEFAULT_ICON.into()),
        badge: Some(DEFAULT_ICON.into()),
        data: Some(json!({ "taskId": task_id, "context": context, "url": "/journal" })),
        ..Default::default()
    };
    let mut content = personalize(base, TASK_REMINDER, "neutral", has_streak);
    if !description.trim().is_empty() {
        content.body = description.to_string();
        if has_streak {
            content.body.push_str(STREAK_SUFFIX);
        }
    }
    content
}

/// The personalised variant used for a scheduled slot, if any.
pub fn personalized_type(kind: NotificationKind) -> Option<&'static str> {
    match kind {
        NotificationKind::Morning => Some(MORNING_CHECKIN),
        NotificationKind::Evening => Some(EVENING_REFLECTION),
        _ => None,
    }
}
