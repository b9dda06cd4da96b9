//! Running the side effects returned by transitions.
//!
//! Analytics events are a write-only side channel and notifications are
//! best-effort: neither can fail the request that produced them.

use std::sync::{Arc, Mutex, MutexGuard};

use idv_types::{Effect, IdvEvent, Notification, UserId};

/// Receives structured analytics events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &IdvEvent);
}

/// Delivers user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, user: UserId, notification: &Notification) -> Result<(), String>;
}

/// Writes each event as one JSON log line under the `idv_events` target.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &IdvEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(target: "idv_events", event = event.name(), %json),
            Err(e) => tracing::warn!(event = event.name(), error = %e, "event not serializable"),
        }
    }
}

/// Logs the template name only; message bodies can carry one-time codes.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: UserId, notification: &Notification) -> Result<(), String> {
        tracing::info!(user_id = %user, template = notification.template(), "notification queued");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<IdvEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IdvEvent> {
        lock(&self.events).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(IdvEvent::name).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: &IdvEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Keeps every notification in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, Notification)>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(UserId, Notification)> {
        lock(&self.sent).clone()
    }

    pub fn templates(&self) -> Vec<&'static str> {
        lock(&self.sent).iter().map(|(_, n)| n.template()).collect()
    }

    /// The code from the most recent mailed letter.
    pub fn last_letter_code(&self) -> Option<String> {
        lock(&self.sent).iter().rev().find_map(|(_, n)| match n {
            Notification::GpoLetter { code } => Some(code.clone()),
            _ => None,
        })
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user: UserId, notification: &Notification) -> Result<(), String> {
        if *lock(&self.failing) {
            return Err("mailer unavailable".into());
        }
        lock(&self.sent).push((user, notification.clone()));
        Ok(())
    }
}

/// Fans effects out to the event sink and the notifier.
#[derive(Clone)]
pub struct EffectDispatcher {
    events: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
}

impl EffectDispatcher {
    pub fn new(events: Arc<dyn EventSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self { events, notifier }
    }

    /// Run `effects` in order. Call only after the state they describe is stored.
    pub fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Event(event) => self.events.record(&event),
                Effect::Notify {
                    user_id,
                    notification,
                } => {
                    if let Err(error) = self.notifier.notify(user_id, &notification) {
                        tracing::warn!(%user_id, template = notification.template(), %error, "notification failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idv_types::ProfileId;

    #[test]
    fn failed_notification_does_not_stop_later_effects() {
        let events = Arc::new(RecordingEventSink::new());
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.set_failing(true);
        let dispatcher = EffectDispatcher::new(events.clone(), notifier.clone());

        dispatcher.dispatch(vec![
            Effect::notify(UserId::new(1), Notification::AccountVerified),
            IdvEvent::ProfileActivated {
                profile_id: ProfileId::new(2),
                superseded: 0,
            }
            .into(),
        ]);

        assert!(notifier.sent().is_empty());
        assert_eq!(events.names(), vec!["profile_activated"]);
    }

    #[test]
    fn letter_code_is_recoverable_from_recorder() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify(UserId::new(1), &Notification::GpoLetter { code: "ABCD2345EF".into() })
            .unwrap();
        assert_eq!(notifier.last_letter_code().as_deref(), Some("ABCD2345EF"));
    }
}
