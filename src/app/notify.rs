use tracing::info;

use crate::app::config::NotificationSettings;

/// Outbound notification seam. The core never talks to a desktop
/// notification service directly; hosts plug in whatever they have.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str);
    fn play_sound(&self);
}

/// Default sink used headless: notifications land in the log stream.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, title: &str, body: &str) {
        info!(title = %title, body = %body, "notification");
    }

    fn play_sound(&self) {
        info!("notification sound");
    }
}

/// Applies the user's notification preferences before touching the sink.
/// Sound only ever plays alongside a delivered notification.
pub fn dispatch(
    settings: &NotificationSettings,
    sink: &dyn NotificationSink,
    title: &str,
    body: &str,
) {
    if !settings.notifications_enabled {
        return;
    }
    sink.notify(title, body);
    if settings.sound_enabled {
        sink.play_sound();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        notified: Mutex<Vec<(String, String)>>,
        sounds: Mutex<usize>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, title: &str, body: &str) {
            self.notified
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
        }
        fn play_sound(&self) {
            *self.sounds.lock().unwrap() += 1;
        }
    }

    #[test]
    fn disabled_notifications_suppress_everything() {
        let sink = RecordingSink::default();
        let settings = NotificationSettings {
            notifications_enabled: false,
            sound_enabled: true,
        };
        dispatch(&settings, &sink, "Backup", "done");
        assert!(sink.notified.lock().unwrap().is_empty());
        assert_eq!(*sink.sounds.lock().unwrap(), 0);
    }

    #[test]
    fn sound_respects_its_own_toggle() {
        let sink = RecordingSink::default();
        let settings = NotificationSettings {
            notifications_enabled: true,
            sound_enabled: false,
        };
        dispatch(&settings, &sink, "Backup", "done");
        assert_eq!(sink.notified.lock().unwrap().len(), 1);
        assert_eq!(*sink.sounds.lock().unwrap(), 0);
    }
}
