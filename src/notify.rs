use crate::config::NotificationConfig;

/// Told when the mailbox contents change.
///
/// `settings` is the copy the current tick took at its start, so a notifier
/// never needs the config lock.
pub trait Notifier: Send + Sync {
    fn on_new_messages(&self, settings: &NotificationConfig);
}

/// Stand-in until a toast/tray layer is attached: reports through the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }

    fn announcements(settings: &NotificationConfig) -> Vec<String> {
        let mut out = Vec::new();
        if settings.system {
            out.push("New SMS received!".to_string());
        }
        let ring = settings.ring.trim();
        if !ring.is_empty() && ring != "None" {
            out.push(format!("ring requested: {ring}"));
        }
        out
    }
}

impl Notifier for LogNotifier {
    fn on_new_messages(&self, settings: &NotificationConfig) {
        for line in Self::announcements(settings) {
            log::info!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcements_follow_settings() {
        let defaults = NotificationConfig::default();
        assert_eq!(
            LogNotifier::announcements(&defaults),
            vec!["New SMS received!".to_string(), "ring requested: Bongo".to_string()]
        );

        let quiet = NotificationConfig {
            system: false,
            ring: " None".into(),
            ..NotificationConfig::default()
        };
        assert!(LogNotifier::announcements(&quiet).is_empty());
    }
}
