//! Events raised to the external event bus (spec §6). The bus itself is
//! an external collaborator — the library's high-level device enumeration
//! dispatch per spec §1 — so this crate only defines the narrow trait the
//! Device Helper calls through and the message-formatting rule it must
//! follow.

/// Which direction's default endpoint changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Playback,
    Capture,
}

impl EventSubject {
    fn label(self) -> &'static str {
        match self {
            EventSubject::Playback => "playback",
            EventSubject::Capture => "capture",
        }
    }
}

/// Sink for events this backend raises. Supplied externally; the
/// Device Helper's notification client is the only caller.
pub trait EventBus: Send + Sync {
    fn default_device_changed(&self, subject: EventSubject, message: String);
}

/// Build the exact message text required by spec §6: `"Default
/// {playback|capture} device changed: <utf8 device id>"`.
pub fn default_device_changed_message(subject: EventSubject, device_id: &str) -> String {
    format!("Default {} device changed: {device_id}", subject.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_format_matches_contract() {
        assert_eq!(
            default_device_changed_message(EventSubject::Playback, "{0.0.0.00000000}.{guid}"),
            "Default playback device changed: {0.0.0.00000000}.{guid}"
        );
        assert_eq!(
            default_device_changed_message(EventSubject::Capture, "id-1"),
            "Default capture device changed: id-1"
        );
    }
}
