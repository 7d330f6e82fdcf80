//! Device map entries and the per-direction device registry.
//!
//! Grounded in the original's free-standing `PlaybackDevices` /
//! `CaptureDevices` vectors and `DevMap` struct, modeled here as two
//! `DeviceRegistry` instances owned by the Device Helper rather than
//! process-lifetime statics.

/// A single enumerated endpoint: display name, endpoint GUID string, and
/// the OS device id used to re-open it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMapEntry {
    pub name: String,
    pub endpoint_guid: String,
    pub device_id: String,
}

/// Holds the last-probed device list for one direction (playback or
/// capture). The default device is always first; names are de-duplicated
/// against siblings sharing a friendly name.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceMapEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { devices: Vec::new() }
    }

    pub fn devices(&self) -> &[DeviceMapEntry] {
        &self.devices
    }

    /// Replace the registry contents from a freshly enumerated list.
    /// `default_id` identifies the entry (by `device_id`) that should be
    /// moved to the front; entries are de-duplicated by `device_id`, and
    /// colliding display names get a " #N" suffix (N starting at 2) in
    /// first-seen order.
    pub fn probe<I: IntoIterator<Item = DeviceMapEntry>>(&mut self, entries: I, default_id: Option<&str>) {
        let mut seen_ids = std::collections::HashSet::new();
        let mut deduped = Vec::new();
        for entry in entries {
            if seen_ids.insert(entry.device_id.clone()) {
                deduped.push(entry);
            }
        }

        if let Some(default_id) = default_id {
            if let Some(pos) = deduped.iter().position(|d| d.device_id == default_id) {
                let default_entry = deduped.remove(pos);
                deduped.insert(0, default_entry);
            }
        }

        let mut name_counts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for entry in &mut deduped {
            let count = name_counts.entry(entry.name.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                entry.name = format!("{} #{}", entry.name, *count);
            }
        }

        self.devices = deduped;
    }

    /// Look up by display name first, then endpoint GUID, then device id —
    /// the precedence order callers are expected to use when opening a
    /// device by a user-supplied string.
    pub fn find(&self, key: &str) -> Option<&DeviceMapEntry> {
        self.devices
            .iter()
            .find(|d| d.name == key)
            .or_else(|| self.devices.iter().find(|d| d.endpoint_guid == key))
            .or_else(|| self.devices.iter().find(|d| d.device_id == key))
    }

    pub fn default_device(&self) -> Option<&DeviceMapEntry> {
        self.devices.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, guid: &str, id: &str) -> DeviceMapEntry {
        DeviceMapEntry {
            name: name.to_string(),
            endpoint_guid: guid.to_string(),
            device_id: id.to_string(),
        }
    }

    #[test]
    fn default_device_moved_to_front() {
        let mut reg = DeviceRegistry::new();
        reg.probe(
            [entry("Speakers", "g1", "id1"), entry("Headset", "g2", "id2")],
            Some("id2"),
        );
        assert_eq!(reg.default_device().unwrap().device_id, "id2");
    }

    #[test]
    fn dedup_by_device_id() {
        let mut reg = DeviceRegistry::new();
        reg.probe([entry("Speakers", "g1", "id1"), entry("Speakers", "g1", "id1")], None);
        assert_eq!(reg.devices().len(), 1);
    }

    #[test]
    fn colliding_names_get_numbered_suffix() {
        let mut reg = DeviceRegistry::new();
        reg.probe(
            [
                entry("USB Audio", "g1", "id1"),
                entry("USB Audio", "g2", "id2"),
                entry("USB Audio", "g3", "id3"),
            ],
            None,
        );
        let names: Vec<_> = reg.devices().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["USB Audio", "USB Audio #2", "USB Audio #3"]);
    }

    #[test]
    fn find_by_name_then_guid_then_id() {
        let mut reg = DeviceRegistry::new();
        reg.probe([entry("Speakers", "{guid-1}", "id1")], None);
        assert_eq!(reg.find("Speakers").unwrap().device_id, "id1");
        assert_eq!(reg.find("{guid-1}").unwrap().device_id, "id1");
        assert_eq!(reg.find("id1").unwrap().device_id, "id1");
        assert!(reg.find("nope").is_none());
    }

    #[test]
    fn empty_registry_has_no_default() {
        let reg = DeviceRegistry::new();
        assert!(reg.default_device().is_none());
    }
}
