//! Maximum-format whitelist.
//!
//! Some cameras advertise modes they cannot sustain; the whitelist caps
//! the format requested from known devices. Entries match a device id or
//! display name with `*`/`?` wildcards; the table is evaluated in
//! configured order and the first match wins.

use serde::{Deserialize, Serialize};

use crate::devices::Device;
use crate::frame::VideoFormat;

/// One whitelist row: a wildcard pattern over a device id or name and the
/// maximum format to allow for matching devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxFormatEntry {
    pub pattern: String,
    pub format: VideoFormat,
}

/// Ordered wildcard table; first match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaxFormatTable {
    entries: Vec<MaxFormatEntry>,
}

impl MaxFormatTable {
    pub fn new(entries: Vec<MaxFormatEntry>) -> Self {
        Self { entries }
    }

    /// Parse a table from its JSON representation.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn push(&mut self, entry: MaxFormatEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The format of the first entry whose pattern matches `key`, walking
    /// the table in configured order.
    pub fn lookup(&self, key: &str) -> Option<&VideoFormat> {
        self.entries
            .iter()
            .find(|entry| string_match(&entry.pattern, key))
            .map(|entry| &entry.format)
    }

    /// Match the device id first, then the display name.
    pub fn max_format(&self, device: &Device) -> Option<&VideoFormat> {
        self.lookup(&device.id).or_else(|| self.lookup(&device.name))
    }
}

/// Wildcard match: `*` matches any run of characters, `?` exactly one,
/// everything else compares ASCII case-insensitively.
fn string_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while vi < value.len() {
        if pi < pattern.len()
            && (pattern[pi] == '?' || pattern[pi].eq_ignore_ascii_case(&value[vi]))
        {
            pi += 1;
            vi += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((star_pi, star_vi)) = star {
            // Backtrack: let the last `*` swallow one more character.
            pi = star_pi + 1;
            vi = star_vi + 1;
            star = Some((star_pi, star_vi + 1));
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn fmt(width: u32) -> VideoFormat {
        VideoFormat::video(PixelFormat::Yuy2, width, width * 9 / 16, 30)
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(string_match("logitech*", "Logitech HD Pro Webcam"));
        assert!(string_match(r"\\?\usb*", r"\\?\USB#vid_046d&pid_082d"));
        assert!(string_match("cam-??", "cam-01"));
        assert!(!string_match("cam-??", "cam-1"));
        assert!(string_match("*webcam*", "Generic WebCam 2000"));
        assert!(string_match("exact", "EXACT"));
        assert!(!string_match("exact", "exactly"));
        assert!(string_match("*", ""));
        assert!(!string_match("?", ""));
    }

    #[test]
    fn test_first_match_wins_in_table_order() {
        let table = MaxFormatTable::new(vec![
            MaxFormatEntry {
                pattern: "logitech*".into(),
                format: fmt(640),
            },
            MaxFormatEntry {
                pattern: "*".into(),
                format: fmt(1920),
            },
        ]);

        assert_eq!(table.lookup("Logitech C920").unwrap().width, 640);
        assert_eq!(table.lookup("Some Other Cam").unwrap().width, 1920);
    }

    #[test]
    fn test_device_id_preferred_over_name() {
        let table = MaxFormatTable::new(vec![
            MaxFormatEntry {
                pattern: r"\\?\usb#vid_046d*".into(),
                format: fmt(1280),
            },
            MaxFormatEntry {
                pattern: "logitech*".into(),
                format: fmt(640),
            },
        ]);

        let device = Device::new("Logitech C920", r"\\?\usb#vid_046d&pid_082d");
        assert_eq!(table.max_format(&device).unwrap().width, 1280);

        // Falls back to the name when the id matches nothing.
        let other = Device::new("Logitech C270", r"\\?\pci#ven_8086");
        assert_eq!(table.max_format(&other).unwrap().width, 640);

        let unknown = Device::new("Mystery Cam", "id-without-match");
        assert!(table.max_format(&unknown).is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {
                "pattern": "logitech*",
                "format": {
                    "kind": "Video",
                    "subtype": "Yuy2",
                    "width": 1280,
                    "height": 720,
                    "frame_rate": 30
                }
            }
        ]"#;
        let table = MaxFormatTable::from_json(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("Logitech brio").unwrap().height, 720);
        assert!(MaxFormatTable::from_json("not json").is_err());
    }
}
