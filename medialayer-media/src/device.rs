//! Capture device descriptions and default-device selection

use crate::media_type::{CameraFormat, MediaKind, MediaTypeDescriptor};
use serde::{Deserialize, Serialize};

/// Capture device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub description: String,
    pub kind: MediaKind,
    pub is_default: bool,
    /// Native media types in the order the device reports them
    pub formats: Vec<MediaTypeDescriptor>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, description: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            kind,
            is_default: false,
            formats: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: MediaTypeDescriptor) -> Self {
        self.formats.push(format);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Video formats as camera formats, in native order
    pub fn camera_formats(&self) -> Vec<CameraFormat> {
        self.formats
            .iter()
            .filter(|f| f.kind() == MediaKind::Video)
            .map(CameraFormat::from_descriptor)
            .collect()
    }
}

/// Pick the device flagged as default, otherwise the first one
pub fn default_device(devices: &[DeviceInfo], kind: MediaKind) -> Option<&DeviceInfo> {
    let mut candidates = devices.iter().filter(|d| d.kind == kind);
    let first = candidates.clone().next();
    candidates.find(|d| d.is_default).or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_prefers_flagged() {
        let devices = vec![
            DeviceInfo::new("mic-0", "Line In", MediaKind::Audio),
            DeviceInfo::new("cam-0", "USB Camera", MediaKind::Video),
            DeviceInfo::new("mic-1", "Headset", MediaKind::Audio).as_default(),
        ];
        assert_eq!(default_device(&devices, MediaKind::Audio).unwrap().id, "mic-1");
        assert_eq!(default_device(&devices, MediaKind::Video).unwrap().id, "cam-0");
    }

    #[test]
    fn test_default_device_empty() {
        let devices = vec![DeviceInfo::new("mic-0", "Line In", MediaKind::Audio)];
        assert!(default_device(&devices, MediaKind::Video).is_none());
    }
}
