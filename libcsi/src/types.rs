//! Core CSI types: volume ids, volume context, requests, plugin and node
//! metadata.
//!
//! These types form the data model shared by the CSI traits, the lifecycle
//! manager, the storage backends and the transport layer.  Wire-facing types
//! are [`Serialize`]/[`Deserialize`] so they can be transmitted as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};

use crate::error::CsiError;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, unique identifier for a volume, assigned by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub String);

impl VolumeId {
    /// Reject ids that cannot name a single directory under a backend root.
    pub fn validate(&self) -> Result<(), CsiError> {
        if self.0.is_empty() {
            return Err(CsiError::InvalidArgument("volume id must not be empty".into()));
        }
        if !is_single_component(&self.0) {
            return Err(CsiError::InvalidArgument(format!(
                "volume id {:?} must be a single path component",
                self.0
            )));
        }
        Ok(())
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// `true` when `name` is exactly one normal path component.
fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

// ---------------------------------------------------------------------------
// Volume context
// ---------------------------------------------------------------------------

/// Volume context key naming the file to materialize inside the volume.
pub const FILENAME_KEY: &str = "filename";
/// Volume context key carrying the literal file content.
pub const DATA_KEY: &str = "data";
/// Volume context key injected by the kubelet for ephemeral inline volumes.
pub const POD_NAME_KEY: &str = "csi.storage.k8s.io/pod.name";

/// Validated form of the orchestrator-supplied volume context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeContext {
    /// Name of the single file written into the volume.
    pub filename: String,
    /// Content of that file.
    pub data: String,
    /// Requesting pod, for diagnostics only.
    pub pod_name: Option<String>,
}

impl VolumeContext {
    /// Parse and validate the raw string map received on the wire.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, CsiError> {
        let filename = required(map, FILENAME_KEY)?;
        if !is_single_component(filename) {
            return Err(CsiError::InvalidArgument(format!(
                "volume context {FILENAME_KEY:?} must be a plain file name, got {filename:?}"
            )));
        }
        let data = required(map, DATA_KEY)?;

        Ok(Self {
            filename: filename.to_owned(),
            data: data.to_owned(),
            pod_name: map.get(POD_NAME_KEY).cloned(),
        })
    }
}

impl TryFrom<&HashMap<String, String>> for VolumeContext {
    type Error = CsiError;

    fn try_from(map: &HashMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_map(map)
    }
}

fn required<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str, CsiError> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| CsiError::InvalidArgument(format!("volume context is missing {key:?}")))
}

// ---------------------------------------------------------------------------
// Node requests
// ---------------------------------------------------------------------------

/// Request to publish (materialize and bind-mount) an ephemeral volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: VolumeId,
    /// Path inside the pod's mount namespace,
    /// e.g. `/var/lib/kubelet/pods/<pod-uid>/volumes/<plugin>/<vol-name>/mount`.
    pub target_path: String,
    /// Driver-specific parameters, see [`VolumeContext`].
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

/// Request to unpublish a previously published volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUnpublishVolumeRequest {
    /// Volume to unpublish.
    pub volume_id: VolumeId,
    /// Path the volume was published at.
    pub target_path: String,
}

/// Request to stage a volume at a global path.  Not supported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStageVolumeRequest {
    pub volume_id: VolumeId,
    pub staging_target_path: String,
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

/// Request to expand a published volume.  Not supported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeExpandVolumeRequest {
    pub volume_id: VolumeId,
    pub volume_path: String,
    pub required_bytes: u64,
}

/// Usage figures for a published volume.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeUsage {
    pub available_bytes: u64,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"csi-driver.rk8s.io"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Capabilities advertised by the CSI plugin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Plugin provides a Controller service.
    ControllerService,
}

/// RPC capabilities advertised by the Node service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeCapability {
    /// No optional node RPC is supported.
    Unknown,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node identifier exactly as configured.
    pub node_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn volume_id_display() {
        let id = VolumeId("vol-abc".into());
        assert_eq!(id.to_string(), "vol-abc");
    }

    #[test]
    fn volume_id_validation() {
        assert!(VolumeId::from("csi-1b2c3d").validate().is_ok());
        for bad in ["", ".", "..", "a/b", "/abs", "../escape"] {
            let res = VolumeId::from(bad).validate();
            assert!(
                matches!(res, Err(CsiError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn volume_context_parses_known_keys() {
        let parsed = VolumeContext::from_map(&ctx(&[
            (FILENAME_KEY, "yolo.txt"),
            (DATA_KEY, "you only live once"),
            (POD_NAME_KEY, "web-0"),
            ("csi.storage.k8s.io/ephemeral", "true"),
        ]))
        .unwrap();

        assert_eq!(parsed.filename, "yolo.txt");
        assert_eq!(parsed.data, "you only live once");
        assert_eq!(parsed.pod_name.as_deref(), Some("web-0"));
    }

    #[test]
    fn volume_context_allows_empty_data_without_pod() {
        let parsed = VolumeContext::try_from(&ctx(&[(FILENAME_KEY, "empty"), (DATA_KEY, "")]))
            .unwrap();
        assert!(parsed.data.is_empty());
        assert!(parsed.pod_name.is_none());
    }

    #[test]
    fn volume_context_missing_keys() {
        let err = VolumeContext::from_map(&ctx(&[(DATA_KEY, "x")])).unwrap_err();
        assert!(matches!(err, CsiError::InvalidArgument(ref m) if m.contains(FILENAME_KEY)));

        let err = VolumeContext::from_map(&ctx(&[(FILENAME_KEY, "f")])).unwrap_err();
        assert!(matches!(err, CsiError::InvalidArgument(ref m) if m.contains(DATA_KEY)));
    }

    #[test]
    fn volume_context_rejects_nested_filename() {
        for bad in ["../etc/passwd", "dir/file", "", "..", "/abs"] {
            let res = VolumeContext::from_map(&ctx(&[(FILENAME_KEY, bad), (DATA_KEY, "x")]));
            assert!(res.is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn node_info_wire_shape() {
        let info = NodeInfo {
            node_id: "node-01".into(),
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({ "node_id": "node-01" })
        );
        assert_eq!(
            serde_json::to_value(NodeCapability::Unknown).unwrap(),
            serde_json::json!("Unknown")
        );
    }
}
