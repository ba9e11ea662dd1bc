//! Parameter objects of the module kinds, as they appear under `para`.

use crate::resources::DEFAULT_SURFACE;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub(crate) struct WindowPara {
    #[serde(rename = "dT")]
    pub dt: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupPara {
    #[serde(default)]
    pub group: Option<Value>,
    #[serde(default)]
    pub sensitive_volumes: Option<SensitiveVolumes>,
}

/// Lookup table assigning every sensitive volume id to a named group.
#[derive(Debug, Deserialize)]
pub(crate) struct SensitiveVolumes {
    #[serde(rename = "sensVolID")]
    pub ids: Vec<i64>,
    pub group: Vec<Value>,
}

impl SensitiveVolumes {
    /// Volume ids whose group key equals `group`.
    ///
    /// Group keys compare by their text form, so `1` and `"1"` name the
    /// same group. Integral numbers are normalized first, so `1.0` matches
    /// `1`; strings are taken verbatim.
    pub fn members(&self, group: &Value) -> Option<Vec<i64>> {
        if self.ids.len() != self.group.len() {
            return None;
        }
        let wanted = group_key(group);
        Some(
            self.ids
                .iter()
                .zip(&self.group)
                .filter(|(_, key)| group_key(key) == wanted)
                .map(|(&id, _)| id)
                .collect(),
        )
    }
}

fn group_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{f:.0}")
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActiveVolumePara {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub conditions: Option<CylinderConditions>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_surface")]
    pub surface: String,
}

fn default_surface() -> String {
    DEFAULT_SURFACE.to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CylinderConditions {
    pub r: f64,
    pub h_top: f64,
    pub h_bottom: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CoincidencePara {
    pub coincidence_gate: [f64; 2],
}

#[derive(Debug, Deserialize)]
pub(crate) struct AcceptancePara {
    pub thr: [f64; 2],
}
