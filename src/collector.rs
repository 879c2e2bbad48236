//! Point-in-time snapshots of the recorded graph for diagnostics panels.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagram;
use crate::error::{DiError, DiResult};
use crate::recorder::{CallGraphRecorder, LoggedService, ServiceSummary};
use crate::trace::RegistrarId;

/// Everything a reporting surface needs from one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub collected_at: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceSummary>,
    pub instances: Vec<LoggedService>,
    pub registrars: BTreeMap<RegistrarId, String>,
}

impl GraphSnapshot {
    /// Diagram URL of the collected services.
    pub fn diagram_url(&self) -> String {
        diagram::export(&self.services)
    }

    pub fn to_json(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DiError::invocation("to_json", e.to_string()))
    }

    pub fn to_yaml(&self) -> DiResult<String> {
        serde_yaml::to_string(self).map_err(|e| DiError::invocation("to_yaml", e.to_string()))
    }

    pub fn from_json(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::invocation("from_json", e.to_string()))
    }
}

/// Collects [`GraphSnapshot`]s from a recorder.
#[derive(Debug, Clone)]
pub struct GraphCollector {
    recorder: CallGraphRecorder,
    enabled: bool,
}

impl GraphCollector {
    pub fn new(recorder: CallGraphRecorder) -> Self {
        Self {
            recorder,
            enabled: true,
        }
    }

    /// A collector that always yields empty snapshots.
    pub fn disabled(recorder: CallGraphRecorder) -> Self {
        Self {
            recorder,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn collect(&self) -> GraphSnapshot {
        if !self.enabled {
            return GraphSnapshot {
                collected_at: Utc::now(),
                services: BTreeMap::new(),
                instances: Vec::new(),
                registrars: BTreeMap::new(),
            };
        }
        GraphSnapshot {
            collected_at: Utc::now(),
            services: self.recorder.summary(),
            instances: self.recorder.logged_services(),
            registrars: self.recorder.logged_registrars(),
        }
    }
}
