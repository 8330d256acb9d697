//! Loaded script table
//!
//! Populated from the handshake `scripts` response and kept current by
//! `afterCompile` events. Stack frames resolve their source file through it.

use serde_json::Value as Json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// One script known to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: i64,
    /// Source file name as reported by the runtime
    pub name: String,
    pub line_count: Option<u32>,
}

impl Script {
    /// Parse a script descriptor (`{"id":5,"name":"app.js","lineCount":40,...}`)
    pub fn from_json(descriptor: &Json) -> Option<Self> {
        let id = descriptor.get("id").and_then(Json::as_i64)?;
        let name = descriptor
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        let line_count = descriptor
            .get("lineCount")
            .and_then(Json::as_u64)
            .and_then(|n| u32::try_from(n).ok());
        Some(Self {
            id,
            name,
            line_count,
        })
    }
}

/// Script id → script, shared by the reader side and callers
#[derive(Debug, Default)]
pub struct ScriptTable {
    scripts: RwLock<HashMap<i64, Script>>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, script: Script) {
        trace!(id = script.id, name = %script.name, "Registering script");
        self.scripts.write().await.insert(script.id, script);
    }

    pub async fn get(&self, id: i64) -> Option<Script> {
        self.scripts.read().await.get(&id).cloned()
    }

    /// Source file name of a script id
    pub async fn name(&self, id: i64) -> Option<String> {
        self.scripts.read().await.get(&id).map(|s| s.name.clone())
    }

    pub async fn len(&self) -> usize {
        self.scripts.read().await.len()
    }

    /// Copy of the table for lock-free lookups
    pub async fn snapshot(&self) -> HashMap<i64, Script> {
        self.scripts.read().await.clone()
    }

    /// All scripts ordered by id
    pub async fn list(&self) -> Vec<Script> {
        let mut scripts: Vec<Script> = self.scripts.read().await.values().cloned().collect();
        scripts.sort_by_key(|s| s.id);
        scripts
    }

    /// Record every script of a `scripts` response body. Returns the number recorded.
    pub async fn record_list(&self, body: &Json) -> usize {
        let Some(entries) = body.as_array() else {
            debug!("Scripts response body is not an array");
            return 0;
        };
        let parsed: Vec<Script> = entries.iter().filter_map(Script::from_json).collect();
        let count = parsed.len();
        let mut scripts = self.scripts.write().await;
        for script in parsed {
            scripts.insert(script.id, script);
        }
        count
    }

    /// Record the script carried by an `afterCompile` event body
    pub async fn record_compiled(&self, body: &Json) -> Option<Script> {
        let script = body.get("script").and_then(Script::from_json)?;
        self.insert(script.clone()).await;
        Some(script)
    }
}
