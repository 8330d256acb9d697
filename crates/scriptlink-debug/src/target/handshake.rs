//! Initial handshake with a freshly connected runtime

use crate::broker::Broker;
use crate::protocol::CommandKind;
use crate::scripts::ScriptTable;
use crate::{Error, Result};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

/// What the runtime reported during the handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    pub runtime_version: Option<String>,
    pub breakpoint_count: usize,
    pub script_count: usize,
}

/// Query version, breakpoints, threads and scripts, recording the scripts.
///
/// A command the runtime rejects or never answers is logged and skipped;
/// only loss of the connection aborts the handshake.
pub async fn perform_handshake(broker: &Broker, scripts: &ScriptTable) -> Result<HandshakeInfo> {
    let mut info = HandshakeInfo::default();

    if let Some(body) = step(broker, CommandKind::Version).await? {
        info.runtime_version = body
            .get("V8Version")
            .or_else(|| body.get("version"))
            .and_then(Json::as_str)
            .map(str::to_string);
    }

    if let Some(body) = step(broker, CommandKind::ListBreakpoints).await? {
        info.breakpoint_count = body
            .get("breakpoints")
            .and_then(Json::as_array)
            .map_or(0, Vec::len);
    }

    if let Some(body) = step(broker, CommandKind::Threads).await? {
        debug!(threads = ?body.get("totalThreads"), "Runtime threads");
    }

    if let Some(body) = step(broker, CommandKind::Scripts).await? {
        info.script_count = scripts.record_list(&body).await;
    }

    info!(
        version = info.runtime_version.as_deref().unwrap_or("unknown"),
        scripts = info.script_count,
        "Handshake complete"
    );
    Ok(info)
}

async fn step(broker: &Broker, kind: CommandKind) -> Result<Option<Json>> {
    let name = kind.name();
    match broker.request(kind).await {
        Ok(response) => Ok(Some(response.body.unwrap_or(Json::Null))),
        Err(Error::Terminated) => Err(Error::Terminated),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(command = name, "Handshake command failed: {}", e);
            Ok(None)
        }
    }
}
