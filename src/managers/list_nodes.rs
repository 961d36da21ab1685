use crate::constants::center::BATCH_MATRIX_PATH;
use crate::errors::ToolError;
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::center_client::{FleetApi, RequestOptions};
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const TOOL_NAME: &str = "list_nodes";

/// Tunnel as exposed to callers. The backend's `id` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    pub domain: String,
    pub protocol: String,
    pub port: Option<u16>,
    pub server_url: String,
}

/// Node as exposed to callers. Internal ids, lifecycle status, timestamps
/// and batch script results never make it into this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub ipv4: String,
    pub ipv6: String,
    pub country: String,
    pub region: String,
    pub tunnels: Vec<TunnelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilters {
    pub country: Option<String>,
    pub name: Option<String>,
}

impl NodeFilters {
    /// Audit form: the given filters joined by commas, or `none`.
    pub fn describe(&self) -> String {
        let parts: Vec<&str> = [self.country.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|value| !value.is_empty())
            .collect();
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(",")
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTunnel {
    #[serde(default, deserialize_with = "nullable")]
    domain: String,
    #[serde(default, deserialize_with = "nullable")]
    protocol: String,
    #[serde(default, deserialize_with = "lenient_port")]
    port: Option<u16>,
    #[serde(default, deserialize_with = "nullable")]
    server_url: String,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default, deserialize_with = "nullable")]
    name: String,
    #[serde(default, deserialize_with = "nullable")]
    ipv4: String,
    #[serde(default, deserialize_with = "nullable")]
    ipv6: String,
    #[serde(default, deserialize_with = "nullable")]
    country: String,
    #[serde(default, deserialize_with = "nullable")]
    region: String,
    #[serde(default, deserialize_with = "nullable")]
    tunnels: Vec<RawTunnel>,
    #[serde(default)]
    meta: Option<Value>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a number or a numeric string; anything else becomes `None`.
fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let port = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(port)
}

impl From<RawTunnel> for TunnelInfo {
    fn from(raw: RawTunnel) -> Self {
        Self {
            domain: raw.domain,
            protocol: raw.protocol,
            port: raw.port,
            server_url: raw.server_url,
        }
    }
}

impl From<RawNode> for NodeInfo {
    fn from(raw: RawNode) -> Self {
        let meta = match raw.meta {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };
        Self {
            name: raw.name,
            ipv4: raw.ipv4,
            ipv6: raw.ipv6,
            country: raw.country,
            region: raw.region,
            tunnels: raw.tunnels.into_iter().map(TunnelInfo::from).collect(),
            meta,
        }
    }
}

/// Validates a batch-matrix payload, applies exact-match filters (country
/// first, then name) to the raw nodes, and maps survivors to [`NodeInfo`].
///
/// A payload without a numeric `code` and a `data.nodes` array is a
/// contract violation. Nodes dropped by a filter are never parsed; a
/// surviving node that is not a node object is also a contract violation.
pub fn filter_nodes(raw: &Value, filters: &NodeFilters) -> Result<Vec<NodeInfo>, ToolError> {
    let invalid = || {
        ToolError::contract_violation("Invalid batch-matrix response shape from Center API")
    };
    if !raw.get("code").map(Value::is_number).unwrap_or(false) {
        return Err(invalid());
    }
    let nodes = raw
        .get("data")
        .filter(|data| data.is_object())
        .and_then(|data| data.get("nodes"))
        .and_then(Value::as_array)
        .ok_or_else(invalid)?;

    nodes
        .iter()
        .filter(|node| field_matches(node, "country", filters.country.as_deref()))
        .filter(|node| field_matches(node, "name", filters.name.as_deref()))
        .map(|node| {
            RawNode::deserialize(node).map(NodeInfo::from).map_err(|err| {
                ToolError::contract_violation(format!(
                    "Invalid node in batch-matrix response: {}",
                    err
                ))
            })
        })
        .collect()
}

fn field_matches(node: &Value, key: &str, wanted: Option<&str>) -> bool {
    match wanted {
        Some(wanted) => node.get(key).and_then(Value::as_str) == Some(wanted),
        None => true,
    }
}

pub struct ListNodesManager {
    logger: Logger,
    validation: Validation,
    api: Arc<dyn FleetApi>,
    audit: Arc<AuditService>,
}

impl ListNodesManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        api: Arc<dyn FleetApi>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            logger: logger.child(TOOL_NAME),
            validation,
            api,
            audit,
        }
    }

    pub async fn list(&self, filters: &NodeFilters) -> Result<Vec<NodeInfo>, ToolError> {
        let raw = self
            .api
            .request(BATCH_MATRIX_PATH, RequestOptions::get())
            .await?;
        let nodes = filter_nodes(&raw, filters).map_err(|err| {
            self.logger.error(
                "batch-matrix contract violation",
                Some(&serde_json::json!({ "error": err.message })),
            );
            err
        })?;
        self.audit
            .record(
                AuditRecord::new(TOOL_NAME)
                    .field("filter", filters.describe())
                    .field("count", nodes.len()),
            )
            .await;
        Ok(nodes)
    }
}

#[async_trait::async_trait]
impl ToolHandler for ListNodesManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let filters = NodeFilters {
            country: self
                .validation
                .ensure_optional_string(args.get("country"), "country", false)?,
            name: self
                .validation
                .ensure_optional_string(args.get("name"), "name", false)?,
        };
        let nodes = self.list(&filters).await?;
        serde_json::to_value(nodes)
            .map_err(|err| ToolError::internal(format!("Failed to encode response: {}", err)))
    }
}
