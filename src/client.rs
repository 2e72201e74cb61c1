//! HTTP client for the Hasura metadata and query APIs.

use std::time::Duration;

use serde_json::Value;

use crate::config::AppConfig;

/// Path of the generic metadata-command endpoint.
pub const METADATA_PATH: &str = "v1/metadata";
/// Path of the generic SQL-query endpoint.
pub const QUERY_PATH: &str = "v2/query";

/// Known failure message meaning the tracked schema no longer matches the
/// database; surfaced with a hint when reported.
const INCONSISTENT_METADATA: &str = "cannot continue due to inconsistent metadata";

// ---------- errors ----------

#[derive(Debug)]
pub enum TransportError {
    /// The endpoint did not accept a connection.
    ConnectionRefused,
    /// The endpoint responded with a non-success status.
    Http { status: u16, message: String },
    /// Any other transport-level failure.
    Unknown(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::ConnectionRefused => {
                write!(f, "connection refused by the Hasura endpoint")
            }
            TransportError::Http { status, message } => {
                write!(f, "HTTP {status}: {message}")?;
                if message.contains(INCONSISTENT_METADATA) {
                    write!(
                        f,
                        " (hint: the database schema may be out of date relative to \
                         this configuration; regenerate and re-apply)"
                    )?;
                }
                Ok(())
            }
            TransportError::Unknown(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::ConnectionRefused
    } else {
        TransportError::Unknown(e.to_string())
    }
}

// ---------- client ----------

/// Async HTTP client for the Hasura admin APIs.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    endpoint: String,
    admin_secret: String,
}

impl GatewayClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Unknown(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            admin_secret: cfg.admin_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    /// POST a JSON body to an API path, returning the parsed response body.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(self.url(path))
            .header("x-hasura-role", "admin")
            .header("x-hasura-admin-secret", &self.admin_secret)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| TransportError::Unknown(format!("malformed response body: {e}")))
    }

    /// POST a metadata command to `v1/metadata`.
    pub async fn metadata(&self, command: &Value) -> Result<Value, TransportError> {
        self.post(METADATA_PATH, command).await
    }

    /// Run a read-only SQL statement via `v2/query`, returning the data rows
    /// (the header row is stripped).
    pub async fn run_sql(
        &self,
        source: &str,
        sql: &str,
    ) -> Result<Vec<Vec<String>>, TransportError> {
        let body = serde_json::json!({
            "type": "run_sql",
            "args": { "source": source, "sql": sql, "read_only": true }
        });
        let resp = self.post(QUERY_PATH, &body).await?;
        parse_tuples(&resp)
    }
}

/// Extract the `error` field from a Hasura error body, falling back to the
/// raw text.
fn error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| text.to_string())
}

/// Parse a `run_sql` response of `result_type` `"TuplesOk"`: `result` is a
/// sequence whose first row is the header and whose remaining rows are
/// positional tuples.
fn parse_tuples(resp: &Value) -> Result<Vec<Vec<String>>, TransportError> {
    match resp.get("result_type").and_then(Value::as_str) {
        Some("TuplesOk") => {}
        other => {
            return Err(TransportError::Unknown(format!(
                "unexpected run_sql result_type: {other:?}"
            )));
        }
    }

    let rows = resp
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| TransportError::Unknown("run_sql response has no result rows".into()))?;

    rows.iter()
        .skip(1)
        .map(|row| {
            let cells = row.as_array().ok_or_else(|| {
                TransportError::Unknown(format!("run_sql row is not a tuple: {row}"))
            })?;
            Ok(cells
                .iter()
                .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
                .collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tuples_ok_strips_header_row() {
        let resp = json!({
            "result_type": "TuplesOk",
            "result": [
                ["constraint_name", "table_name"],
                ["post_author_id_fkey", "post"],
                ["account_pkey", "account"]
            ]
        });
        let rows = parse_tuples(&resp).unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["post_author_id_fkey".to_string(), "post".to_string()],
                vec!["account_pkey".to_string(), "account".to_string()],
            ]
        );
    }

    #[test]
    fn tuples_ok_with_only_header_is_empty() {
        let resp = json!({
            "result_type": "TuplesOk",
            "result": [["constraint_name"]]
        });
        assert!(parse_tuples(&resp).unwrap().is_empty());
    }

    #[test]
    fn unexpected_result_type_is_rejected() {
        let resp = json!({ "result_type": "CommandOk", "result": [] });
        assert!(parse_tuples(&resp).is_err());
    }

    #[test]
    fn error_message_prefers_error_field() {
        let body = r#"{"code":"already-tracked","error":"view/table already tracked","path":"$"}"#;
        assert_eq!(error_message(body), "view/table already tracked");
        assert_eq!(error_message("gateway exploded"), "gateway exploded");
    }

    #[test]
    fn inconsistent_metadata_failure_carries_hint() {
        let err = TransportError::Http {
            status: 400,
            message: "cannot continue due to inconsistent metadata".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("hint"), "expected a hint in: {rendered}");
    }
}
