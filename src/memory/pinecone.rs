//! Pinecone 兼容的远程向量索引
//!
//! 数据面：POST {host}/vectors/upsert、POST {host}/query（includeMetadata）。
//! 控制面（可选）：按 environment 列出索引，不存在时以配置的维度 / 度量 / pod 类型创建。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::memory::index::{rank_matches, ContextIndex, ContextRecord, IndexError, IndexMetric, QueryMatch, RecordMetadata};

/// 远程索引连接参数
#[derive(Debug, Clone)]
pub struct PineconeSettings {
    pub name: String,
    /// 数据面地址，如 https://{index}-{project}.svc.{environment}.pinecone.io
    pub host: String,
    pub api_key: String,
    pub environment: String,
    pub dimension: usize,
    pub metric: IndexMetric,
    pub pod_type: String,
    pub namespace: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: HashMap<String, String>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RemoteMatch>,
}

#[derive(Deserialize)]
struct RemoteMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    pod_type: &'a str,
}

fn metadata_str(map: &HashMap<String, serde_json::Value>, key: &str) -> String {
    match map.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// 将远程响应转换为按分数降序的命中列表（最多 top_k 条）
fn decode_matches(body: &str, top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| IndexError::Decode(e.to_string()))?;
    let mut matches: Vec<QueryMatch> = response
        .matches
        .into_iter()
        .map(|m| QueryMatch {
            metadata: RecordMetadata {
                task_name: metadata_str(&m.metadata, "task_name"),
                result_text: metadata_str(&m.metadata, "result_text"),
            },
            id: m.id,
            score: m.score,
        })
        .collect();
    rank_matches(&mut matches);
    matches.truncate(top_k);
    Ok(matches)
}

/// 远程索引客户端
pub struct PineconeIndex {
    http: reqwest::Client,
    settings: PineconeSettings,
}

impl PineconeIndex {
    pub fn new(settings: PineconeSettings) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(Self { http, settings })
    }

    fn controller_url(&self) -> String {
        format!("https://controller.{}.pinecone.io/databases", self.settings.environment)
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.host.trim_end_matches('/'), path)
    }

    /// 索引不存在时创建
    pub async fn ensure_exists(&self) -> Result<(), IndexError> {
        let existing: Vec<String> = self
            .http
            .get(self.controller_url())
            .header("Api-Key", &self.settings.api_key)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| IndexError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;

        if existing.iter().any(|n| n == &self.settings.name) {
            tracing::debug!(index = %self.settings.name, "remote index already exists");
            return Ok(());
        }

        tracing::info!(
            index = %self.settings.name,
            dimension = self.settings.dimension,
            metric = self.settings.metric.as_str(),
            "creating remote index"
        );
        self.http
            .post(self.controller_url())
            .header("Api-Key", &self.settings.api_key)
            .json(&CreateIndexRequest {
                name: &self.settings.name,
                dimension: self.settings.dimension,
                metric: self.settings.metric.as_str(),
                pod_type: &self.settings.pod_type,
            })
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| IndexError::Request(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ContextIndex for PineconeIndex {
    async fn upsert(&self, record: ContextRecord) -> Result<(), IndexError> {
        if record.embedding.len() != self.settings.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.settings.dimension,
                actual: record.embedding.len(),
            });
        }
        let body = UpsertRequest {
            vectors: vec![UpsertVector {
                id: &record.id,
                values: &record.embedding,
                metadata: record.metadata.to_map(),
            }],
            namespace: self.settings.namespace.as_deref(),
        };
        self.http
            .post(self.data_url("vectors/upsert"))
            .header("Api-Key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| IndexError::Request(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let body = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
            namespace: self.settings.namespace.as_deref(),
        };
        let text = self
            .http
            .post(self.data_url("query"))
            .header("Api-Key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| IndexError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        decode_matches(&text, top_k)
    }

    fn name(&self) -> &str {
        &self.settings.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_uses_camel_case() {
        let v = [0.1f32, 0.2];
        let body = serde_json::to_value(QueryRequest {
            vector: &v,
            top_k: 5,
            include_metadata: true,
            namespace: None,
        })
        .unwrap();
        assert_eq!(body["topK"], 5);
        assert_eq!(body["includeMetadata"], true);
        assert!(body.get("namespace").is_none());
    }

    #[test]
    fn test_decode_sorts_and_truncates() {
        let body = r#"{"matches":[
            {"id":"result_2","score":0.4,"metadata":{"task_name":"b","result_text":"rb"}},
            {"id":"result_1","score":0.9,"metadata":{"task_name":"a","result_text":"ra"}},
            {"id":"result_3","score":0.1}
        ]}"#;
        let hits = decode_matches(body, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "result_1");
        assert_eq!(hits[0].metadata.task_name, "a");
        assert_eq!(hits[1].metadata.result_text, "rb");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_matches("not json", 3), Err(IndexError::Decode(_))));
    }

    #[test]
    fn test_data_url_trims_trailing_slash() {
        let index = PineconeIndex::new(PineconeSettings {
            name: "tasks".into(),
            host: "https://tasks-abc.svc.us-east1-gcp.pinecone.io/".into(),
            api_key: "k".into(),
            environment: "us-east1-gcp".into(),
            dimension: 1536,
            metric: IndexMetric::Cosine,
            pod_type: "p1".into(),
            namespace: None,
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            index.data_url("query"),
            "https://tasks-abc.svc.us-east1-gcp.pinecone.io/query"
        );
        assert_eq!(
            index.controller_url(),
            "https://controller.us-east1-gcp.pinecone.io/databases"
        );
    }
}
