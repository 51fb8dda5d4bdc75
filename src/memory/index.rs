//! 上下文索引：已完成任务结果的向量存储
//!
//! ContextIndex 只暴露 upsert（按 id 幂等覆盖）与 query（按相似度降序取 top_k）。
//! InMemoryIndex 为进程内实现，同分时按 id 升序，保证结果可复现。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// 索引错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index request failed: {0}")]
    Request(String),

    #[error("index response could not be decoded: {0}")]
    Decode(String),
}

/// 相似度度量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMetric {
    Cosine,
    Dotproduct,
}

impl IndexMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMetric::Cosine => "cosine",
            IndexMetric::Dotproduct => "dotproduct",
        }
    }

    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            IndexMetric::Cosine => cosine_similarity(a, b),
            IndexMetric::Dotproduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        }
    }
}

/// 记录元数据：产生结果的任务名与结果文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub task_name: String,
    pub result_text: String,
}

impl RecordMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("task_name".to_string(), self.task_name.clone()),
            ("result_text".to_string(), self.result_text.clone()),
        ])
    }
}

/// 一条上下文记录，每个完成的任务写入一次
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl ContextRecord {
    /// 记录 id 由任务 id 派生
    pub fn id_for_task(task_id: u64) -> String {
        format!("result_{}", task_id)
    }
}

/// 查询命中
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

/// 按分数降序、同分按 id 升序排序
pub fn rank_matches(matches: &mut [QueryMatch]) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}

/// 向量索引 trait
#[async_trait]
pub trait ContextIndex: Send + Sync {
    /// 按 id 幂等覆盖写入
    async fn upsert(&self, record: ContextRecord) -> Result<(), IndexError>;

    /// 返回至多 top_k 条结果，分数非递增
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError>;

    fn name(&self) -> &str;
}

/// 进程内索引（每个会话独立一份）
pub struct InMemoryIndex {
    name: String,
    dimension: usize,
    metric: IndexMetric,
    records: RwLock<BTreeMap<String, ContextRecord>>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>, dimension: usize, metric: IndexMetric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<ContextRecord> {
        self.records.read().await.get(id).cloned()
    }

    fn check_dimension(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContextIndex for InMemoryIndex {
    async fn upsert(&self, record: ContextRecord) -> Result<(), IndexError> {
        self.check_dimension(&record.embedding)?;
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        self.check_dimension(embedding)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        let mut matches: Vec<QueryMatch> = records
            .values()
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: self.metric.score(embedding, &r.embedding),
                metadata: r.metadata.clone(),
            })
            .collect();
        rank_matches(&mut matches);
        matches.truncate(top_k);
        Ok(matches)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, v: Vec<f32>) -> ContextRecord {
        ContextRecord {
            id: id.to_string(),
            embedding: v,
            metadata: RecordMetadata {
                task_name: format!("task {}", id),
                result_text: format!("result {}", id),
            },
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_upsert_then_query_returns_same_id() {
        let index = InMemoryIndex::new("t", 3, IndexMetric::Cosine);
        index.upsert(record("result_1", vec![0.2, 0.5, 0.1])).await.unwrap();
        index.upsert(record("result_2", vec![0.9, 0.0, 0.1])).await.unwrap();

        let hits = index.query(&[0.2, 0.5, 0.1], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "result_1");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_query_is_bounded_and_sorted() {
        let index = InMemoryIndex::new("t", 2, IndexMetric::Cosine);
        for (i, v) in [[1.0, 0.0], [0.7, 0.7], [0.0, 1.0], [0.9, 0.1]].iter().enumerate() {
            index.upsert(record(&format!("r{}", i), v.to_vec())).await.unwrap();
        }
        let hits = index.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].id, "r0");
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let index = InMemoryIndex::new("t", 2, IndexMetric::Cosine);
        index.upsert(record("b", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("a", vec![2.0, 0.0])).await.unwrap();
        let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryIndex::new("t", 2, IndexMetric::Cosine);
        index.upsert(record("x", vec![1.0, 0.0])).await.unwrap();
        let mut updated = record("x", vec![0.0, 1.0]);
        updated.metadata.result_text = "second".into();
        index.upsert(updated).await.unwrap();
        assert_eq!(index.len().await, 1);
        assert_eq!(index.get("x").await.unwrap().metadata.result_text, "second");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let index = InMemoryIndex::new("t", 4, IndexMetric::Cosine);
        let err = index.upsert(record("x", vec![1.0])).await.unwrap_err();
        assert_eq!(err, IndexError::DimensionMismatch { expected: 4, actual: 1 });
        assert!(index.query(&[1.0, 2.0], 1).await.is_err());
    }

    #[test]
    fn test_record_id_and_metadata_map() {
        assert_eq!(ContextRecord::id_for_task(7), "result_7");
        let m = RecordMetadata {
            task_name: "a".into(),
            result_text: "b".into(),
        }
        .to_map();
        assert_eq!(m.get("task_name").map(String::as_str), Some("a"));
        assert_eq!(m.get("result_text").map(String::as_str), Some("b"));
    }
}
