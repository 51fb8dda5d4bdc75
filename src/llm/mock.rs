//! Mock LLM 与嵌入（用于测试与离线运行，无需 API）
//!
//! MockLlmClient 先按脚本依次返回预设结果，脚本耗尽后交给 responder；
//! HashingEmbedder 用词哈希生成确定性向量，相同文本的余弦相似度恒为 1。

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionParams, EmbeddingProvider, LlmClient, LlmError, ModelTier};

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Mock 客户端：脚本 + 兜底 responder，并记录收到的所有 prompt
pub struct MockLlmClient {
    tier: ModelTier,
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Responder,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// 离线模式：回显 prompt 最后一行
    pub fn new(tier: ModelTier) -> Self {
        Self::with_responder(tier, |prompt| {
            let last = prompt
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("(no input)");
            Ok(format!("Mock response to: {}", last))
        })
    }

    pub fn with_responder<F>(tier: ModelTier, responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            tier,
            script: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 按顺序返回 responses，耗尽后回退到离线回显
    pub fn scripted(tier: ModelTier, responses: Vec<Result<String, LlmError>>) -> Self {
        let client = Self::new(tier);
        *client.script.lock().unwrap_or_else(|e| e.into_inner()) = responses.into();
        client
    }

    /// 已收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, _params: CompletionParams) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(r) => r.map(|s| s.trim().to_string()),
            None => (self.responder)(prompt).map(|s| s.trim().to_string()),
        }
    }

    fn tier(&self) -> ModelTier {
        self.tier
    }
}

/// 确定性哈希嵌入：小写分词后按哈希落桶，再做 L2 归一化
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    failure: Option<LlmError>,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            failure: None,
        }
    }

    /// 每次调用都返回指定错误
    pub fn failing(dimension: usize, error: LlmError) -> Self {
        Self {
            dimension,
            failure: Some(error),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
