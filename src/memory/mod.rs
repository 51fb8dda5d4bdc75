//! 记忆层：任务结果的向量上下文索引（进程内 / 远程）

pub mod index;
pub mod pinecone;

pub use index::{
    cosine_similarity, rank_matches, ContextIndex, ContextRecord, IndexError, IndexMetric,
    InMemoryIndex, QueryMatch, RecordMetadata,
};
pub use pinecone::{PineconeIndex, PineconeSettings};
