//! 长期（情景）记忆：已完成 Activity 的经验记录，跨 Activity 检索
//!
//! 契约只有 save(record) 与 retrieve_top_k(query, k)；当前实现为 InMemoryEpisodicStore（关键词重叠），
//! 后续可接真实向量库。

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::memory::EpisodicRecord;

/// 情景记忆 trait：写入经验记录与相似度检索
pub trait EpisodicStore: Send + Sync {
    fn save(&self, record: &EpisodicRecord);

    /// 按查询检索最相关的 k 条，返回记录文本
    fn retrieve_top_k(&self, query: &str, k: usize) -> Vec<String>;

    /// 是否启用（Noop 实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopEpisodicStore;

impl EpisodicStore for NoopEpisodicStore {
    fn save(&self, _record: &EpisodicRecord) {}

    fn retrieve_top_k(&self, _query: &str, _k: usize) -> Vec<String> {
        Vec::new()
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// 简单内存实现：按关键词重叠检索（无真实向量）
#[derive(Clone)]
pub struct InMemoryEpisodicStore {
    /// (记录文本, 小写词集合)
    store: Arc<RwLock<Vec<(String, HashSet<String>)>>>,
    max_entries: usize,
}

/// 将文本切分为小写词集合
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

impl InMemoryEpisodicStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Vec::new())),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EpisodicStore for InMemoryEpisodicStore {
    fn save(&self, record: &EpisodicRecord) {
        let text = record.to_text_content();
        let tokens = tokenize_lower(&text);
        let mut store = self.store.write();
        store.push((text, tokens));
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
        tracing::debug!("Episodic memory saved: {}", record.original_goal);
    }

    fn retrieve_top_k(&self, query: &str, k: usize) -> Vec<String> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() || k == 0 {
            return Vec::new();
        }
        let store = self.store.read();
        let mut scored: Vec<(usize, &String)> = store
            .iter()
            .map(|(text, doc_tokens)| (query_tokens.intersection(doc_tokens).count(), text))
            .filter(|(s, _)| *s > 0)
            .collect();
        // 稳定排序：同分时保留写入顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, t)| t.clone()).collect()
    }
}

impl Default for InMemoryEpisodicStore {
    fn default() -> Self {
        Self::new(1000)
    }
}
