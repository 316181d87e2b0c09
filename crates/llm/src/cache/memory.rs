//! In-memory, fixed-capacity prompt-response cache backend.

use std::{collections::VecDeque, sync::Mutex};

use dashmap::DashMap;

use super::{CacheEntry, PromptCacheBackend};
use crate::{fingerprint::Fingerprint, router::embedder::cosine_similarity};

pub(crate) struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl MemoryCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }
}

impl PromptCacheBackend for MemoryCache {
    fn get_exact(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.entries.get(fingerprint.as_str()).map(|e| e.value().clone())
    }

    fn get_semantic(&self, embedding: &[f32], threshold: f32) -> Option<(f32, CacheEntry)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let stored_embedding = entry.value().embedding.as_ref()?;
                let similarity = cosine_similarity(embedding, stored_embedding);
                (similarity >= threshold).then(|| (similarity, entry.value().clone()))
            })
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn put(&self, entry: CacheEntry) {
        let key = entry.fingerprint.as_str().to_string();

        if !self.entries.contains_key(&key) {
            let mut order = self.order.lock().unwrap();
            order.push_back(key.clone());
            while order.len() > self.capacity {
                if let Some(evicted) = order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
        }

        self.entries.insert(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::{UnifiedChoice, UnifiedFinishReason, UnifiedMessage, UnifiedRole, UnifiedResponse, UnifiedUsage};

    fn entry(seed: &str, embedding: Option<Vec<f32>>) -> CacheEntry {
        CacheEntry {
            fingerprint: crate::fingerprint::of_value(&serde_json::json!({ "seed": seed })),
            response: UnifiedResponse {
                id: format!("resp-{seed}"),
                model: "gpt-4".to_string(),
                choices: vec![UnifiedChoice {
                    index: 0,
                    message: UnifiedMessage {
                        role: UnifiedRole::Assistant,
                        content: crate::messages::unified::UnifiedContentContainer::Text("hi".to_string()),
                        tool_calls: None,
                        tool_call_id: None,
                    },
                    finish_reason: Some(UnifiedFinishReason::Stop),
                }],
                usage: UnifiedUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    total_tokens: 2,
                    cache_tier: None,
                },
                created: 0,
                stop_reason: None,
                stop_sequence: None,
            },
            embedding,
        }
    }

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let cache = MemoryCache::new(2);
        cache.put(entry("a", None));
        cache.put(entry("b", None));
        cache.put(entry("c", None));

        assert!(cache.get_exact(&crate::fingerprint::of_value(&serde_json::json!({ "seed": "a" }))).is_none());
        assert!(cache.get_exact(&crate::fingerprint::of_value(&serde_json::json!({ "seed": "c" }))).is_some());
    }

    #[test]
    fn semantic_lookup_returns_highest_similarity() {
        let cache = MemoryCache::new(10);
        cache.put(entry("a", Some(vec![1.0, 0.0])));
        cache.put(entry("b", Some(vec![0.0, 1.0])));

        let (similarity, hit) = cache.get_semantic(&[0.9, 0.1], 0.5).expect("hit");
        assert!(similarity > 0.8);
        assert_eq!(hit.response.id, "resp-a");
    }
}
