//! Local selection cache: avoids calling the router RPC twice for prompts
//! that are exactly or semantically the same request.

use std::{
    collections::VecDeque,
    sync::Mutex,
};

use dashmap::DashMap;

use super::{Candidate, Candidates, embedder::cosine_similarity};
use crate::fingerprint::Fingerprint;

#[derive(Clone)]
struct Entry {
    embedding: Vec<f32>,
    candidates: CachedCandidates,
}

#[derive(Clone)]
struct CachedCandidates {
    primary: Candidate,
    alternatives: Vec<Candidate>,
}

impl From<&Candidates> for CachedCandidates {
    fn from(candidates: &Candidates) -> Self {
        Self {
            primary: candidates.primary.clone(),
            alternatives: candidates.alternatives.clone(),
        }
    }
}

impl From<CachedCandidates> for Candidates {
    fn from(cached: CachedCandidates) -> Self {
        Self {
            primary: cached.primary,
            alternatives: cached.alternatives,
        }
    }
}

/// Bounded selection cache keyed by `fingerprint(prompt, cost_bias, models)`,
/// with a semantic fallback tier over the same entries via embedding cosine
/// similarity.
pub(crate) struct SelectionCache {
    entries: DashMap<String, Entry>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    semantic_threshold: f32,
}

impl SelectionCache {
    pub(crate) fn new(capacity: usize, semantic_threshold: f32) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            semantic_threshold,
        }
    }

    /// Exact hit: the selection key fingerprints identically.
    pub(crate) fn exact(&self, key: &Fingerprint) -> Option<Candidates> {
        self.entries.get(key.as_str()).map(|entry| Candidates::from(entry.candidates.clone()))
    }

    /// Semantic hit: an entry whose prompt embedding has cosine similarity
    /// at or above the configured threshold.
    pub(crate) fn semantic(&self, embedding: &[f32]) -> Option<Candidates> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let sim = cosine_similarity(embedding, &entry.value().embedding);
                (sim >= self.semantic_threshold).then(|| (sim, entry.value().candidates.clone()))
            })
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, candidates)| Candidates::from(candidates))
    }

    pub(crate) fn insert(&self, key: Fingerprint, embedding: Vec<f32>, candidates: &Candidates) {
        let key = key.as_str().to_string();

        if !self.entries.contains_key(&key) {
            let mut order = self.order.lock().unwrap();
            order.push_back(key.clone());
            while order.len() > self.capacity {
                if let Some(evicted) = order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
        }

        self.entries.insert(
            key,
            Entry {
                embedding,
                candidates: CachedCandidates::from(candidates),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint;

    fn candidates() -> Candidates {
        Candidates {
            primary: Candidate {
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
            },
            alternatives: vec![],
        }
    }

    #[test]
    fn exact_hit_after_insert() {
        let cache = SelectionCache::new(10, 0.95);
        let key = fingerprint::of_value(&serde_json::json!({"prompt": "hello"}));

        assert!(cache.exact(&key).is_none());
        cache.insert(key.clone(), vec![1.0, 0.0], &candidates());
        assert!(cache.exact(&key).is_some());
    }

    #[test]
    fn semantic_hit_above_threshold() {
        let cache = SelectionCache::new(10, 0.9);
        let key = fingerprint::of_value(&serde_json::json!({"prompt": "hello"}));
        cache.insert(key, vec![1.0, 0.0], &candidates());

        assert!(cache.semantic(&[0.99, (1.0f32 - 0.99f32 * 0.99f32).sqrt()]).is_some());
        assert!(cache.semantic(&[0.0, 1.0]).is_none());
    }

    #[test]
    fn eviction_drops_oldest_entry() {
        let cache = SelectionCache::new(2, 0.95);
        let a = fingerprint::of_value(&serde_json::json!({"prompt": "a"}));
        let b = fingerprint::of_value(&serde_json::json!({"prompt": "b"}));
        let c = fingerprint::of_value(&serde_json::json!({"prompt": "c"}));

        cache.insert(a.clone(), vec![1.0], &candidates());
        cache.insert(b, vec![1.0], &candidates());
        cache.insert(c, vec![1.0], &candidates());

        assert!(cache.exact(&a).is_none());
    }
}
