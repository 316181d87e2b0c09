//! Three-tier prompt-response cache: exact fingerprint match, semantic-exact
//! (embedding cosine within epsilon of 1.0), and semantic-similar (cosine at
//! or above a configurable threshold). Looked up before the fallback
//! executor runs; only non-streaming responses are ever written back.

mod memory;

use std::sync::Arc;

use config::PromptCacheConfig;

use crate::{fingerprint::Fingerprint, messages::unified::UnifiedResponse};

pub(crate) use memory::MemoryCache;

/// Tier a cache hit was served from, surfaced to callers as
/// `UnifiedUsage::cache_tier`.
pub(crate) const TIER_EXACT: &str = "prompt_response";
pub(crate) const TIER_SEMANTIC_EXACT: &str = "semantic_exact";
pub(crate) const TIER_SEMANTIC_SIMILAR: &str = "semantic_similar";

const SEMANTIC_EXACT_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub response: UnifiedResponse,
    pub embedding: Option<Vec<f32>>,
}

/// Storage contract for the prompt-response cache. An in-memory LRU and an
/// external KV both satisfy this; callers don't need to know which.
pub(crate) trait PromptCacheBackend: Send + Sync {
    fn get_exact(&self, fingerprint: &Fingerprint) -> Option<CacheEntry>;
    fn get_semantic(&self, embedding: &[f32], threshold: f32) -> Option<(f32, CacheEntry)>;
    fn put(&self, entry: CacheEntry);
}

/// Outcome of a cache lookup: which tier (if any) matched, and the response
/// to replay.
pub(crate) struct CacheHit {
    pub tier: &'static str,
    pub response: UnifiedResponse,
}

pub(crate) struct PromptCache {
    backend: Arc<dyn PromptCacheBackend>,
    enabled: bool,
    semantic_threshold: f32,
}

impl PromptCache {
    pub(crate) fn new(config: &PromptCacheConfig) -> Self {
        Self {
            backend: Arc::new(MemoryCache::new(config.capacity)),
            enabled: config.enabled,
            semantic_threshold: config.semantic_threshold,
        }
    }

    #[cfg(test)]
    fn with_backend(backend: Arc<dyn PromptCacheBackend>, enabled: bool, semantic_threshold: f32) -> Self {
        Self {
            backend,
            enabled,
            semantic_threshold,
        }
    }

    /// Look up a cached response for `fingerprint`, trying exact match, then
    /// semantic-exact, then semantic-similar, in that order.
    pub(crate) fn lookup(&self, fingerprint: &Fingerprint, embedding: Option<&[f32]>) -> Option<CacheHit> {
        if !self.enabled {
            return None;
        }

        if let Some(entry) = self.backend.get_exact(fingerprint) {
            return Some(CacheHit {
                tier: TIER_EXACT,
                response: entry.response,
            });
        }

        let embedding = embedding?;

        if let Some((similarity, entry)) = self.backend.get_semantic(embedding, self.semantic_threshold) {
            let tier = if (1.0 - similarity).abs() <= SEMANTIC_EXACT_EPSILON {
                TIER_SEMANTIC_EXACT
            } else {
                TIER_SEMANTIC_SIMILAR
            };

            return Some(CacheHit {
                tier,
                response: entry.response,
            });
        }

        None
    }

    /// Store a successful non-streaming completion. Never call this for a
    /// streaming response.
    pub(crate) fn store(&self, fingerprint: Fingerprint, response: UnifiedResponse, embedding: Option<Vec<f32>>) {
        if !self.enabled {
            return;
        }

        self.backend.put(CacheEntry {
            fingerprint,
            response,
            embedding,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::{UnifiedChoice, UnifiedFinishReason, UnifiedMessage, UnifiedRole, UnifiedUsage};

    fn response() -> UnifiedResponse {
        UnifiedResponse {
            id: "resp-1".to_string(),
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
        }
    }

    fn fp(seed: &str) -> Fingerprint {
        crate::fingerprint::of_value(&serde_json::json!({ "seed": seed }))
    }

    #[test]
    fn exact_hit_reports_prompt_response_tier() {
        let cache = PromptCache::with_backend(Arc::new(MemoryCache::new(10)), true, 0.9);
        let key = fp("a");
        cache.store(key.clone(), response(), None);

        let hit = cache.lookup(&key, None).expect("exact hit");
        assert_eq!(hit.tier, TIER_EXACT);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = PromptCache::with_backend(Arc::new(MemoryCache::new(10)), false, 0.9);
        let key = fp("a");
        cache.store(key.clone(), response(), None);

        assert!(cache.lookup(&key, None).is_none());
    }

    #[test]
    fn semantic_similar_hit_below_exact_epsilon() {
        let cache = PromptCache::with_backend(Arc::new(MemoryCache::new(10)), true, 0.9);
        cache.store(fp("a"), response(), Some(vec![1.0, 0.0]));

        let query_key = fp("query-not-stored");
        let hit = cache
            .lookup(&query_key, Some(&[0.95, (1.0f32 - 0.95f32 * 0.95f32).sqrt()]))
            .expect("semantic hit");
        assert_eq!(hit.tier, TIER_SEMANTIC_SIMILAR);
    }
}
