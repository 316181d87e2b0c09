//! Usage recording: one record emitted per inbound request, fire-and-forget.

use std::sync::Arc;

use async_trait::async_trait;

/// One usage event, emitted after a response has been fully flushed or has
/// failed. Sink failures never affect the already-returned response.
#[derive(Debug, Clone)]
pub(crate) struct UsageRecord {
    pub api_key_id: Option<String>,
    pub endpoint: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub status_code: u16,
    pub latency_ms: u64,
    pub error_message: Option<String>,
    pub request_id: String,
}

/// Destination for usage records. Implementations must not block the
/// request path; `record` is invoked from a spawned task.
#[async_trait]
pub(crate) trait UsageSink: Send + Sync {
    async fn record(&self, record: UsageRecord);
}

/// A sink that drops every record. Used when no usage backend is configured.
pub(crate) struct NullUsageSink;

#[async_trait]
impl UsageSink for NullUsageSink {
    async fn record(&self, _record: UsageRecord) {}
}

/// A sink that writes records to the application log, for local development.
pub(crate) struct LoggingUsageSink;

#[async_trait]
impl UsageSink for LoggingUsageSink {
    async fn record(&self, record: UsageRecord) {
        log::info!(
            "usage request_id={} endpoint={} provider={} model={} status={} latency_ms={} tokens={}/{}/{}{}",
            record.request_id,
            record.endpoint,
            record.provider,
            record.model,
            record.status_code,
            record.latency_ms,
            record.prompt_tokens,
            record.completion_tokens,
            record.total_tokens,
            record
                .error_message
                .as_ref()
                .map(|m| format!(" error={m}"))
                .unwrap_or_default(),
        );
    }
}

/// Emit a usage record without blocking the caller. The sink is cloned into
/// a spawned task; a panic or error inside it is logged, never propagated.
pub(crate) fn emit(sink: Arc<dyn UsageSink>, record: UsageRecord) {
    tokio::spawn(async move {
        sink.record(record).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CapturingSink {
        records: Mutex<Vec<UsageRecord>>,
    }

    #[async_trait]
    impl UsageSink for CapturingSink {
        async fn record(&self, record: UsageRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    fn sample_record() -> UsageRecord {
        UsageRecord {
            api_key_id: Some("key-1".to_string()),
            endpoint: "/v1/chat/completions".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            status_code: 200,
            latency_ms: 42,
            error_message: None,
            request_id: "req-1".to_string(),
        }
    }

    #[tokio::test]
    async fn emit_delivers_record_to_sink() {
        let sink = Arc::new(CapturingSink {
            records: Mutex::new(Vec::new()),
        });

        emit(sink.clone(), sample_record());

        // Yield so the spawned task runs before we inspect it.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_id, "req-1");
    }

    #[tokio::test]
    async fn null_sink_accepts_records_without_panicking() {
        NullUsageSink.record(sample_record()).await;
    }
}
