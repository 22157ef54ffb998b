//! Test doubles for the extraction capability
//!
//! Public so integration tests under `tests/` can drive the pipeline
//! without network access.

use super::client::{ExtractionClient, ExtractionRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&ExtractionRequest) -> Result<String> + Send + Sync>;

/// Extraction client answering from a script.
///
/// Replies come from a queue when one is configured, otherwise from a
/// responder function. Every request is recorded.
pub struct ScriptedExtractionClient {
    queue: Mutex<VecDeque<Result<String>>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedExtractionClient {
    /// Answer requests in order from `replies`; an exhausted queue is an error
    pub fn from_replies(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            queue: Mutex::new(replies.into_iter().collect()),
            responder: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request through `f`
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ExtractionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Route extraction prompts to `extract` and deduplication prompts
    /// (those carrying a system policy) to `dedup`
    pub fn routed(extract: impl Into<String>, dedup: Result<String>) -> Self {
        let extract = extract.into();
        let dedup = match dedup {
            Ok(text) => Ok(text),
            Err(e) => Err(e.to_string()),
        };
        Self::from_fn(move |request| {
            if request.system.is_some() {
                dedup.clone().map_err(Error::Extraction)
            } else {
                Ok(extract.clone())
            }
        })
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ExtractionClient for ScriptedExtractionClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ExtractionRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(responder) = &self.responder {
            return responder(&request);
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Err(Error::Extraction("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_exhausted() {
        let client = ScriptedExtractionClient::from_replies(vec![
            Ok("one".to_string()),
            Err(Error::Extraction("down".to_string())),
        ]);
        assert_eq!(client.complete(ExtractionRequest::new("a", 10)).await.unwrap(), "one");
        assert!(client.complete(ExtractionRequest::new("b", 10)).await.is_err());
        assert!(client.complete(ExtractionRequest::new("c", 10)).await.is_err());
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.requests()[1].prompt, "b");
    }

    #[tokio::test]
    async fn test_routed_by_system_prompt() {
        let client = ScriptedExtractionClient::routed("extract", Ok("dedup".to_string()));
        let plain = client.complete(ExtractionRequest::new("p", 10)).await.unwrap();
        let with_system = client
            .complete(ExtractionRequest::new("p", 10).with_system("s"))
            .await
            .unwrap();
        assert_eq!(plain, "extract");
        assert_eq!(with_system, "dedup");
    }
}
