use super::{Comparison, MatchBackend};
use crate::model::MatchResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Deterministic backend for tests and dry runs. Replies are served in
/// order; the last one repeats once the script runs out.
pub struct FakeBackend {
    replies: Mutex<Vec<MatchResult>>,
    audits: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeBackend {
    pub fn always(result: MatchResult) -> Self {
        Self::scripted(vec![result])
    }

    pub fn scripted(replies: Vec<MatchResult>) -> Self {
        Self {
            replies: Mutex::new(replies),
            audits: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes the worker audit this backend like the cloud one.
    pub fn auditing(mut self) -> Self {
        self.audits = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MatchResult {
        let mut replies = match self.replies.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies.first().cloned().unwrap_or(MatchResult::NotMatched)
        }
    }
}

#[async_trait]
impl MatchBackend for FakeBackend {
    async fn compare(&self, _reference: &[u8], _target: &[u8], _threshold: u8) -> Comparison {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let result = self.next_reply();
        let raw = serde_json::to_value(&result).unwrap_or_default();
        Comparison { result, raw }
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }

    fn audits_raw_response(&self) -> bool {
        self.audits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_is_served_in_order_then_repeats() {
        let fake = FakeBackend::scripted(vec![
            MatchResult::Matched { similarity: 90 },
            MatchResult::NotMatched,
        ]);
        assert_eq!(
            fake.compare(b"", b"", 0).await.result,
            MatchResult::Matched { similarity: 90 }
        );
        assert_eq!(fake.compare(b"", b"", 0).await.result, MatchResult::NotMatched);
        assert_eq!(fake.compare(b"", b"", 0).await.result, MatchResult::NotMatched);
        assert_eq!(fake.calls(), 3);
    }
}
