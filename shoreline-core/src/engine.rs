//! Generation dispatch and streaming engine.
//!
//! [`ChatEngine`] wraps the backend bound at construction and turns its
//! output into an ordered fragment stream with a hard wall-clock deadline.
//! Generation runs on its own tokio task (the producer) and fragments are
//! relayed to the caller through a single-producer/single-consumer channel,
//! so a blocking or slow backend never stalls the request scheduler.
//!
//! The engine never surfaces a hard error: a backend that fails mid-stream
//! is silently replaced by the demo backend, and a deadline overrun simply
//! ends the stream early. Callers always get *some* response. This is a
//! deliberate availability-over-correctness policy; the substitutions are
//! visible in the logs via the `fallback_reason` field, not to the caller.

use crate::backend::{Backend, DemoBackend, FragmentStream};
use crate::config::Settings;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Items travelling over the bridge channel. `End` is the terminal sentinel;
/// a channel that closes without it means the producer was lost.
#[derive(Debug)]
enum StreamItem {
    Fragment(String),
    End,
}

/// Engine owning the backend binding for the lifetime of the process.
///
/// The binding is immutable after construction and shared read-only by all
/// concurrent requests; reconfiguring means constructing a new engine.
pub struct ChatEngine {
    backend: Arc<dyn Backend>,
    demo: Arc<DemoBackend>,
}

impl ChatEngine {
    /// Binds a backend per the fallback selector and builds the engine.
    pub async fn new(settings: &Settings) -> Self {
        let backend = crate::backend::bind(settings).await;
        Self::with_backend(backend, &settings.fallback_message)
    }

    /// Builds the engine around an already-constructed backend.
    pub fn with_backend(backend: Arc<dyn Backend>, fallback_message: &str) -> Self {
        Self {
            backend,
            demo: Arc::new(DemoBackend::new(fallback_message)),
        }
    }

    /// True when no real backend could be bound.
    pub fn demo_mode(&self) -> bool {
        self.backend.name() == "demo"
    }

    /// Starts a generation and returns the consumer half of the bridge.
    ///
    /// The producer task pulls fragments from the bound backend, truncates
    /// at `deadline`, substitutes demo output on any mid-stream failure, and
    /// pushes a terminal sentinel when the sequence ends. It is independent
    /// of the returned [`TokenStream`]: dropping the stream early lets the
    /// producer notice the closed channel and stop on its next send.
    pub fn stream(&self, prompt: &str, deadline: Duration) -> TokenStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let demo = Arc::clone(&self.demo);
        let prompt = prompt.to_owned();

        tokio::spawn(async move {
            run_producer(backend, demo, prompt, deadline, tx).await;
        });

        TokenStream {
            rx,
            saw_sentinel: false,
            exhausted: false,
        }
    }

    /// Full answer: `stream` drained and concatenated.
    ///
    /// If the stream ends without its sentinel (the producer was lost), the
    /// configured fallback message is returned instead of an error.
    pub async fn generate(&self, prompt: &str, deadline: Duration) -> String {
        let mut stream = self.stream(prompt, deadline);
        let mut reply = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            reply.push_str(&fragment);
        }

        if stream.ended_cleanly() {
            reply
        } else {
            warn!(
                fallback_reason = "producer_lost",
                "stream ended without terminal sentinel, returning fallback message"
            );
            self.demo.fallback_message().to_owned()
        }
    }
}

/// Producer loop: one per in-flight request, running on its own task.
async fn run_producer(
    backend: Arc<dyn Backend>,
    demo: Arc<DemoBackend>,
    prompt: String,
    deadline: Duration,
    tx: mpsc::UnboundedSender<StreamItem>,
) {
    let started = Instant::now();
    let mut source = open_fragments(backend, &prompt);
    let mut degraded = false;

    loop {
        // Each pull is awaited under the remaining budget so a backend that
        // never produces cannot hold the session past the deadline.
        let Some(budget) = deadline.checked_sub(started.elapsed()) else {
            debug!("generation deadline reached, truncating stream");
            break;
        };
        let pulled = match timeout(budget, source.next()).await {
            Ok(item) => item,
            Err(_) => {
                debug!("generation deadline reached while awaiting a fragment");
                break;
            }
        };

        match pulled {
            None => break,
            Some(Ok(fragment)) => {
                // Consumer went away; nobody is left to receive the sentinel.
                if tx.send(StreamItem::Fragment(fragment)).is_err() {
                    return;
                }
            }
            Some(Err(err)) if !degraded => {
                warn!(
                    fallback_reason = "generation_failure",
                    error = %err,
                    "backend failed mid-stream, continuing with demo output"
                );
                degraded = true;
                source = demo.stream_fragments(&prompt);
            }
            Some(Err(err)) => {
                warn!(error = %err, "fallback source failed, ending stream");
                break;
            }
        }
    }

    let _ = tx.send(StreamItem::End);
}

/// Picks the backend's native fragment sequence, or wraps its single-shot
/// call when it has no incremental support (whole result as one fragment).
fn open_fragments(backend: Arc<dyn Backend>, prompt: &str) -> FragmentStream {
    if backend.supports_streaming() {
        backend.stream_fragments(prompt)
    } else {
        let prompt = prompt.to_owned();
        Box::pin(async_stream::try_stream! {
            let text = backend.single_shot(&prompt).await?;
            yield text;
        })
    }
}

/// Consumer half of the bridge: yields fragments in emission order until the
/// terminal sentinel. One per request; dropping it abandons the producer.
pub struct TokenStream {
    rx: mpsc::UnboundedReceiver<StreamItem>,
    saw_sentinel: bool,
    exhausted: bool,
}

impl TokenStream {
    /// Awaits the next fragment, or `None` once the stream has ended.
    pub async fn next_fragment(&mut self) -> Option<String> {
        StreamExt::next(self).await
    }

    /// True when the stream ended with the producer's terminal sentinel
    /// rather than a dropped channel.
    pub fn ended_cleanly(&self) -> bool {
        self.saw_sentinel
    }
}

impl Stream for TokenStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if self.exhausted {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamItem::Fragment(fragment))) => Poll::Ready(Some(fragment)),
            Poll::Ready(Some(StreamItem::End)) => {
                self.saw_sentinel = true;
                self.exhausted = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.exhausted = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, Result as BackendResult};
    use async_trait::async_trait;

    const FALLBACK: &str = "demo fallback";

    /// Scripted backend: replays a fixed fragment sequence, optionally
    /// pausing between fragments or hanging forever.
    struct ScriptedBackend {
        script: Vec<BackendResult<String>>,
        delay: Duration,
        hang: bool,
    }

    impl ScriptedBackend {
        fn fragments(fragments: &[&str]) -> Self {
            Self {
                script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                delay: Duration::ZERO,
                hang: false,
            }
        }

        fn failing_after(fragments: &[&str]) -> Self {
            let mut script: Vec<BackendResult<String>> =
                fragments.iter().map(|f| Ok(f.to_string())).collect();
            script.push(Err(BackendError::Api("connection reset".to_string())));
            Self {
                script,
                delay: Duration::ZERO,
                hang: false,
            }
        }

        fn never_completes() -> Self {
            Self {
                script: Vec::new(),
                delay: Duration::ZERO,
                hang: true,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn supports_streaming(&self) -> bool {
            true
        }

        fn stream_fragments(&self, _prompt: &str) -> FragmentStream {
            let script: Vec<_> = self
                .script
                .iter()
                .map(|item| match item {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(BackendError::Api("connection reset".to_string())),
                })
                .collect();
            let delay = self.delay;
            let hang = self.hang;
            Box::pin(async_stream::stream! {
                for item in script {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    yield item;
                }
                if hang {
                    std::future::pending::<()>().await;
                }
            })
        }

        async fn single_shot(&self, _prompt: &str) -> BackendResult<String> {
            Ok("single shot answer".to_string())
        }

        async fn embed(&self, _text: &str) -> BackendResult<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
    }

    /// Backend with no incremental support; the engine must fall back to
    /// `single_shot` and emit the whole result as one fragment.
    struct SingleShotBackend;

    #[async_trait]
    impl Backend for SingleShotBackend {
        fn name(&self) -> &'static str {
            "singleshot"
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        fn stream_fragments(&self, _prompt: &str) -> FragmentStream {
            Box::pin(futures::stream::empty())
        }

        async fn single_shot(&self, prompt: &str) -> BackendResult<String> {
            Ok(format!("answer to {prompt}"))
        }

        async fn embed(&self, _text: &str) -> BackendResult<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
    }

    fn engine_with(backend: impl Backend + 'static) -> ChatEngine {
        ChatEngine::with_backend(Arc::new(backend), FALLBACK)
    }

    async fn drain(mut stream: TokenStream) -> Vec<String> {
        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next_fragment().await {
            fragments.push(fragment);
        }
        fragments
    }

    #[tokio::test]
    async fn generate_equals_concatenated_stream() {
        let deadline = Duration::from_secs(5);
        let engine = engine_with(ScriptedBackend::fragments(&["Hello", ", ", "world"]));

        let fragments = drain(engine.stream("hi", deadline)).await;
        let generated = engine.generate("hi", deadline).await;

        assert_eq!(fragments.concat(), "Hello, world");
        assert_eq!(generated, fragments.concat());
    }

    #[tokio::test]
    async fn fragments_arrive_in_emission_order() {
        let engine = engine_with(ScriptedBackend::fragments(&["a", "b", "c", "d"]));
        let fragments = drain(engine.stream("x", Duration::from_secs(5))).await;
        assert_eq!(fragments, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn empty_prompt_in_demo_mode_returns_exact_fallback_message() {
        let engine = ChatEngine::with_backend(Arc::new(DemoBackend::new(FALLBACK)), FALLBACK);
        assert!(engine.demo_mode());

        let reply = engine.generate("", Duration::from_secs(5)).await;
        assert_eq!(reply, FALLBACK);
    }

    #[tokio::test]
    async fn demo_mode_prefixes_nonempty_prompts() {
        let engine = ChatEngine::with_backend(Arc::new(DemoBackend::new(FALLBACK)), FALLBACK);
        let reply = engine.generate("hello", Duration::from_secs(5)).await;
        assert_eq!(reply, "(demo) You said: hello");
    }

    #[tokio::test]
    async fn mid_stream_failure_degrades_to_demo_output_without_error() {
        let engine = engine_with(ScriptedBackend::failing_after(&["Partial "]));
        let reply = engine.generate("hello", Duration::from_secs(5)).await;

        assert_eq!(reply, "Partial (demo) You said: hello");
    }

    #[tokio::test]
    async fn failure_before_any_fragment_yields_full_demo_output() {
        let engine = engine_with(ScriptedBackend::failing_after(&[]));
        let reply = engine.generate("hello", Duration::from_secs(5)).await;

        assert!(!reply.is_empty());
        assert_eq!(reply, "(demo) You said: hello");
    }

    #[tokio::test]
    async fn never_completing_backend_returns_promptly_on_tiny_deadline() {
        let engine = engine_with(ScriptedBackend::never_completes());

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            engine.generate("hi", Duration::from_millis(1)),
        )
        .await;

        // At most one fragment could have been produced before truncation;
        // here the backend produces none.
        assert_eq!(result.expect("stream must not hang"), "");
    }

    #[tokio::test]
    async fn zero_deadline_never_hangs() {
        let engine = engine_with(ScriptedBackend::fragments(&["late"]).with_delay(
            Duration::from_millis(50),
        ));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            engine.generate("hi", Duration::ZERO),
        )
        .await;

        assert_eq!(result.expect("stream must not hang"), "");
    }

    #[tokio::test]
    async fn deadline_truncates_a_slow_stream_without_error() {
        let slow = ScriptedBackend::fragments(&["a"; 100]).with_delay(Duration::from_millis(20));
        let engine = engine_with(slow);

        let started = std::time::Instant::now();
        let mut stream = engine.stream("hi", Duration::from_millis(90));
        let mut count = 0;
        while stream.next_fragment().await.is_some() {
            count += 1;
        }

        assert!(stream.ended_cleanly());
        assert!(count < 100, "stream was not truncated: {count} fragments");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn non_streaming_backend_emits_whole_result_as_one_fragment() {
        let engine = engine_with(SingleShotBackend);
        let fragments = drain(engine.stream("q", Duration::from_secs(5))).await;
        assert_eq!(fragments, vec!["answer to q"]);
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_interleave() {
        let engine = Arc::new(ChatEngine::with_backend(
            Arc::new(DemoBackend::new(FALLBACK)),
            FALLBACK,
        ));
        let deadline = Duration::from_secs(5);

        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { drain(engine.stream("A", deadline)).await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { drain(engine.stream("B", deadline)).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.concat(), "(demo) You said: A");
        assert_eq!(b.concat(), "(demo) You said: B");
    }

    #[tokio::test]
    async fn abandoned_stream_does_not_wedge_the_producer() {
        let slow = ScriptedBackend::fragments(&["x"; 50]).with_delay(Duration::from_millis(5));
        let engine = engine_with(slow);

        let mut stream = engine.stream("hi", Duration::from_secs(5));
        // Read one fragment, then walk away mid-stream.
        assert!(stream.next_fragment().await.is_some());
        drop(stream);

        // The engine stays usable for later requests.
        let reply = engine.generate("again", Duration::from_secs(5)).await;
        assert_eq!(reply, "x".repeat(50));
    }
}
