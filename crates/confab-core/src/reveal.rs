//! Streaming Revealer: paced, cancellable progressive disclosure of a
//! complete answer.
//!
//! The full answer text is known up front; the revealer emits growing
//! prefixes on a fixed cadence so the surface can render a typing effect.
//! Only one reveal may be active per revealer at a time. Cancelling
//! finalizes immediately with the prefix revealed so far, and the terminal
//! outcome is delivered exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use confab_types::config::RevealSettings;
use confab_types::error::StreamError;

/// Reveal cadence configuration.
#[derive(Debug, Clone)]
pub struct RevealConfig {
    pub chunk_chars: usize,
    pub interval: Duration,
}

impl From<&RevealSettings> for RevealConfig {
    fn from(settings: &RevealSettings) -> Self {
        Self {
            chunk_chars: settings.chunk_chars.max(1),
            interval: Duration::from_millis(settings.interval_ms),
        }
    }
}

/// One step of an active reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealStep {
    /// The prefix revealed so far.
    Partial(String),
    /// Terminal step; no further steps follow.
    Done(RevealOutcome),
}

/// How a reveal ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// The full text was revealed.
    Completed(String),
    /// The reveal was cancelled; `partial` is what had been revealed.
    Cancelled { partial: String },
}

/// Factory for reveals, enforcing at most one active reveal at a time.
pub struct Revealer {
    config: RevealConfig,
    active: Arc<AtomicBool>,
}

impl Revealer {
    pub fn new(config: RevealConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin revealing `full_text`.
    ///
    /// Fails with [`StreamError::ConcurrentStream`] if a reveal is already
    /// active. The previous reveal must finish or be cancelled (dropping
    /// its handle cancels it) before a new one can begin.
    pub fn begin(&self, full_text: String) -> Result<RevealHandle, StreamError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(StreamError::ConcurrentStream);
        }
        let guard = ActiveGuard {
            active: self.active.clone(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            // Moved into the task so the flag clears when the reveal ends,
            // however it ends.
            let _guard = guard;
            run_reveal(full_text, config, task_cancel, tx).await;
        });

        Ok(RevealHandle { steps: rx, cancel })
    }
}

async fn run_reveal(
    full_text: String,
    config: RevealConfig,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<RevealStep>,
) {
    let chars: Vec<char> = full_text.chars().collect();
    let mut revealed = 0usize;
    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let partial: String = chars[..revealed].iter().collect();
                debug!(revealed, total = chars.len(), "reveal cancelled");
                let _ = tx.send(RevealStep::Done(RevealOutcome::Cancelled { partial }));
                return;
            }
            _ = interval.tick() => {
                revealed = (revealed + config.chunk_chars).min(chars.len());
                let prefix: String = chars[..revealed].iter().collect();
                if revealed < chars.len() {
                    if tx.send(RevealStep::Partial(prefix)).is_err() {
                        return;
                    }
                } else {
                    let _ = tx.send(RevealStep::Done(RevealOutcome::Completed(prefix)));
                    return;
                }
            }
        }
    }
}

/// Handle to an active reveal. Dropping it cancels the reveal.
#[derive(Debug)]
pub struct RevealHandle {
    steps: mpsc::UnboundedReceiver<RevealStep>,
    cancel: CancellationToken,
}

impl RevealHandle {
    /// Next step, or `None` after the terminal step has been consumed.
    pub async fn next(&mut self) -> Option<RevealStep> {
        self.steps.recv().await
    }

    /// Cancel the reveal. The terminal [`RevealOutcome::Cancelled`] step
    /// still arrives through [`Self::next`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observers can use to react to cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for RevealHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ActiveGuard {
    active: Arc<AtomicBool>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_chars: usize, interval_ms: u64) -> RevealConfig {
        RevealConfig {
            chunk_chars,
            interval: Duration::from_millis(interval_ms),
        }
    }

    async fn drain(handle: &mut RevealHandle) -> (Vec<String>, RevealOutcome) {
        let mut partials = Vec::new();
        loop {
            match handle.next().await.expect("terminal step must arrive") {
                RevealStep::Partial(p) => partials.push(p),
                RevealStep::Done(outcome) => return (partials, outcome),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_monotone_prefixes_until_complete() {
        let revealer = Revealer::new(config(3, 30));
        let mut handle = revealer.begin("hello world".to_string()).unwrap();

        let (partials, outcome) = drain(&mut handle).await;
        assert_eq!(partials, vec!["hel", "hello ", "hello wor"]);
        assert_eq!(outcome, RevealOutcome::Completed("hello world".to_string()));
        for window in partials.windows(2) {
            assert!(window[1].starts_with(&window[0]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn short_text_completes_in_one_step() {
        let revealer = Revealer::new(config(10, 30));
        let mut handle = revealer.begin("hi".to_string()).unwrap();

        let (partials, outcome) = drain(&mut handle).await;
        assert!(partials.is_empty());
        assert_eq!(outcome, RevealOutcome::Completed("hi".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn multibyte_text_splits_on_char_boundaries() {
        let revealer = Revealer::new(config(2, 30));
        let mut handle = revealer.begin("héllo ünïcode".to_string()).unwrap();

        let (partials, outcome) = drain(&mut handle).await;
        assert_eq!(partials[0], "hé");
        assert_eq!(
            outcome,
            RevealOutcome::Completed("héllo ünïcode".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_finalizes_with_partial() {
        let revealer = Revealer::new(config(1, 30));
        let mut handle = revealer.begin("abcdef".to_string()).unwrap();

        let first = handle.next().await.unwrap();
        assert_eq!(first, RevealStep::Partial("a".to_string()));

        handle.cancel();
        loop {
            match handle.next().await.unwrap() {
                RevealStep::Partial(_) => continue,
                RevealStep::Done(RevealOutcome::Cancelled { partial }) => {
                    assert!("abcdef".starts_with(&partial));
                    assert!(!partial.is_empty());
                    break;
                }
                RevealStep::Done(other) => panic!("expected cancellation, got {other:?}"),
            }
        }
        assert!(handle.next().await.is_none(), "terminal step is final");
    }

    #[tokio::test(start_paused = true)]
    async fn second_begin_while_active_is_rejected() {
        let revealer = Revealer::new(config(1, 30));
        let _handle = revealer.begin("a long answer".to_string()).unwrap();

        let err = revealer.begin("another".to_string()).unwrap_err();
        assert_eq!(err, StreamError::ConcurrentStream);
    }

    #[tokio::test(start_paused = true)]
    async fn begin_allowed_after_previous_completes() {
        let revealer = Revealer::new(config(10, 30));
        let mut handle = revealer.begin("one".to_string()).unwrap();
        let (_, outcome) = drain(&mut handle).await;
        assert!(matches!(outcome, RevealOutcome::Completed(_)));
        drop(handle);
        tokio::task::yield_now().await;

        assert!(revealer.begin("two".to_string()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels_and_frees_slot() {
        let revealer = Revealer::new(config(1, 30));
        let handle = revealer.begin("abcdefghij".to_string()).unwrap();
        drop(handle);

        // Give the reveal task a chance to observe cancellation.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(revealer.begin("next".to_string()).is_ok());
    }
}
