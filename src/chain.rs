//! Ordered fallback chains.
//!
//! Every extraction stage (OCR, entities, summaries, translation) holds a
//! [`FallbackChain`] over its capability trait. The driver tries backends in
//! priority order, adopts the first result accepted by the stage's success
//! predicate, and records every attempt so exhaustion can be reported with
//! per-backend detail.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Common supertrait of every capability trait that can sit in a chain.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
}

/// One tried backend and what happened.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Attempt {
    pub backend: String,
    pub outcome: String,
}

/// The result adopted from the first accepted backend.
#[derive(Debug)]
pub struct Adopted<T> {
    pub value: T,
    pub backend: String,
    /// Backends that were tried and rejected before the winner.
    pub attempts: Vec<Attempt>,
}

/// Every backend failed or produced unusable output.
#[derive(Debug, Default)]
pub struct Exhausted {
    pub attempts: Vec<Attempt>,
}

impl Exhausted {
    /// One line per attempt, e.g. `- tesseract: binary not found`.
    pub fn describe(&self) -> String {
        if self.attempts.is_empty() {
            return "- no backends configured".to_string();
        }
        self.attempts
            .iter()
            .map(|a| format!("- {}: {}", a.backend, a.outcome))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Priority-ordered list of backends for one stage.
pub struct FallbackChain<B: ?Sized> {
    stage: &'static str,
    backends: Vec<Arc<B>>,
}

impl<B: Backend + ?Sized> FallbackChain<B> {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            backends: Vec::new(),
        }
    }

    pub fn with(mut self, backend: Arc<B>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn push(&mut self, backend: Arc<B>) {
        self.backends.push(backend);
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Try each backend in order until `accept` approves a result.
    pub async fn run<'a, T, F, P>(&'a self, mut call: F, accept: P) -> Result<Adopted<T>, Exhausted>
    where
        F: FnMut(&'a B) -> BoxFuture<'a, anyhow::Result<T>>,
        P: Fn(&T) -> bool,
    {
        let mut attempts = Vec::new();

        for backend in &self.backends {
            let name = backend.name().to_string();
            match call(backend.as_ref()).await {
                Ok(value) if accept(&value) => {
                    debug!(stage = self.stage, backend = %name, "Backend adopted");
                    return Ok(Adopted {
                        value,
                        backend: name,
                        attempts,
                    });
                }
                Ok(_) => {
                    debug!(stage = self.stage, backend = %name, "Backend produced no usable output");
                    attempts.push(Attempt {
                        backend: name,
                        outcome: "produced no usable output".to_string(),
                    });
                }
                Err(e) => {
                    warn!(stage = self.stage, backend = %name, "Backend failed: {:#}", e);
                    attempts.push(Attempt {
                        backend: name,
                        outcome: format!("{:#}", e),
                    });
                }
            }
        }

        Err(Exhausted { attempts })
    }
}
