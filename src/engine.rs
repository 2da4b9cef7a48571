//! The engine: owned configuration plus injected capabilities, with the
//! indexing lock and per-process LLM kill switch.
//!
//! Concurrency model: queries run freely and concurrently; indexing runs
//! take `index_lock` so at most one mutates the stores at a time. The
//! autoscan manager acquires the same lock with `try_lock` and drops its
//! run when an indexing pass is already underway.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::capability::Capabilities;
use crate::config::Config;
use crate::index::{self, IndexOutcome};
use crate::lexical::LexicalIndex;
use crate::llm::ChatError;
use crate::models::{Answer, ScanOutcome, SearchHit};
use crate::query;
use crate::scan;

pub struct Engine {
    pub(crate) config: Config,
    pub(crate) caps: Capabilities,
    pub(crate) index_lock: Mutex<()>,
    llm_disabled: AtomicBool,
    lexical: Mutex<LexicalIndex>,
}

impl Engine {
    /// Build an engine with an explicit capability set. Tests use this with
    /// null objects; production callers usually want [`Engine::detect`].
    pub fn new(config: Config, caps: Capabilities) -> Self {
        Self {
            config,
            caps,
            index_lock: Mutex::new(()),
            llm_disabled: AtomicBool::new(false),
            lexical: Mutex::new(LexicalIndex::default()),
        }
    }

    /// Probe the environment and build an engine with whatever is available.
    pub fn detect(config: Config) -> Self {
        let caps = Capabilities::detect(&config);
        Self::new(config, caps)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Refresh the mapping store and fingerprint registry from the roots.
    pub fn scan(&self) -> Result<ScanOutcome> {
        scan::run_scan(&self.config.scan, &self.config.storage.data_dir)
    }

    /// Re-extract everything and rebuild all stores.
    pub async fn index_full(&self) -> Result<IndexOutcome> {
        let _guard = self.index_lock.lock().await;
        index::build_full(&self.config, &self.caps).await
    }

    /// Re-index only what changed since the last run.
    pub async fn index_incremental(&self) -> Result<IndexOutcome> {
        let _guard = self.index_lock.lock().await;
        index::ensure_up_to_date(&self.config, &self.caps).await
    }

    /// Answer a question, citations included. `k` overrides the configured
    /// retrieval depth when given.
    pub async fn ask_with_sources(&self, question: &str, k: Option<usize>) -> Answer {
        let mut lexical = self.lexical.lock().await;
        query::ask_with_sources(
            &self.config,
            &self.caps,
            &mut lexical,
            &self.llm_disabled,
            question,
            k,
        )
        .await
    }

    /// Answer a question, text only.
    pub async fn ask(&self, question: &str) -> String {
        self.ask_with_sources(question, None).await.answer
    }

    /// Offline keyword search over the lexical index.
    pub async fn search(
        &self,
        question: &str,
        top_k: Option<usize>,
        min_score: Option<f64>,
    ) -> Vec<SearchHit> {
        let mut lexical = self.lexical.lock().await;
        query::keyword_search(
            &self.config.storage.data_dir,
            &mut lexical,
            question,
            top_k.unwrap_or(self.config.retrieval.top_k),
            min_score.unwrap_or(self.config.retrieval.min_score),
        )
    }

    /// Open a document at a page with the platform handler.
    pub fn open(&self, basename: &str, page: u32) -> Result<String> {
        query::open_source(&self.config.storage.data_dir, basename, page)
    }

    /// Answer a question as a stream of text deltas. The receiver yields
    /// model deltas when the chat model streams natively, word bursts
    /// otherwise. Degradations mirror [`Engine::ask`].
    pub fn stream(self: Arc<Self>, question: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        let engine = self;
        let question = question.to_string();
        tokio::spawn(async move {
            engine.stream_inner(&question, tx).await;
        });
        rx
    }

    async fn stream_inner(&self, question: &str, tx: mpsc::Sender<String>) {
        let question = question.trim();
        if question.is_empty() {
            let _ = tx.send(query::MISSING_QUERY_MSG.to_string()).await;
            return;
        }

        let hits = {
            let mut lexical = self.lexical.lock().await;
            query::retrieve(&self.config, &self.caps, &mut lexical, question, None).await
        };
        if hits.is_empty() {
            let _ = tx.send(query::NO_EXTRACTS_MSG.to_string()).await;
            return;
        }

        let (context, _packed) =
            query::pack_context(&hits, self.config.retrieval.context_budget_chars);

        if self.caps.chat.is_enabled()
            && !self.llm_disabled.load(std::sync::atomic::Ordering::Relaxed)
        {
            let (system, user) = query::synthesis_prompts(&context, question);
            if self.caps.chat.supports_streaming() {
                match self.caps.chat.stream(&system, &user, tx.clone()).await {
                    Ok(()) => return,
                    Err(e) => self.note_chat_failure(e),
                }
            } else {
                match self.caps.chat.complete(&system, &user).await {
                    Ok(answer) => {
                        send_bursts(&tx, &answer).await;
                        return;
                    }
                    Err(e) => self.note_chat_failure(e),
                }
            }
        }

        send_bursts(&tx, &context).await;
    }

    fn note_chat_failure(&self, e: ChatError) {
        match e {
            ChatError::Auth(msg) => {
                warn!("LLM credentials rejected, disabling synthesis: {}", msg);
                self.llm_disabled
                    .store(true, std::sync::atomic::Ordering::Relaxed);
            }
            ChatError::Other(msg) => warn!("Synthesis failed, streaming raw extracts: {}", msg),
        }
    }
}

async fn send_bursts(tx: &mpsc::Sender<String>, text: &str) {
    for burst in query::word_bursts(text) {
        if tx.send(burst).await.is_err() {
            return;
        }
    }
}
