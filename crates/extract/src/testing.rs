use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::CacheStore;
use crate::llm::{ChatMessage, ChatModel, ModelResponse, Usage, YesNo};

type Responder = Box<dyn Fn(&str, &[ChatMessage]) -> Result<String> + Send + Sync>;

/// Model double driven by a closure, recording every prompt it sees.
pub struct ScriptedModel {
    responder: Responder,
    answers: Mutex<VecDeque<YesNo>>,
    chat_calls: AtomicUsize,
    classify_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    history_lengths: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(responder: impl Fn(&str, &[ChatMessage]) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            answers: Mutex::new(VecDeque::new()),
            chat_calls: AtomicUsize::new(0),
            classify_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            history_lengths: Mutex::new(Vec::new()),
        }
    }

    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Err(anyhow::anyhow!("model unavailable")))
    }

    /// Answers for successive yes/no calls; `No` once exhausted.
    pub fn with_answers(self, answers: impl IntoIterator<Item = YesNo>) -> Self {
        *self.answers.lock().unwrap() = answers.into_iter().collect();
        self
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, prompt: &str, history: &[ChatMessage]) -> Result<ModelResponse> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.history_lengths.lock().unwrap().push(history.len());

        let text = (self.responder)(prompt, history)?;
        let usage = Usage {
            input_tokens: prompt.len() as u64,
            output_tokens: text.len() as u64,
        };
        Ok(ModelResponse::new(prompt, history, text, usage))
    }

    async fn classify_yes_no(&self, _prompt: &str, _history: &[ChatMessage]) -> Result<YesNo> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(YesNo::No))
    }
}

/// Cache whose every operation fails.
pub struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        anyhow::bail!("disk on fire")
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<()> {
        anyhow::bail!("disk on fire")
    }
}
