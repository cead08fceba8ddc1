use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CategorySet, Classifier};
use crate::error::{ClassifierError, ClassifierResult};

/// Answers every ticket with the same text, normalized like the HTTP gateway.
#[derive(Debug, Clone)]
pub struct FakeClassifier {
    response: String,
    categories: CategorySet,
}

impl FakeClassifier {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            categories: CategorySet::default(),
        }
    }

    pub fn with_categories(mut self, categories: CategorySet) -> Self {
        self.categories = categories;
        self
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, _text: &str, _prompt_id: &str) -> ClassifierResult<String> {
        Ok(self.categories.normalize(&self.response))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Replays a queue of answers in call order and records each call.
///
/// Answers are returned as given, without normalization.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<ClassifierResult<String>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedClassifier {
    pub fn new(script: impl IntoIterator<Item = ClassifierResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Successful answers only.
    pub fn answering<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels.into_iter().map(|l| Ok(l.into())))
    }

    /// `(text, prompt_id)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, text: &str, prompt_id: &str) -> ClassifierResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((text.to_string(), prompt_id.to_string()));
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| {
            Err(ClassifierError::InvalidResponse {
                message: "script exhausted".to_string(),
            })
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
