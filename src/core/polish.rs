/// Polishing collaborator boundary: rewrites a composed seed into
/// conversational text.
///
/// The engine only ever sees the [`Polisher`] trait. Any failure falls back
/// to the seed, so a dead collaborator degrades the wording but never the
/// run.
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::core::config::{NlgConfig, NlgMode};
use crate::schema::event::EventKind;
use crate::schema::message::{Facts, Role};

#[derive(Debug, Error)]
pub enum PolishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("collaborator returned status {0}")]
    Status(u16),
    #[error("collaborator returned an empty body")]
    Empty,
}

/// What the collaborator is asked to do with the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolishMode {
    /// Reword the seed, keeping every fact.
    Paraphrase,
    /// Write a fresh body from the facts alone.
    Full,
}

impl PolishMode {
    /// `None` when polishing is switched off.
    pub fn from_config(mode: NlgMode) -> Option<PolishMode> {
        match mode {
            NlgMode::Off => None,
            NlgMode::Paraphrase => Some(PolishMode::Paraphrase),
            NlgMode::Full => Some(PolishMode::Full),
        }
    }
}

/// One request across the text-only boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolishRequest {
    pub role: Role,
    pub event_kind: EventKind,
    pub facts: Facts,
    pub avoid_opening_like: Option<String>,
    pub mode: PolishMode,
    /// Template-built body.
    pub seed: String,
    pub tone: String,
    pub display_name: String,
}

/// Injected text-polishing capability.
pub trait Polisher {
    /// Return the polished body. Errors are recovered by the caller.
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError>;

    /// Prime the collaborator before the first request. Failures are ignored.
    fn warmup(&mut self) {}
}

/// Returns the seed unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPolisher;

impl Polisher for NoopPolisher {
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError> {
        Ok(request.seed.clone())
    }
}

/// Cache key over everything that shapes a response: mode, model, role,
/// event, header, seed body and facts.
pub fn cache_key(request: &PolishRequest, model: &str) -> u64 {
    let mut hasher = FxHasher::default();
    request.mode.hash(&mut hasher);
    model.hash(&mut hasher);
    request.role.hash(&mut hasher);
    request.event_kind.hash(&mut hasher);
    request.event_kind.header().hash(&mut hasher);
    request.seed.hash(&mut hasher);
    for (key, value) in &request.facts {
        key.hash(&mut hasher);
        value.to_string().hash(&mut hasher);
    }
    hasher.finish()
}

/// Remembers successful responses so an identical request is answered
/// without calling the wrapped polisher again. Errors are never cached.
pub struct CachedPolisher {
    inner: Box<dyn Polisher>,
    model: String,
    cache: FxHashMap<u64, String>,
}

impl CachedPolisher {
    pub fn new(inner: Box<dyn Polisher>, model: impl Into<String>) -> Self {
        Self {
            inner,
            model: model.into(),
            cache: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Polisher for CachedPolisher {
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError> {
        let key = cache_key(request, &self.model);
        if let Some(text) = self.cache.get(&key) {
            debug!(role = %request.role, kind = request.event_kind.name(), "polish cache hit");
            return Ok(text.clone());
        }
        let text = self.inner.polish(request)?;
        self.cache.insert(key, text.clone());
        Ok(text)
    }

    fn warmup(&mut self) {
        self.inner.warmup();
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Polisher backed by a local Ollama server.
pub struct OllamaPolisher {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    temperature: f64,
}

impl OllamaPolisher {
    pub fn new(config: &NlgConfig) -> Result<Self, PolishError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(config.timeout_secs.clamp(1, 5)))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", config.host.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn generate(&self, prompt: String) -> Result<String, PolishError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self.client.post(&self.url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(PolishError::Status(response.status().as_u16()));
        }

        let text = response.json::<GenerateResponse>()?.response;
        let text = text.trim();
        if text.is_empty() {
            return Err(PolishError::Empty);
        }
        Ok(text.to_string())
    }
}

impl Polisher for OllamaPolisher {
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError> {
        self.generate(build_prompt(request))
    }

    /// Loads the model so the first real request doesn't pay for it.
    fn warmup(&mut self) {
        if let Err(e) = self.generate("Reply with OK.".to_string()) {
            debug!(error = %e, "warmup failed");
        }
    }
}

/// Prompt for either mode. Facts are listed as the only source of truth.
pub fn build_prompt(request: &PolishRequest) -> String {
    let mut prompt = String::new();
    let event = request.event_kind.name();

    prompt.push_str(&format!(
        "You are {} ({}) sending a short chat message about '{}'.\n",
        request.display_name, request.role, event
    ));
    prompt.push_str(&format!("Tone: {}.\n", request.tone));

    if request.role.is_member() {
        prompt.push_str("- You are the client. Never greet and never use your own name. One or two direct sentences.\n");
    } else {
        prompt.push_str("- Greet by first name only occasionally. A greeting goes on its own line.\n");
    }
    if let Some(avoid) = request.avoid_opening_like.as_deref().filter(|a| !a.is_empty()) {
        prompt.push_str(&format!("- Do not open with words like \"{}\".\n", avoid));
    }
    prompt.push_str("- Two to five short lines. Plain sentences, no bullet points, no labels such as \"Plan:\" or \"Summary -\".\n");
    prompt.push_str(&format!(
        "- Do not write the header \"{}\". Output the message body only.\n",
        request.event_kind.header()
    ));
    prompt.push_str("- Use only the facts below. Keep every number exactly as given and add none.\n\n");

    prompt.push_str("Facts:\n");
    for (key, value) in &request.facts {
        prompt.push_str(&format!("- {}: {}\n", key, value));
    }

    match request.mode {
        PolishMode::Paraphrase => {
            prompt.push_str("\nMessage to reword:\n");
            prompt.push_str(&request.seed);
            prompt.push_str("\n\nRewrite it now:");
        }
        PolishMode::Full => {
            prompt.push_str("\nWrite the message now:");
        }
    }
    prompt
}
