//! Local inference fallback for the cloud endpoint
//!
//! When the cloud inference endpoint is unreachable, text generation runs
//! through three providers in order: the response cache, a remote-local
//! model endpoint, and a deterministic keyword rule table that always
//! answers.

use atlas_common::config::InferenceSettings;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Local inference providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceProvider {
    Ollama,
    RuleBased,
    Cached,
}

impl InferenceProvider {
    fn parse(raw: &str) -> Self {
        match raw {
            "ollama" => InferenceProvider::Ollama,
            "cached" => InferenceProvider::Cached,
            _ => InferenceProvider::RuleBased,
        }
    }
}

/// Severity bands used for both risk and urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{}", label)
    }
}

/// Actions a fallback decision may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    Log,
    Notify,
    AutoFix,
    Immediate,
    Block,
    Escalate,
}

impl fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FallbackAction::Log => "log",
            FallbackAction::Notify => "notify",
            FallbackAction::AutoFix => "auto_fix",
            FallbackAction::Immediate => "immediate",
            FallbackAction::Block => "block",
            FallbackAction::Escalate => "escalate",
        };
        write!(f, "{}", label)
    }
}

/// Rule-based / cached / remote-local fallback text generator
pub struct LocalInference {
    provider: InferenceProvider,
    ollama_url: String,
    model: String,
    client: reqwest::Client,
    cache: RwLock<HashMap<String, String>>,
    rules: Vec<(&'static str, &'static str)>,
}

const GENERAL_RESPONSE: &str =
    "Request recorded. A detailed analysis will run once connectivity returns.";

impl LocalInference {
    pub fn new(settings: &InferenceSettings) -> Self {
        let provider = InferenceProvider::parse(&settings.provider);
        info!(
            "local inference created (provider={:?}, model={})",
            provider, settings.model
        );
        Self {
            provider,
            ollama_url: settings.ollama_url.clone(),
            model: settings.model.clone(),
            client: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
            rules: vec![
                (
                    "server_check",
                    "Server check completed. Detailed analysis is unavailable offline.",
                ),
                (
                    "security_scan",
                    "Security scan completed with reduced offline coverage.",
                ),
                (
                    "risk_assessment",
                    "Risk assessment: the conservative offline policy applies.",
                ),
            ],
        }
    }

    /// Active provider
    pub fn provider(&self) -> InferenceProvider {
        self.provider
    }

    /// Generate a response, trying cache, then the remote-local endpoint,
    /// then the rule table. Always produces text.
    pub async fn generate(&self, prompt: &str, context: Option<&Value>) -> String {
        let prompt_hash = Self::hash_prompt(prompt);
        if let Some(cached) = self.cached_response(&prompt_hash).await {
            debug!("inference cache hit for {}", prompt_hash);
            return cached;
        }

        if self.provider == InferenceProvider::Ollama {
            match self.ollama_generate(prompt, context).await {
                Ok(response) => {
                    self.cache_response(prompt_hash, response.clone()).await;
                    return response;
                }
                Err(err) => {
                    warn!("remote-local inference failed, using rules: {}", err);
                }
            }
        }

        self.rule_based_generate(prompt)
    }

    async fn ollama_generate(
        &self,
        prompt: &str,
        context: Option<&Value>,
    ) -> Result<String, reqwest::Error> {
        let mut payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(ctx) = context {
            payload["system"] = Value::String(ctx.to_string());
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.ollama_url))
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        Ok(body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Scan the prompt for a registered keyword, case-insensitive
    fn rule_based_generate(&self, prompt: &str) -> String {
        let prompt_lower = prompt.to_lowercase();
        for (keyword, response) in &self.rules {
            if prompt_lower.contains(keyword) {
                return (*response).to_string();
            }
        }
        GENERAL_RESPONSE.to_string()
    }

    /// Conservative (risk, urgency) -> action lookup; never escalates
    /// beyond Notify
    pub fn fallback_action(&self, risk: RiskLevel, urgency: RiskLevel) -> FallbackAction {
        use RiskLevel::*;
        match (risk, urgency) {
            (Low, Low) | (Low, Medium) => FallbackAction::Log,
            (Low, High) => FallbackAction::Notify,
            (Medium, _) => FallbackAction::Notify,
            (High, _) => FallbackAction::Notify,
        }
    }

    /// Write a response back to the cache
    pub async fn cache_response(&self, prompt_hash: String, response: String) {
        self.cache.write().await.insert(prompt_hash, response);
    }

    /// Read a cached response
    pub async fn cached_response(&self, prompt_hash: &str) -> Option<String> {
        self.cache.read().await.get(prompt_hash).cloned()
    }

    /// Whether the active provider can answer right now.
    /// RuleBased always can; Cached needs a non-empty cache; Ollama needs
    /// a live endpoint within the 3 second probe budget.
    pub async fn is_available(&self) -> bool {
        match self.provider {
            InferenceProvider::RuleBased => true,
            InferenceProvider::Cached => !self.cache.read().await.is_empty(),
            InferenceProvider::Ollama => {
                let probe = self
                    .client
                    .get(format!("{}/api/tags", self.ollama_url))
                    .timeout(Duration::from_secs(3))
                    .send()
                    .await;
                matches!(probe, Ok(resp) if resp.status().is_success())
            }
        }
    }

    /// Truncated hex digest of the prompt used as the cache key
    pub fn hash_prompt(prompt: &str) -> String {
        let digest = ring::digest::digest(&ring::digest::SHA256, prompt.as_bytes());
        let hex: String = digest
            .as_ref()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        hex[..16].to_string()
    }
}
