//! Loads the catalog of model descriptors the agent can be pointed at, by
//! consulting `$MINICODER_MODEL_CONFIG`, the XDG config file, or a built-in
//! default catalog selected by which provider API keys are present.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::MinicoderError;
use crate::error::Result;

const DEFAULT_MAX_TOKENS: u32 = 128_000;

/// A single configured model: endpoint, credentials, and request params.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub endpoint: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub max_tokens: u32,
}

/// An ordered catalog of models; the first entry is the default.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    models: Vec<ModelDescriptor>,
}

impl ModelConfig {
    /// Resolves the catalog using the priority order documented in the
    /// models schema: explicit env override, then the XDG config file, then
    /// environment-derived built-in defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("MINICODER_MODEL_CONFIG") {
            let models = load_from_file(&PathBuf::from(path))?;
            return Ok(Self { models });
        }

        if let Some(path) = config_file_path() {
            if path.exists() {
                let models = load_from_file(&path)?;
                return Ok(Self { models });
            }
        }

        let models = built_in_models();
        if models.is_empty() {
            return Err(MinicoderError::Configuration(
                "no models configured".to_string(),
            ));
        }
        Ok(Self { models })
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        self.models.first()
    }

    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }
}

fn config_file_path() -> Option<PathBuf> {
    let config_home = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))?;
    Some(config_home.join("minicoder").join("models.json"))
}

#[derive(Debug, Deserialize)]
struct RawModelEntry {
    #[serde(rename = "type")]
    kind: String,
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
    api_key_env: Option<String>,
    params: Option<serde_json::Map<String, serde_json::Value>>,
    max_tokens: Option<u32>,
}

fn load_from_file(path: &std::path::Path) -> Result<Vec<ModelDescriptor>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MinicoderError::Configuration(format!("cannot read model config {}: {e}", path.display()))
    })?;
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| MinicoderError::Configuration(format!("invalid model config JSON: {e}")))?;

    let mut models = Vec::with_capacity(raw.len());
    for (name, value) in raw {
        let entry: RawModelEntry = serde_json::from_value(value).map_err(|e| {
            MinicoderError::Configuration(format!("invalid model entry '{name}': {e}"))
        })?;
        if entry.kind != "openai" {
            return Err(MinicoderError::Configuration(format!(
                "model '{name}' has unsupported type '{}'",
                entry.kind
            )));
        }
        if !entry.endpoint.contains("/chat/completions") {
            return Err(MinicoderError::Configuration(format!(
                "model '{name}' endpoint must contain /chat/completions"
            )));
        }
        let api_key = entry.api_key.or_else(|| {
            entry
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        });
        models.push(ModelDescriptor {
            name,
            endpoint: entry.endpoint,
            model: entry.model,
            api_key,
            params: entry.params.unwrap_or_default(),
            max_tokens: entry.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
    }
    Ok(models)
}

fn reasoning_params() -> serde_json::Map<String, serde_json::Value> {
    serde_json::json!({"reasoning": {"effort": "high"}, "stream": true})
        .as_object()
        .cloned()
        .unwrap_or_default()
}

fn stream_params() -> serde_json::Map<String, serde_json::Value> {
    serde_json::json!({"stream": true})
        .as_object()
        .cloned()
        .unwrap_or_default()
}

fn descriptor(
    name: &str,
    endpoint: &str,
    api_key: Option<String>,
    params: serde_json::Map<String, serde_json::Value>,
) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        endpoint: endpoint.to_string(),
        model: Some(name.to_string()),
        api_key,
        params,
        max_tokens: DEFAULT_MAX_TOKENS,
    }
}

/// The environment-derived default catalog, checked in the order the
/// provider env vars are listed.
fn built_in_models() -> Vec<ModelDescriptor> {
    const OPENROUTER: &str = "https://openrouter.ai/api/v1/chat/completions";
    const OPENAI: &str = "https://api.openai.com/v1/chat/completions";
    const GEMINI: &str = "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
    const XAI: &str = "https://api.x.ai/v1/chat/completions";

    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        return ["o3", "o3-pro", "o4-mini", "grok-4", "gemini", "deepseek"]
            .into_iter()
            .map(|name| descriptor(name, OPENROUTER, Some(key.clone()), reasoning_params()))
            .collect();
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        return ["o4-mini", "o3"]
            .into_iter()
            .map(|name| descriptor(name, OPENAI, Some(key.clone()), reasoning_params()))
            .collect();
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        return vec![descriptor("gemini", GEMINI, Some(key), stream_params())];
    }
    if let Ok(key) = std::env::var("XAI_API_KEY") {
        return vec![descriptor("grok-4", XAI, Some(key), stream_params())];
    }

    vec![descriptor(
        "qwen3-32b",
        "http://localhost:11434/v1/chat/completions",
        Some("ollama".to_string()),
        stream_params(),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Built-in defaults and the file-override path both read process env
    // vars; serialize the tests that touch them so they don't race.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_from_file_preserves_key_order_and_default() {
        let _guard = ENV_LOCK.lock().expect("lock");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{
                "first": {"type": "openai", "endpoint": "https://x/chat/completions", "api_key": "k1"},
                "second": {"type": "openai", "endpoint": "https://y/chat/completions", "api_key": "k2"}
            }"#,
        )
        .expect("write");

        let models = load_from_file(&path).expect("load");
        assert_eq!(models[0].name, "first");
        assert_eq!(models[1].name, "second");
    }

    #[test]
    fn load_from_file_rejects_non_openai_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{"m": {"type": "anthropic", "endpoint": "https://x/chat/completions"}}"#,
        )
        .expect("write");

        let err = load_from_file(&path).unwrap_err();
        assert!(matches!(err, MinicoderError::Configuration(_)));
    }

    #[test]
    fn load_from_file_rejects_bad_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{"m": {"type": "openai", "endpoint": "https://x/completions"}}"#,
        )
        .expect("write");

        let err = load_from_file(&path).unwrap_err();
        assert!(matches!(err, MinicoderError::Configuration(_)));
    }

    #[test]
    fn api_key_env_is_resolved_from_environment() {
        let _guard = ENV_LOCK.lock().expect("lock");
        // SAFETY: guarded by ENV_LOCK, single-threaded within this test body.
        unsafe { std::env::set_var("MINICODER_TEST_KEY", "secret-value") };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{"m": {"type": "openai", "endpoint": "https://x/chat/completions", "api_key_env": "MINICODER_TEST_KEY"}}"#,
        )
        .expect("write");

        let models = load_from_file(&path).expect("load");
        assert_eq!(models[0].api_key.as_deref(), Some("secret-value"));
        unsafe { std::env::remove_var("MINICODER_TEST_KEY") };
    }

    #[test]
    fn default_model_is_first_entry() {
        let config = ModelConfig {
            models: vec![
                descriptor("a", "https://x/chat/completions", None, Default::default()),
                descriptor("b", "https://y/chat/completions", None, Default::default()),
            ],
        };
        assert_eq!(config.default_model().expect("default").name, "a");
        assert_eq!(config.get("b").expect("get").name, "b");
        assert!(config.get("missing").is_none());
    }
}
