use std::path::PathBuf;
use std::time::Duration;

use comfygate_comfyui::generator::GeneratorConfig;
use comfygate_comfyui::retry::RetryConfig;
use comfygate_core::credentials::{generate_password, Credentials};
use comfygate_core::workflow::NodeTargets;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI. Invalid numeric
/// values panic at startup so misconfiguration fails fast.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// Whole-request timeout in seconds. Must exceed the completion timeout.
    pub request_timeout_secs: u64,
    /// Basic-auth credential pair guarding `/generate`.
    pub credentials: Credentials,
    /// `true` when no `PASSWORD` was set and one was generated.
    pub password_generated: bool,
    /// Workflow template file (ComfyUI API format).
    pub workflow_path: PathBuf,
    /// Nodes receiving the prompt texts and seed.
    pub node_targets: NodeTargets,
    pub comfyui: ComfyUIConfig,
}

/// Connection settings for the upstream ComfyUI server.
#[derive(Debug, Clone)]
pub struct ComfyUIConfig {
    /// Base HTTP URL, e.g. `http://localhost:8188`.
    pub url: String,
    /// Prefix of the WebSocket client id.
    pub client_id: String,
    /// Ceiling on waiting for a prompt to finish.
    pub completion_timeout_secs: u64,
    /// Ceiling on each individual HTTP call to ComfyUI.
    pub http_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `8000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `360`                   |
    /// | `USERNAME`                 | `default`               |
    /// | `PASSWORD`                 | random, 20 chars        |
    /// | `WORKFLOW_PATH`            | `workflow_demo.json`    |
    /// | `COMFYUI_URL`              | `http://localhost:8188` |
    /// | `CLIENT_ID`                | `comfyui`               |
    /// | `POSITIVE_PROMPT_INPUT_ID` | `6`                     |
    /// | `NEGATIVE_PROMPT_INPUT_ID` | `7`                     |
    /// | `SEED_PROMPT_INPUT_ID`     | `3`                     |
    /// | `COMPLETION_TIMEOUT_SECS`  | `300`                   |
    /// | `UPSTREAM_TIMEOUT_SECS`    | `60`                    |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = env_parse("PORT", 8000);

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 360);

        let username = env_or("USERNAME", "default");
        let (password, password_generated) = match std::env::var("PASSWORD") {
            Ok(p) if !p.is_empty() => (p, false),
            _ => (generate_password(), true),
        };

        let defaults = NodeTargets::default();
        let node_targets = NodeTargets {
            positive_prompt: env_or("POSITIVE_PROMPT_INPUT_ID", &defaults.positive_prompt),
            negative_prompt: env_or("NEGATIVE_PROMPT_INPUT_ID", &defaults.negative_prompt),
            seed: env_or("SEED_PROMPT_INPUT_ID", &defaults.seed),
        };

        let comfyui = ComfyUIConfig {
            url: env_or("COMFYUI_URL", "http://localhost:8188"),
            client_id: env_or("CLIENT_ID", "comfyui"),
            completion_timeout_secs: env_parse("COMPLETION_TIMEOUT_SECS", 300),
            http_timeout_secs: env_parse("UPSTREAM_TIMEOUT_SECS", 60),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            credentials: Credentials::new(username, password),
            password_generated,
            workflow_path: PathBuf::from(env_or("WORKFLOW_PATH", "workflow_demo.json")),
            node_targets,
            comfyui,
        }
    }

    /// Whether the outer request timeout leaves room for the completion
    /// wait plus the image downloads that follow it.
    ///
    /// When it does not, slow jobs end in a bare 408 from the tower stack
    /// instead of the 504 `GENERATION_TIMEOUT` the orchestrator reports.
    pub fn request_timeout_covers_completion(&self) -> bool {
        self.request_timeout_secs > self.comfyui.completion_timeout_secs
    }

    /// Settings for the ComfyUI job orchestrator.
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            api_url: self.comfyui.url.clone(),
            client_id: self.comfyui.client_id.clone(),
            completion_timeout: Duration::from_secs(self.comfyui.completion_timeout_secs),
            http_timeout: Duration::from_secs(self.comfyui.http_timeout_secs),
            retry: RetryConfig::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_timeouts(request_secs: u64, completion_secs: u64) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: request_secs,
            credentials: Credentials::new("u", "p"),
            password_generated: false,
            workflow_path: PathBuf::from("wf.json"),
            node_targets: NodeTargets::default(),
            comfyui: ComfyUIConfig {
                url: "http://comfy:8188".into(),
                client_id: "gateway".into(),
                completion_timeout_secs: completion_secs,
                http_timeout_secs: 15,
            },
        }
    }

    #[test]
    fn default_timeouts_leave_room_for_downloads() {
        assert!(config_with_timeouts(360, 300).request_timeout_covers_completion());
    }

    #[test]
    fn request_timeout_not_above_completion_is_flagged() {
        assert!(!config_with_timeouts(300, 300).request_timeout_covers_completion());
        assert!(!config_with_timeouts(60, 300).request_timeout_covers_completion());
    }

    #[test]
    fn generator_config_converts_seconds() {
        let config = config_with_timeouts(10, 90);

        let generator = config.generator_config();
        assert_eq!(generator.api_url, "http://comfy:8188");
        assert_eq!(generator.client_id, "gateway");
        assert_eq!(generator.completion_timeout, Duration::from_secs(90));
        assert_eq!(generator.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn env_parse_falls_back_when_unset() {
        let value: u64 = env_parse("COMFYGATE_TEST_SURELY_UNSET_VAR", 42);
        assert_eq!(value, 42);
    }
}
