use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Gemini Provider Args ---
    /// API key for the Gemini generateContent endpoint. Required.
    #[arg(long, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Base URL of the Gemini API (e.g., https://generativelanguage.googleapis.com)
    #[arg(long, env = "GEMINI_BASE_URL")] // No default, let the client handle it if None
    pub gemini_base_url: Option<String>,

    /// Model used for patient replies and session reviews (e.g., gemini-1.5-flash)
    #[arg(long, env = "GEMINI_MODEL")] // No default, rely on client default if None
    pub gemini_model: Option<String>,

    /// Per-request timeout in seconds for Gemini calls. 0 waits indefinitely.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value = "0")]
    pub chat_timeout_secs: u64,

    // --- Prompt Args ---
    /// Optional JSON file overriding the built-in prompt templates and condition descriptions.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Progress Ledger Args ---
    /// Where trainee progress is kept (memory, file)
    #[arg(long, env = "PROGRESS_TYPE", default_value = "memory")]
    pub progress_type: String,

    /// Path of the JSON progress file when PROGRESS_TYPE=file.
    #[arg(long, env = "PROGRESS_PATH", default_value = "data/progress.json")]
    pub progress_path: String,

    // --- General App Args ---
    /// Host address and port for the WebSocket chat server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP API (scenarios, progress, prompt reload).
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must provide this key.
    #[arg(long, env = "SERVER_API_KEY", hide_env_values = true)]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn chat_timeout(&self) -> Option<std::time::Duration> {
        if self.chat_timeout_secs == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(self.chat_timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_env() {
        let args = Args::try_parse_from(["therapy-trainer", "--gemini-api-key", "k"]).unwrap();
        assert_eq!(args.gemini_api_key, "k");
        assert_eq!(args.server_addr, "127.0.0.1:4000");
        assert_eq!(args.progress_type, "memory");
        assert!(args.chat_timeout().is_none());
    }

    #[test]
    fn timeout_is_optional() {
        let args = Args::try_parse_from([
            "therapy-trainer",
            "--chat-timeout-secs",
            "30",
        ]).unwrap();
        assert_eq!(args.chat_timeout(), Some(std::time::Duration::from_secs(30)));
    }
}
