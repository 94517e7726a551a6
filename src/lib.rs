pub mod cli;
pub mod config;
pub mod empathy;
pub mod llm;
pub mod models;
pub mod progress;
pub mod review;
pub mod server;
pub mod session;
pub mod trainer;

#[cfg(test)]
mod testing;

use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use trainer::Trainer;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!(
        "Gemini Model: {}",
        args.gemini_model.as_deref().unwrap_or(llm::DEFAULT_GEMINI_MODEL)
    );
    info!(
        "Gemini Base URL: {}",
        args.gemini_base_url.as_deref().unwrap_or(llm::DEFAULT_GEMINI_BASE_URL)
    );
    info!("Gemini API Key configured: {}", !args.gemini_api_key.trim().is_empty());
    match args.chat_timeout() {
        Some(timeout) => info!("Chat Timeout: {}s", timeout.as_secs()),
        None => info!("Chat Timeout: none"),
    }
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("<built-in>"));
    info!("Progress Store Type: {}", args.progress_type);
    if args.progress_type == "file" {
        info!("Progress Path: {}", args.progress_path);
    }
    if let Some(port) = args.http_port {
        info!("HTTP API Port: {}", port);
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let trainer = Arc::new(Trainer::new(&args).await?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, trainer, args.server_api_key.clone(), args.clone());
    server.run().await?;

    Ok(())
}
