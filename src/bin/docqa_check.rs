//! Smoke test for the configured LLM credential: list models, then send one prompt.

use anyhow::{Context, Result, bail};
use clap::Parser;
use docqa::{
    config,
    llm::{ChatClient, OpenAiCompatibleChatClient},
};

#[derive(Parser)]
#[command(
    name = "docqa-check",
    about = "Verify that the configured API key can reach the chat model"
)]
struct Cli {
    /// Skip listing the models visible to the credential.
    #[arg(long)]
    skip_models: bool,
    /// Prompt sent to the chat model.
    #[arg(long, default_value = "Hello, what can you do?")]
    prompt: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("docqa-check failed: {error:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    config::init_config();
    let config = config::get_config();
    let client = OpenAiCompatibleChatClient::new(
        &config.llm_base_url,
        &config.google_api_key,
        &config.chat_model,
    )
    .context("Failed to build chat client")?;

    println!("API key loaded; using {} at {}", client.model(), config.llm_base_url);

    if !cli.skip_models {
        let models = client
            .list_models()
            .await
            .context("Failed to list models")?;
        println!("Available models ({}):", models.len());
        for model in &models {
            println!("  {model}");
        }
        if !models.iter().any(|model| model.ends_with(client.model())) {
            println!("Warning: {} is not in the model list", client.model());
        }
    }

    let reply = client
        .complete(&cli.prompt)
        .await
        .context("Test prompt failed")?;
    if reply.trim().is_empty() {
        bail!("model returned an empty reply");
    }
    println!("Response: {reply}");
    println!("The API key is working.");
    Ok(())
}
