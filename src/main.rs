use std::sync::Arc;

use clap::Parser;
use inquire::error::InquireError;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod agent;
mod bookmarks;
mod cache;
mod cli;
mod config;
mod enrich;
mod errors;
mod llm;
mod pipeline;
mod reconcile;
mod semantic;
mod source;
#[cfg(test)]
mod tests;

use agent::Agent;
use cli::{ChatInput, Command};
use config::Config;
use llm::{LanguageModel, OpenAiChat};
use pipeline::Pipeline;
use semantic::{Embedder, EmbeddingModel};

fn init_logging(log_level: &str) {
    let default_filter = format!("{},reqwest=warn,hyper=warn,hyper_util=warn,ort=warn", log_level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&default_filter))
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let config = Config::load(args.config.as_deref())?;
    init_logging(&config.log_level);

    let api_key = config.require_api_key()?;
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiChat::new(
        &config.openai_base_url,
        api_key,
        &config.llm_model,
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingModel::new(
        &config.embedding_model,
        config.models_dir.clone(),
    )?);

    let default_k = config.retrieval_k;
    let pipeline = Pipeline::new(config, model.clone(), embedder);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let library = rt.block_on(pipeline.run())?;

    match args.command {
        Command::Sync => {
            let described =
                library.records.len() - bookmarks::count_missing_descriptions(&library.records);
            let indexed = library
                .records
                .iter()
                .filter(|r| library.index.contains(&r.url))
                .count();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "bookmarks": library.records.len(),
                    "described": described,
                    "indexed": indexed,
                    "index_size": library.index.len(),
                }))?
            );
        }

        Command::Search { query, k } => {
            let hits = library.index.search(&query, k.unwrap_or(default_k))?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }

        Command::Ask { question, k } => {
            let mut agent = Agent::new(model, library, k.unwrap_or(default_k));
            let answer = rt.block_on(agent.ask(&question))?;
            log::debug!("Answered from {} bookmarks", answer.sources.len());
            println!("{}", answer.text);
        }

        Command::Chat { k } => {
            if library.index.is_empty() {
                println!("The index is empty, answers will not cite any bookmarks.");
            }
            let mut agent = Agent::new(model, library.clone(), k.unwrap_or(default_k));
            println!(
                "{} bookmarks indexed, retrieving {} per question. An empty line exits.",
                library.index.len(),
                agent.k()
            );

            loop {
                let line = match inquire::Text::new("You:").prompt() {
                    Ok(line) => line,
                    Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                        break
                    }
                    Err(err) => return Err(err.into()),
                };

                match cli::parse_chat_input(&line) {
                    ChatInput::Exit => break,
                    ChatInput::SetK(k) => {
                        agent.set_k(k);
                        println!("Retrieving {} bookmarks per question", k);
                    }
                    ChatInput::Invalid(message) => println!("{}", message),
                    ChatInput::Question(question) => match rt.block_on(agent.ask(&question)) {
                        Ok(answer) => println!("\n{}\n", answer.text),
                        Err(err) => log::error!("Failed to answer: {}", err),
                    },
                }
            }
        }
    }

    Ok(())
}
