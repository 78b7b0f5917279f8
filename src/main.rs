use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use clap::Parser;

mod cli;
mod config;
mod eid;
mod fallback;
mod prompts;
mod similarity;
mod storage;
mod summary;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use prompts::{BackendCsv, PromptStore, SearchQuery};
use similarity::{ProcessVectorIndex, SimilarityEngine, VectorIndexPort};
use std::time::Duration;
use summary::SummaryService;

pub fn parse_tags(tags: String) -> Vec<String> {
    tags.split(',')
        .flat_map(|value| value.split(' ').filter(|value| !value.is_empty()))
        .map(|s| s.to_lowercase().to_string())
        .collect::<Vec<_>>()
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn build_engine(config: &Config, store: Arc<dyn PromptStore>) -> Arc<SimilarityEngine> {
    let external: Option<Arc<dyn VectorIndexPort>> = ProcessVectorIndex::from_command(
        &config.similarity.index_command,
        Duration::from_secs(config.similarity.process_timeout_secs),
    )
    .map(|port| Arc::new(port) as Arc<dyn VectorIndexPort>);

    Arc::new(SimilarityEngine::new(
        store,
        external,
        None,
        config.similarity.clone(),
        PathBuf::from("."),
    ))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let config = Config::load();
    let store: Arc<dyn PromptStore> = Arc::new(BackendCsv::load(Path::new("."))?);

    match args.command {
        cli::Command::Daemon {} => {
            let engine = build_engine(&config, store.clone());
            let summary = Arc::new(SummaryService::new(&config.summary));

            web::start_daemon(web::SharedState {
                store,
                engine,
                summary,
                config: Arc::new(RwLock::new(config)),
            });
            Ok(())
        }

        cli::Command::RebuildIndex {} => {
            let engine = build_engine(&config, store);
            runtime()?.block_on(async { engine.build_index().await })
        }

        cli::Command::Similar { id, limit } => {
            let engine = build_engine(&config, store.clone());

            let results = runtime()?.block_on(async {
                let target = store
                    .get(&id)?
                    .ok_or_else(|| anyhow::anyhow!("prompt with id {id} not found"))?;
                engine.find_similar(&target, limit).await
            })?;

            println!("{}", serde_json::to_string_pretty(&results).unwrap());
            Ok(())
        }

        cli::Command::Add {
            title,
            content,
            category,
            description,
            tags,
            private,
        } => {
            let create = prompts::PromptCreate {
                title,
                description,
                content,
                category: category.parse()?,
                tags: tags.map(parse_tags),
                is_public: if private { Some(false) } else { None },
            };

            let prompt = store.create(create)?;
            println!("{}", serde_json::to_string_pretty(&prompt).unwrap());
            Ok(())
        }

        cli::Command::Search {
            category,
            tag,
            keyword,
            limit,
        } => {
            let query = SearchQuery {
                category: category.map(|c| c.parse()).transpose()?,
                tag,
                keyword,
                limit,
            };

            let results = store.search(query)?;
            println!("{}", serde_json::to_string_pretty(&results).unwrap());
            Ok(())
        }

        cli::Command::Summarize { content } => {
            let summary = SummaryService::new(&config.summary);

            let description = runtime()?.block_on(async { summary.generate(&content).await })?;
            println!("{description}");
            Ok(())
        }
    }
}
