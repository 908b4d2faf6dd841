use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};

use deckmind_backend::core::config::{AppPaths, Config};
use deckmind_backend::embedding::HttpEmbedder;
use deckmind_backend::engine::RagEngine;
use deckmind_backend::generation::HttpGenerator;
use deckmind_backend::index::VectorIndex;
use deckmind_backend::logging;
use deckmind_backend::prompt::AnswerStyle;

const DEFAULT_OWNER: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    logging::init(&paths);

    let config = Config::load(&paths.config_path).context("loading configuration")?;

    let embedder = Arc::new(
        HttpEmbedder::new(&config.embedding, &config.rag).context("building embedding client")?,
    );
    let generator = Arc::new(
        HttpGenerator::new(&config.generation, &config.rag)
            .context("building generation client")?,
    );
    let index = Arc::new(VectorIndex::open(&paths.index_dir).context("opening vector index")?);
    let engine = RagEngine::new(config.rag.clone(), embedder, generator, index);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("ingest") => {
            let file = args
                .get(1)
                .map(PathBuf::from)
                .context("usage: deckmind ingest <file> [owner]")?;
            let owner = args.get(2).map(String::as_str).unwrap_or(DEFAULT_OWNER);

            let report = engine.ingest(&file, owner).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some("ask") => {
            let question = args
                .get(1)
                .cloned()
                .context("usage: deckmind ask <question> [--style STYLE] [--strict] [owner]")?;

            let mut style = AnswerStyle::Detailed;
            let mut strict = false;
            let mut owner = DEFAULT_OWNER.to_string();

            let mut rest = args[2..].iter();
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--style" => {
                        let value = rest.next().context("--style requires a value")?;
                        style = value
                            .parse()
                            .map_err(|e: String| anyhow::anyhow!(e))?;
                    }
                    "--strict" => strict = true,
                    other => owner = other.to_string(),
                }
            }

            let outcome = engine.answer(&question, style, &owner, &[], strict).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        _ => bail!("usage: deckmind <ingest|ask> ..."),
    }

    Ok(())
}
