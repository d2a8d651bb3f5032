mod resources;
mod server;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::utils::config::get_config;
use ingestion_pipeline::fetch::{fetch_statute, DEFAULT_LABOR_LAW_URL, DEFAULT_OUTPUT_FILE};
use resources::Resources;
use retrieval_pipeline::AskOptions;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "legal-rag")]
#[command(version)]
#[command(about = "Ask questions about the Labor Law, answered from the statute text", long_about = None)]
struct Cli {
    /// Without a command: index the corpus if needed, then serve.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Embed the corpus directory into the vector store
    Process {
        /// Wipe the vector store and embed everything again
        #[arg(long)]
        force: bool,
    },
    /// Serve the chat UI and the JSON API
    Serve,
    /// Answer one question on the command line
    Ask {
        question: String,
        /// Print only the answer, without the cited articles
        #[arg(long)]
        no_sources: bool,
    },
    /// Download the statute text into the corpus directory
    Fetch {
        #[arg(long, default_value = DEFAULT_LABOR_LAW_URL)]
        url: String,
        /// File name inside the corpus directory
        #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
        output: String,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Option<Command>) -> anyhow::Result<()> {
    let config = get_config().context("failed to load configuration")?;
    config.validate()?;

    match command {
        Some(Command::Fetch { url, output }) => {
            let path = fetch_statute(&url, &PathBuf::from(&config.data_dir), &output).await?;
            info!(path = %path.display(), "Statute text ready; run `legal-rag process` next");
        }
        Some(Command::Process { force }) => {
            let resources = Resources::from_config(config).await?;
            resources.ingestion_pipeline.run(force).await?;
        }
        Some(Command::Serve) => {
            let resources = Resources::from_config(config).await?;
            server::serve(&resources).await?;
        }
        Some(Command::Ask {
            question,
            no_sources,
        }) => {
            let resources = Resources::from_config(config).await?;
            let options = AskOptions {
                show_sources: !no_sources,
                ..AskOptions::default()
            };
            let answer = resources.qa_chain.ask(&question, options).await?;
            print_answer(&answer);
        }
        None => {
            let resources = Resources::from_config(config).await?;
            if resources.ingestion_pipeline.needs_rebuild().await? {
                info!("Vector store is empty or stale; embedding the corpus first");
                resources.ingestion_pipeline.run(false).await?;
            }
            server::serve(&resources).await?;
        }
    }

    Ok(())
}

fn print_answer(answer: &retrieval_pipeline::Answer) {
    println!("{}", answer.answer);
    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("相关法律条文:");
    for source in &answer.sources {
        println!();
        println!("来源: {} - {}", source.source, source.article);
        println!("{}", source.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["legal-rag"]).expect("no command");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["legal-rag", "process", "--force"]).expect("process");
        assert!(matches!(cli.command, Some(Command::Process { force: true })));

        let cli = Cli::try_parse_from(["legal-rag", "ask", "劳动法第60条是什么？", "--no-sources"])
            .expect("ask");
        assert!(matches!(
            cli.command,
            Some(Command::Ask { ref question, no_sources: true }) if question == "劳动法第60条是什么？"
        ));
    }

    #[test]
    fn fetch_defaults_to_the_labor_law_page() {
        let cli = Cli::try_parse_from(["legal-rag", "fetch"]).expect("fetch");
        let Some(Command::Fetch { url, output }) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(url, DEFAULT_LABOR_LAW_URL);
        assert_eq!(output, DEFAULT_OUTPUT_FILE);
    }
}
