use clap::{Parser, Subcommand};
use dotenv::dotenv;
use petopeta_rs::adk::model::openai::OpenAIModel;
use petopeta_rs::adk::model::Model;
use petopeta_rs::adk::store::InMemoryStore;
use petopeta_rs::petopeta::assistant::{AgentConfiguration, Assistant, Collaborators, InputState};
use petopeta_rs::petopeta::ingest::{self, JsonlSink};
use petopeta_rs::petopeta::server;
use petopeta_rs::petopeta::tools::pets::PetTools;
use petopeta_rs::petopeta::tools::search::BraveSearchRetriever;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Assistant configuration (YAML); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the assistant one question
    Chat {
        /// The question to send
        #[arg(short, long)]
        prompt: String,

        /// User whose pets are read and stored
        #[arg(short, long)]
        user_id: Option<String>,
    },
    /// Serve the assistant over HTTP
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Split documents into chunks and write them as JSON lines
    Ingest {
        /// Files to ingest (`.jsonl` or plain text)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(short, long, default_value = "chunks.jsonl")]
        output: PathBuf,
    },
}

fn build_assistant(config: AgentConfiguration) -> anyhow::Result<Assistant> {
    log::info!(
        "Using models: {} (queries), {} (responses)",
        config.query_model,
        config.response_model
    );
    let query_model: Arc<dyn Model> = Arc::new(OpenAIModel::new(config.query_model.clone())?);
    let response_model: Arc<dyn Model> = Arc::new(OpenAIModel::new(config.response_model.clone())?);

    let collaborators = Collaborators {
        query_model,
        response_model,
        retriever: Arc::new(BraveSearchRetriever::new()?),
        pets: PetTools::new(Arc::new(InMemoryStore::new())),
        config,
    };
    Ok(Assistant::new(collaborators)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AgentConfiguration::load(path)?,
        None => AgentConfiguration::default(),
    };

    match args.command {
        Commands::Chat { prompt, user_id } => {
            let assistant = build_assistant(config)?;
            println!("Sending prompt: {}", prompt);
            let state = assistant
                .chat(InputState::from_user(prompt), user_id.as_deref())
                .await?;
            println!("Response: {}", state.answer);
        }
        Commands::Serve { port } => {
            let assistant = build_assistant(config)?;
            server::serve(Arc::new(assistant), port).await?;
        }
        Commands::Ingest { paths, output } => {
            let mut documents = Vec::new();
            for path in &paths {
                documents.extend(ingest::load_path(path).await?);
            }
            let report = ingest::ingest(&documents, &JsonlSink::new(&output)).await?;
            println!(
                "Ingested {} documents as {} chunks into {}",
                report.documents,
                report.chunks,
                output.display()
            );
        }
    }

    Ok(())
}
