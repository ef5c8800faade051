use analysis_flow::InMemorySessionStorage;
use anyhow::Context as _;
use biochem_assistant::{
    AnalysisType, AnalyzeRequest, Assistant, Config, GeminiClient, InputSource, Language,
    create_app, write_export,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "biochem-assistant", version, about = "Interpret biochemical lab data with a language model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Analyze local files and print the result
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = AnalysisType::General)]
        analysis_type: AnalysisType,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, value_enum)]
        language: Option<Language>,
        /// Follow-up question asked after the analysis
        #[arg(long)]
        question: Option<String>,
        /// Write the last response to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Analyze the configured sample file
    Demo {
        #[arg(long, value_enum)]
        language: Option<Language>,
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(&config).await
        }
        Command::Analyze {
            files,
            analysis_type,
            notes,
            language,
            question,
            export,
        } => {
            let assistant = cli_assistant(&config)?;
            let session_id = assistant.create_session().await?;
            let request = AnalyzeRequest {
                analysis_type,
                notes,
                language,
                files: Some(files.into_iter().map(InputSource::local).collect()),
            };

            let analysis = assistant.analyze(&session_id, request).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);

            if let Some(question) = question {
                let answer = assistant.ask(&session_id, &question, language).await?;
                println!("\n{}", answer);
            }
            if let Some(path) = export {
                export_last_response(&assistant, &session_id, &path).await?;
            }
            Ok(())
        }
        Command::Demo { language, export } => {
            let assistant = cli_assistant(&config)?;
            let session_id = assistant.create_session().await?;

            let analysis = assistant.run_demo(&session_id, language).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);

            if let Some(path) = export {
                export_last_response(&assistant, &session_id, &path).await?;
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let app = create_app(config).context("failed to set up the model client")?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("BioChem Assistant starting on {}", addr);
    info!("API documentation available at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn cli_assistant(config: &Config) -> anyhow::Result<Assistant> {
    let client = GeminiClient::new(config).context("failed to set up the model client")?;
    Ok(Assistant::new(
        Arc::new(client),
        Arc::new(InMemorySessionStorage::new()),
        config,
    ))
}

async fn export_last_response(
    assistant: &Assistant,
    session_id: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let text = assistant
        .export(session_id)
        .await?
        .context("nothing to export")?;
    write_export(path, &text).await?;
    info!(path = %path.display(), "response exported");
    Ok(())
}
