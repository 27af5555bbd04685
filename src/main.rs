use anyhow::{bail, Context, Result};
use documind::cli::{Cli, Commands, ConfigAction};
use documind::config::{expand_path, load_env_file, Config};
use documind::corpus::CorpusFields;
use documind::embedding::FastEmbedProvider;
use documind::index::{IndexBuilder, IndexStore};
use documind::retrieval::{ChatResponse, RetrievedChunk, Retriever};
use documind::server::{IpcClient, IpcMessage, IpcResponse, Server};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PREVIEW_CHARS: usize = 160;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    // API keys may live in a .env next to where the binary is run
    match load_env_file(Path::new(".env")) {
        Ok(true) => tracing::debug!("Loaded environment from .env"),
        Ok(false) => {}
        Err(e) => tracing::warn!("{}", e),
    }

    match cli.command {
        Commands::Build { corpus, index_dir } => cmd_build(cli.config, corpus, index_dir)?,
        Commands::Query { query, k, json } => cmd_query(cli.config, &query, k, json)?,
        Commands::Serve { profile } => cmd_serve(cli.config, profile)?,
        Commands::Chat { prompt, k, json } => cmd_chat(cli.config, &prompt, k, json)?,
        Commands::Status => cmd_status(cli.config)?,
        Commands::Config { action } => cmd_config(cli.config, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "documind=debug" } else { "documind=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_build(
    config_path: Option<PathBuf>,
    corpus: Option<PathBuf>,
    index_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, None)?;

    let corpus_path = expand_path(&corpus.unwrap_or_else(|| config.corpus.path.clone()))?;
    let index_dir = expand_path(&index_dir.unwrap_or_else(|| config.index.dir.clone()))?;
    let fields = CorpusFields {
        id_field: config.corpus.id_field.clone(),
        text_field: config.corpus.text_field.clone(),
    };

    tracing::info!("Loading embedding model {}", config.embedding.model);
    let provider = FastEmbedProvider::new(&config.embedding.model)
        .with_context(|| format!("Failed to load embedding model {}", config.embedding.model))?;

    let builder = IndexBuilder::new(Arc::new(provider), config.embedding.batch_size);
    let report = builder
        .build_from_corpus(
            &corpus_path,
            &fields,
            &index_dir,
            config.index.retain_generations,
        )
        .with_context(|| format!("Failed to build index from {}", corpus_path.display()))?;

    println!("✓ Index built");
    println!("  Chunks:     {}", report.chunks);
    println!("  Dimension:  {}", report.dimension);
    println!("  Model:      {}", report.model);
    println!(
        "  Generation: {}{}",
        report.generation,
        if report.reused { " (unchanged)" } else { "" }
    );
    println!("  Location:   {}", index_dir.display());
    println!("  Took:       {} ms", report.duration_ms);

    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    query: &str,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, None)?;
    let index_dir = expand_path(&config.index.dir)?;

    let store = IndexStore::open(&index_dir)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;
    let provider = FastEmbedProvider::new(&config.embedding.model)
        .with_context(|| format!("Failed to load embedding model {}", config.embedding.model))?;

    let retriever = Retriever::new(
        Arc::new(provider),
        Arc::new(store),
        config.retrieval.max_top_k,
    );
    let top_k = k.unwrap_or(config.retrieval.default_top_k);
    let chunks = retriever.search_relevant_chunks(query, top_k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
    } else {
        print_chunks(&chunks);
    }

    Ok(())
}

fn cmd_serve(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;

    tracing::info!("Starting documind server...");

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(async {
        let server = Server::from_config(&config).context("Failed to start server")?;
        println!(
            "✓ Serving on {}",
            server.options().socket_path.display()
        );
        server.run_foreground().await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_chat(
    config_path: Option<PathBuf>,
    prompt: &str,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, None)?;

    let data = send(
        &config,
        IpcMessage::Chat {
            prompt: prompt.to_string(),
            top_k: k,
        },
    )?;
    let response: ChatResponse =
        serde_json::from_value(data).context("Unexpected chat response from server")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(answer) = &response.llm_response {
        println!("{}\n", answer.trim());
    }
    if let Some(error) = &response.generation_error {
        println!("⚠ Generation failed: {}\n", error);
    }
    if let Some(error) = &response.retrieval_error {
        println!("⚠ Retrieval failed: {}\n", error);
    }

    print_chunks(&response.relevant_chunks);

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, None)?;
    let data = send(&config, IpcMessage::Status)?;

    println!("DocuMind Status");
    println!("===============");
    println!("\nServer: Running");
    println!("  Chunks:      {}", data["chunks"]);
    println!("  Dimension:   {}", data["dimension"]);
    println!("  Index model: {}", data["index_model"].as_str().unwrap_or("-"));
    println!("  Query model: {}", data["query_model"].as_str().unwrap_or("-"));
    println!("  Generation:  {}", data["generation"].as_str().unwrap_or("-"));
    println!("  LLM:         {}", data["llm_enabled"]);

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)
                .with_context(|| format!("Invalid configuration: {}", path.display()))?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            Config::default().save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'documind config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    let config = match profile {
        Some(profile) => Config::load_with_profile(&path, &profile)?,
        None => Config::load(&path)?,
    };
    Ok(config)
}

/// Send one message to the running server and return its data payload
fn send(config: &Config, message: IpcMessage) -> Result<serde_json::Value> {
    let socket_path = expand_path(&config.server.socket_path)?;
    let client = IpcClient::new(socket_path.clone());

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let response: IpcResponse = runtime
        .block_on(client.send(&message))
        .with_context(|| {
            format!(
                "Server is not reachable at {}. Start it with 'documind serve'.",
                socket_path.display()
            )
        })?;

    if !response.success {
        bail!(response
            .message
            .unwrap_or_else(|| "Server returned an error".to_string()));
    }

    Ok(response.data.unwrap_or(serde_json::Value::Null))
}

fn print_chunks(chunks: &[RetrievedChunk]) {
    if chunks.is_empty() {
        println!("No matching chunks");
        return;
    }

    for (rank, chunk) in chunks.iter().enumerate() {
        println!("{}. [{}] distance {:.4}", rank + 1, chunk.id, chunk.distance);
        println!("   {}", chunk.preview(PREVIEW_CHARS).replace('\n', " "));
    }
}
