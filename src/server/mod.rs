// Server module: foreground process answering search and chat over a Unix socket

mod ipc;
mod signals;

pub use ipc::{
    read_frame, write_frame, IpcClient, IpcMessage, IpcResponse, IpcServer, MAX_MESSAGE_SIZE,
};
pub use signals::SignalHandler;

use crate::config::{expand_path, Config, MAX_CONNECTIONS};
use crate::embedding::FastEmbedProvider;
use crate::error::{DocuMindError, Result};
use crate::generation;
use crate::index::IndexStore;
use crate::retrieval::{Assistant, PromptTemplate, Retriever};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task;

/// How long shutdown waits for in-flight connections
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings the accept loop needs
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub socket_path: PathBuf,
    pub max_connections: usize,
    pub default_top_k: usize,
}

impl ServerOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            socket_path: expand_path(&config.server.socket_path)?,
            max_connections: config.server.max_connections.clamp(1, MAX_CONNECTIONS),
            default_top_k: config.retrieval.default_top_k,
        })
    }
}

pub struct Server {
    options: ServerOptions,
    assistant: Arc<Assistant>,
}

impl Server {
    pub fn new(assistant: Arc<Assistant>, options: ServerOptions) -> Self {
        Self { options, assistant }
    }

    /// Load the published index, the query model and the optional generator.
    ///
    /// Any index load error is returned; the server never starts on a
    /// missing or corrupt index.
    pub fn from_config(config: &Config) -> Result<Self> {
        let index_dir = expand_path(&config.index.dir)?;
        let store = Arc::new(IndexStore::open(&index_dir)?);

        let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
        let retriever = Arc::new(Retriever::new(
            provider,
            store,
            config.retrieval.max_top_k,
        ));

        let generator = generation::from_config(&config.llm)?;
        let prompt = PromptTemplate::from_config(&config.llm);
        let assistant = Assistant::new(retriever, generator, prompt);

        Ok(Self::new(Arc::new(assistant), ServerOptions::from_config(config)?))
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Serve until SIGTERM, SIGINT or SIGHUP
    pub async fn run_foreground(self) -> Result<()> {
        let mut signal_handler = SignalHandler::new()?;
        self.run_until(async move {
            signal_handler.wait().await;
        })
        .await
    }

    /// Serve until `shutdown` completes, then remove the socket
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ipc_server = IpcServer::new(self.options.socket_path.clone());
        ipc_server.bind().await?;

        let limit = self.options.max_connections.clamp(1, MAX_CONNECTIONS);
        let semaphore = Arc::new(Semaphore::new(limit));

        tracing::info!(
            "Server started ({} chunks, up to {} concurrent connections)",
            self.assistant.retriever().store().len(),
            limit
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = ipc_server.accept() => {
                    let stream = match accepted {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            continue;
                        }
                    };

                    let assistant = Arc::clone(&self.assistant);
                    let semaphore = Arc::clone(&semaphore);
                    let default_top_k = self.options.default_top_k;

                    task::spawn(async move {
                        let Ok(_permit) = semaphore.acquire_owned().await else {
                            return;
                        };
                        if let Err(e) = handle_client(stream, assistant, default_top_k).await {
                            tracing::error!("Client handler error: {}", e);
                        }
                    });
                }

                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        ipc_server.shutdown()?;

        // Waiting on every permit means no handler is still running
        let permits = u32::try_from(limit).unwrap_or(u32::MAX);
        match tokio::time::timeout(DRAIN_TIMEOUT, semaphore.acquire_many(permits)).await {
            Ok(_) => tracing::info!("Server shutdown complete"),
            Err(_) => tracing::warn!("Shutdown with connections still in flight"),
        }

        Ok(())
    }
}

async fn handle_client(
    mut stream: tokio::net::UnixStream,
    assistant: Arc<Assistant>,
    default_top_k: usize,
) -> Result<()> {
    let message: IpcMessage = match read_frame(&mut stream).await {
        Ok(message) => message,
        Err(e @ DocuMindError::Json { .. }) => {
            let response = IpcResponse::error(e.to_string());
            return write_frame(&mut stream, &response).await;
        }
        Err(e) => return Err(e),
    };

    let response = dispatch(message, &assistant, default_top_k).await;
    write_frame(&mut stream, &response).await
}

async fn dispatch(message: IpcMessage, assistant: &Assistant, default_top_k: usize) -> IpcResponse {
    match message {
        IpcMessage::Search { query, top_k } => {
            match assistant.search(&query, top_k.unwrap_or(default_top_k)).await {
                Ok(chunks) => to_data(&chunks),
                Err(e) => IpcResponse::error(e.to_string()),
            }
        }
        IpcMessage::Chat { prompt, top_k } => {
            match assistant.chat(&prompt, top_k.unwrap_or(default_top_k)).await {
                Ok(response) => to_data(&response),
                Err(e) => IpcResponse::error(e.to_string()),
            }
        }
        IpcMessage::Status => {
            let store = assistant.retriever().store();
            IpcResponse::success_with_data(serde_json::json!({
                "chunks": store.len(),
                "dimension": store.dimension(),
                "index_model": store.model(),
                "query_model": assistant.retriever().model_name(),
                "generation": store.generation(),
                "llm_enabled": assistant.generation_enabled(),
            }))
        }
    }
}

fn to_data<T: serde::Serialize>(value: &T) -> IpcResponse {
    match serde_json::to_value(value) {
        Ok(data) => IpcResponse::success_with_data(data),
        Err(e) => IpcResponse::error(format!("Failed to encode response: {}", e)),
    }
}
