//! Serve a fixture index over the Unix socket and talk to it as a client

mod common;

use async_trait::async_trait;
use common::{animal_chunks, FixtureProvider};
use documind::generation::{GenerationError, TextGenerator};
use documind::index::IndexBuilder;
use documind::retrieval::{Assistant, ChatResponse, PromptTemplate, RetrievedChunk, Retriever};
use documind::server::{IpcClient, IpcMessage, Server, ServerOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Always fails, like an unreachable LLM endpoint
struct DownGenerator;

#[async_trait]
impl TextGenerator for DownGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

struct Running {
    socket_path: std::path::PathBuf,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<documind::Result<()>>,
}

async fn start(dir: &Path, generator: Option<Arc<dyn TextGenerator>>) -> Running {
    let provider = Arc::new(FixtureProvider::new());
    let store = IndexBuilder::new(provider.clone(), 8)
        .build(animal_chunks())
        .unwrap();

    let retriever = Arc::new(Retriever::new(provider, Arc::new(store), 10));
    let assistant = Assistant::new(retriever, generator, PromptTemplate::new("Answer.", true));

    let socket_path = dir.join("run").join("documind.sock");
    let server = Server::new(
        Arc::new(assistant),
        ServerOptions {
            socket_path: socket_path.clone(),
            max_connections: 4,
            default_top_k: 2,
        },
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async move {
        let _ = stopped.await;
    }));

    for _ in 0..100 {
        if socket_path.exists() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(socket_path.exists(), "server did not bind");

    Running {
        socket_path,
        stop,
        handle,
    }
}

async fn stop(running: Running) {
    running.stop.send(()).unwrap();
    running.handle.await.unwrap().unwrap();
    assert!(!running.socket_path.exists());
}

#[tokio::test]
async fn test_search_over_socket() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path(), None).await;
    let client = IpcClient::new(running.socket_path.clone());

    let response = client
        .send(&IpcMessage::Search {
            query: "kitten".to_string(),
            top_k: Some(3),
        })
        .await
        .unwrap();
    assert!(response.success);

    let chunks: Vec<RetrievedChunk> = serde_json::from_value(response.data.unwrap()).unwrap();
    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);

    // default_top_k applies when the request leaves it out
    let response = client
        .send(&IpcMessage::Search {
            query: "dog".to_string(),
            top_k: None,
        })
        .await
        .unwrap();
    let chunks: Vec<RetrievedChunk> = serde_json::from_value(response.data.unwrap()).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].id, "b");

    stop(running).await;
}

#[tokio::test]
async fn test_query_errors_are_reported_not_fatal() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path(), None).await;
    let client = IpcClient::new(running.socket_path.clone());

    let response = client
        .send(&IpcMessage::Search {
            query: "   ".to_string(),
            top_k: Some(2),
        })
        .await
        .unwrap();
    assert!(!response.success);

    let response = client
        .send(&IpcMessage::Search {
            query: "cat".to_string(),
            top_k: Some(0),
        })
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.message.unwrap().contains("Invalid argument"));

    // the server keeps answering
    let response = client.send(&IpcMessage::Status).await.unwrap();
    assert!(response.success);

    stop(running).await;
}

#[tokio::test]
async fn test_status() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path(), None).await;

    let response = IpcClient::new(running.socket_path.clone())
        .send(&IpcMessage::Status)
        .await
        .unwrap();
    let data = response.data.unwrap();
    assert_eq!(data["chunks"], 3);
    assert_eq!(data["dimension"], 3);
    assert_eq!(data["index_model"], "fixture-v1");
    assert_eq!(data["llm_enabled"], false);

    stop(running).await;
}

#[tokio::test]
async fn test_chat_survives_generation_failure() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path(), Some(Arc::new(DownGenerator))).await;

    let response = IpcClient::new(running.socket_path.clone())
        .send(&IpcMessage::Chat {
            prompt: "kitten".to_string(),
            top_k: Some(2),
        })
        .await
        .unwrap();
    assert!(response.success);

    let chat: ChatResponse = serde_json::from_value(response.data.unwrap()).unwrap();
    assert_eq!(chat.relevant_chunks.len(), 2);
    assert_eq!(chat.relevant_chunks[0].id, "a");
    assert!(chat.llm_response.is_none());
    assert!(chat.retrieval_error.is_none());
    assert!(chat.generation_error.unwrap().contains("service unavailable"));

    stop(running).await;
}

#[tokio::test]
async fn test_empty_chat_prompt() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path(), None).await;

    let response = IpcClient::new(running.socket_path.clone())
        .send(&IpcMessage::Chat {
            prompt: String::new(),
            top_k: None,
        })
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.message.unwrap().contains("A prompt is required."));

    stop(running).await;
}

#[tokio::test]
async fn test_concurrent_clients() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path(), None).await;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let client = IpcClient::new(running.socket_path.clone());
            let word = ["cat", "dog", "car", "kitten"][i % 4];
            tokio::spawn(async move {
                let response = client
                    .send(&IpcMessage::Search {
                        query: word.to_string(),
                        top_k: Some(1),
                    })
                    .await
                    .unwrap();
                let chunks: Vec<RetrievedChunk> =
                    serde_json::from_value(response.data.unwrap()).unwrap();
                (word, chunks[0].id.clone())
            })
        })
        .collect();

    for task in tasks {
        let (word, id) = task.await.unwrap();
        let expected = match word {
            "dog" => "b",
            "car" => "c",
            _ => "a",
        };
        assert_eq!(id, expected, "{}", word);
    }

    stop(running).await;
}
