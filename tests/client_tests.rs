//! End-to-end tests: a `Session` talking through `HttpProxyClient` to the
//! proxy router served on a loopback port.

use async_trait::async_trait;
use parking_lot::Mutex;
use parley::integration::{Session, SessionConfig};
use parley::llm::UpstreamConfig;
use parley::messages::{
    AudioClip, ContextMessage, MemoryStorage, Storage, CONTEXT_KEY, HISTORY_KEY,
};
use parley::proxy::{HttpProxyClient, ProxyClientConfig};
use parley::server::{build_router, AppState, ModelProvider, ServerConfig};
use parley::{ParleyError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Default)]
struct RecordingProvider {
    fail: AtomicBool,
    calls: AtomicUsize,
    contexts: Mutex<Vec<Vec<ContextMessage>>>,
    uploads: Mutex<Vec<AudioClip>>,
}

#[async_trait]
impl ModelProvider for RecordingProvider {
    async fn chat(
        &self,
        _system_prompt: &str,
        context: &[ContextMessage],
        message: &str,
    ) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ParleyError::Upstream("provider unavailable".to_string()));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.to_vec());
        Ok(format!("ans({}) to {}", n, message))
    }

    async fn transcribe(&self, audio: AudioClip) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ParleyError::Upstream("provider unavailable".to_string()));
        }
        let text = format!("heard {} bytes", audio.len());
        self.uploads.lock().push(audio);
        Ok(text)
    }
}

/// Serve the router on an ephemeral port and return its base URL
async fn spawn_proxy(provider: Arc<RecordingProvider>) -> String {
    let state = AppState::new(provider, &UpstreamConfig::default());
    let router = build_router(state, &ServerConfig::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

fn client_session(base_url: String, storage: MemoryStorage) -> Session {
    let client = Arc::new(HttpProxyClient::new(ProxyClientConfig::new(base_url)).unwrap());
    Session::new(
        SessionConfig::default(),
        Arc::new(storage),
        client.clone(),
        client,
    )
}

#[tokio::test]
async fn test_text_and_audio_round_trip() {
    let provider = Arc::new(RecordingProvider::default());
    let base_url = spawn_proxy(provider.clone()).await;
    let session = client_session(base_url, MemoryStorage::new());

    let text = session.submit_text("hello").await.unwrap();
    assert_eq!(text.reply(), "ans(0) to hello");

    let clip = AudioClip::new(vec![1, 2, 3])
        .with_file_name("clip.wav")
        .with_mime_type("audio/wav");
    let audio = session.submit_audio(&clip).await.unwrap();
    assert_eq!(audio.user.content, "heard 3 bytes");
    assert!(audio.user.is_audio);
    assert_eq!(audio.reply(), "ans(1) to heard 3 bytes");

    // The upload arrives intact under the "audio" field
    let uploads = provider.uploads.lock();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].data, vec![1, 2, 3]);
    assert_eq!(uploads[0].file_name, "clip.wav");
    assert_eq!(uploads[0].mime_type, "audio/wav");

    // The context travels as JSON for chat and as the "context" form field for audio
    let contexts = provider.contexts.lock();
    assert!(contexts[0].is_empty());
    assert_eq!(
        contexts[1],
        vec![
            ContextMessage::user("hello"),
            ContextMessage::assistant("ans(0) to hello")
        ]
    );

    let history = session.history();
    assert_eq!(history.len(), 4);
    assert_eq!(session.context().len(), 4);
}

#[tokio::test]
async fn test_provider_failure_surfaces_error_body() {
    let provider = Arc::new(RecordingProvider::default());
    let base_url = spawn_proxy(provider.clone()).await;
    let storage = MemoryStorage::new();
    let session = client_session(base_url, storage.clone());

    session.submit_text("hello").await.unwrap();
    let history_before = storage.get(HISTORY_KEY).unwrap();
    let context_before = storage.get(CONTEXT_KEY).unwrap();
    let snapshot = session.history();

    provider.fail.store(true, Ordering::SeqCst);

    let err = session.submit_text("again").await.unwrap_err();
    assert_eq!(err, ParleyError::Upstream("provider unavailable".to_string()));

    let err = session
        .submit_audio(&AudioClip::new(vec![9; 16]))
        .await
        .unwrap_err();
    assert_eq!(err, ParleyError::Upstream("provider unavailable".to_string()));

    assert_eq!(session.history(), snapshot);
    assert_eq!(session.context().len(), 2);
    assert_eq!(storage.get(HISTORY_KEY).unwrap(), history_before);
    assert_eq!(storage.get(CONTEXT_KEY).unwrap(), context_before);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_unreachable_proxy_is_upstream_error() {
    // Bind then drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = client_session(format!("http://{}", addr), MemoryStorage::new());

    let err = session.submit_text("hello").await.unwrap_err();
    assert!(matches!(err, ParleyError::Upstream(_)));
    assert!(session.history().is_empty());
}
