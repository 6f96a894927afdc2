use std::future::Future;

use tokio::runtime::Handle;

use crate::api::{ApiClient, SessionListItem, SessionMessagesResponse};
use crate::error::ChatError;

/// Result of a background read against the backend.
#[derive(Debug)]
pub enum LoadEvent {
    Greeting(Result<String, ChatError>),
    Sessions(Result<Vec<SessionListItem>, ChatError>),
    History {
        session_id: String,
        result: Result<SessionMessagesResponse, ChatError>,
    },
}

/// Runs the retried GETs off the UI thread and posts their results to a
/// channel drained once per frame.
pub struct BackendLoader {
    runtime: Handle,
    tx: flume::Sender<LoadEvent>,
}

impl BackendLoader {
    pub fn new(runtime: Handle) -> (Self, flume::Receiver<LoadEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { runtime, tx }, rx)
    }

    pub fn load_greeting(&self, client: &ApiClient) {
        let client = client.clone();
        self.spawn(async move { LoadEvent::Greeting(client.greeting().await) });
    }

    pub fn load_sessions(&self, client: &ApiClient) {
        let client = client.clone();
        self.spawn(async move { LoadEvent::Sessions(client.list_sessions().await) });
    }

    pub fn load_history(&self, client: &ApiClient, session_id: &str) {
        let client = client.clone();
        let session_id = session_id.to_string();
        self.spawn(async move {
            let result = client.session_messages(&session_id).await;
            LoadEvent::History { session_id, result }
        });
    }

    fn spawn<F>(&self, load: F)
    where
        F: Future<Output = LoadEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            if tx.send(load.await).is_err() {
                tracing::debug!("Load result dropped: receiver closed");
            }
        });
    }
}
