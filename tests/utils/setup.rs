#![allow(dead_code)] // Not every test file uses every helper

use std::collections::HashMap;
use std::sync::Arc;

use cloudclip::{
    clipboard::{ClientInfo, ClipboardService, ConnectionError, Session},
    config::Config,
    device::DeviceIdentifier,
    message::{History, InMemoryHistoryStore},
};

use super::mocks::MockSink;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestClient {
    pub sink: Arc<MockSink>,
    pub session: Session,
}

pub struct TestSetup {
    pub service: Arc<ClipboardService>,
    pub store: Arc<InMemoryHistoryStore>,
    pub config: Config,
    pub clients: HashMap<String, TestClient>,
}

pub struct TestSetupBuilder {
    config: Config,
    history: Option<History>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            history: None,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.config.server.history = capacity;
        self
    }

    pub fn with_room_list(mut self) -> Self {
        self.config.server.room_list = true;
        self
    }

    pub fn with_text_limit(mut self, limit: u64) -> Self {
        self.config.text.limit = limit;
        self
    }

    /// Seeds the history store as if a previous run had saved it
    pub fn with_saved_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub async fn build(self) -> TestSetup {
        let store = Arc::new(match self.history {
            Some(history) => InMemoryHistoryStore::with_history(history),
            None => InMemoryHistoryStore::new(),
        });

        let service = Arc::new(ClipboardService::with_identifier(
            &self.config,
            store.clone(),
            DeviceIdentifier::with_seed(42),
        ));
        service.load_history().await.unwrap();

        TestSetup {
            service,
            store,
            config: self.config,
            clients: HashMap::new(),
        }
    }
}

/// Client descriptor unique per name, so every test client gets its own device ID
pub fn client_info(name: &str) -> ClientInfo {
    let port = 40_000 + name.bytes().map(u16::from).sum::<u16>();
    ClientInfo {
        remote_addr: format!("10.0.0.{}:{}", name.len(), port),
        ip: format!("10.0.0.{}", name.len()),
        user_agent: format!("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0 {}", name),
    }
}

impl TestSetup {
    /// Registers a client named `name` in `room` and keeps its sink for inspection
    pub async fn connect(&mut self, name: &str, room: &str) -> Session {
        self.try_connect(name, room, Arc::new(MockSink::new()))
            .await
            .unwrap()
    }

    pub async fn try_connect(
        &mut self,
        name: &str,
        room: &str,
        sink: Arc<MockSink>,
    ) -> Result<Session, ConnectionError> {
        let session = self
            .service
            .register_connection(sink.clone(), room, &client_info(name))
            .await?;
        self.clients.insert(
            name.to_string(),
            TestClient {
                sink,
                session: session.clone(),
            },
        );
        Ok(session)
    }

    pub async fn disconnect(&self, name: &str) -> Option<String> {
        let handle = self.client(name).session.handle;
        self.service.unregister_connection(handle).await
    }

    pub fn client(&self, name: &str) -> &TestClient {
        self.clients
            .get(name)
            .unwrap_or_else(|| panic!("no test client named {}", name))
    }

    pub fn sink(&self, name: &str) -> Arc<MockSink> {
        self.client(name).sink.clone()
    }

    pub fn device_id(&self, name: &str) -> String {
        self.client(name).session.device_id.clone()
    }

    /// Drops every recorded frame, e.g. the join sync
    pub async fn clear_frames(&self) {
        for client in self.clients.values() {
            client.sink.clear().await;
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
