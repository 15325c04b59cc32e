//! Test harness wiring a full client against in-memory storage and a mock
//! transport.
//!
//! # Example using test-context
//!
//! ```ignore
//! use test_context::test_context;
//!
//! #[test_context(TestHarness)]
//! #[tokio::test]
//! async fn my_test(ctx: &TestHarness) {
//!     ctx.transport.respond_json(PROFILE, 200, json!({...}));
//!     let client = ctx.client().await;
//!     // ... test code
//! }
//! ```

use std::sync::Arc;

use ourafrica_client::auth::TokenPair;
use ourafrica_client::storage::{KeyValueStore, KvDatabase, LocalDatabase, MemoryStore};
use ourafrica_client::testing::MockTransport;
use ourafrica_client::token::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use ourafrica_client::{ConnectivityFlag, CurrentUser, OurAfricaClient};
use test_context::AsyncTestContext;

pub const API_URL: &str = "http://api.ourafrica.test";

pub struct TestHarness {
    pub transport: Arc<MockTransport>,
    pub token_storage: Arc<MemoryStore>,
    pub local_db: Arc<KvDatabase<MemoryStore>>,
    pub connectivity: ConnectivityFlag,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        Self::new()
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(MockTransport::new()),
            token_storage: Arc::new(MemoryStore::new()),
            local_db: Arc::new(KvDatabase::new(MemoryStore::new())),
            connectivity: ConnectivityFlag::online(),
        }
    }

    /// Build a client over this harness's storage. Startup restoration runs
    /// against whatever has been seeded so far.
    pub async fn client(&self) -> OurAfricaClient {
        OurAfricaClient::builder(API_URL)
            .transport(self.transport.clone())
            .token_storage(self.token_storage.clone())
            .local_database(self.local_db.clone())
            .connectivity(Arc::new(self.connectivity.clone()))
            .build()
            .await
            .expect("Failed to build client")
    }

    /// Seed the token store as a previous run would have left it.
    pub async fn seed_token_store(&self, tokens: &TokenPair) {
        self.token_storage
            .set(ACCESS_TOKEN_KEY, &tokens.access_token)
            .await
            .unwrap();
        self.token_storage
            .set(REFRESH_TOKEN_KEY, &tokens.refresh_token)
            .await
            .unwrap();
    }

    /// Seed the local database with a signed-in user and their tokens.
    pub async fn seed_local_db(&self, user: &CurrentUser, tokens: Option<&TokenPair>) {
        self.local_db.save_user(user).await.unwrap();
        if let Some(tokens) = tokens {
            self.local_db.save_auth_tokens(tokens).await.unwrap();
        }
    }

    pub async fn stored_access_token(&self) -> Option<String> {
        self.token_storage.get(ACCESS_TOKEN_KEY).await.unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", API_URL, path)
    }
}
