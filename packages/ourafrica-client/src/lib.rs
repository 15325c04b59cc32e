//! OurAfrica learning platform client.
//!
//! Session core for the student client: authentication against the backend
//! or the local cache, durable token storage, single-flight token renewal,
//! and the student certificates API on top of it.
//!
//! # Example
//!
//! ```rust,ignore
//! use ourafrica_client::{ClientConfig, Credentials, OurAfricaClient};
//!
//! let client = OurAfricaClient::from_config(&ClientConfig::from_env()?).await?;
//!
//! let user = client.auth().login(Credentials::new("ada@example.com", "secret")).await?;
//! println!("Signed in as {}", user.display_name());
//!
//! let page = client.student().list_certificates(&Default::default()).await?;
//! for certificate in &page.items {
//!     println!("{}", certificate.title());
//! }
//! ```

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod storage;
pub mod student;
pub mod testing;
pub mod token;
pub mod user;

pub use auth::{
    AuthEvent, AuthService, Credentials, CurrentUser, RegistrationDetails, Restored, Role, Session,
};
pub use config::ClientConfig;
pub use connectivity::{Connectivity, ConnectivityFlag};
pub use error::{ApiError, ClientError, Result};
pub use student::{Certificate, CertificatePage, CertificateQuery, StudentApi};
pub use user::UserProjection;

use std::sync::Arc;

use tracing::info;

use auth::{
    AuthState, ConnectivityAwareProvider, OfflineAuthProvider, OnlineAuthProvider,
    RefreshCoordinator, RefreshEndpoint, SessionBus,
};
use http::{ApiClient, ApiGateway, HttpTransport, ReqwestTransport};
use storage::{FileStore, KeyValueStore, KvDatabase, LocalDatabase, MemoryStore};
use token::TokenStore;

/// Fully wired client: auth coordinator, user projection and student API
/// sharing one token store, local database and refresh coordinator.
#[derive(Debug)]
pub struct OurAfricaClient {
    auth: AuthService,
    user: Arc<UserProjection>,
    student: StudentApi,
    api: ApiClient,
}

impl OurAfricaClient {
    pub fn builder(base_url: impl Into<String>) -> OurAfricaClientBuilder {
        OurAfricaClientBuilder::new(base_url)
    }

    /// File-backed client rooted at `config.data_dir`.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::builder(&config.api_url)
            .token_storage(Arc::new(FileStore::new(config.token_store_path())))
            .local_database(Arc::new(KvDatabase::new(FileStore::new(config.database_path()))))
            .connectivity(Arc::new(ConnectivityFlag::new(!config.offline)))
            .build()
            .await
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn user(&self) -> &UserProjection {
        &self.user
    }

    pub fn student(&self) -> &StudentApi {
        &self.student
    }

    /// Authenticated access to any backend path.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

pub struct OurAfricaClientBuilder {
    base_url: String,
    transport: Option<Arc<dyn HttpTransport>>,
    token_storage: Option<Arc<dyn KeyValueStore>>,
    local_db: Option<Arc<dyn LocalDatabase>>,
    connectivity: Option<Arc<dyn Connectivity>>,
}

impl OurAfricaClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            transport: None,
            token_storage: None,
            local_db: None,
            connectivity: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.token_storage = Some(storage);
        self
    }

    pub fn local_database(mut self, local_db: Arc<dyn LocalDatabase>) -> Self {
        self.local_db = Some(local_db);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Wire the components and restore any cached session.
    ///
    /// Unset parts default to an in-memory store and database, the reqwest
    /// transport and an always-online connectivity flag.
    pub async fn build(self) -> Result<OurAfricaClient> {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let token_storage = self
            .token_storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let local_db = self
            .local_db
            .unwrap_or_else(|| Arc::new(KvDatabase::new(MemoryStore::new())));
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityFlag::online()));

        let tokens = TokenStore::load(token_storage).await?;
        let state = Arc::new(AuthState::new());
        let events = SessionBus::new();

        let user = Arc::new(UserProjection::new());
        events.observe(user.clone());

        let gateway = ApiGateway::new(self.base_url, transport);
        let refresh = Arc::new(RefreshCoordinator::new(
            tokens.clone(),
            local_db.clone(),
            state.clone(),
            events.clone(),
            connectivity.clone(),
            Arc::new(RefreshEndpoint::new(gateway.clone())),
        ));
        let api = ApiClient::new(gateway, tokens.clone(), refresh.clone());

        let provider = Arc::new(ConnectivityAwareProvider::new(
            Arc::new(OnlineAuthProvider::new(api.clone())),
            Arc::new(OfflineAuthProvider::new(local_db.clone())),
            connectivity.clone(),
        ));

        let auth = AuthService::start(provider, tokens, local_db, connectivity, state, events, refresh).await?;
        info!(base_url = %api.gateway().base_url(), authenticated = auth.is_authenticated(), "Client ready");

        Ok(OurAfricaClient {
            auth,
            user,
            student: StudentApi::new(api.clone()),
            api,
        })
    }
}
