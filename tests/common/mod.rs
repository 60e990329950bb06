#![allow(dead_code)]

//! Shared test harness: an in-memory fake of the remote authority plus
//! helpers for wiring an engine against it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use vaultsync::core::chunks;
use vaultsync::core::crypto;
use vaultsync::core::errors::{VaultSyncError, VaultSyncResult};
use vaultsync::core::keys::KeyChain;
use vaultsync::core::models::NewSecret;
use vaultsync::remote::api::{
    CreateSecretRequest, DownloadChunkResponse, FinalizeChunkedUploadRequest,
    InitChunkedUploadRequest, InitChunkedUploadResponse, RemoteApi, SecretWire, SyncResponse,
    UpdateSecretRequest, UploadChunkRequest, UploadChunkResponse,
};
use vaultsync::storage::sqlite::SqliteStore;
use vaultsync::sync::engine::SyncEngine;

/// One secret as the fake server stores it. Ciphertext strings are opaque
/// to the server; `version` advances on every accepted write.
#[derive(Debug, Clone)]
pub struct ServerSecret {
    pub login: String,
    pub password: String,
    pub metadata: BTreeMap<String, String>,
    pub binary: Option<Vec<u8>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    change_tick: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallCounts {
    pub create: usize,
    pub get: usize,
    pub update: usize,
    pub delete: usize,
    pub sync: usize,
    pub init_upload: usize,
    pub upload_chunk: usize,
    pub finalize: usize,
    pub download_chunk: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum FailKind {
    Transport,
    VersionConflict,
}

impl FailKind {
    fn to_error(self) -> VaultSyncError {
        match self {
            Self::Transport => VaultSyncError::Transport("injected failure".to_owned()),
            Self::VersionConflict => VaultSyncError::VersionConflict,
        }
    }
}

struct UploadSession {
    chunks: BTreeMap<usize, Vec<u8>>,
    total_chunks: usize,
    metadata: BTreeMap<String, String>,
    secret_id: String,
}

#[derive(Default)]
struct ServerState {
    secrets: BTreeMap<String, ServerSecret>,
    uploads: BTreeMap<String, UploadSession>,
    next_id: u64,
    clock: u64,
    calls: CallCounts,
    fail_next_update: Option<FailKind>,
    fail_next_sync: Option<FailKind>,
    fail_chunk_at: Option<usize>,
    sync_delay: Option<Duration>,
    update_delay: Option<Duration>,
    omit_sync_binaries: bool,
}

impl ServerState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory remote authority. Clones share state, so two engines built
/// from clones of one `FakeRemote` behave like two clients of one server.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<ServerState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a secret directly, as if another client had pushed it.
    pub fn seed(
        &self,
        login: &str,
        password: &str,
        metadata: BTreeMap<String, String>,
        binary: Option<Vec<u8>>,
    ) -> String {
        let mut state = self.lock();
        let id = format!("srv-{}", state.fresh_id());
        let tick = state.tick();
        let now = Utc::now();
        state.secrets.insert(
            id.clone(),
            ServerSecret {
                login: login.to_owned(),
                password: password.to_owned(),
                metadata,
                binary,
                version: 1,
                created_at: now,
                updated_at: now,
                deleted_at: None,
                change_tick: tick,
            },
        );
        id
    }

    /// A concurrent edit from another client: replaces the ciphertext and
    /// advances the version.
    pub fn edit(&self, id: &str, login: &str, password: &str) {
        let mut state = self.lock();
        let tick = state.tick();
        let secret = state.secrets.get_mut(id).expect("edit of unknown secret");
        secret.login = login.to_owned();
        secret.password = password.to_owned();
        secret.version += 1;
        secret.updated_at = Utc::now();
        secret.change_tick = tick;
    }

    /// A delete from another client: the secret becomes a server-side
    /// delete marker offered to sync pulls.
    pub fn remove(&self, id: &str) {
        let mut state = self.lock();
        let tick = state.tick();
        let secret = state.secrets.get_mut(id).expect("remove of unknown secret");
        secret.deleted_at = Some(Utc::now());
        secret.binary = None;
        secret.change_tick = tick;
    }

    pub fn secret(&self, id: &str) -> Option<ServerSecret> {
        self.lock().secrets.get(id).cloned()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }

    pub fn fail_next_update(&self, kind: FailKind) {
        self.lock().fail_next_update = Some(kind);
    }

    pub fn fail_next_sync(&self, kind: FailKind) {
        self.lock().fail_next_sync = Some(kind);
    }

    pub fn fail_chunk(&self, index: usize) {
        self.lock().fail_chunk_at = Some(index);
    }

    pub fn set_sync_delay(&self, delay: Duration) {
        self.lock().sync_delay = Some(delay);
    }

    pub fn set_update_delay(&self, delay: Duration) {
        self.lock().update_delay = Some(delay);
    }

    /// Sync responses stop carrying attachment payloads or sizes, the way
    /// a server elides unchanged binaries from change feeds.
    pub fn omit_sync_binaries(&self) {
        self.lock().omit_sync_binaries = true;
    }

    fn wire(id: &str, secret: &ServerSecret) -> SecretWire {
        let (inline, size) = match &secret.binary {
            Some(data) if chunks::should_use_chunks(data.len()) => (None, Some(data.len() as i64)),
            Some(data) => (Some(STANDARD.encode(data)), None),
            None => (None, None),
        };
        SecretWire {
            id: id.to_owned(),
            login: secret.login.clone(),
            password: secret.password.clone(),
            metadata: Some(secret.metadata.clone()),
            binary_data: inline,
            binary_data_size: size,
            version: secret.version,
            created_at: secret.created_at,
            updated_at: secret.updated_at,
            deleted_at: secret.deleted_at,
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn create_secret(&self, request: &CreateSecretRequest) -> VaultSyncResult<SecretWire> {
        let mut state = self.lock();
        state.calls.create += 1;

        let binary = request
            .binary_data
            .as_deref()
            .map(|data| STANDARD.decode(data.as_bytes()))
            .transpose()?;
        let id = format!("srv-{}", state.fresh_id());
        let tick = state.tick();
        let now = Utc::now();
        let secret = ServerSecret {
            login: request.login.clone(),
            password: request.password.clone(),
            metadata: request.metadata.clone(),
            binary,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            change_tick: tick,
        };
        let wire = Self::wire(&id, &secret);
        state.secrets.insert(id, secret);
        Ok(wire)
    }

    async fn get_secret(&self, id: &str) -> VaultSyncResult<SecretWire> {
        let mut state = self.lock();
        state.calls.get += 1;
        state
            .secrets
            .get(id)
            .map(|secret| Self::wire(id, secret))
            .ok_or_else(|| VaultSyncError::Transport(format!("no such secret {id}")))
    }

    async fn update_secret(
        &self,
        id: &str,
        request: &UpdateSecretRequest,
    ) -> VaultSyncResult<SecretWire> {
        let delay = self.lock().update_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.update += 1;

        if let Some(kind) = state.fail_next_update.take() {
            return Err(kind.to_error());
        }

        let binary = request
            .binary_data
            .as_deref()
            .map(|data| STANDARD.decode(data.as_bytes()))
            .transpose()?;
        let tick = state.tick();
        let secret = state
            .secrets
            .get_mut(id)
            .ok_or_else(|| VaultSyncError::Transport(format!("no such secret {id}")))?;
        // A tombstoned secret never accepts an optimistic update.
        if secret.deleted_at.is_some() || request.version < secret.version {
            return Err(VaultSyncError::VersionConflict);
        }

        secret.login = request.login.clone();
        secret.password = request.password.clone();
        secret.metadata = request.metadata.clone();
        secret.binary = binary;
        secret.version += 1;
        secret.updated_at = Utc::now();
        secret.change_tick = tick;
        Ok(Self::wire(id, secret))
    }

    async fn delete_secret(&self, id: &str) -> VaultSyncResult<()> {
        let mut state = self.lock();
        state.calls.delete += 1;
        let tick = state.tick();
        let secret = state
            .secrets
            .get_mut(id)
            .ok_or_else(|| VaultSyncError::Transport(format!("no such secret {id}")))?;
        secret.deleted_at = Some(Utc::now());
        secret.binary = None;
        secret.change_tick = tick;
        Ok(())
    }

    async fn sync_since(&self, since: Option<&str>) -> VaultSyncResult<SyncResponse> {
        let delay = self.lock().sync_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.sync += 1;

        if let Some(kind) = state.fail_next_sync.take() {
            return Err(kind.to_error());
        }

        let cursor: u64 = since.and_then(|value| value.parse().ok()).unwrap_or(0);
        let omit_binaries = state.omit_sync_binaries;
        let secrets = state
            .secrets
            .iter()
            .filter(|(_, secret)| secret.change_tick > cursor)
            .map(|(id, secret)| {
                let mut wire = Self::wire(id, secret);
                if omit_binaries {
                    wire.binary_data = None;
                    wire.binary_data_size = None;
                }
                wire
            })
            .collect();
        Ok(SyncResponse {
            secrets,
            server_time: state.clock.to_string(),
        })
    }

    async fn init_chunked_upload(
        &self,
        request: &InitChunkedUploadRequest,
    ) -> VaultSyncResult<InitChunkedUploadResponse> {
        let mut state = self.lock();
        state.calls.init_upload += 1;

        let upload_id = format!("up-{}", state.fresh_id());
        let secret_id = format!("srv-{}", state.fresh_id());
        state.uploads.insert(
            upload_id.clone(),
            UploadSession {
                chunks: BTreeMap::new(),
                total_chunks: request.total_chunks,
                metadata: request.metadata.clone(),
                secret_id: secret_id.clone(),
            },
        );
        Ok(InitChunkedUploadResponse {
            upload_id,
            secret_id,
        })
    }

    async fn upload_chunk(
        &self,
        _secret_id: &str,
        request: &UploadChunkRequest,
    ) -> VaultSyncResult<UploadChunkResponse> {
        let mut state = self.lock();
        state.calls.upload_chunk += 1;

        if state.fail_chunk_at == Some(request.chunk_index) {
            state.fail_chunk_at = None;
            return Err(VaultSyncError::Transport("chunk upload refused".to_owned()));
        }

        let piece = STANDARD.decode(request.data.as_bytes())?;
        let session = state
            .uploads
            .get_mut(&request.upload_id)
            .ok_or_else(|| VaultSyncError::Transport("unknown upload".to_owned()))?;
        session.chunks.insert(request.chunk_index, piece);
        Ok(UploadChunkResponse {
            chunk_index: request.chunk_index,
            received: true,
        })
    }

    async fn finalize_chunked_upload(
        &self,
        secret_id: &str,
        request: &FinalizeChunkedUploadRequest,
    ) -> VaultSyncResult<SecretWire> {
        let mut state = self.lock();
        state.calls.finalize += 1;

        if let Some(kind) = state.fail_next_update.take() {
            return Err(kind.to_error());
        }

        let session = state
            .uploads
            .remove(&request.upload_id)
            .ok_or_else(|| VaultSyncError::Transport("unknown upload".to_owned()))?;
        if session.chunks.len() != session.total_chunks {
            return Err(VaultSyncError::Transport("incomplete upload".to_owned()));
        }
        let mut binary = Vec::new();
        for piece in session.chunks.values() {
            binary.extend_from_slice(piece);
        }

        let tick = state.tick();
        let now = Utc::now();
        if let Some(secret) = state.secrets.get_mut(secret_id) {
            if request.version.is_some_and(|version| version < secret.version) {
                return Err(VaultSyncError::VersionConflict);
            }
            secret.login = request.login.clone();
            secret.password = request.password.clone();
            secret.metadata = request.metadata.clone();
            secret.binary = Some(binary);
            secret.version += 1;
            secret.updated_at = now;
            secret.change_tick = tick;
            return Ok(Self::wire(secret_id, secret));
        }

        let id = session.secret_id;
        let secret = ServerSecret {
            login: request.login.clone(),
            password: request.password.clone(),
            metadata: session.metadata,
            binary: Some(binary),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            change_tick: tick,
        };
        let wire = Self::wire(&id, &secret);
        state.secrets.insert(id, secret);
        Ok(wire)
    }

    async fn download_chunk(
        &self,
        secret_id: &str,
        chunk_index: usize,
    ) -> VaultSyncResult<DownloadChunkResponse> {
        let mut state = self.lock();
        state.calls.download_chunk += 1;

        let secret = state
            .secrets
            .get(secret_id)
            .ok_or_else(|| VaultSyncError::Transport(format!("no such secret {secret_id}")))?;
        let binary = secret
            .binary
            .as_deref()
            .ok_or_else(|| VaultSyncError::Transport("secret has no attachment".to_owned()))?;

        let pieces = chunks::split_into_chunks(binary, chunks::CHUNK_SIZE);
        let piece = pieces
            .get(chunk_index)
            .ok_or_else(|| VaultSyncError::Transport(format!("chunk {chunk_index} out of range")))?;
        Ok(DownloadChunkResponse {
            chunk_index,
            data: STANDARD.encode(piece),
            total_chunks: pieces.len(),
        })
    }
}

// ---- engine wiring ------------------------------------------------------

pub type TestEngine = SyncEngine<SqliteStore, FakeRemote>;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine over in-memory SQLite with a freshly imported session key.
/// Returns the raw key bytes so tests can forge server-side ciphertext.
pub async fn build_engine(remote: FakeRemote) -> VaultSyncResult<(Arc<TestEngine>, [u8; 32])> {
    let key = crypto::generate_key();
    let engine = build_engine_with_key(remote, key).await?;
    Ok((engine, key))
}

/// Same wiring with a caller-supplied key: a second device of one user.
pub async fn build_engine_with_key(
    remote: FakeRemote,
    key: [u8; 32],
) -> VaultSyncResult<Arc<TestEngine>> {
    init_tracing();
    let keys = Arc::new(KeyChain::new());
    let exported = SecretString::new(STANDARD.encode(key).into_boxed_str());
    keys.import(&exported)?;

    let store = SqliteStore::connect("sqlite::memory:").await?;
    let engine = Arc::new(SyncEngine::new(store, remote, keys));
    engine.bootstrap().await?;
    Ok(engine)
}

pub fn go_online(engine: &TestEngine) {
    engine.set_online(true);
    engine.set_server_reachable(true);
}

pub fn draft(login: &str, password: &str) -> NewSecret {
    NewSecret {
        login: login.to_owned(),
        password: SecretString::new(password.to_owned().into_boxed_str()),
        metadata: BTreeMap::new(),
        binary_data: None,
    }
}

pub fn draft_with_binary(login: &str, password: &str, binary: Vec<u8>) -> NewSecret {
    NewSecret {
        login: login.to_owned(),
        password: SecretString::new(password.to_owned().into_boxed_str()),
        metadata: BTreeMap::new(),
        binary_data: Some(binary),
    }
}
