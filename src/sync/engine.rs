use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{
    chunks, crypto,
    errors::{VaultSyncError, VaultSyncResult},
    keys::KeyChain,
    models::{DecryptedSecret, NewSecret, SecretRecord, SyncStatus},
};
use crate::remote::api::{
    CreateSecretRequest, FinalizeChunkedUploadRequest, InitChunkedUploadRequest, RemoteApi,
    SecretWire, UpdateSecretRequest, UploadChunkRequest,
};
use crate::storage::record_store::SecretStore;
use crate::sync::conflicts::{Conflict, ConflictChoice, ConflictQueue, ConflictReason};
use crate::sync::triggers::RemoteChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A cycle ran to completion.
    Completed {
        pushed: usize,
        pulled: usize,
        open_conflicts: usize,
    },
    /// The readiness guard or the reentrancy guard declined the cycle.
    Skipped,
}

/// Published on the engine's broadcast channel so the surrounding UI can
/// present notifications without the engine knowing how.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SyncStarted,
    SyncCompleted {
        pushed: usize,
        pulled: usize,
        open_conflicts: usize,
    },
    SyncFailed {
        message: String,
    },
    ConflictDetected {
        server_id: String,
    },
    ConflictResolved {
        server_id: String,
    },
    ConflictViewOpened,
}

/// Local-first synchronization engine.
///
/// Owns the record store, the remote seam, the session key chain and the
/// conflict queue. All sync-driven store mutations happen inside a single
/// cycle at a time; the cycle mutex is the reentrancy guard and `try_lock`
/// on it makes overlapping triggers collapse into one running cycle.
pub struct SyncEngine<S, R> {
    store: S,
    remote: R,
    keys: Arc<KeyChain>,
    state_tx: watch::Sender<SyncState>,
    online_tx: watch::Sender<bool>,
    reachable_tx: watch::Sender<bool>,
    pending_tx: watch::Sender<usize>,
    events_tx: broadcast::Sender<EngineEvent>,
    cycle: AsyncMutex<()>,
    conflicts: Mutex<ConflictQueue>,
    pub(crate) realtime_tx: mpsc::UnboundedSender<RemoteChange>,
    pub(crate) realtime_rx: Mutex<Option<mpsc::UnboundedReceiver<RemoteChange>>>,
}

struct CycleSummary {
    pushed: usize,
    pulled: usize,
}

impl<S: SecretStore, R: RemoteApi> SyncEngine<S, R> {
    pub fn new(store: S, remote: R, keys: Arc<KeyChain>) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let (online_tx, _) = watch::channel(false);
        let (reachable_tx, _) = watch::channel(false);
        let (pending_tx, _) = watch::channel(0);
        let (events_tx, _) = broadcast::channel(64);
        let (realtime_tx, realtime_rx) = mpsc::unbounded_channel();

        Self {
            store,
            remote,
            keys,
            state_tx,
            online_tx,
            reachable_tx,
            pending_tx,
            events_tx,
            cycle: AsyncMutex::new(()),
            conflicts: Mutex::new(ConflictQueue::new()),
            realtime_tx,
            realtime_rx: Mutex::new(Some(realtime_rx)),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &KeyChain {
        &self.keys
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn unsynced_count(&self) -> usize {
        *self.pending_tx.borrow()
    }

    pub fn watch_unsynced_count(&self) -> watch::Receiver<usize> {
        self.pending_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    pub fn is_server_reachable(&self) -> bool {
        *self.reachable_tx.borrow()
    }

    pub(crate) fn online_sender(&self) -> &watch::Sender<bool> {
        &self.online_tx
    }

    pub(crate) fn reachable_sender(&self) -> &watch::Sender<bool> {
        &self.reachable_tx
    }

    pub(crate) fn pending_sender(&self) -> &watch::Sender<usize> {
        &self.pending_tx
    }

    /// Loads the pending count from the store; called once after
    /// construction and again after every cycle.
    pub async fn bootstrap(&self) -> VaultSyncResult<()> {
        self.store.init().await?;
        self.refresh_pending().await
    }

    // ---- exposed record operations -------------------------------------

    /// Encrypts the draft's sensitive fields and stores a new `pending`
    /// record with `version = 1`. The server identity arrives on first
    /// successful push.
    pub async fn create_secret(&self, draft: NewSecret) -> VaultSyncResult<SecretRecord> {
        let key = self.keys.current()?;
        let login = crypto::encrypt_field(&key, draft.login.trim())?;
        let password = crypto::encrypt_field(&key, draft.password.expose_secret())?;
        let binary_data = Self::encrypt_binary(&key, draft.binary_data)?;

        let now = Utc::now();
        let record = SecretRecord {
            local_id: Uuid::new_v4(),
            server_id: None,
            login,
            password,
            metadata: draft.metadata,
            binary_data,
            version: 1,
            sync_status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store.add(&record).await?;
        self.refresh_pending().await?;
        Ok(record)
    }

    /// Re-encrypts the record's content and flips it back to `pending`.
    /// The version is left untouched: only a server response moves it.
    pub async fn update_secret(
        &self,
        local_id: Uuid,
        draft: NewSecret,
    ) -> VaultSyncResult<SecretRecord> {
        let key = self.keys.current()?;
        let existing = self
            .store
            .get(local_id)
            .await?
            .ok_or(VaultSyncError::NotFound)?;

        let mut updated = existing;
        updated.login = crypto::encrypt_field(&key, draft.login.trim())?;
        updated.password = crypto::encrypt_field(&key, draft.password.expose_secret())?;
        updated.metadata = draft.metadata;
        updated.binary_data = Self::encrypt_binary(&key, draft.binary_data)?;
        updated.sync_status = SyncStatus::Pending;
        updated.updated_at = Utc::now();

        self.store.put(&updated).await?;
        self.refresh_pending().await?;
        Ok(updated)
    }

    /// Never-synced records are removed outright; synced ones become a
    /// tombstone awaiting the server delete.
    pub async fn delete_secret(&self, local_id: Uuid) -> VaultSyncResult<()> {
        let existing = self
            .store
            .get(local_id)
            .await?
            .ok_or(VaultSyncError::NotFound)?;

        if existing.server_id.is_none() {
            self.store.delete(local_id).await?;
        } else {
            let now = Utc::now();
            let mut tombstone = existing;
            tombstone.sync_status = SyncStatus::Deleted;
            tombstone.deleted_at = Some(now);
            tombstone.updated_at = now;
            self.store.put(&tombstone).await?;
        }
        self.refresh_pending().await?;
        Ok(())
    }

    pub async fn list_secrets(&self) -> VaultSyncResult<Vec<SecretRecord>> {
        self.store.list_active().await
    }

    /// Decrypts one record on demand; nothing is decrypted eagerly.
    pub fn decrypt_secret(&self, record: &SecretRecord) -> VaultSyncResult<DecryptedSecret> {
        let key = self.keys.current()?;
        let login = crypto::decrypt_field(&key, &record.login)?;
        let password = crypto::decrypt_field(&key, &record.password)?;
        let binary_data = record
            .binary_data
            .as_deref()
            .map(|data| crypto::decrypt_bytes(&key, data))
            .transpose()?;

        Ok(DecryptedSecret {
            local_id: record.local_id,
            server_id: record.server_id.clone(),
            login,
            password: SecretString::new(password.into_boxed_str()),
            metadata: record.metadata.clone(),
            binary_data,
            version: record.version,
            sync_status: record.sync_status,
            updated_at: record.updated_at,
        })
    }

    // ---- sync cycle -----------------------------------------------------

    pub fn can_sync(&self) -> bool {
        *self.online_tx.borrow() && *self.reachable_tx.borrow()
    }

    /// Runs one sync cycle: push, then pull, then bookkeeping.
    ///
    /// Entry is guarded twice: the readiness check (online + reachable)
    /// and a `try_lock` on the cycle mutex, so concurrent triggers result
    /// in at most one running cycle. A started cycle runs to completion;
    /// there is no mid-cycle cancellation.
    pub async fn sync(&self) -> VaultSyncResult<SyncOutcome> {
        if !self.can_sync() {
            return Ok(SyncOutcome::Skipped);
        }
        let Ok(_guard) = self.cycle.try_lock() else {
            return Ok(SyncOutcome::Skipped);
        };

        self.state_tx.send_replace(SyncState::Syncing);
        let _ = self.events_tx.send(EngineEvent::SyncStarted);
        debug!("sync cycle started");

        match self.run_cycle().await {
            Ok(summary) => {
                let open_conflicts = self.finish_cycle();
                self.state_tx.send_replace(SyncState::Idle);
                let _ = self.events_tx.send(EngineEvent::SyncCompleted {
                    pushed: summary.pushed,
                    pulled: summary.pulled,
                    open_conflicts,
                });
                debug!(
                    pushed = summary.pushed,
                    pulled = summary.pulled,
                    open_conflicts, "sync cycle completed"
                );
                Ok(SyncOutcome::Completed {
                    pushed: summary.pushed,
                    pulled: summary.pulled,
                    open_conflicts,
                })
            }
            Err(err) => {
                self.state_tx.send_replace(SyncState::Error);
                let _ = self.events_tx.send(EngineEvent::SyncFailed {
                    message: err.to_string(),
                });
                warn!(error = %err, "sync cycle failed");
                Err(err)
            }
        }
    }

    async fn run_cycle(&self) -> VaultSyncResult<CycleSummary> {
        let pushed = self.push_local_changes().await?;
        let pulled = self.pull_server_changes().await?;
        self.refresh_pending().await?;
        Ok(CycleSummary { pushed, pulled })
    }

    /// Opens the conflict view when the cycle queued conflicts and the
    /// view is not already open; returns the open-conflict count.
    fn finish_cycle(&self) -> usize {
        let (count, opened) = {
            let mut queue = self.lock_conflicts();
            let count = queue.len();
            let opened = count > 0 && !queue.view_open();
            if opened {
                queue.open_view();
            }
            (count, opened)
        };
        if opened {
            let _ = self.events_tx.send(EngineEvent::ConflictViewOpened);
        }
        count
    }

    /// Push phase. A failure on one record is logged and the loop moves
    /// on; the record stays `pending` and retries on the next cycle.
    async fn push_local_changes(&self) -> VaultSyncResult<usize> {
        let unsynced = self.store.list_unsynced().await?;
        let mut pushed = 0;
        for record in unsynced {
            let local_id = record.local_id;
            match self.push_record(record).await {
                Ok(()) => pushed += 1,
                Err(err) => {
                    warn!(%local_id, error = %err, "push failed; record left for next cycle");
                }
            }
        }
        Ok(pushed)
    }

    async fn push_record(&self, record: SecretRecord) -> VaultSyncResult<()> {
        match (record.sync_status, record.server_id.clone()) {
            (SyncStatus::Deleted, Some(server_id)) => {
                self.remote.delete_secret(&server_id).await?;
                self.store.delete(record.local_id).await?;
            }
            (SyncStatus::Deleted, None) => {
                // Tombstone that never reached the server; nothing to tell it.
                self.store.delete(record.local_id).await?;
            }
            (_, None) => {
                let wire = match &record.binary_data {
                    Some(binary) if chunks::should_use_chunks(binary.len()) => {
                        self.upload_with_chunks(
                            None,
                            binary,
                            &record.login,
                            &record.password,
                            &record.metadata,
                            None,
                        )
                        .await?
                    }
                    _ => self.remote.create_secret(&create_request(&record)).await?,
                };
                let mut accepted = record;
                accepted.server_id = Some(wire.id);
                accepted.version = wire.version;
                accepted.sync_status = SyncStatus::Synced;
                self.store.put(&accepted).await?;
            }
            (_, Some(server_id)) => {
                let result = match &record.binary_data {
                    Some(binary) if chunks::should_use_chunks(binary.len()) => {
                        self.upload_with_chunks(
                            Some(&server_id),
                            binary,
                            &record.login,
                            &record.password,
                            &record.metadata,
                            Some(record.version),
                        )
                        .await
                    }
                    _ => {
                        self.remote
                            .update_secret(&server_id, &update_request(&record))
                            .await
                    }
                };
                match result {
                    Ok(wire) => {
                        let mut accepted = record;
                        accepted.version = wire.version;
                        accepted.sync_status = SyncStatus::Synced;
                        self.store.put(&accepted).await?;
                    }
                    Err(err) if err.is_version_conflict() => {
                        self.queue_version_conflict(&record, ConflictReason::Update)
                            .await?;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    /// Pull phase. The server response is one atomic batch: the first
    /// failure aborts the remainder and the cursor does not advance.
    async fn pull_server_changes(&self) -> VaultSyncResult<usize> {
        let cursor = self.store.sync_cursor().await?;
        let response = self.remote.sync_since(cursor.as_deref()).await?;
        let pulled = response.secrets.len();

        for wire in response.secrets {
            self.apply_server_secret(wire).await?;
        }

        self.store.set_sync_cursor(&response.server_time).await?;
        Ok(pulled)
    }

    async fn apply_server_secret(&self, wire: SecretWire) -> VaultSyncResult<()> {
        let existing = self.store.get_by_server_id(&wire.id).await?;

        if wire.deleted_at.is_some() {
            if let Some(existing) = existing {
                if existing.sync_status == SyncStatus::Pending {
                    // Local edit vs remote delete.
                    return self
                        .queue_version_conflict(&existing, ConflictReason::Sync)
                        .await;
                }
                self.store.delete(existing.local_id).await?;
            }
            return Ok(());
        }

        match existing {
            Some(existing) => {
                if existing.sync_status == SyncStatus::Pending && wire.version > existing.version {
                    return self
                        .queue_version_conflict(&existing, ConflictReason::Sync)
                        .await;
                }
                if existing.version == wire.version && existing.sync_status == SyncStatus::Synced {
                    return Ok(());
                }
                if existing.sync_status == SyncStatus::Synced || wire.version > existing.version {
                    let binary_data = match self.fetch_server_binary(&wire).await? {
                        Some(binary) => Some(binary),
                        // Sync responses omit unchanged payloads; keep ours.
                        None => existing.binary_data.clone(),
                    };
                    let overwritten = SecretRecord {
                        local_id: existing.local_id,
                        server_id: Some(wire.id),
                        login: wire.login,
                        password: wire.password,
                        metadata: wire.metadata.unwrap_or_default(),
                        binary_data,
                        version: wire.version,
                        sync_status: SyncStatus::Synced,
                        created_at: existing.created_at,
                        updated_at: wire.updated_at,
                        deleted_at: existing.deleted_at,
                    };
                    self.store.put(&overwritten).await?;
                }
                Ok(())
            }
            None => {
                let binary_data = self.fetch_server_binary(&wire).await?;
                let inserted = SecretRecord {
                    local_id: Uuid::new_v4(),
                    server_id: Some(wire.id),
                    login: wire.login,
                    password: wire.password,
                    metadata: wire.metadata.unwrap_or_default(),
                    binary_data,
                    version: wire.version,
                    sync_status: SyncStatus::Synced,
                    created_at: wire.created_at,
                    updated_at: wire.updated_at,
                    deleted_at: None,
                };
                self.store.add(&inserted).await?;
                Ok(())
            }
        }
    }

    async fn fetch_server_binary(&self, wire: &SecretWire) -> VaultSyncResult<Option<Vec<u8>>> {
        if let Some(inline) = &wire.binary_data {
            return Ok(Some(STANDARD.decode(inline.as_bytes())?));
        }
        if matches!(wire.binary_data_size, Some(size) if size > 0) {
            return Ok(Some(self.download_with_chunks(&wire.id).await?));
        }
        Ok(None)
    }

    // ---- chunked transfer ----------------------------------------------

    /// Three-phase upload for oversized payloads: init, sequential chunk
    /// uploads (one in flight at a time), finalize carrying the record's
    /// other fields and the optimistic version. `server_id` targets an
    /// existing secret; `None` lets init reserve a fresh identity. Any
    /// mid-flight failure aborts the whole operation; a finalize version
    /// conflict passes through untouched so it can reach conflict
    /// detection.
    async fn upload_with_chunks(
        &self,
        server_id: Option<&str>,
        data: &[u8],
        login: &str,
        password: &str,
        metadata: &BTreeMap<String, String>,
        version: Option<i64>,
    ) -> VaultSyncResult<SecretWire> {
        let pieces = chunks::split_into_chunks(data, chunks::CHUNK_SIZE);
        let total_chunks = pieces.len();

        let init = self
            .remote
            .init_chunked_upload(&InitChunkedUploadRequest {
                total_chunks,
                total_size: data.len() as u64,
                metadata: metadata.clone(),
            })
            .await
            .map_err(chunk_abort)?;
        let target = server_id.unwrap_or(init.secret_id.as_str());

        for (chunk_index, piece) in pieces.iter().enumerate() {
            let response = self
                .remote
                .upload_chunk(
                    target,
                    &UploadChunkRequest {
                        upload_id: init.upload_id.clone(),
                        chunk_index,
                        total_chunks,
                        data: STANDARD.encode(piece),
                    },
                )
                .await
                .map_err(chunk_abort)?;
            if !response.received {
                return Err(VaultSyncError::ChunkTransferAborted(format!(
                    "chunk {chunk_index} not acknowledged"
                )));
            }
        }

        self.remote
            .finalize_chunked_upload(
                target,
                &FinalizeChunkedUploadRequest {
                    upload_id: init.upload_id,
                    login: login.to_owned(),
                    password: password.to_owned(),
                    metadata: metadata.clone(),
                    version,
                },
            )
            .await
            .map_err(|err| {
                if err.is_version_conflict() {
                    err
                } else {
                    chunk_abort(err)
                }
            })
    }

    /// Chunk 0 reveals the total count; the rest are fetched in index
    /// order and concatenated.
    async fn download_with_chunks(&self, server_id: &str) -> VaultSyncResult<Vec<u8>> {
        let first = self
            .remote
            .download_chunk(server_id, 0)
            .await
            .map_err(chunk_abort)?;
        let total_chunks = first.total_chunks;

        let mut pieces = Vec::with_capacity(total_chunks);
        pieces.push(STANDARD.decode(first.data.as_bytes())?);
        for chunk_index in 1..total_chunks {
            let chunk = self
                .remote
                .download_chunk(server_id, chunk_index)
                .await
                .map_err(chunk_abort)?;
            pieces.push(STANDARD.decode(chunk.data.as_bytes())?);
        }
        Ok(chunks::merge_chunks(&pieces))
    }

    // ---- conflicts ------------------------------------------------------

    pub fn conflicts_count(&self) -> usize {
        self.lock_conflicts().len()
    }

    pub fn current_conflict(&self) -> Option<Conflict> {
        self.lock_conflicts().current().cloned()
    }

    pub fn conflict_view_open(&self) -> bool {
        self.lock_conflicts().view_open()
    }

    pub fn open_conflict_view(&self) {
        self.lock_conflicts().open_view();
    }

    pub fn close_conflict_view(&self) {
        self.lock_conflicts().close_view();
    }

    pub fn go_to_next_conflict(&self) {
        self.lock_conflicts().go_next();
    }

    pub fn go_to_prev_conflict(&self) {
        self.lock_conflicts().go_prev();
    }

    pub fn can_go_to_next_conflict(&self) -> bool {
        self.lock_conflicts().can_go_next()
    }

    pub fn can_go_to_prev_conflict(&self) -> bool {
        self.lock_conflicts().can_go_prev()
    }

    /// Fetches the server's current version of the conflicted record and
    /// queues the pair. The record itself stays `pending`, so an unresolved
    /// or dropped conflict is always re-discovered by a later push.
    async fn queue_version_conflict(
        &self,
        record: &SecretRecord,
        reason: ConflictReason,
    ) -> VaultSyncResult<()> {
        let Some(server_id) = record.server_id.clone() else {
            warn!(local_id = %record.local_id, "version conflict on a record without server identity");
            return Ok(());
        };
        if self.lock_conflicts().contains(&server_id, record.local_id) {
            return Ok(());
        }

        let server = self.remote.get_secret(&server_id).await?;
        let server_binary = self.fetch_server_binary(&server).await?;
        let conflict = Conflict {
            server_id: server_id.clone(),
            local_id: record.local_id,
            local: record.clone(),
            server,
            server_binary,
            reason,
            detected_at: Utc::now(),
        };

        if self.lock_conflicts().add(conflict) {
            let _ = self
                .events_tx
                .send(EngineEvent::ConflictDetected { server_id });
        }
        Ok(())
    }

    /// Applies the user's choice to the current conflict.
    ///
    /// Both choices re-submit field values under `max(local, server)` as
    /// the precondition version: a conflict implies the server is at least
    /// that far, so the precondition never decreases. A further version
    /// conflict leaves the entry queued for another attempt; any other
    /// failure drops it — the record is still `pending` and the next
    /// cycle re-discovers the conflict if it still exists.
    pub async fn resolve_conflict(&self, choice: ConflictChoice) -> VaultSyncResult<()> {
        let Some(conflict) = self.current_conflict() else {
            return Ok(());
        };
        let precondition = conflict.local.version.max(conflict.server.version);

        match self.submit_resolution(&conflict, choice, precondition).await {
            Ok(resolved) => {
                self.store.put(&resolved).await?;
                self.refresh_pending().await?;
                self.lock_conflicts()
                    .remove(&conflict.server_id, conflict.local_id);
                let _ = self.events_tx.send(EngineEvent::ConflictResolved {
                    server_id: conflict.server_id,
                });
                Ok(())
            }
            Err(err) if err.is_version_conflict() => Err(err),
            Err(err) => {
                self.lock_conflicts()
                    .remove(&conflict.server_id, conflict.local_id);
                Err(err)
            }
        }
    }

    async fn submit_resolution(
        &self,
        conflict: &Conflict,
        choice: ConflictChoice,
        version: i64,
    ) -> VaultSyncResult<SecretRecord> {
        let (login, password, metadata, binary_data) = match choice {
            ConflictChoice::Local => (
                conflict.local.login.clone(),
                conflict.local.password.clone(),
                conflict.local.metadata.clone(),
                conflict.local.binary_data.clone(),
            ),
            ConflictChoice::Server => (
                conflict.server.login.clone(),
                conflict.server.password.clone(),
                conflict.server.metadata.clone().unwrap_or_default(),
                conflict.server_binary.clone(),
            ),
        };

        let wire = match &binary_data {
            Some(data) if chunks::should_use_chunks(data.len()) => {
                self.upload_with_chunks(
                    Some(&conflict.server_id),
                    data,
                    &login,
                    &password,
                    &metadata,
                    Some(version),
                )
                .await?
            }
            _ => {
                self.remote
                    .update_secret(
                        &conflict.server_id,
                        &UpdateSecretRequest {
                            login: login.clone(),
                            password: password.clone(),
                            metadata: metadata.clone(),
                            binary_data: binary_data.as_deref().map(|data| STANDARD.encode(data)),
                            version,
                        },
                    )
                    .await?
            }
        };

        Ok(SecretRecord {
            local_id: conflict.local.local_id,
            server_id: Some(conflict.server_id.clone()),
            login,
            password,
            metadata,
            binary_data,
            version: wire.version,
            sync_status: SyncStatus::Synced,
            created_at: conflict.local.created_at,
            updated_at: Utc::now(),
            deleted_at: None,
        })
    }

    // ---- helpers --------------------------------------------------------

    async fn refresh_pending(&self) -> VaultSyncResult<()> {
        let count = self.store.unsynced_count().await?;
        self.pending_tx.send_if_modified(|value| {
            if *value == count {
                false
            } else {
                *value = count;
                true
            }
        });
        Ok(())
    }

    fn encrypt_binary(
        key: &[u8; crypto::KEY_SIZE],
        binary: Option<Vec<u8>>,
    ) -> VaultSyncResult<Option<Vec<u8>>> {
        match binary {
            Some(mut raw) => {
                let encrypted = crypto::encrypt_bytes(key, &raw)?;
                crypto::zeroize_vec(&mut raw);
                Ok(Some(encrypted))
            }
            None => Ok(None),
        }
    }

    fn lock_conflicts(&self) -> std::sync::MutexGuard<'_, ConflictQueue> {
        self.conflicts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn create_request(record: &SecretRecord) -> CreateSecretRequest {
    CreateSecretRequest {
        login: record.login.clone(),
        password: record.password.clone(),
        metadata: record.metadata.clone(),
        binary_data: record
            .binary_data
            .as_deref()
            .map(|data| STANDARD.encode(data)),
    }
}

fn update_request(record: &SecretRecord) -> UpdateSecretRequest {
    UpdateSecretRequest {
        login: record.login.clone(),
        password: record.password.clone(),
        metadata: record.metadata.clone(),
        binary_data: record
            .binary_data
            .as_deref()
            .map(|data| STANDARD.encode(data)),
        version: record.version,
    }
}

fn chunk_abort(err: VaultSyncError) -> VaultSyncError {
    VaultSyncError::ChunkTransferAborted(err.to_string())
}
