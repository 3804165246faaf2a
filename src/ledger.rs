use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

use csv::ByteRecord;
use tracing::{debug, info, warn};

use crate::{
    backend::{FileBackend, MemoryBackend},
    codec,
    errors::{LedgerError, Result, ValidationError},
    models::{ExpenseRecord, LedgerEntry, LedgerSnapshot, LoadReport, RecordId},
    traits::LedgerBackend,
};

struct State {
    backend: Box<dyn LedgerBackend>,
    snapshot: LedgerSnapshot,
    /// Rows of the file that could not be read as entries; rewritten as is.
    preserved: Vec<ByteRecord>,
    loaded: bool,
    last_id: RecordId,
}

/// Sole owner of the durable expense ledger.
///
/// Every operation runs under the store's lock, so one instance may be shared
/// between threads. Mutations build the new entry list, write it out in full
/// and only then replace the in-memory snapshot; a failed write leaves the
/// store at its previous snapshot. Rows skipped at load are carried through
/// every rewrite after the entries, so a bad row is never silently dropped.
pub struct LedgerStore {
    state: Mutex<State>,
}

impl LedgerStore {
    pub fn new(backend: impl LedgerBackend + 'static) -> Self {
        LedgerStore {
            state: Mutex::new(State {
                backend: Box::new(backend),
                snapshot: LedgerSnapshot::default(),
                preserved: Vec::new(),
                loaded: false,
                last_id: RecordId::default(),
            }),
        }
    }

    /// Store backed by the CSV file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(path))
    }

    /// Store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn location(&self) -> PathBuf {
        self.lock().backend.location()
    }

    /// The snapshot as of the last load or mutation.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.lock().snapshot.clone()
    }

    /// Reads the backing file, creating it with only a header row when absent.
    pub fn load(&self) -> Result<LoadReport> {
        let mut state = self.lock();
        load_locked(&mut state)
    }

    /// Appends `record` after the last entry and persists the whole ledger.
    pub fn append(&self, record: ExpenseRecord) -> Result<LedgerSnapshot> {
        record.validate()?;

        let mut state = self.lock();
        ensure_loaded(&mut state)?;

        let id = state.last_id.next();
        let mut entries = state.snapshot.entries().to_vec();
        entries.push(LedgerEntry::new(id, record));

        commit(&mut state, entries)?;
        state.last_id = id;
        info!(%id, count = state.snapshot.len(), "expense appended");
        Ok(state.snapshot.clone())
    }

    /// Removes the entry at `index` of `snapshot` and persists the remainder.
    ///
    /// The index is resolved against the snapshot the caller rendered. If that
    /// entry no longer exists in the store, the index is stale and the call
    /// fails with `OutOfRange` without writing.
    pub fn delete_at(&self, snapshot: &LedgerSnapshot, index: usize) -> Result<LedgerSnapshot> {
        let entry = snapshot.get(index).ok_or(LedgerError::OutOfRange {
            index,
            len: snapshot.len(),
        })?;
        let id = entry.id();

        let mut state = self.lock();
        ensure_loaded(&mut state)?;
        let Some(position) = state.snapshot.position_of(id) else {
            warn!(index, %id, "delete index is stale");
            return Err(LedgerError::OutOfRange {
                index,
                len: state.snapshot.len(),
            });
        };
        remove_locked(&mut state, position)
    }

    /// Removes the entry with the given id and persists the remainder.
    pub fn delete_by_id(&self, id: RecordId) -> Result<LedgerSnapshot> {
        let mut state = self.lock();
        ensure_loaded(&mut state)?;
        let position = state
            .snapshot
            .position_of(id)
            .ok_or(LedgerError::RecordNotFound(id))?;
        remove_locked(&mut state, position)
    }

    /// Overwrites the backing file with `snapshot` and adopts it as current.
    ///
    /// Every entry must pass record validation and carry a unique, non-zero id;
    /// otherwise nothing is written. Unreadable rows already in the file are
    /// kept.
    pub fn persist(&self, snapshot: &LedgerSnapshot) -> Result<LedgerSnapshot> {
        validate_entries(snapshot.entries())?;

        let mut state = self.lock();
        ensure_loaded(&mut state)?;
        commit(&mut state, snapshot.entries().to_vec())?;
        if let Some(max) = snapshot.iter().map(LedgerEntry::id).max() {
            state.last_id = state.last_id.max(max);
        }
        Ok(state.snapshot.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LedgerStore")
            .field("location", &state.backend.location())
            .field("entries", &state.snapshot.len())
            .field("revision", &state.snapshot.revision())
            .finish()
    }
}

fn load_locked(state: &mut State) -> Result<LoadReport> {
    let location = state.backend.location();
    let bytes = state
        .backend
        .read()
        .map_err(|err| LedgerError::io(&location, err))?;

    let (decoded, created) = match bytes {
        Some(bytes) => {
            let decoded =
                codec::decode(&bytes).map_err(|err| LedgerError::io(&location, err))?;
            (decoded, false)
        }
        None => {
            let header = codec::encode(&[], &[]).map_err(|err| LedgerError::io(&location, err))?;
            state
                .backend
                .write(&header)
                .map_err(|err| LedgerError::io(&location, err))?;
            info!(path = %location.display(), "created empty ledger");
            (codec::Decoded::default(), true)
        }
    };

    let revision = if state.loaded && state.snapshot.entries() == decoded.entries.as_slice() {
        state.snapshot.revision()
    } else {
        state.snapshot.revision() + 1
    };
    state.snapshot = LedgerSnapshot::new(decoded.entries, revision);
    state.preserved = decoded.preserved;
    state.last_id = state.last_id.max(decoded.last_id);
    state.loaded = true;

    if !decoded.skipped.is_empty() {
        warn!(
            path = %location.display(),
            skipped = decoded.skipped.len(),
            "ledger loaded with unreadable rows"
        );
    }
    info!(path = %location.display(), count = state.snapshot.len(), "ledger loaded");

    Ok(LoadReport {
        snapshot: state.snapshot.clone(),
        skipped_rows: decoded.skipped,
        created,
    })
}

fn ensure_loaded(state: &mut State) -> Result<()> {
    if !state.loaded {
        load_locked(state)?;
    }
    Ok(())
}

fn validate_entries(entries: &[LedgerEntry]) -> std::result::Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        let id = entry.id();
        if id == RecordId::default() {
            return Err(ValidationError::ZeroId);
        }
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateId(id));
        }
        entry.record().validate()?;
    }
    Ok(())
}

fn remove_locked(state: &mut State, position: usize) -> Result<LedgerSnapshot> {
    let mut entries = state.snapshot.entries().to_vec();
    let id = entries.remove(position).id();
    commit(state, entries)?;
    info!(%id, count = state.snapshot.len(), "expense deleted");
    Ok(state.snapshot.clone())
}

/// Writes `entries` in full, then swaps them in as the next revision.
fn commit(state: &mut State, entries: Vec<LedgerEntry>) -> Result<()> {
    let location = state.backend.location();
    if !state.preserved.is_empty() {
        warn!(
            path = %location.display(),
            rows = state.preserved.len(),
            "keeping unreadable rows at the end of the ledger"
        );
    }
    let bytes = codec::encode(&entries, &state.preserved)
        .map_err(|err| LedgerError::io(&location, err))?;
    state
        .backend
        .write(&bytes)
        .map_err(|err| LedgerError::io(&location, err))?;
    debug!(path = %location.display(), count = entries.len(), "ledger persisted");
    state.snapshot = LedgerSnapshot::new(entries, state.snapshot.revision() + 1);
    Ok(())
}
