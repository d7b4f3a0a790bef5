//! In-memory store implementations for testing and embedded use.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde_json::Value;

use crate::{
    Result, SegflowError, ShareLock,
    store::{ObjectStore, TokenStore},
    utils,
};

/// Key in a token record holding the callback credential, used by the
/// conditional delete.
const CREDENTIAL_KEY: &str = "task_token";

struct StoredToken {
    record: Value,
    expires_at: i64,
}

/// In-memory token store.
///
/// TTL is enforced on read; the conditional delete holds the write lock for
/// the whole compare-and-delete, standing in for the backend atomicity the
/// contract requires.
#[derive(Clone, Default)]
pub struct MemTokenStore {
    tokens: ShareLock<HashMap<String, Arc<StoredToken>>>,
}

impl MemTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl TokenStore for MemTokenStore {
    fn put(
        &self,
        id: &str,
        record: Value,
        ttl_secs: u64,
    ) -> Result<()> {
        let mut tokens = self.tokens.write().unwrap();
        tokens.insert(
            id.to_string(),
            Arc::new(StoredToken {
                record,
                expires_at: utils::time::time_secs() + ttl_secs as i64,
            }),
        );
        Ok(())
    }

    fn get(
        &self,
        id: &str,
    ) -> Result<Option<Value>> {
        let expired = {
            let tokens = self.tokens.read().unwrap();
            match tokens.get(id) {
                Some(stored) if stored.expires_at > utils::time::time_secs() => return Ok(Some(stored.record.clone())),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.tokens.write().unwrap().remove(id);
        }
        Ok(None)
    }

    fn delete_if_matches(
        &self,
        id: &str,
        expected_credential: &str,
    ) -> Result<bool> {
        let mut tokens = self.tokens.write().unwrap();
        let matches = tokens
            .get(id)
            .map(|stored| stored.record.get(CREDENTIAL_KEY).and_then(|v| v.as_str()) == Some(expected_credential))
            .unwrap_or(false);
        if matches {
            tokens.remove(id);
        }
        Ok(matches)
    }
}

/// In-memory object store. Pointers are the stored path behind a `mem://`
/// scheme.
#[derive(Clone, Default)]
pub struct MemObjectStore {
    objects: ShareLock<HashMap<String, Vec<u8>>>,
}

const POINTER_SCHEME: &str = "mem://";

impl MemObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored objects, for tests.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemObjectStore {
    fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let mut objects = self.objects.write().unwrap();
        objects.insert(path.to_string(), bytes);
        Ok(format!("{}{}", POINTER_SCHEME, path))
    }

    fn get(
        &self,
        pointer: &str,
    ) -> Result<Vec<u8>> {
        let path = pointer.strip_prefix(POINTER_SCHEME).unwrap_or(pointer);
        let objects = self.objects.read().unwrap();
        objects.get(path).cloned().ok_or(SegflowError::Store(format!("object {} not found", pointer)))
    }
}
