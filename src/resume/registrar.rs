use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Config, Result, SegflowError,
    resume::token::{ChunkContinuation, ResumptionToken, TokenStatus},
    runtime::ExecutionState,
    store::{ObjectStore, TokenStore, object_path},
    utils,
};

/// Characters allowed in a composed storage key.
static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-#.:]*$").unwrap());

/// Identity of a pause, registered when a chunk suspends.
///
/// Every component is mandatory: without the full tuple the composed token
/// id cannot be guaranteed unique.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub owner: String,
    pub workflow: String,
    pub parent_execution: String,
    pub chunk_id: String,
    pub paused_index: usize,
    pub task_token: String,
    pub state: ExecutionState,
}

/// Persists single-use resumption tokens on pause and reconstructs
/// execution context from them on resume.
pub struct ResumptionRegistrar {
    config: Config,
    tokens: Arc<dyn TokenStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ResumptionRegistrar {
    pub fn new(
        config: Config,
        tokens: Arc<dyn TokenStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            tokens,
            objects,
        }
    }

    /// Register a paused chunk and return the resumption id.
    ///
    /// Fails on any missing identity component, on a composed key that is
    /// too long or carries unsafe characters, and on any store failure —
    /// a pause whose token cannot be persisted must surface loudly rather
    /// than silently losing the human decision it waits for.
    pub fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<String> {
        for (name, value) in [
            ("owner", &request.owner),
            ("workflow", &request.workflow),
            ("parent_execution", &request.parent_execution),
            ("chunk_id", &request.chunk_id),
            ("task_token", &request.task_token),
        ] {
            if value.is_empty() {
                return Err(SegflowError::Token(format!("missing identity component: {}", name)));
            }
        }

        let resumption_id = format!(
            "{}#{}#{}#{}#{}",
            request.owner, request.workflow, request.parent_execution, request.chunk_id, request.paused_index
        );
        if resumption_id.len() > self.config.max_key_length {
            return Err(SegflowError::Token(format!(
                "composed resumption id exceeds {} characters",
                self.config.max_key_length
            )));
        }
        if !KEY_PATTERN.is_match(&resumption_id) {
            return Err(SegflowError::Token(format!("resumption id {} contains unsafe characters", resumption_id)));
        }

        let mut token = ResumptionToken {
            resumption_id: resumption_id.clone(),
            task_token: request.task_token,
            chunk_id: request.chunk_id.clone(),
            paused_index: request.paused_index,
            parent_execution: request.parent_execution.clone(),
            owner: request.owner.clone(),
            workflow: request.workflow.clone(),
            status: TokenStatus::Waiting,
            created_at: utils::time::time_millis(),
            ttl_secs: self.config.token_ttl_secs,
            state: None,
            state_pointer: None,
            state_summary: None,
        };

        let state_size = request.state.serialized_size();
        if state_size > self.config.inline_payload_limit {
            // offload: the token keeps a pointer and a summary, never the
            // full state twice
            let path = object_path(
                "paused_state",
                &request.owner,
                &request.workflow,
                &request.parent_execution,
                &request.chunk_id,
                &format!("segment_{}.json", request.paused_index),
            );
            let bytes = serde_json::to_vec(&request.state)?;
            let pointer = self.objects.put(&path, bytes)?;
            token.state_pointer = Some(pointer);
            token.state_summary = Some(format!("{} keys, {} bytes", request.state.len(), state_size));
        } else {
            token.state = Some(request.state);
        }

        self.tokens.put(&resumption_id, serde_json::to_value(&token)?, self.config.token_ttl_secs)?;
        debug!("registered resumption token {}", resumption_id);
        Ok(resumption_id)
    }

    /// Consume a token: reconstruct the paused state, merge the external
    /// response, and return the continuation.
    ///
    /// A token can be consumed at most once. The record is deleted
    /// conditionally on its stored credential; losing that race means
    /// another consumer already rotated the token, which is logged and
    /// otherwise ignored.
    pub fn resume(
        &self,
        resumption_id: &str,
        response: Value,
    ) -> Result<ChunkContinuation> {
        let record = self
            .tokens
            .get(resumption_id)?
            .ok_or(SegflowError::Token(format!("resumption token {} not found", resumption_id)))?;
        let token: ResumptionToken = serde_json::from_value(record)?;

        let mut state = match (&token.state, &token.state_pointer) {
            (Some(state), _) => state.clone(),
            (None, Some(pointer)) => {
                let bytes = self.objects.get(pointer)?;
                serde_json::from_slice(&bytes)?
            }
            (None, None) => ExecutionState::new(),
        };
        state.merge(response, self.config.message_window_size);

        match self.tokens.delete_if_matches(resumption_id, &token.task_token) {
            Ok(true) => {}
            Ok(false) => warn!("resumption token {} already rotated", resumption_id),
            Err(e) => return Err(e),
        }

        Ok(ChunkContinuation {
            resume_from_index: token.paused_index + 1,
            merged_state: state,
            chunk_id: token.chunk_id,
            parent_execution: token.parent_execution,
            owner: token.owner,
            workflow: token.workflow,
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::json;

    use super::{RegisterRequest, ResumptionRegistrar};
    use crate::{
        Config, SegflowError,
        runtime::ExecutionState,
        store::{MemObjectStore, MemTokenStore, TokenStore},
    };

    fn registrar() -> (ResumptionRegistrar, Arc<MemTokenStore>, Arc<MemObjectStore>) {
        let tokens = Arc::new(MemTokenStore::new());
        let objects = Arc::new(MemObjectStore::new());
        let registrar = ResumptionRegistrar::new(Config::default(), tokens.clone(), objects.clone());
        (registrar, tokens, objects)
    }

    fn request(state: ExecutionState) -> RegisterRequest {
        RegisterRequest {
            owner: "acme".to_string(),
            workflow: "wf1".to_string(),
            parent_execution: "exec1".to_string(),
            chunk_id: "chunk1".to_string(),
            paused_index: 1,
            task_token: "cred-123".to_string(),
            state,
        }
    }

    #[test]
    fn test_register_requires_identity_components() {
        let (registrar, _, _) = registrar();
        let mut req = request(ExecutionState::new());
        req.owner = String::new();

        let err = registrar.register(req).unwrap_err();
        assert!(matches!(err, SegflowError::Token(_)));
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn test_register_rejects_unsafe_keys() {
        let (registrar, _, _) = registrar();
        let mut req = request(ExecutionState::new());
        req.chunk_id = "chunk/../../etc".to_string();

        let err = registrar.register(req).unwrap_err();
        assert!(err.to_string().contains("unsafe characters"));
    }

    #[test]
    fn test_resume_merges_response_and_consumes_token() {
        let (registrar, _, _) = registrar();
        let state = ExecutionState::from(json!({ "draft": "v1" }));
        let id = registrar.register(request(state)).unwrap();
        assert_eq!(id, "acme#wf1#exec1#chunk1#1");

        let continuation = registrar.resume(&id, json!("Approved")).unwrap();
        assert_eq!(continuation.resume_from_index, 2);
        assert_eq!(continuation.merged_state.get("draft"), Some(json!("v1")));
        assert_eq!(continuation.merged_state.messages(), vec!["Approved"]);

        // single use: the second attempt reports not-found
        let err = registrar.resume(&id, json!("Approved")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_oversized_state_is_offloaded_with_summary() {
        let tokens = Arc::new(MemTokenStore::new());
        let objects = Arc::new(MemObjectStore::new());
        let config = Config {
            inline_payload_limit: 64,
            ..Default::default()
        };
        let registrar = ResumptionRegistrar::new(config, tokens.clone(), objects.clone());

        let state = ExecutionState::from(json!({ "blob": "x".repeat(256) }));
        let id = registrar.register(request(state)).unwrap();

        // the token record holds a pointer and a summary, not the state
        let record = tokens.get(&id).unwrap().unwrap();
        assert!(record.get("state").is_none());
        assert!(record["state_pointer"].as_str().unwrap().contains("paused_state/acme/wf1/exec1/chunk1"));
        assert!(record["state_summary"].as_str().unwrap().contains("1 keys"));
        assert_eq!(objects.len(), 1);

        // resume dereferences the pointer
        let continuation = registrar.resume(&id, json!({ "feedback": "ok" })).unwrap();
        assert_eq!(continuation.merged_state.get("blob"), Some(json!("x".repeat(256))));
        assert_eq!(continuation.merged_state.messages(), vec!["ok"]);
    }
}
