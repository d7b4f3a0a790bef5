use std::sync::Arc;

use crate::{
    Config, Engine, Result, SegflowError,
    runtime::SegmentRunner,
    store::{MemObjectStore, MemTokenStore, ObjectStore, TokenStore},
};

/// Builder for [`Engine`].
///
/// The segment runner is the one required collaborator; the token and
/// object stores default to the in-memory implementations.
pub struct EngineBuilder {
    config: Config,
    runner: Option<Arc<dyn SegmentRunner>>,
    tokens: Option<Arc<dyn TokenStore>>,
    objects: Option<Arc<dyn ObjectStore>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            runner: None,
            tokens: None,
            objects: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn runner(
        mut self,
        runner: Arc<dyn SegmentRunner>,
    ) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn token_store(
        mut self,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn object_store(
        mut self,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let runner = self.runner.ok_or(SegflowError::Config("a segment runner is required".to_string()))?;
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(MemTokenStore::new()));
        let objects = self.objects.unwrap_or_else(|| Arc::new(MemObjectStore::new()));

        Ok(Engine::new(self.config, runner, tokens, objects))
    }
}
