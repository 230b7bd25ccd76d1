// src/context.rs

//! Per-run context shared by every algorithm

use crate::config::Config;
use crate::repository::RepositoryClient;
use crate::repository::publish::{ReleaseGenerator, Signer, generator_for, signer_for};

/// Configuration plus the collaborators built from it
pub struct Context {
    config: Config,
    client: RepositoryClient,
    generator: Box<dyn ReleaseGenerator>,
    signer: Box<dyn Signer>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let client = RepositoryClient::new(&config.http);
        let generator = generator_for(&config.publish);
        let signer = signer_for(&config.publish);
        Self {
            config,
            client,
            generator,
            signer,
        }
    }

    /// Replace the Release generator and signer
    pub fn with_publisher(
        mut self,
        generator: Box<dyn ReleaseGenerator>,
        signer: Box<dyn Signer>,
    ) -> Self {
        self.generator = generator;
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    pub fn generator(&self) -> &dyn ReleaseGenerator {
        self.generator.as_ref()
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
