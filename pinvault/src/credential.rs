//! Secrets used to authenticate against pinning services.
//!
//! A credential is anything that can hand out a secret on demand. Literal
//! keys are the trivial case; closures and environment lookups let a
//! rotating or short-lived token be read at registration time.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    async fn credential(&self) -> anyhow::Result<String>;
}

/// A fixed secret.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticCredential(..)")
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads the secret from an environment variable when asked.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for EnvCredential {
    async fn credential(&self) -> anyhow::Result<String> {
        std::env::var(&self.var)
            .with_context(|| format!("credential variable {} is not set", self.var))
    }
}

/// Calls a closure for every lookup.
pub struct FnCredential<F>(F);

impl<F> FnCredential<F>
where
    F: Fn() -> anyhow::Result<String> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait::async_trait]
impl<F> CredentialProvider for FnCredential<F>
where
    F: Fn() -> anyhow::Result<String> + Send + Sync + 'static,
{
    async fn credential(&self) -> anyhow::Result<String> {
        (self.0)()
    }
}

/// Serializable form of a credential.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum CredentialConfig {
    Literal { key: String },
    Env { var: String },
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialConfig::Literal { .. } => f.write_str("Literal { .. }"),
            CredentialConfig::Env { var } => f.debug_struct("Env").field("var", var).finish(),
        }
    }
}

impl CredentialConfig {
    pub fn into_provider(self) -> Arc<dyn CredentialProvider> {
        match self {
            CredentialConfig::Literal { key } => Arc::new(StaticCredential::new(key)),
            CredentialConfig::Env { var } => Arc::new(EnvCredential::new(var)),
        }
    }
}
