//! In-memory credential lookup.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::ake::{CredentialResolver, ResolveError};
use crate::soft::credential::RpkCredential;
use crate::types::{Credential, CredentialRef};

/// Resolver backed by a fixed table, falling back to an inline hint.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    credentials: HashMap<CredentialRef, Credential>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: CredentialRef, credential: Credential) {
        self.credentials.insert(reference, credential);
    }

    pub fn with_rpk(mut self, rpk: &RpkCredential) -> Self {
        self.insert(rpk.reference(), rpk.to_credential());
        self
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialResolver for StaticResolver {
    async fn resolve(
        &self,
        reference: &CredentialRef,
        hint: Option<&Credential>,
    ) -> Result<Credential, ResolveError> {
        if let Some(credential) = self.credentials.get(reference) {
            return Ok(credential.clone());
        }
        hint.cloned()
            .ok_or_else(|| ResolveError::Unknown(reference.clone()))
    }
}
