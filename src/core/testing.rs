//! In-memory registry used by the worker tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::core::reference::ImageReference;
use crate::core::registry::{PulledImage, RegistryAuth, RegistryClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Pull(String),
    Tag(String, String),
    Push(String),
    TrustedPush(String),
    Save(String),
    Manifest(String),
}

/// Registry knowing a fixed set of images and their sizes
#[derive(Debug, Default)]
pub struct FakeRegistry {
    images: HashMap<String, u64>,
    broken_exports: HashSet<String>,
    calls: Mutex<Vec<RegistryCall>>,
}

impl FakeRegistry {
    pub fn with_image(mut self, reference: &str, size: u64) -> Self {
        self.images.insert(reference.to_string(), size);
        self
    }

    /// Image that exists in the registry but cannot be exported
    pub fn with_broken_export(mut self, reference: &str) -> Self {
        self.broken_exports.insert(reference.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RegistryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn pull(
        &self,
        reference: &str,
        _auth: Option<&RegistryAuth>,
        _attempts: u32,
    ) -> Result<PulledImage> {
        self.record(RegistryCall::Pull(reference.to_string()));
        match self.images.get(reference) {
            Some(size) => Ok(PulledImage { size: *size }),
            None => bail!("image {} not found", reference),
        }
    }

    async fn tag(&self, source: &str, target: &ImageReference) -> Result<()> {
        self.record(RegistryCall::Tag(source.to_string(), target.to_string()));
        Ok(())
    }

    async fn push(&self, target: &ImageReference, _auth: &RegistryAuth, _attempts: u32) -> Result<()> {
        self.record(RegistryCall::Push(target.to_string()));
        Ok(())
    }

    async fn trusted_push(
        &self,
        target: &ImageReference,
        _auth: &RegistryAuth,
        _attempts: u32,
    ) -> Result<()> {
        self.record(RegistryCall::TrustedPush(target.to_string()));
        Ok(())
    }

    async fn save(&self, reference: &str, dst: &Path) -> Result<u64> {
        self.record(RegistryCall::Save(reference.to_string()));
        if !self.images.contains_key(reference) {
            bail!("image {} not found", reference);
        }
        if self.broken_exports.contains(reference) {
            bail!("export of {} interrupted", reference);
        }
        let content = format!("tar of {}", reference).into_bytes();
        tokio::fs::write(dst, &content).await?;
        Ok(content.len() as u64)
    }

    async fn manifest(&self, reference: &ImageReference) -> Result<()> {
        self.record(RegistryCall::Manifest(reference.to_string()));
        let known = self
            .images
            .keys()
            .filter_map(|k| ImageReference::parse(k).ok())
            .any(|k| &k == reference);
        if !known {
            bail!("manifest unknown: {}", reference);
        }
        Ok(())
    }
}
