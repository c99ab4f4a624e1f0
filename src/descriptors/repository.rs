//! Descriptor acquisition and the linked registry
//!
//! Descriptors come from a serialized `FileDescriptorSet` bundle, a live
//! reflection session, or both. Collected files are ordered so every import is
//! registered before its importer, then linked into a `DescriptorPool`.

use super::linkage::DescriptorSet;
use super::reflection::ReflectionClient;
use crate::error::{BridgeError, Result};
use prost::Message;
use prost_reflect::{DescriptorPool, FileDescriptor, MethodDescriptor, ServiceDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

const WELL_KNOWN_PREFIX: &str = "google/protobuf/";

/// Where a static bundle is read from
#[derive(Debug, Clone)]
enum BundleSource {
    Path(String),
    Bytes(Vec<u8>),
}

/// Collects descriptors from the configured sources and links them
#[derive(Debug, Clone, Default)]
pub struct DescriptorRepository {
    bundle: Option<BundleSource>,
    reflection: Option<ReflectionClient>,
}

impl DescriptorRepository {
    /// Repository with no source configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a serialized `FileDescriptorSet` from a file (`~` is expanded)
    pub fn with_bundle_path<S: Into<String>>(mut self, path: S) -> Self {
        self.bundle = Some(BundleSource::Path(path.into()));
        self
    }

    /// Use an in-memory serialized `FileDescriptorSet`
    pub fn with_bundle_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bundle = Some(BundleSource::Bytes(bytes));
        self
    }

    /// Discover descriptors from the backend's reflection service
    pub fn with_reflection(mut self, client: ReflectionClient) -> Self {
        self.reflection = Some(client);
        self
    }

    /// Whether at least one source is configured
    pub fn is_configured(&self) -> bool {
        self.bundle.is_some() || self.reflection.is_some()
    }

    /// Gather, order and link every configured source into a registry
    pub async fn acquire(&self) -> Result<Registry> {
        if !self.is_configured() {
            return Err(BridgeError::config(
                "no descriptor source configured: provide a descriptor bundle and/or enable reflection",
            ));
        }

        let mut set = DescriptorSet::new();

        if let Some(client) = &self.reflection {
            let discovered = client.fetch().await?;
            info!("Discovered {} descriptor file(s) via reflection", discovered.len());
            set.extend(discovered.into_files());
        }

        if let Some(bundle) = &self.bundle {
            let files = self.read_bundle(bundle)?;
            let total = files.len();
            let mut added = 0;
            for file in files {
                let name = file.name().to_string();
                if set.insert(file) {
                    added += 1;
                } else {
                    debug!("Dropping bundle file {} (already collected)", name);
                }
            }
            info!("Loaded {} of {} bundle descriptor file(s)", added, total);
        }

        resolve_well_known(&mut set);
        Registry::link(set.into_linkage_order()?)
    }

    fn read_bundle(&self, bundle: &BundleSource) -> Result<Vec<FileDescriptorProto>> {
        let bytes = match bundle {
            BundleSource::Path(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
                debug!("Reading descriptor bundle {}", expanded.display());
                std::fs::read(&expanded)?
            }
            BundleSource::Bytes(bytes) => bytes.clone(),
        };
        Ok(FileDescriptorSet::decode(bytes.as_slice())?.file)
    }
}

/// Fill missing `google/protobuf/*` imports from the built-in well-known types
fn resolve_well_known(set: &mut DescriptorSet) {
    let missing = set.missing_dependencies();
    if missing.is_empty() {
        return;
    }

    let builtin = DescriptorPool::global();
    for name in missing {
        if !name.starts_with(WELL_KNOWN_PREFIX) {
            continue;
        }
        match builtin.get_file_by_name(&name) {
            Some(file) => {
                debug!("Using built-in descriptor for {}", name);
                set.insert(file.file_descriptor_proto().clone());
            }
            None => warn!("No built-in descriptor for {}", name),
        }
    }
}

/// Linked descriptors, read-only after construction
#[derive(Debug, Clone)]
pub struct Registry {
    pool: DescriptorPool,
    registered: Vec<String>,
}

impl Registry {
    /// Register files that are already in linkage order
    pub fn link(files: Vec<FileDescriptorProto>) -> Result<Self> {
        let mut pool = DescriptorPool::new();
        let mut registered = Vec::with_capacity(files.len());

        for file in files {
            let name = file.name().to_string();
            if pool.get_file_by_name(&name).is_some() {
                debug!("Skipping {} (already registered)", name);
                continue;
            }
            pool.add_file_descriptor_proto(file)?;
            registered.push(name);
        }

        let registry = Self { pool, registered };
        info!(
            "Descriptor registry ready: {} file(s), {} service(s)",
            registry.file_count(),
            registry.service_count()
        );
        Ok(registry)
    }

    /// Files in registration order
    pub fn files(&self) -> impl Iterator<Item = FileDescriptor> + '_ {
        self.registered
            .iter()
            .filter_map(|name| self.pool.get_file_by_name(name))
    }

    /// Services in file registration order, then declaration order
    pub fn services(&self) -> impl Iterator<Item = ServiceDescriptor> + '_ {
        self.files().flat_map(|file| file.services().collect::<Vec<_>>())
    }

    pub fn file_count(&self) -> usize {
        self.registered.len()
    }

    pub fn service_count(&self) -> usize {
        self.services().count()
    }

    /// The underlying pool
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Look a method up by fully-qualified service name and method name
    pub fn find_method(&self, service: &str, method: &str) -> Option<MethodDescriptor> {
        self.pool
            .get_service_by_name(service)?
            .methods()
            .find(|m| m.name() == method)
    }
}
