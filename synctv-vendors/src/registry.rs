//! Named vendor backends with a local fallback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tonic::transport::Channel;
use tracing::{debug, info};

use crate::emby::{new_emby_grpc_client, EmbyInterface, EmbyService};
use crate::error::VendorError;

/// Lookup table of vendor clients.
///
/// A lookup by backend name returns the registered remote client when there
/// is one and the in-process client otherwise, so callers never have to care
/// whether a vendor service is deployed.
pub struct VendorRegistry {
    emby: DashMap<String, Arc<dyn EmbyInterface>>,
    local_emby: Arc<dyn EmbyInterface>,
    closed: AtomicBool,
}

impl VendorRegistry {
    /// Registry with the default HTTP-backed local client.
    pub fn new() -> Result<Self, VendorError> {
        Ok(Self::with_local_emby(Arc::new(EmbyService::new()?)))
    }

    #[must_use]
    pub fn with_local_emby(local_emby: Arc<dyn EmbyInterface>) -> Self {
        Self {
            emby: DashMap::new(),
            local_emby,
            closed: AtomicBool::new(false),
        }
    }

    /// Register (or replace) a named Emby backend.
    pub fn register_emby(
        &self,
        name: impl Into<String>,
        client: Arc<dyn EmbyInterface>,
    ) -> Result<(), VendorError> {
        if self.is_closed() {
            return Err(VendorError::Closed);
        }
        let name = name.into();
        if self.emby.insert(name.clone(), client).is_some() {
            debug!(backend = %name, "Replaced Emby backend");
        } else {
            info!(backend = %name, "Registered Emby backend");
        }
        Ok(())
    }

    /// Register a named Emby backend reached over gRPC.
    pub fn register_emby_grpc(
        &self,
        name: impl Into<String>,
        channel: Option<Channel>,
    ) -> Result<(), VendorError> {
        let client = new_emby_grpc_client(channel)?;
        self.register_emby(name, client)
    }

    pub fn unregister_emby(&self, name: &str) -> bool {
        self.emby.remove(name).is_some()
    }

    /// Client for the named backend, falling back to the local one.
    #[must_use]
    pub fn load_emby_client(&self, name: &str) -> Arc<dyn EmbyInterface> {
        if !name.is_empty() {
            if let Some(client) = self.emby.get(name) {
                return Arc::clone(client.value());
            }
        }
        Arc::clone(&self.local_emby)
    }

    #[must_use]
    pub fn local_emby_client(&self) -> Arc<dyn EmbyInterface> {
        Arc::clone(&self.local_emby)
    }

    /// Names of the registered remote backends, sorted.
    #[must_use]
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.emby.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every remote backend. Lookups keep working against the local
    /// client. Returns false if already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let dropped = self.emby.len();
        self.emby.clear();
        info!(dropped, "Vendor registry closed");
        true
    }
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("backends", &self.backends())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
