//! In-process transport that lets [`adstub_client::DirectoryClient`] talk to the emulator.

use crate::engine::DirectoryEmulator;
use crate::Result;
use adstub_client::{DirectoryConnector, DirectorySession};
use adstub_core::{DistinguishedName, Identity, SearchRequest, SearchScope};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Opens sessions against a shared [`DirectoryEmulator`].
#[derive(Clone)]
pub struct EmulatedConnector {
    emulator: Arc<DirectoryEmulator>,
}

impl EmulatedConnector {
    /// Creates a connector for the given emulator.
    #[must_use]
    pub fn new(emulator: Arc<DirectoryEmulator>) -> Self {
        Self { emulator }
    }
}

#[async_trait]
impl DirectoryConnector for EmulatedConnector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        debug!("opening emulated directory session");
        Ok(Box::new(EmulatedSession {
            emulator: Arc::clone(&self.emulator),
            bound: None,
        }))
    }
}

/// One emulated connection. A failed bind leaves it anonymous.
struct EmulatedSession {
    emulator: Arc<DirectoryEmulator>,
    bound: Option<DistinguishedName>,
}

#[async_trait]
impl DirectorySession for EmulatedSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        match self.emulator.bind(dn, password) {
            Ok(bound) => {
                self.bound = Some(bound);
                Ok(())
            }
            Err(err) => {
                self.bound = None;
                Err(err)
            }
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Identity>> {
        let request = SearchRequest::new(filter)
            .with_scope(scope)
            .with_attributes(attributes.iter().cloned())
            .with_base(base_dn);
        self.emulator.search(self.bound.as_ref(), &request)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.bound = None;
        Ok(())
    }
}
