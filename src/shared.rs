use std::sync::Arc;

use parking_lot::RwLock;

use crate::document::Document;
use crate::snapshot::Snapshot;

/// A document shared between an editing thread and readers.
///
/// Each `with_mut` call is one edit transaction under the write lock, so
/// readers never see a half-applied edit. Long reads should take a
/// [`Snapshot`] and drop the lock right away.
#[derive(Clone, Default)]
pub struct SharedDocument(Arc<RwLock<Document>>);

impl SharedDocument {
    pub fn new(document: Document) -> Self {
        Self(Arc::new(RwLock::new(document)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let guard = self.0.read();
        f(&guard)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut guard = self.0.write();
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.0.read().snapshot()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Document> for SharedDocument {
    fn from(document: Document) -> Self {
        Self::new(document)
    }
}
