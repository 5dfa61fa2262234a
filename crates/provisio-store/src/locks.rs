use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::StoreError;

/// One mutex per document id, created on first use.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding writes for `document_id`.
    pub fn get(&self, document_id: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut map = self.inner.lock()?;
        Ok(Arc::clone(map.entry(document_id.to_string()).or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_document_shares_a_lock() {
        let locks = DocumentLocks::new();
        let a = locks.get("doc-a").unwrap();
        let b = locks.get("doc-a").unwrap();
        let c = locks.get("doc-b").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _held = a.lock().unwrap();
        assert!(b.try_lock().is_err());
        assert!(c.try_lock().is_ok());
    }
}
