use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{FileStore, StorageError, StoredObject};

/// 测试用内存存储，可以设置在第 N 次写入后开始失败
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: AtomicUsize,
    fail_from: Mutex<Option<usize>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 前 `successful` 次写入成功，之后全部失败
    pub fn fail_after(&self, successful: usize) {
        *self.fail_from.lock().unwrap() = Some(successful);
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn put(&self, namespace: &str, file_name: &str, data: &[u8]) -> Result<StoredObject, StorageError> {
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_from.lock().unwrap().is_some_and(|n| attempt >= n) {
            return Err(StorageError::Rejected(file_name.to_string()));
        }

        let path = super::object_path(namespace, file_name);
        self.files.lock().unwrap().insert(path.clone(), data.to_vec());
        Ok(StoredObject {
            path,
            size: data.len(),
        })
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}
