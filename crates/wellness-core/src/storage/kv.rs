use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use std::path::Path;
use anyhow::Result;

#[derive(Clone)]
pub struct KvStore {
    db: Arc<DB>,
}

impl KvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db: Arc::new(db),
        })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let val = self.db.get(key)?;
        Ok(val)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    /// Applies all puts and deletes atomically.
    pub fn write_batch(&self, puts: Vec<(Vec<u8>, Vec<u8>)>, deletes: Vec<Vec<u8>>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (k, v) in puts {
            batch.put(k, v);
        }
        for k in deletes {
            batch.delete(k);
        }
        self.db.write(batch)?;
        Ok(())
    }

    pub fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // Explicit seek iterator: prefix_iterator needs a configured prefix extractor.
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));
        let mut results = Vec::new();
        for item in iter {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            results.push((k.to_vec(), v.to_vec()));
        }
        Ok(results)
    }

    /// Walks keys under `prefix` from the largest down, starting strictly
    /// below `before` when given, and stops after `limit` items.
    pub fn scan_reverse(&self, prefix: &[u8], before: Option<&[u8]>, limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut upper = prefix.to_vec();
        upper.push(0xFF);
        let seek = before.unwrap_or(upper.as_slice());

        let iter = self.db.iterator(IteratorMode::From(seek, Direction::Reverse));
        let mut results = Vec::new();
        for item in iter {
            if results.len() >= limit {
                break;
            }
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            if before.is_some_and(|b| k.as_ref() >= b) {
                continue;
            }
            results.push((k.to_vec(), v.to_vec()));
        }
        Ok(results)
    }

    /// Scan keys in the range [start_key, end_key_exclusive) using a RocksDB seek.
    pub fn scan_range(&self, start_key: &[u8], end_key_exclusive: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self.db.iterator(IteratorMode::From(start_key, Direction::Forward));
        let mut results = Vec::new();
        for item in iter {
            let (k, v) = item?;
            if k.as_ref() >= end_key_exclusive {
                break;
            }
            results.push((k.to_vec(), v.to_vec()));
        }
        Ok(results)
    }
}
