//! Nested-bucket adapter over the embedded database engine.
//!
//! The engine (redb) offers flat tables; the store's schema is a tree of
//! named buckets. This module materializes the tree over two tables:
//!
//! ```text
//! buckets:  <encoded bucket path>          -> ""      (existence marker)
//! entries:  <encoded bucket path><key>     -> value
//! ```
//!
//! Paths are sequences of byte-string segments, each encoded as a 4-byte
//! big-endian length followed by the segment bytes. The encoding is
//! prefix-free: a byte-prefix match implies a segment-prefix match, so a
//! range scan from a bucket's path visits exactly that bucket's subtree.
//!
//! A marker is kept per bucket so that an empty bucket and a missing bucket
//! are distinguishable. The store's integrity checks depend on that
//! distinction: a missing sub-bucket is corruption, an empty one is a valid
//! state.
//!
//! Callers obtain buckets through the schema accessors, which verify
//! existence; `put`/`delete` do not re-check the marker.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::constants::DB_FILE_MODE;
use crate::error::{Error, Result};

const BUCKETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("buckets");
const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

// =============================================================================
// Engine
// =============================================================================

/// Handle to an open store file.
pub(crate) struct Engine {
    db: Database,
}

impl Engine {
    /// Opens (or creates) the store file and ensures both backing tables
    /// exist. The file is restricted to mode `0600` on Unix.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let tx = db.begin_write()?;
        tx.open_table(BUCKETS)?;
        tx.open_table(ENTRIES)?;
        tx.commit()?;

        restrict_mode(path)?;

        Ok(Self { db })
    }

    /// Begins a read-only transaction.
    pub fn begin_read(&self) -> Result<ReadTx> {
        Ok(ReadTx {
            tx: self.db.begin_read()?,
        })
    }

    /// Begins a read-write transaction.
    pub fn begin_write(&self) -> Result<WriteTx> {
        Ok(WriteTx {
            tx: self.db.begin_write()?,
        })
    }
}

#[cfg(unix)]
fn restrict_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(DB_FILE_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) -> Result<()> {
    Ok(())
}

// =============================================================================
// Buckets
// =============================================================================

/// Handle to a bucket: its encoded path from the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Bucket {
    path: Vec<u8>,
}

impl Bucket {
    /// Handle to a top-level bucket.
    pub fn root(name: &[u8]) -> Self {
        let mut path = Vec::with_capacity(4 + name.len());
        push_segment(&mut path, name);
        Self { path }
    }

    /// Handle to a sub-bucket nested under this one.
    pub fn child(&self, segment: &[u8]) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 4 + segment.len());
        path.extend_from_slice(&self.path);
        push_segment(&mut path, segment);
        Self { path }
    }
}

fn push_segment(buf: &mut Vec<u8>, segment: &[u8]) {
    buf.extend_from_slice(&(segment.len() as u32).to_be_bytes());
    buf.extend_from_slice(segment);
}

fn entry_key(bucket: &Bucket, key: &[u8]) -> Vec<u8> {
    bucket.child(key).path
}

/// If `key` addresses a direct entry of the bucket at `prefix`, returns the
/// entry's own key. Entries of nested sub-buckets carry more than one
/// trailing segment and are rejected.
fn direct_child<'a>(prefix: &[u8], key: &'a [u8]) -> Option<&'a [u8]> {
    let rest = &key[prefix.len()..];
    if rest.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    (rest.len() == 4 + len).then(|| &rest[4..])
}

// =============================================================================
// Transactions
// =============================================================================

/// Read operations available on both transaction kinds.
pub(crate) trait Tx {
    /// Whether the bucket has been created.
    fn bucket_exists(&self, bucket: &Bucket) -> Result<bool>;

    /// Value stored under `key` in `bucket`, if any.
    fn get(&self, bucket: &Bucket, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All direct key/value entries of `bucket`, in key order. Contents of
    /// nested sub-buckets are not included.
    fn entries(&self, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Read-only transaction.
pub(crate) struct ReadTx {
    tx: redb::ReadTransaction,
}

impl Tx for ReadTx {
    fn bucket_exists(&self, bucket: &Bucket) -> Result<bool> {
        let table = self.tx.open_table(BUCKETS)?;
        Ok(table.get(bucket.path.as_slice())?.is_some())
    }

    fn get(&self, bucket: &Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.tx.open_table(ENTRIES)?;
        Ok(table
            .get(entry_key(bucket, key).as_slice())?
            .map(|guard| guard.value().to_vec()))
    }

    fn entries(&self, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let table = self.tx.open_table(ENTRIES)?;
        scan_entries(&table, bucket)
    }
}

/// Read-write transaction. Dropping it without calling [`WriteTx::commit`]
/// aborts it; partial writes are never visible.
pub(crate) struct WriteTx {
    tx: redb::WriteTransaction,
}

impl Tx for WriteTx {
    fn bucket_exists(&self, bucket: &Bucket) -> Result<bool> {
        let table = self.tx.open_table(BUCKETS)?;
        Ok(table.get(bucket.path.as_slice())?.is_some())
    }

    fn get(&self, bucket: &Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.tx.open_table(ENTRIES)?;
        Ok(table
            .get(entry_key(bucket, key).as_slice())?
            .map(|guard| guard.value().to_vec()))
    }

    fn entries(&self, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let table = self.tx.open_table(ENTRIES)?;
        scan_entries(&table, bucket)
    }
}

impl WriteTx {
    /// Creates a bucket. The bucket must not already exist.
    pub fn create_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut table = self.tx.open_table(BUCKETS)?;
        if table.get(bucket.path.as_slice())?.is_some() {
            return Err(Error::Internal("bucket already exists".to_string()));
        }
        table.insert(bucket.path.as_slice(), b"".as_slice())?;
        Ok(())
    }

    /// Creates a bucket if it does not already exist.
    pub fn ensure_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut table = self.tx.open_table(BUCKETS)?;
        if table.get(bucket.path.as_slice())?.is_none() {
            table.insert(bucket.path.as_slice(), b"".as_slice())?;
        }
        Ok(())
    }

    /// Stores `value` under `key` in `bucket`, replacing any prior value.
    pub fn put(&self, bucket: &Bucket, key: &[u8], value: &[u8]) -> Result<()> {
        let mut table = self.tx.open_table(ENTRIES)?;
        table.insert(entry_key(bucket, key).as_slice(), value)?;
        Ok(())
    }

    /// Removes `key` from `bucket`. Removing an absent key is a no-op.
    pub fn delete(&self, bucket: &Bucket, key: &[u8]) -> Result<()> {
        let mut table = self.tx.open_table(ENTRIES)?;
        table.remove(entry_key(bucket, key).as_slice())?;
        Ok(())
    }

    /// Deletes a bucket, all entries in it, and all nested sub-buckets.
    pub fn delete_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut markers = self.tx.open_table(BUCKETS)?;
        if markers.get(bucket.path.as_slice())?.is_none() {
            return Err(Error::Internal(
                "cannot delete bucket: it does not exist".to_string(),
            ));
        }
        for key in keys_with_prefix(&markers, &bucket.path)? {
            markers.remove(key.as_slice())?;
        }
        drop(markers);

        let mut entries = self.tx.open_table(ENTRIES)?;
        for key in keys_with_prefix(&entries, &bucket.path)? {
            entries.remove(key.as_slice())?;
        }
        Ok(())
    }

    /// Commits the transaction, making all writes visible atomically.
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn scan_entries<T>(table: &T, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut out = Vec::new();
    for item in table.range(bucket.path.as_slice()..)? {
        let (key, value) = item?;
        let key = key.value();
        if !key.starts_with(&bucket.path) {
            break;
        }
        if let Some(name) = direct_child(&bucket.path, key) {
            out.push((name.to_vec(), value.value().to_vec()));
        }
    }
    Ok(out)
}

fn keys_with_prefix<T>(table: &T, prefix: &[u8]) -> Result<Vec<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut out = Vec::new();
    for item in table.range(prefix..)? {
        let (key, _) = item?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push(key.to_vec());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_engine() -> (TempDir, Engine) {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(&dir.path().join("test.db")).unwrap();
        (dir, engine)
    }

    #[test]
    fn test_bucket_exists_only_after_create() {
        let (_dir, engine) = test_engine();
        let bucket = Bucket::root(b"top");

        let tx = engine.begin_write().unwrap();
        assert!(!tx.bucket_exists(&bucket).unwrap());
        tx.create_bucket(&bucket).unwrap();
        assert!(tx.bucket_exists(&bucket).unwrap());
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert!(tx.bucket_exists(&bucket).unwrap());
    }

    #[test]
    fn test_empty_bucket_is_distinct_from_missing() {
        let (_dir, engine) = test_engine();
        let present = Bucket::root(b"present");
        let missing = Bucket::root(b"missing");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&present).unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert!(tx.bucket_exists(&present).unwrap());
        assert!(tx.entries(&present).unwrap().is_empty());
        assert!(!tx.bucket_exists(&missing).unwrap());
    }

    #[test]
    fn test_create_existing_bucket_fails() {
        let (_dir, engine) = test_engine();
        let bucket = Bucket::root(b"top");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&bucket).unwrap();
        assert!(tx.create_bucket(&bucket).is_err());
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, engine) = test_engine();
        let bucket = Bucket::root(b"top");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&bucket).unwrap();
        tx.put(&bucket, b"key", b"value").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert_eq!(tx.get(&bucket, b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(tx.get(&bucket, b"other").unwrap(), None);
    }

    #[test]
    fn test_entries_exclude_nested_sub_buckets() {
        let (_dir, engine) = test_engine();
        let top = Bucket::root(b"top");
        let nested = top.child(b"nested");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&top).unwrap();
        tx.create_bucket(&nested).unwrap();
        tx.put(&top, b"direct", b"1").unwrap();
        tx.put(&nested, b"inner", b"2").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        let entries = tx.entries(&top).unwrap();
        assert_eq!(entries, vec![(b"direct".to_vec(), b"1".to_vec())]);
        let entries = tx.entries(&nested).unwrap();
        assert_eq!(entries, vec![(b"inner".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn test_sibling_buckets_do_not_collide() {
        // "ab" at the root and "a"/"b" nested encode to different paths.
        let (_dir, engine) = test_engine();
        let flat = Bucket::root(b"ab");
        let parent = Bucket::root(b"a");
        let nested = parent.child(b"b");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&flat).unwrap();
        tx.create_bucket(&parent).unwrap();
        tx.create_bucket(&nested).unwrap();
        tx.put(&flat, b"k", b"flat").unwrap();
        tx.put(&nested, b"k", b"nested").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert_eq!(tx.get(&flat, b"k").unwrap(), Some(b"flat".to_vec()));
        assert_eq!(tx.get(&nested, b"k").unwrap(), Some(b"nested".to_vec()));
        assert_eq!(tx.entries(&parent).unwrap(), vec![]);
    }

    #[test]
    fn test_delete_bucket_removes_subtree() {
        let (_dir, engine) = test_engine();
        let top = Bucket::root(b"top");
        let nested = top.child(b"nested");
        let other = Bucket::root(b"other");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&top).unwrap();
        tx.create_bucket(&nested).unwrap();
        tx.create_bucket(&other).unwrap();
        tx.put(&top, b"k", b"v").unwrap();
        tx.put(&nested, b"k", b"v").unwrap();
        tx.put(&other, b"k", b"v").unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_write().unwrap();
        tx.delete_bucket(&top).unwrap();
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert!(!tx.bucket_exists(&top).unwrap());
        assert!(!tx.bucket_exists(&nested).unwrap());
        assert_eq!(tx.get(&nested, b"k").unwrap(), None);
        // Unrelated buckets survive.
        assert!(tx.bucket_exists(&other).unwrap());
        assert_eq!(tx.get(&other, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_delete_missing_bucket_fails() {
        let (_dir, engine) = test_engine();
        let tx = engine.begin_write().unwrap();
        assert!(tx.delete_bucket(&Bucket::root(b"nope")).is_err());
    }

    #[test]
    fn test_dropped_transaction_aborts() {
        let (_dir, engine) = test_engine();
        let bucket = Bucket::root(b"top");

        let tx = engine.begin_write().unwrap();
        tx.create_bucket(&bucket).unwrap();
        tx.put(&bucket, b"k", b"v").unwrap();
        drop(tx);

        let tx = engine.begin_read().unwrap();
        assert!(!tx.bucket_exists(&bucket).unwrap());
        assert_eq!(tx.get(&bucket, b"k").unwrap(), None);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let bucket = Bucket::root(b"top");

        {
            let engine = Engine::open(&path).unwrap();
            let tx = engine.begin_write().unwrap();
            tx.create_bucket(&bucket).unwrap();
            tx.put(&bucket, b"k", b"v").unwrap();
            tx.commit().unwrap();
        }

        let engine = Engine::open(&path).unwrap();
        let tx = engine.begin_read().unwrap();
        assert_eq!(tx.get(&bucket, b"k").unwrap(), Some(b"v".to_vec()));
    }
}
