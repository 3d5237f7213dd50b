//! Registry and content store traits.
//!
//! The engine depends only on these traits, so a local JSON document, an
//! in-memory map and a ledger can be swapped without touching it.

use async_trait::async_trait;
use bytes::Bytes;
use pregrant_core::{AccessGrant, Completion, ContentId, DataRecord, PrincipalId};

use crate::error::Result;

/// Result of recording a data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// The record was new.
    Inserted,
    /// An identical record (same content id and hash) already exists.
    AlreadyExists,
}

/// The source-of-truth registry of data records and access grants.
///
/// # Semantics
///
/// Every backend must behave identically:
///
/// - `put_record` is idempotent for the same `(content_id, content_hash)` and
///   fails with `Conflict` for the same id with a different hash.
/// - `put_grant` fails with `Conflict` if `(content_id, recipient_id)` exists.
///   Grants are issue-once.
/// - `complete_grant` is the single atomic `Issued -> Transformed`
///   transition. Missing grant is `NotFound`; a repeat with the same
///   transformed id returns [`Completion::AlreadyCompleted`]; a repeat with
///   a different id is `AlreadyTransformed`.
/// - Nothing is ever deleted.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Record a new data record.
    async fn put_record(&self, record: &DataRecord) -> Result<InsertResult>;

    /// Look up a record by content id.
    async fn get_record(&self, content_id: &ContentId) -> Result<Option<DataRecord>>;

    /// All records. Insertion order for local stores, block order for ledgers.
    async fn list_records(&self) -> Result<Vec<DataRecord>>;

    /// Record a newly issued grant.
    async fn put_grant(&self, grant: &AccessGrant) -> Result<()>;

    /// Look up a grant by its key.
    async fn get_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
    ) -> Result<Option<AccessGrant>>;

    /// All grants, optionally restricted to one content id, in insertion order.
    async fn list_grants(&self, content_id: Option<&ContentId>) -> Result<Vec<AccessGrant>>;

    /// Atomically move a grant from `Issued` to `Transformed`.
    async fn complete_grant(
        &self,
        content_id: &ContentId,
        recipient_id: &PrincipalId,
        transformed_content_id: &ContentId,
    ) -> Result<Completion>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// A content-addressed blob store.
///
/// `put` derives the id from the bytes, so the same bytes always land on the
/// same id and an id never names two different blobs.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob and return its id.
    async fn put(&self, bytes: Bytes) -> Result<ContentId>;

    /// Fetch a blob. Missing ids are `NotFound`.
    async fn get(&self, id: &ContentId) -> Result<Bytes>;
}
