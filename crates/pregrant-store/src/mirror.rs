//! Mirror reconciliation: keep a local registry consistent with an
//! authoritative one.
//!
//! The authoritative side (usually the ledger) only ever grows and grants only
//! ever advance `Issued -> Transformed`, so reconciliation is a one-way copy:
//!
//! 1. Records missing locally are inserted; same id with a different hash is a
//!    divergence.
//! 2. Grants missing locally are inserted in their authoritative state.
//! 3. Grants `Transformed` upstream but `Issued` locally are advanced through
//!    the mirror's own `complete_grant`.
//! 4. Anything the mirror knows that contradicts upstream is reported, never
//!    overwritten.

use pregrant_core::{AccessGrant, Blake3Hash, ContentId, GrantKey, GrantState};
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Registry};

/// A disagreement between mirror and authority that needs an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// Same content id, different content hash.
    RecordHash {
        content_id: ContentId,
        authoritative: Blake3Hash,
        mirror: Blake3Hash,
    },
    /// Both transformed, to different ids.
    TransformedId {
        key: GrantKey,
        authoritative: ContentId,
        mirror: ContentId,
    },
    /// Mirror is transformed but the authority is not.
    MirrorAhead { key: GrantKey, mirror: ContentId },
    /// Same key, different grant metadata.
    GrantMetadata { key: GrantKey },
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub records_copied: usize,
    pub grants_copied: usize,
    pub grants_advanced: usize,
    pub divergences: Vec<Divergence>,
}

impl MirrorReport {
    /// Check whether the mirror now agrees with the authority.
    pub fn is_converged(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Copy everything the authority knows into the mirror.
pub async fn reconcile(authority: &dyn Registry, mirror: &dyn Registry) -> Result<MirrorReport> {
    let mut report = MirrorReport::default();

    for record in authority.list_records().await? {
        match mirror.put_record(&record).await {
            Ok(InsertResult::Inserted) => report.records_copied += 1,
            Ok(InsertResult::AlreadyExists) => {}
            Err(StoreError::Conflict(_)) => {
                let local = mirror.get_record(&record.content_id).await?;
                if let Some(local) = local {
                    report.divergences.push(Divergence::RecordHash {
                        content_id: record.content_id.clone(),
                        authoritative: record.content_hash,
                        mirror: local.content_hash,
                    });
                }
            }
            Err(e) => return Err(e),
        }
    }

    for upstream in authority.list_grants(None).await? {
        let key = upstream.key();
        let local = mirror
            .get_grant(&upstream.content_id, &upstream.recipient_id)
            .await?;

        let Some(local) = local else {
            mirror.put_grant(&issued_copy(&upstream)).await?;
            report.grants_copied += 1;
            if let Some(transformed) = &upstream.transformed_content_id {
                mirror
                    .complete_grant(&upstream.content_id, &upstream.recipient_id, transformed)
                    .await?;
            }
            continue;
        };

        if local.owner_id != upstream.owner_id
            || local.recipient_public_key != upstream.recipient_public_key
            || local.fragment_reference != upstream.fragment_reference
        {
            report.divergences.push(Divergence::GrantMetadata { key: key.clone() });
        }

        match (&upstream.transformed_content_id, &local.transformed_content_id) {
            (Some(up), None) => {
                mirror
                    .complete_grant(&upstream.content_id, &upstream.recipient_id, up)
                    .await?;
                report.grants_advanced += 1;
            }
            (Some(up), Some(down)) if up != down => {
                report.divergences.push(Divergence::TransformedId {
                    key,
                    authoritative: up.clone(),
                    mirror: down.clone(),
                });
            }
            (None, Some(down)) => {
                report.divergences.push(Divergence::MirrorAhead {
                    key,
                    mirror: down.clone(),
                });
            }
            _ => {}
        }
    }

    if report.is_converged() {
        info!(
            authority = authority.backend_name(),
            mirror = mirror.backend_name(),
            records_copied = report.records_copied,
            grants_copied = report.grants_copied,
            grants_advanced = report.grants_advanced,
            "mirror reconciled"
        );
    } else {
        warn!(
            authority = authority.backend_name(),
            mirror = mirror.backend_name(),
            divergences = report.divergences.len(),
            "mirror diverges from authority"
        );
    }

    Ok(report)
}

/// The grant as it was issued, so the mirror applies the completion itself.
fn issued_copy(grant: &AccessGrant) -> AccessGrant {
    let mut issued = grant.clone();
    issued.state = GrantState::Issued;
    issued.transformed_content_id = None;
    issued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use pregrant_core::{DataRecord, FragmentRef, PrincipalId};

    fn grant(content: &str, recipient: &str) -> AccessGrant {
        let key = GrantKey::new(content.into(), recipient.into());
        AccessGrant::issue(
            key.content_id.clone(),
            "owner".into(),
            key.recipient_id.clone(),
            "ab".repeat(32),
            FragmentRef::for_grant(&key.grant_id()),
        )
    }

    #[tokio::test]
    async fn test_reconcile_copies_and_advances() {
        let authority = MemoryRegistry::new();
        let mirror = MemoryRegistry::new();

        authority
            .put_record(&DataRecord::new("X1".into(), b"a", "owner".into(), "s"))
            .await
            .unwrap();
        authority.put_grant(&grant("X1", "R1")).await.unwrap();
        authority.put_grant(&grant("X1", "R2")).await.unwrap();

        let first = reconcile(&authority, &mirror).await.unwrap();
        assert_eq!(first.records_copied, 1);
        assert_eq!(first.grants_copied, 2);
        assert!(first.is_converged());

        authority
            .complete_grant(&"X1".into(), &"R1".into(), &"X2".into())
            .await
            .unwrap();
        let second = reconcile(&authority, &mirror).await.unwrap();
        assert_eq!(second.grants_advanced, 1);
        assert_eq!(second.records_copied, 0);

        let local = mirror
            .get_grant(&"X1".into(), &PrincipalId::new("R1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local.transformed_content_id, Some("X2".into()));
        assert_eq!(mirror.snapshot().unwrap(), authority.snapshot().unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_reports_divergence() {
        let authority = MemoryRegistry::new();
        let mirror = MemoryRegistry::new();

        authority.put_grant(&grant("X1", "R1")).await.unwrap();
        mirror.put_grant(&grant("X1", "R1")).await.unwrap();
        authority
            .complete_grant(&"X1".into(), &"R1".into(), &"X2".into())
            .await
            .unwrap();
        mirror
            .complete_grant(&"X1".into(), &"R1".into(), &"X9".into())
            .await
            .unwrap();

        authority
            .put_record(&DataRecord::new("X1".into(), b"a", "owner".into(), "s"))
            .await
            .unwrap();
        mirror
            .put_record(&DataRecord::new("X1".into(), b"b", "owner".into(), "s"))
            .await
            .unwrap();

        let report = reconcile(&authority, &mirror).await.unwrap();
        assert!(!report.is_converged());
        assert_eq!(report.divergences.len(), 2);
        assert!(report
            .divergences
            .iter()
            .any(|d| matches!(d, Divergence::TransformedId { .. })));

        let local = mirror
            .get_grant(&"X1".into(), &"R1".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local.transformed_content_id, Some("X9".into()));
    }

    #[tokio::test]
    async fn test_reconcile_mirror_ahead() {
        let authority = MemoryRegistry::new();
        let mirror = MemoryRegistry::new();
        authority.put_grant(&grant("X1", "R1")).await.unwrap();
        mirror.put_grant(&grant("X1", "R1")).await.unwrap();
        mirror
            .complete_grant(&"X1".into(), &"R1".into(), &"X2".into())
            .await
            .unwrap();

        let report = reconcile(&authority, &mirror).await.unwrap();
        assert!(matches!(
            report.divergences.as_slice(),
            [Divergence::MirrorAhead { .. }]
        ));
    }
}
