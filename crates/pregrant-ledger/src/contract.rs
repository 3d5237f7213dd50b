//! The access-control contract: calls, signed transactions, events and the
//! state machine the ledger runs them through.
//!
//! Three entry points exist:
//!
//! - `RegisterData` records a [`DataRecord`]; the sending account becomes its
//!   registrant.
//! - `GrantAccess` issues a grant; only the record's registrant may call it
//!   and the record must already exist.
//! - `CompleteAccess` moves a grant to `Transformed`; any account may call it
//!   (the proxy signs with its own key), but only once per grant.
//!
//! Transactions are CBOR-encoded behind a domain prefix and signed with
//! Ed25519. The transaction hash is BLAKE3 over the signed bytes and the
//! signature.

use std::collections::HashMap;

use pregrant_core::{
    AccessGrant, Blake3Hash, Completion, ContentId, CoreError, DataRecord, Ed25519PublicKey,
    Ed25519Signature, GrantId, GrantState, Keypair, PrincipalId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{LedgerError, Result};

/// Domain separation prefix for transaction signatures.
pub const SIGNING_DOMAIN: &[u8] = b"pregrant-ledger-v1:";

/// A contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCall {
    RegisterData { record: DataRecord },
    GrantAccess { grant: AccessGrant },
    CompleteAccess {
        grant_id: GrantId,
        transformed_content_id: ContentId,
    },
}

impl LedgerCall {
    /// Method name as it appears in logs.
    pub fn method(&self) -> &'static str {
        match self {
            LedgerCall::RegisterData { .. } => "registerData",
            LedgerCall::GrantAccess { .. } => "grantAccess",
            LedgerCall::CompleteAccess { .. } => "completeAccess",
        }
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Ed25519PublicKey,
    pub nonce: u64,
    pub call: LedgerCall,
}

impl Transaction {
    /// The bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = SIGNING_DOMAIN.to_vec();
        ciborium::into_writer(self, &mut buf).map_err(|e| LedgerError::Encoding(e.to_string()))?;
        Ok(buf)
    }
}

/// A transaction with its sender's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub signature: Ed25519Signature,
}

impl SignedTransaction {
    /// Build and sign a transaction from `keypair`.
    pub fn sign(keypair: &Keypair, nonce: u64, call: LedgerCall) -> Result<Self> {
        let tx = Transaction {
            sender: keypair.public_key(),
            nonce,
            call,
        };
        let signature = keypair.sign(&tx.signing_bytes()?);
        Ok(Self { tx, signature })
    }

    /// Check the signature against the declared sender.
    pub fn verify(&self) -> Result<()> {
        let bytes = self.tx.signing_bytes()?;
        self.tx
            .sender
            .verify(&bytes, &self.signature)
            .map_err(LedgerError::from)
    }

    /// Content hash identifying this transaction.
    pub fn tx_hash(&self) -> Result<Blake3Hash> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.tx.signing_bytes()?);
        hasher.update(self.signature.as_bytes());
        Ok(Blake3Hash::from_bytes(*hasher.finalize().as_bytes()))
    }
}

/// Event emitted by a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    DataRegistered {
        record: DataRecord,
        registrant: Ed25519PublicKey,
    },
    AccessGranted {
        grant_id: GrantId,
        grant: AccessGrant,
    },
    AccessCompleted {
        grant_id: GrantId,
        content_id: ContentId,
        recipient_id: PrincipalId,
        transformed_content_id: ContentId,
    },
}

/// An event with its inclusion position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub block_number: u64,
    pub tx_hash: Blake3Hash,
    pub event: LedgerEvent,
}

/// Inclusion receipt for a successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: Blake3Hash,
    pub block_number: u64,
}

/// Why the ledger refused a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RevertReason {
    #[error("record already registered with hash {existing_hash}")]
    RecordExists { existing_hash: Blake3Hash },

    #[error("unknown record")]
    UnknownRecord,

    #[error("sender is not the record registrant")]
    NotRecordOwner,

    #[error("grant already exists")]
    GrantExists,

    #[error("unknown grant")]
    UnknownGrant,

    #[error("grant already processed to {existing}")]
    AlreadyProcessed { existing: ContentId },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bad nonce: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },

    #[error("bad signature")]
    BadSignature,
}

#[derive(Debug, Clone)]
struct RegisteredRecord {
    record: DataRecord,
    registrant: Ed25519PublicKey,
}

/// Contract storage and the rules applied to each call.
#[derive(Debug, Default, Clone)]
pub struct ContractState {
    records: HashMap<ContentId, RegisteredRecord>,
    grants: HashMap<GrantId, AccessGrant>,
    nonces: HashMap<Ed25519PublicKey, u64>,
}

impl ContractState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce expected from `account`.
    pub fn nonce(&self, account: &Ed25519PublicKey) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    /// Check signature and nonce, without touching state.
    pub fn admit(&self, tx: &SignedTransaction) -> std::result::Result<(), RevertReason> {
        tx.verify().map_err(|_| RevertReason::BadSignature)?;
        let expected = self.nonce(&tx.tx.sender);
        if tx.tx.nonce != expected {
            return Err(RevertReason::BadNonce {
                expected,
                got: tx.tx.nonce,
            });
        }
        Ok(())
    }

    /// Consume the sender's nonce. Included transactions do this whether or
    /// not the call itself reverts.
    pub fn bump_nonce(&mut self, account: &Ed25519PublicKey) {
        *self.nonces.entry(*account).or_insert(0) += 1;
    }

    pub fn record(&self, content_id: &ContentId) -> Option<&DataRecord> {
        self.records.get(content_id).map(|r| &r.record)
    }

    pub fn grant(&self, grant_id: &GrantId) -> Option<&AccessGrant> {
        self.grants.get(grant_id)
    }

    /// Run one call. State changes only when an event is returned.
    pub fn apply(
        &mut self,
        sender: &Ed25519PublicKey,
        call: LedgerCall,
    ) -> std::result::Result<LedgerEvent, RevertReason> {
        match call {
            LedgerCall::RegisterData { record } => self.register_data(sender, record),
            LedgerCall::GrantAccess { grant } => self.grant_access(sender, grant),
            LedgerCall::CompleteAccess {
                grant_id,
                transformed_content_id,
            } => self.complete_access(grant_id, transformed_content_id),
        }
    }

    fn register_data(
        &mut self,
        sender: &Ed25519PublicKey,
        record: DataRecord,
    ) -> std::result::Result<LedgerEvent, RevertReason> {
        pregrant_core::validate_record(&record)
            .map_err(|e| RevertReason::InvalidArgument(e.to_string()))?;

        if let Some(existing) = self.records.get(&record.content_id) {
            return Err(RevertReason::RecordExists {
                existing_hash: existing.record.content_hash,
            });
        }

        self.records.insert(
            record.content_id.clone(),
            RegisteredRecord {
                record: record.clone(),
                registrant: *sender,
            },
        );
        Ok(LedgerEvent::DataRegistered {
            record,
            registrant: *sender,
        })
    }

    fn grant_access(
        &mut self,
        sender: &Ed25519PublicKey,
        grant: AccessGrant,
    ) -> std::result::Result<LedgerEvent, RevertReason> {
        pregrant_core::validate_grant(&grant)
            .map_err(|e| RevertReason::InvalidArgument(e.to_string()))?;
        if grant.state != GrantState::Issued {
            return Err(RevertReason::InvalidArgument(
                "grants must be issued in state Issued".into(),
            ));
        }

        let registered = self
            .records
            .get(&grant.content_id)
            .ok_or(RevertReason::UnknownRecord)?;
        if registered.registrant != *sender {
            return Err(RevertReason::NotRecordOwner);
        }
        if registered.record.owner_id != grant.owner_id {
            return Err(RevertReason::InvalidArgument(format!(
                "grant owner {} does not match record owner {}",
                grant.owner_id, registered.record.owner_id
            )));
        }

        let grant_id = grant.grant_id();
        if self.grants.contains_key(&grant_id) {
            return Err(RevertReason::GrantExists);
        }

        self.grants.insert(grant_id, grant.clone());
        Ok(LedgerEvent::AccessGranted { grant_id, grant })
    }

    fn complete_access(
        &mut self,
        grant_id: GrantId,
        transformed_content_id: ContentId,
    ) -> std::result::Result<LedgerEvent, RevertReason> {
        let grant = self
            .grants
            .get_mut(&grant_id)
            .ok_or(RevertReason::UnknownGrant)?;

        if let Some(existing) = &grant.transformed_content_id {
            return Err(RevertReason::AlreadyProcessed {
                existing: existing.clone(),
            });
        }

        match grant.complete(transformed_content_id.clone()) {
            Ok(Completion::Completed) => Ok(LedgerEvent::AccessCompleted {
                grant_id,
                content_id: grant.content_id.clone(),
                recipient_id: grant.recipient_id.clone(),
                transformed_content_id,
            }),
            Ok(Completion::AlreadyCompleted) => Err(RevertReason::AlreadyProcessed {
                existing: transformed_content_id,
            }),
            Err(CoreError::DivergentCompletion { existing, .. }) => {
                Err(RevertReason::AlreadyProcessed { existing })
            }
            Err(e) => Err(RevertReason::InvalidArgument(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregrant_core::{FragmentRef, GrantKey};

    fn record(id: &str, owner: &str) -> DataRecord {
        DataRecord::new(id.into(), b"ciphertext", owner.into(), "sensor-1")
    }

    fn grant(content: &str, owner: &str, recipient: &str) -> AccessGrant {
        let key = GrantKey::new(content.into(), recipient.into());
        AccessGrant::issue(
            key.content_id.clone(),
            owner.into(),
            key.recipient_id.clone(),
            "ab".repeat(32),
            FragmentRef::for_grant(&key.grant_id()),
        )
    }

    #[test]
    fn test_signed_transaction_verifies() {
        let keypair = Keypair::generate();
        let tx = SignedTransaction::sign(
            &keypair,
            0,
            LedgerCall::RegisterData {
                record: record("X1", "alice"),
            },
        )
        .unwrap();
        tx.verify().unwrap();

        let mut forged = tx.clone();
        forged.tx.nonce = 1;
        assert!(forged.verify().is_err());
        assert_ne!(tx.tx_hash().unwrap(), forged.tx_hash().unwrap());
    }

    #[test]
    fn test_admit_checks_nonce() {
        let keypair = Keypair::generate();
        let mut state = ContractState::new();
        let call = LedgerCall::RegisterData {
            record: record("X1", "alice"),
        };

        let early = SignedTransaction::sign(&keypair, 3, call.clone()).unwrap();
        assert_eq!(
            state.admit(&early),
            Err(RevertReason::BadNonce {
                expected: 0,
                got: 3
            })
        );

        state.bump_nonce(&keypair.public_key());
        let next = SignedTransaction::sign(&keypair, 1, call).unwrap();
        assert_eq!(state.admit(&next), Ok(()));
    }

    #[test]
    fn test_only_registrant_may_grant() {
        let alice = Keypair::generate().public_key();
        let mallory = Keypair::generate().public_key();
        let mut state = ContractState::new();

        state
            .apply(&alice, LedgerCall::RegisterData { record: record("X1", "alice") })
            .unwrap();

        let err = state
            .apply(&mallory, LedgerCall::GrantAccess { grant: grant("X1", "alice", "R1") })
            .unwrap_err();
        assert_eq!(err, RevertReason::NotRecordOwner);

        state
            .apply(&alice, LedgerCall::GrantAccess { grant: grant("X1", "alice", "R1") })
            .unwrap();
        let dup = state
            .apply(&alice, LedgerCall::GrantAccess { grant: grant("X1", "alice", "R1") })
            .unwrap_err();
        assert_eq!(dup, RevertReason::GrantExists);
    }

    #[test]
    fn test_grant_requires_record_and_matching_owner() {
        let alice = Keypair::generate().public_key();
        let mut state = ContractState::new();

        let missing = state
            .apply(&alice, LedgerCall::GrantAccess { grant: grant("X1", "alice", "R1") })
            .unwrap_err();
        assert_eq!(missing, RevertReason::UnknownRecord);

        state
            .apply(&alice, LedgerCall::RegisterData { record: record("X1", "alice") })
            .unwrap();
        let wrong_owner = state
            .apply(&alice, LedgerCall::GrantAccess { grant: grant("X1", "bob", "R1") })
            .unwrap_err();
        assert!(matches!(wrong_owner, RevertReason::InvalidArgument(_)));
    }

    #[test]
    fn test_complete_access_once() {
        let alice = Keypair::generate().public_key();
        let proxy = Keypair::generate().public_key();
        let mut state = ContractState::new();
        let g = grant("X1", "alice", "R1");
        let grant_id = g.grant_id();

        state
            .apply(&alice, LedgerCall::RegisterData { record: record("X1", "alice") })
            .unwrap();
        state
            .apply(&alice, LedgerCall::GrantAccess { grant: g })
            .unwrap();

        let event = state
            .apply(
                &proxy,
                LedgerCall::CompleteAccess {
                    grant_id,
                    transformed_content_id: "X2".into(),
                },
            )
            .unwrap();
        assert!(matches!(event, LedgerEvent::AccessCompleted { .. }));

        let again = state
            .apply(
                &proxy,
                LedgerCall::CompleteAccess {
                    grant_id,
                    transformed_content_id: "X3".into(),
                },
            )
            .unwrap_err();
        assert_eq!(
            again,
            RevertReason::AlreadyProcessed {
                existing: "X2".into()
            }
        );

        let stored = state.grant(&grant_id).unwrap();
        assert_eq!(stored.state, GrantState::Transformed);
        assert_eq!(stored.transformed_content_id, Some("X2".into()));
    }

    #[test]
    fn test_register_existing_reports_hash() {
        let alice = Keypair::generate().public_key();
        let mut state = ContractState::new();
        let first = record("X1", "alice");
        state
            .apply(&alice, LedgerCall::RegisterData { record: first.clone() })
            .unwrap();

        let err = state
            .apply(&alice, LedgerCall::RegisterData { record: first.clone() })
            .unwrap_err();
        assert_eq!(
            err,
            RevertReason::RecordExists {
                existing_hash: first.content_hash
            }
        );
    }
}
