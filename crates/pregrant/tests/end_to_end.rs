//! Produce, grant, transform and decrypt through the public API.

use std::sync::Arc;

use pregrant::core::Keypair;
use pregrant::ledger::client::memory::MemoryLedger;
use pregrant::ledger::LedgerRegistry;
use pregrant::pre::RistrettoPre;
use pregrant::store::MemoryContentStore;
use pregrant::{Engine, EngineConfig, EngineError, GrantState};
use tempfile::TempDir;

const READING: &[u8] = b"{\"temp\": 21.5}";

async fn local_engine(dir: &TempDir) -> Engine {
    Engine::open_local(EngineConfig::with_data_dir(dir.path()))
        .await
        .unwrap()
}

fn ledger_engine(dir: &TempDir, ledger: &Arc<MemoryLedger>) -> Engine {
    Engine::new(
        EngineConfig::with_data_dir(dir.path()),
        Arc::new(LedgerRegistry::new(Arc::clone(ledger), Keypair::generate())),
        Arc::new(MemoryContentStore::new()),
        Arc::new(RistrettoPre::new()),
    )
    .unwrap()
}

async fn full_lifecycle(engine: &Engine) {
    let owner = engine.owner("alice").await.unwrap();
    let r1 = engine.recipient("R1").await.unwrap();
    let r2 = engine.recipient("R2").await.unwrap();

    let record = owner.produce(READING, "thermo-7").await.unwrap();
    assert_eq!(record.owner_id.as_str(), "alice");
    assert_eq!(record.logical_source_id, "thermo-7");
    assert_eq!(owner.records().await.unwrap(), vec![record.clone()]);

    owner.grant(&record.content_id, r1.id()).await.unwrap();
    owner.grant(&record.content_id, r2.id()).await.unwrap();

    let pending = owner.grants(Some(&record.content_id)).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|g| g.state == GrantState::Issued));

    let report = engine.worker().run_once().await.unwrap();
    assert_eq!(report.completed.len(), 2);
    assert!(report.failures.is_empty());

    let g1 = engine
        .registry()
        .get_grant(&record.content_id, r1.id())
        .await
        .unwrap()
        .unwrap();
    let g2 = engine
        .registry()
        .get_grant(&record.content_id, r2.id())
        .await
        .unwrap()
        .unwrap();
    assert!(g1.is_transformed() && g2.is_transformed());
    assert_ne!(g1.transformed_content_id, g2.transformed_content_id);

    assert_eq!(r1.decrypt(&record.content_id).await.unwrap(), READING);
    assert_eq!(r2.decrypt(&record.content_id).await.unwrap(), READING);
    assert_eq!(r1.access_list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lifecycle_on_local_backend() {
    let dir = tempfile::tempdir().unwrap();
    full_lifecycle(&local_engine(&dir).await).await;
}

#[tokio::test]
async fn test_lifecycle_on_ledger_backend() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    full_lifecycle(&ledger_engine(&dir, &ledger)).await;
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let record = {
        let engine = local_engine(&dir).await;
        let owner = engine.owner("alice").await.unwrap();
        engine.recipient("R1").await.unwrap();
        let record = owner.produce(READING, "thermo-7").await.unwrap();
        owner.grant(&record.content_id, &"R1".into()).await.unwrap();
        record
    };

    let engine = local_engine(&dir).await;
    engine.worker().run_once().await.unwrap();
    let recipient = engine.recipient("R1").await.unwrap();
    assert_eq!(recipient.decrypt(&record.content_id).await.unwrap(), READING);
}

#[tokio::test]
async fn test_grant_errors() {
    let dir = tempfile::tempdir().unwrap();
    let engine = local_engine(&dir).await;
    let alice = engine.owner("alice").await.unwrap();
    let bob = engine.owner("bob").await.unwrap();
    engine.recipient("R1").await.unwrap();

    let record = alice.produce(READING, "thermo-7").await.unwrap();
    alice.grant(&record.content_id, &"R1".into()).await.unwrap();

    assert!(matches!(
        alice.grant(&record.content_id, &"R1".into()).await,
        Err(EngineError::Conflict(_))
    ));
    assert!(matches!(
        alice.grant(&"ZZ".into(), &"R1".into()).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        alice.grant(&record.content_id, &"nobody".into()).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        bob.grant(&record.content_id, &"R1".into()).await,
        Err(EngineError::Invalid(_))
    ));
}

#[tokio::test]
async fn test_recipient_without_grant() {
    let dir = tempfile::tempdir().unwrap();
    let engine = local_engine(&dir).await;
    let owner = engine.owner("alice").await.unwrap();
    let stranger = engine.recipient("R9").await.unwrap();
    let record = owner.produce(READING, "thermo-7").await.unwrap();

    assert!(matches!(
        stranger.decrypt(&record.content_id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(stranger.access_list().await.unwrap().is_empty());
}
