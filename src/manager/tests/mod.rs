//! Orchestration tests with a scripted provider
//!
//! These drive the manager through its full lifecycle without a network:
//! the scripted provider hands its update channel to the test, which then
//! plays the transfer's lifecycle by hand.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, VolumeConfig};
use crate::error::{Error, Result};
use crate::events::{Broadcaster, ChannelSink, SinkEvent};
use crate::provider::{
    CancellationHandle, DownloadProvider, ProviderUpdate, TorrentEngine, TorrentSignal,
    TorrentSource, TransferId, UpdateSender,
};
use crate::store::{Database, StateStore};
use crate::types::{DownloadId, Method, Status};
use crate::volume::VolumeManager;

use super::DownloadManager;

/// Engine stub for wiring a manager; torrent paths are not exercised here
struct NullEngine;

#[async_trait]
impl TorrentEngine for NullEngine {
    async fn add_transfer(
        &self,
        _source: TorrentSource,
        _download_dir: &Path,
        _signals: tokio::sync::mpsc::UnboundedSender<TorrentSignal>,
    ) -> Result<TransferId> {
        Ok(TransferId(0))
    }

    async fn remove_transfer(&self, _id: TransferId) -> Result<()> {
        Ok(())
    }
}

/// Provider whose transfer lifecycle is played by the test
struct ScriptedProvider {
    estimate: u64,
    fail_estimate: bool,
    fail_start: bool,
    token: CancellationToken,
    updates: StdMutex<Option<UpdateSender>>,
}

impl ScriptedProvider {
    fn new(estimate: u64) -> Arc<Self> {
        Arc::new(Self {
            estimate,
            fail_estimate: false,
            fail_start: false,
            token: CancellationToken::new(),
            updates: StdMutex::new(None),
        })
    }

    fn failing_estimate() -> Arc<Self> {
        Arc::new(Self {
            estimate: 0,
            fail_estimate: true,
            fail_start: false,
            token: CancellationToken::new(),
            updates: StdMutex::new(None),
        })
    }

    fn failing_start() -> Arc<Self> {
        Arc::new(Self {
            estimate: 0,
            fail_estimate: false,
            fail_start: true,
            token: CancellationToken::new(),
            updates: StdMutex::new(None),
        })
    }

    /// Emit an update as if the transfer produced it
    fn emit(&self, update: ProviderUpdate) {
        let guard = self.updates.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            tx.send(update).unwrap();
        }
    }

    /// Drop the update sender, as a provider does after cancellation
    fn close(&self) {
        self.updates.lock().unwrap().take();
    }
}

#[async_trait]
impl DownloadProvider for ScriptedProvider {
    async fn estimate_size(&self, _url: &str) -> Result<u64> {
        if self.fail_estimate {
            return Err(Error::Provider("estimate failed".to_string()));
        }
        Ok(self.estimate)
    }

    async fn start(
        &self,
        _url: &str,
        _destination: &Path,
        updates: UpdateSender,
    ) -> Result<CancellationHandle> {
        if self.fail_start {
            return Err(Error::Provider("start failed".to_string()));
        }
        *self.updates.lock().unwrap() = Some(updates);
        Ok(CancellationHandle::new(self.token.clone()))
    }
}

struct Harness {
    manager: DownloadManager,
    provider: Arc<ScriptedProvider>,
    store: Arc<Database>,
    _temp: TempDir,
}

async fn harness(provider: Arc<ScriptedProvider>) -> Harness {
    let temp = TempDir::new().unwrap();
    let mut config = Config {
        volumes: vec![VolumeConfig {
            name: "v1".to_string(),
            root: temp.path().join("v1"),
            max_size_gb: 100.0,
            tags: vec!["media".to_string()],
        }],
        ..Default::default()
    };
    config.providers.torrent.metadata_cache_dir = temp.path().join("torrents");

    let volumes = Arc::new(VolumeManager::new(
        config.volumes.clone(),
        Duration::from_secs(60),
    ));
    volumes.initialize().await;

    let store = Arc::new(Database::in_memory().await.unwrap());
    let broadcaster = Arc::new(Broadcaster::new());

    let mut manager = DownloadManager::new(
        &config,
        volumes,
        broadcaster,
        store.clone() as Arc<dyn StateStore>,
        Arc::new(NullEngine),
    )
    .await
    .unwrap();
    manager.register_provider(Method::Direct, provider.clone());

    Harness {
        manager,
        provider,
        store,
        _temp: temp,
    }
}

fn media_tags() -> Vec<String> {
    vec!["media".to_string()]
}

/// Poll status until the predicate holds or a 2s deadline passes
async fn wait_for_status(
    manager: &DownloadManager,
    id: DownloadId,
    expected: Status,
) -> crate::types::DownloadSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = manager.get_status(id).await.unwrap();
        if let Some(snapshot) = snapshot
            && snapshot.status == expected
        {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "download {id} never reached {expected:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Admission ───────────────────────────────────────────────────────────

#[tokio::test]
async fn start_download_persists_a_pending_record() {
    let h = harness(ScriptedProvider::new(1000)).await;

    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();

    let snapshot = h.manager.get_status(id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, Status::Pending);
    assert_eq!(snapshot.url, "http://host/file.bin");

    let record = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Pending);
    assert!(
        record.destination.ends_with(id.to_string()),
        "destination must be volume-root/download-id"
    );
    assert!(record.destination.is_dir(), "destination dir must exist");
}

#[tokio::test]
async fn unsupported_method_is_rejected_before_any_resource() {
    let h = harness(ScriptedProvider::new(0)).await;

    let result = h
        .manager
        .start_download(Method::Magnet, "magnet:?xt=urn:btih:abc", &media_tags())
        .await;

    assert!(matches!(result, Err(Error::UnsupportedMethod { .. })));
    assert!(
        h.store.get_all().await.unwrap().is_empty(),
        "no record may be created for an unsupported method"
    );
}

#[tokio::test]
async fn estimate_failure_aborts_without_creating_a_job() {
    let h = harness(ScriptedProvider::failing_estimate()).await;

    let result = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await;

    assert!(matches!(result, Err(Error::Provider(_))));
    assert!(
        h.store.get_all().await.unwrap().is_empty(),
        "an estimate failure must propagate before anything is persisted"
    );
}

#[tokio::test]
async fn unmatched_tags_fail_with_no_suitable_volume() {
    let h = harness(ScriptedProvider::new(0)).await;

    let result = h
        .manager
        .start_download(
            Method::Direct,
            "http://host/file.bin",
            &["books".to_string()],
        )
        .await;

    assert!(matches!(result, Err(Error::NoSuitableVolume { .. })));
    assert!(h.store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn start_failure_marks_the_record_failed_and_propagates() {
    let h = harness(ScriptedProvider::failing_start()).await;

    let result = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await;
    assert!(result.is_err());

    let records = h.store.get_all().await.unwrap();
    assert_eq!(records.len(), 1, "the record is retained for audit");
    assert_eq!(records[0].status, Status::Failed);
    assert!(
        records[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("start failed"),
        "the captured message must carry the provider error"
    );
}

// ── Lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn started_update_moves_pending_to_downloading_and_persists() {
    let h = harness(ScriptedProvider::new(1000)).await;
    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();

    h.provider.emit(ProviderUpdate::Started);
    wait_for_status(&h.manager, id, Status::Downloading).await;

    let record = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Downloading);
}

#[tokio::test]
async fn progress_updates_flow_into_the_live_snapshot() {
    let h = harness(ScriptedProvider::new(1000)).await;
    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();

    h.provider.emit(ProviderUpdate::Started);
    h.provider.emit(ProviderUpdate::Progress {
        downloaded_bytes: 250,
        total_bytes: 1000,
        speed_bps: 125,
        eta_secs: 6,
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = h.manager.get_status(id).await.unwrap().unwrap();
        if snapshot.downloaded_bytes == 250 {
            assert_eq!(snapshot.progress, 25.0);
            assert_eq!(snapshot.speed_bps, 125);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "progress never applied");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn completed_update_demotes_to_the_durable_record() {
    let h = harness(ScriptedProvider::new(1000)).await;
    let (sink, mut events) = ChannelSink::new();

    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();
    h.manager.subscribe(id, Box::new(sink));

    h.provider.emit(ProviderUpdate::Started);
    h.provider.emit(ProviderUpdate::Completed);

    let snapshot = wait_for_status(&h.manager, id, Status::Completed).await;
    assert_eq!(snapshot.progress, 100.0);

    // The job must be demoted from the active table; status now comes from
    // the durable record alone
    let record = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Completed);

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, "completed");
    assert_eq!(event.payload["progress"], 100.0);
    assert_eq!(event.payload["status"], "completed");
}

#[tokio::test]
async fn failed_update_records_the_error_and_broadcasts() {
    let h = harness(ScriptedProvider::new(1000)).await;
    let (sink, mut events) = ChannelSink::new();

    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();
    h.manager.subscribe(id, Box::new(sink));

    h.provider.emit(ProviderUpdate::Started);
    h.provider.emit(ProviderUpdate::Failed("connection reset".to_string()));

    wait_for_status(&h.manager, id, Status::Failed).await;

    let record = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.error_message.as_deref(), Some("connection reset"));

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, "error");
    assert_eq!(event.payload["error_message"], "connection reset");
}

#[tokio::test]
async fn progress_broadcasts_are_throttled_but_the_terminal_event_is_not() {
    let h = harness(ScriptedProvider::new(0)).await;
    let (sink, mut events) = ChannelSink::new();

    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();
    let subscriber = h.manager.subscribe(id, Box::new(sink));

    h.provider.emit(ProviderUpdate::Started);
    // A burst far faster than the 1/sec delivery budget
    for i in 0..100u64 {
        h.provider.emit(ProviderUpdate::Progress {
            downloaded_bytes: i * 10,
            total_bytes: 1000,
            speed_bps: 100,
            eta_secs: 1,
        });
    }
    h.provider.emit(ProviderUpdate::Completed);

    wait_for_status(&h.manager, id, Status::Completed).await;
    h.provider.close();

    // Drain the stream until the terminal event lands
    let mut delivered: Vec<SinkEvent> = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .expect("terminal event must arrive")
            .expect("stream must stay open while subscribed");
        let is_terminal = event.event == "completed";
        delivered.push(event);
        if is_terminal {
            break;
        }
    }

    let progress_count = delivered.iter().filter(|e| e.event == "progress").count();
    assert!(
        progress_count <= 2,
        "100 samples in one window must coalesce to at most ~1 broadcast, got {progress_count}"
    );

    // Nothing may follow the terminal event
    let trailing = tokio::time::timeout(Duration::from_millis(200), events.next()).await;
    assert!(
        trailing.is_err(),
        "no events may follow the terminal one, got {trailing:?}"
    );
    h.manager.unsubscribe(subscriber);
}

// ── Cancellation ────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_unknown_id_fails_without_mutation() {
    let h = harness(ScriptedProvider::new(0)).await;

    let result = h.manager.cancel_download(DownloadId::new()).await;
    assert!(matches!(result, Err(Error::NotFoundOrInactive { .. })));
    assert!(h.store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_signals_the_provider_and_forces_cancelled() {
    let h = harness(ScriptedProvider::new(1000)).await;
    let (sink, mut events) = ChannelSink::new();

    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();
    h.manager.subscribe(id, Box::new(sink));

    h.provider.emit(ProviderUpdate::Started);
    wait_for_status(&h.manager, id, Status::Downloading).await;

    h.manager.cancel_download(id).await.unwrap();

    assert!(
        h.provider.token.is_cancelled(),
        "the provider's cancellation handle must be invoked"
    );

    // Forced synchronously, even while downloading
    let snapshot = h.manager.get_status(id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, Status::Cancelled);
    assert!(
        snapshot.error_message.is_none(),
        "cancellation is not an error"
    );

    let record = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Cancelled, "record retained for audit");

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, "cancelled");
}

#[tokio::test]
async fn cancel_twice_fails_the_second_time() {
    let h = harness(ScriptedProvider::new(0)).await;
    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();

    h.manager.cancel_download(id).await.unwrap();
    let second = h.manager.cancel_download(id).await;
    assert!(
        matches!(second, Err(Error::NotFoundOrInactive { .. })),
        "a cancelled job is no longer active"
    );
}

#[tokio::test]
async fn no_events_follow_a_cancellation() {
    let h = harness(ScriptedProvider::new(0)).await;
    let (sink, events) = ChannelSink::new();

    let id = h
        .manager
        .start_download(Method::Direct, "http://host/file.bin", &media_tags())
        .await
        .unwrap();
    let subscriber = h.manager.subscribe(id, Box::new(sink));

    h.provider.emit(ProviderUpdate::Started);
    wait_for_status(&h.manager, id, Status::Downloading).await;
    h.manager.cancel_download(id).await.unwrap();

    // A race where the provider still reports progress and completion after
    // the cancel: the frozen state machine must swallow both
    h.provider.emit(ProviderUpdate::Progress {
        downloaded_bytes: 999,
        total_bytes: 1000,
        speed_bps: 10,
        eta_secs: 1,
    });
    h.provider.emit(ProviderUpdate::Completed);
    h.provider.close();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = h.manager.get_status(id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, Status::Cancelled, "terminal state is frozen");

    h.manager.unsubscribe(subscriber);
    let delivered: Vec<SinkEvent> = events.collect().await;
    assert_eq!(
        delivered.len(),
        1,
        "only the cancelled event may be delivered, got {delivered:?}"
    );
    assert_eq!(delivered[0].event, "cancelled");
}

// ── Status queries ──────────────────────────────────────────────────────

#[tokio::test]
async fn get_status_of_unknown_id_is_none() {
    let h = harness(ScriptedProvider::new(0)).await;
    assert!(h.manager.get_status(DownloadId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn get_all_status_overlays_live_state_on_records() {
    let h = harness(ScriptedProvider::new(1000)).await;

    let finished = h
        .manager
        .start_download(Method::Direct, "http://host/a.bin", &media_tags())
        .await
        .unwrap();
    h.provider.emit(ProviderUpdate::Started);
    h.provider.emit(ProviderUpdate::Completed);
    wait_for_status(&h.manager, finished, Status::Completed).await;

    let running = h
        .manager
        .start_download(Method::Direct, "http://host/b.bin", &media_tags())
        .await
        .unwrap();
    h.provider.emit(ProviderUpdate::Started);
    h.provider.emit(ProviderUpdate::Progress {
        downloaded_bytes: 500,
        total_bytes: 1000,
        speed_bps: 100,
        eta_secs: 5,
    });
    wait_for_status(&h.manager, running, Status::Downloading).await;

    let all = h.manager.get_all_status().await.unwrap();
    assert_eq!(all.len(), 2);

    let finished_view = all.iter().find(|s| s.id == finished).unwrap();
    assert_eq!(finished_view.status, Status::Completed);

    let running_view = all.iter().find(|s| s.id == running).unwrap();
    assert_eq!(running_view.status, Status::Downloading);
    assert!(
        running_view.downloaded_bytes > 0 || running_view.progress >= 0.0,
        "active jobs must surface live counters"
    );
}

#[tokio::test]
async fn subscriber_management_delegates_to_the_broadcaster() {
    let h = harness(ScriptedProvider::new(0)).await;
    let id = DownloadId::new();

    let (sink, _events) = ChannelSink::new();
    let subscriber = h.manager.subscribe(id, Box::new(sink));
    assert_eq!(h.manager.subscriber_count(id), 1);

    assert!(h.manager.unsubscribe(subscriber));
    assert_eq!(h.manager.subscriber_count(id), 0);
}
