//! Two-machine reconciliation scenarios against a shared filesystem store.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use rstest::rstest;
use tempfile::TempDir;

use savesync_core::{Generation, ItemTitle, SyncAction};
use savesync_sync::store::ensure_container;
use savesync_sync::{
    Conflict, ContainerId, Decision, Engine, FsObjectStore, LocalReplica, ObjectId, ObjectStore,
    RemoteReplica, ReplicaPair, Resolution, Side, SyncError,
};

const BASE: u64 = 1_700_000_000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct World {
    tmp: TempDir,
    store: Arc<FsObjectStore>,
    container: ContainerId,
}

impl World {
    fn new() -> Self {
        init_logging();
        let tmp = TempDir::new().expect("tmp");
        let store = Arc::new(FsObjectStore::new(tmp.path().join("remote")));
        let container = ensure_container(store.as_ref(), "TouhouSaveSync").expect("container");
        Self {
            tmp,
            store,
            container,
        }
    }

    /// A machine's view of `Touhou13`.
    fn machine(&self, name: &str) -> ReplicaPair {
        let root = self.tmp.path().join(name);
        let title = ItemTitle::from("Touhou13");
        let local = LocalReplica::new(
            title.clone(),
            Generation::New,
            root.join("ShanghaiAlice/th13"),
            root.join("scratch/Touhou13.zip"),
            "th13",
        )
        .expect("local");
        let remote = RemoteReplica::new(&title, self.container.clone(), self.store.clone());
        ReplicaPair { local, remote }
    }
}

fn write_payload(pair: &ReplicaPair, bytes: &[u8], secs: u64) {
    let path = pair.local.source_dir().join("scoreth13.dat");
    fs::write(&path, bytes).expect("write payload");
    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    filetime::set_file_mtime(&path, FileTime::from_system_time(when)).expect("mtime");
}

fn payload(pair: &ReplicaPair) -> Vec<u8> {
    fs::read(pair.local.source_dir().join("scoreth13.dat")).expect("read payload")
}

fn never(_: &Conflict) -> Result<Resolution, SyncError> {
    Err(SyncError::Unresolved {
        title: "test".to_string(),
        reason: "no conflict expected".to_string(),
    })
}

#[test]
fn missing_remote_object_pushes_and_creates() {
    let world = World::new();
    let mut a = world.machine("a");
    write_payload(&a, b"first", BASE);

    let engine = Engine::default();
    assert_eq!(engine.action(&mut a).expect("action"), Decision::Push);
    assert!(a.remote.cached_id().is_none(), "action must not create");

    assert_eq!(engine.reconcile(&mut a, &never).expect("sync"), SyncAction::Push);
    assert!(world
        .store
        .find_by_name("Touhou13", &world.container)
        .expect("find")
        .is_some());
}

#[rstest]
#[case::remote_newer_pulls(BASE, BASE + 120, SyncAction::Pull)]
#[case::close_times_do_nothing(BASE, BASE - 30, SyncAction::None)]
#[case::local_newer_pushes(BASE + 120, BASE, SyncAction::Push)]
fn second_machine_follows_payload_time(
    #[case] b_time: u64,
    #[case] a_time: u64,
    #[case] expected: SyncAction,
) {
    let world = World::new();
    let engine = Engine::default();
    let mut a = world.machine("a");
    let mut b = world.machine("b");

    write_payload(&a, b"AAAA", a_time);
    engine.reconcile(&mut a, &never).expect("seed");

    write_payload(&b, b"BBBB", b_time);
    let action = engine.reconcile(&mut b, &never).expect("sync");
    assert_eq!(action, expected);

    match expected {
        SyncAction::Pull => assert_eq!(payload(&b), b"AAAA"),
        _ => assert_eq!(payload(&b), b"BBBB"),
    }
}

#[test]
fn pulled_copy_is_settled_afterwards() {
    let world = World::new();
    let engine = Engine::default();
    let mut a = world.machine("a");
    let mut b = world.machine("b");

    write_payload(&a, b"save", BASE + 600);
    engine.reconcile(&mut a, &never).expect("seed");
    write_payload(&b, b"save", BASE);
    assert_eq!(engine.reconcile(&mut b, &never).expect("pull"), SyncAction::Pull);
    assert_eq!(engine.action(&mut b).expect("action"), Decision::None);
}

#[test]
fn newer_but_smaller_local_asks_the_resolver() {
    let world = World::new();
    let engine = Engine::default();
    let mut a = world.machine("a");
    let mut b = world.machine("b");

    write_payload(&a, &[7u8; 2000], BASE - 120);
    engine.reconcile(&mut a, &never).expect("seed");
    write_payload(&b, &[1u8; 500], BASE);

    let seen = Mutex::new(None);
    let keep_remote = |conflict: &Conflict| -> Result<Resolution, SyncError> {
        *seen.lock().expect("lock") = Some(conflict.clone());
        Ok(Resolution::KeepRemote)
    };
    let action = engine.reconcile(&mut b, &keep_remote).expect("sync");

    assert_eq!(action, SyncAction::Pull);
    assert_eq!(payload(&b), vec![7u8; 2000]);
    let conflict = seen.into_inner().expect("lock").expect("resolver called");
    assert_eq!(conflict.newer, Side::Local);
    assert_eq!(conflict.local.size, Some(500));
}

#[test]
fn malformed_remote_description_defaults_to_push() {
    let world = World::new();
    let engine = Engine::default();
    let mut a = world.machine("a");
    let mut b = world.machine("b");

    write_payload(&a, b"remote-copy-is-much-newer", BASE + 10_000);
    engine.reconcile(&mut a, &never).expect("seed");
    let id = a.remote.cached_id().cloned().expect("id");
    fs::write(
        world.tmp.path().join("remote/TouhouSaveSync/Touhou13.meta"),
        "{ definitely not metadata",
    )
    .expect("corrupt");

    write_payload(&b, b"older", BASE);
    assert_eq!(engine.action(&mut b).expect("action"), Decision::Push);
    engine.reconcile(&mut b, &never).expect("push");
    assert_eq!(read_object(&world, &id), b"older".len());
}

fn read_object(world: &World, id: &ObjectId) -> usize {
    let bytes = world.store.download(id).expect("download");
    let unpacked = world.tmp.path().join("check");
    let archive = world.tmp.path().join("check.zip");
    fs::write(&archive, bytes).expect("write");
    savesync_sync::archive::unpack_into(&archive, &unpacked).expect("unpack");
    file_len(&unpacked.join("scoreth13.dat"))
}

fn file_len(path: &Path) -> usize {
    fs::read(path).expect("read").len()
}

/// Store whose transfers always fail.
struct BrokenStore;

impl ObjectStore for BrokenStore {
    fn find_container(&self, _: &str) -> Result<Option<ContainerId>, SyncError> {
        Ok(Some(ContainerId("c".to_string())))
    }
    fn create_container(&self, _: &str) -> Result<ContainerId, SyncError> {
        Ok(ContainerId("c".to_string()))
    }
    fn find_by_name(
        &self,
        name: &str,
        _: &ContainerId,
    ) -> Result<Option<savesync_sync::store::ObjectRef>, SyncError> {
        Err(savesync_sync::error::transfer_err("lookup", name, "network down"))
    }
    fn upload(&self, name: &str, _: &[u8], _: &ContainerId, _: &str) -> Result<ObjectId, SyncError> {
        Err(savesync_sync::error::transfer_err("upload", name, "network down"))
    }
    fn replace(&self, id: &ObjectId, _: &[u8], _: &str) -> Result<(), SyncError> {
        Err(savesync_sync::error::transfer_err("replace", &id.0, "network down"))
    }
    fn download(&self, id: &ObjectId) -> Result<Vec<u8>, SyncError> {
        Err(savesync_sync::error::transfer_err("download", &id.0, "network down"))
    }
    fn description(&self, id: &ObjectId) -> Result<Option<String>, SyncError> {
        Err(savesync_sync::error::transfer_err("describe", &id.0, "network down"))
    }
}

#[test]
fn transfer_failures_propagate_instead_of_defaulting() {
    init_logging();
    let tmp = TempDir::new().expect("tmp");
    let title = ItemTitle::from("Touhou13");
    let local = LocalReplica::new(
        title.clone(),
        Generation::New,
        tmp.path().join("th13"),
        tmp.path().join("scratch.zip"),
        "th13",
    )
    .expect("local");
    let remote = RemoteReplica::new(&title, ContainerId("c".to_string()), Arc::new(BrokenStore));
    let mut pair = ReplicaPair { local, remote };

    let err = Engine::default().action(&mut pair).unwrap_err();
    assert!(matches!(err, SyncError::Transfer { .. }), "got: {err}");
}
