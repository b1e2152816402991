//! Reconciliation engine.
//!
//! [`decide`] is a pure comparison of the local payload against the remote
//! metadata. [`Engine::action`] gathers both sides and never prompts or
//! writes; a [`Decision::Conflict`] is turned into an action only by
//! [`Decision::resolve`].
//!
//! Decision table, with `delta = local - remote` payload modification time:
//!
//! | condition                                 | result     |
//! |-------------------------------------------|------------|
//! | remote metadata unavailable               | `Push`     |
//! | `|delta| <= threshold`                    | `None`     |
//! | `delta > 0`, local smaller                | `Conflict` |
//! | `delta > 0`, otherwise                    | `Push`     |
//! | `delta < 0`, local bigger                 | `Conflict` |
//! | `delta < 0`, otherwise                    | `Pull`     |

use std::fmt;

use chrono::Duration;
use serde::Serialize;

use savesync_core::{ItemTitle, Metadata, PayloadStat, SyncAction};

use crate::error::SyncError;
use crate::local::LocalReplica;
use crate::remote::RemoteReplica;
use crate::resolver::ConflictResolver;

pub const SYNC_THRESHOLD_SECONDS: i64 = 60;

/// Which side of an item looked newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

/// Context handed to a [`ConflictResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub title: ItemTitle,
    pub local: PayloadStat,
    pub remote: PayloadStat,
    pub newer: Side,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (newer, older) = match self.newer {
            Side::Local => ("local", "remote"),
            Side::Remote => ("remote", "local"),
        };
        write!(
            f,
            "{}: the {newer} save is newer but smaller than the {older} save \
             (local {} bytes, remote {} bytes)",
            self.title,
            describe_size(self.local.size),
            describe_size(self.remote.size),
        )
    }
}

fn describe_size(size: Option<u64>) -> String {
    size.map(|s| s.to_string()).unwrap_or_else(|| "no".to_string())
}

/// Engine verdict before conflict arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Push,
    Pull,
    None,
    Conflict(Conflict),
}

impl Decision {
    /// The action, unless a conflict still needs arbitration.
    pub fn settled(&self) -> Option<SyncAction> {
        match self {
            Decision::Push => Some(SyncAction::Push),
            Decision::Pull => Some(SyncAction::Pull),
            Decision::None => Some(SyncAction::None),
            Decision::Conflict(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Decision::Conflict(_))
    }

    /// Final action, asking `resolver` when this is a conflict.
    pub fn resolve(self, resolver: &dyn ConflictResolver) -> Result<SyncAction, SyncError> {
        match self {
            Decision::Conflict(conflict) => {
                let resolution = resolver.resolve(&conflict)?;
                tracing::info!("conflict on {} resolved as {resolution:?}", conflict.title);
                Ok(resolution.action())
            }
            other => Ok(other.settled().unwrap_or(SyncAction::None)),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Push => write!(f, "push"),
            Decision::Pull => write!(f, "pull"),
            Decision::None => write!(f, "none"),
            Decision::Conflict(_) => write!(f, "conflict"),
        }
    }
}

/// Compare payloads. `remote` is `None` when its metadata is unavailable.
pub fn decide(
    title: &ItemTitle,
    local: &PayloadStat,
    remote: Option<&Metadata>,
    threshold: Duration,
) -> Decision {
    let Some(remote) = remote else {
        return Decision::Push;
    };
    let remote = remote.payload();

    let delta = local.effective_modified_at() - remote.effective_modified_at();
    if delta <= threshold && delta >= -threshold {
        return Decision::None;
    }

    let same_size = local.effective_size() == remote.effective_size();
    let local_bigger = local.effective_size() > remote.effective_size();
    let conflict = |newer| {
        Decision::Conflict(Conflict {
            title: title.clone(),
            local: *local,
            remote,
            newer,
        })
    };

    if delta > Duration::zero() {
        if !same_size && !local_bigger {
            return conflict(Side::Local);
        }
        Decision::Push
    } else {
        if !same_size && local_bigger {
            return conflict(Side::Remote);
        }
        Decision::Pull
    }
}

/// What the engine observed about the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Known(Metadata),
    Unavailable(String),
}

impl RemoteState {
    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            RemoteState::Known(metadata) => Some(metadata),
            RemoteState::Unavailable(_) => None,
        }
    }
}

/// Both sides of one item and the resulting decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub local: PayloadStat,
    pub remote: RemoteState,
    pub decision: Decision,
}

/// Local and remote replica of one item.
#[derive(Debug)]
pub struct ReplicaPair {
    pub local: LocalReplica,
    pub remote: RemoteReplica,
}

impl ReplicaPair {
    pub fn title(&self) -> &ItemTitle {
        self.local.title()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Engine {
    threshold: Duration,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(SYNC_THRESHOLD_SECONDS as u64)
    }
}

impl Engine {
    pub fn new(threshold_secs: u64) -> Self {
        Self {
            threshold: Duration::seconds(threshold_secs.min(u64::from(u32::MAX)) as i64),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Gather both sides of `pair` and decide. Never writes to either side.
    ///
    /// [`SyncError::MetadataUnavailable`] is absorbed into
    /// [`RemoteState::Unavailable`] (and thus `Push`); every other error
    /// propagates.
    pub fn observe(&self, pair: &mut ReplicaPair) -> Result<Observation, SyncError> {
        let remote = match pair.remote.fetch_metadata() {
            Ok(metadata) => RemoteState::Known(metadata),
            Err(SyncError::MetadataUnavailable { reason, .. }) => {
                tracing::warn!(
                    "remote metadata for {} unavailable ({reason}); local wins",
                    pair.title()
                );
                RemoteState::Unavailable(reason)
            }
            Err(err) => return Err(err),
        };
        let local = pair.local.payload()?;
        let decision = decide(pair.title(), &local, remote.metadata(), self.threshold);
        Ok(Observation {
            local,
            remote,
            decision,
        })
    }

    pub fn action(&self, pair: &mut ReplicaPair) -> Result<Decision, SyncError> {
        Ok(self.observe(pair)?.decision)
    }

    /// Apply `action`. Returns the metadata now shared by both sides when the
    /// transfer produced or read one.
    pub fn execute(
        &self,
        pair: &mut ReplicaPair,
        action: SyncAction,
    ) -> Result<Option<Metadata>, SyncError> {
        match action {
            SyncAction::Push => Ok(Some(pair.remote.push(&pair.local)?)),
            SyncAction::Pull => pair.remote.pull(&pair.local),
            SyncAction::None => {
                tracing::debug!("{} is up to date", pair.title());
                Ok(None)
            }
        }
    }

    /// `action`, `resolve`, `execute` in sequence. Returns the executed action.
    pub fn reconcile(
        &self,
        pair: &mut ReplicaPair,
        resolver: &dyn ConflictResolver,
    ) -> Result<SyncAction, SyncError> {
        let action = self.action(pair)?.resolve(resolver)?;
        self.execute(pair, action)?;
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;

    use crate::resolver::Resolution;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn stat(secs: i64, size: u64) -> PayloadStat {
        PayloadStat {
            modified_at: Some(at(secs)),
            size: Some(size),
        }
    }

    fn meta(payload: PayloadStat) -> Metadata {
        Metadata {
            checksum: "c".to_string(),
            archive_modified_at: at(0),
            archive_size: 1,
            payload_modified_at: payload.modified_at,
            payload_size: payload.size,
        }
    }

    fn run(local: PayloadStat, remote: PayloadStat) -> Decision {
        decide(
            &ItemTitle::from("Touhou13"),
            &local,
            Some(&meta(remote)),
            Duration::seconds(SYNC_THRESHOLD_SECONDS),
        )
    }

    #[rstest]
    #[case::remote_newer_same_size(stat(0, 100), stat(120, 100), "pull")]
    #[case::within_threshold(stat(0, 100), stat(-30, 100), "none")]
    #[case::within_threshold_any_size(stat(0, 5), stat(60, 5000), "none")]
    #[case::at_threshold_edge(stat(60, 1), stat(0, 2), "none")]
    #[case::local_newer_same_size(stat(120, 100), stat(0, 100), "push")]
    #[case::local_newer_bigger(stat(120, 200), stat(0, 100), "push")]
    #[case::local_newer_smaller(stat(0, 500), stat(-120, 2000), "conflict")]
    #[case::remote_newer_local_smaller(stat(0, 100), stat(120, 200), "pull")]
    #[case::remote_newer_local_bigger(stat(0, 200), stat(120, 100), "conflict")]
    #[case::local_absent(PayloadStat::absent(), stat(0, 10), "pull")]
    #[case::remote_absent(stat(0, 10), PayloadStat::absent(), "push")]
    #[case::both_absent(PayloadStat::absent(), PayloadStat::absent(), "none")]
    fn decision_table(#[case] local: PayloadStat, #[case] remote: PayloadStat, #[case] expected: &str) {
        assert_eq!(run(local, remote).to_string(), expected);
    }

    #[test]
    fn unavailable_remote_always_pushes() {
        for local in [stat(0, 1), PayloadStat::absent()] {
            let decision = decide(
                &ItemTitle::from("x"),
                &local,
                None,
                Duration::seconds(SYNC_THRESHOLD_SECONDS),
            );
            assert_eq!(decision, Decision::Push);
        }
    }

    #[test]
    fn conflict_records_newer_side() {
        let Decision::Conflict(conflict) = run(stat(0, 500), stat(-120, 2000)) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.newer, Side::Local);
        assert_eq!(conflict.local.size, Some(500));
        assert_eq!(conflict.remote.size, Some(2000));
        assert!(conflict.to_string().contains("local save is newer"));
    }

    #[test]
    fn resolve_consults_resolver_only_for_conflicts() {
        let refuse = |_: &Conflict| -> Result<Resolution, SyncError> {
            panic!("resolver must not be called")
        };
        assert_eq!(Decision::Pull.resolve(&refuse).unwrap(), SyncAction::Pull);
        assert_eq!(Decision::None.resolve(&refuse).unwrap(), SyncAction::None);

        let keep_remote =
            |_: &Conflict| -> Result<Resolution, SyncError> { Ok(Resolution::KeepRemote) };
        let decision = run(stat(0, 500), stat(-120, 2000));
        assert_eq!(decision.resolve(&keep_remote).unwrap(), SyncAction::Pull);
    }

    #[test]
    fn custom_threshold_is_honoured() {
        let decision = decide(
            &ItemTitle::from("x"),
            &stat(10, 1),
            Some(&meta(stat(0, 1))),
            Engine::new(5).threshold(),
        );
        assert_eq!(decision, Decision::Push);
    }
}
