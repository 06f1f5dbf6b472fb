use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::process::Command;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ProbeStatus {
    Reachable,
    Unreachable,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub target: Ipv4Addr,
}

impl ProbeOutcome {
    pub fn new(status: ProbeStatus, target: Ipv4Addr) -> Self {
        Self { status, target }
    }
}

/// A single reachability check against one address.
///
/// Implementations must be infallible: a probe that cannot be carried out
/// (missing binary, no permission, transport error) reports
/// [`ProbeStatus::Unreachable`] instead of surfacing an error, so that one
/// broken probe can never fail a whole scan.
#[async_trait]
pub trait Prober {
    /// Issues exactly one probe and waits up to `timeout` for a reply.
    async fn probe(&self, target: Ipv4Addr, timeout: Duration) -> ProbeOutcome;
}

/// Probes reachability by spawning the platform `ping` binary with a
/// single-packet, timeout-bounded invocation.
///
/// Using the system binary sidesteps the raw-socket privileges an in-process
/// ICMP implementation would need.
#[derive(Copy, Clone, Default, Debug)]
pub struct PingProber {}

impl PingProber {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, target: Ipv4Addr, timeout: Duration) -> ProbeOutcome {
        let status = match ping_once(target, timeout).await {
            Ok(true) => ProbeStatus::Reachable,
            Ok(false) => ProbeStatus::Unreachable,
            Err(err) => {
                debug!("probe of {} failed to run: {}", target, err);
                ProbeStatus::Unreachable
            }
        };
        trace!("probe of {} -> {:?}", target, status);
        ProbeOutcome::new(status, target)
    }
}

/// Grace period past the ping's own timeout before the child is given up on.
const REAP_GRACE: Duration = Duration::from_secs(1);

async fn ping_once(target: Ipv4Addr, timeout: Duration) -> std::io::Result<bool> {
    let mut command = Command::new("ping");
    command
        .args(ping_args(target, timeout))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    let mut child = command.spawn()?;
    match tokio::time::timeout(timeout + REAP_GRACE, child.wait()).await {
        Ok(status) => Ok(status?.success()),
        // Child is killed on drop; a hung ping counts as no reply.
        Err(_elapsed) => Ok(false),
    }
}

#[cfg(not(target_os = "windows"))]
fn ping_args(target: Ipv4Addr, timeout: Duration) -> [String; 5] {
    let secs = timeout.as_secs().max(1);
    [
        "-c".into(),
        "1".into(),
        "-W".into(),
        secs.to_string(),
        target.to_string(),
    ]
}

#[cfg(target_os = "windows")]
fn ping_args(target: Ipv4Addr, timeout: Duration) -> [String; 5] {
    [
        "-n".into(),
        "1".into(),
        "-w".into(),
        timeout.as_millis().to_string(),
        target.to_string(),
    ]
}
