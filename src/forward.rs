use k8s_openapi::jiff::Timestamp;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::model::namespaced;
use crate::render::format_elapsed_seconds;

pub const DEFAULT_ADDRESS: &str = "localhost";

pub fn session_key(path: &str, container: Option<&str>) -> String {
    match container.filter(|container| !container.is_empty()) {
        Some(container) => format!("{path}:{container}"),
        None => path.to_string(),
    }
}

/// Reduces a rendered port such as `http:8080╱UDP` to its number.
pub fn strip_port(port: &str) -> String {
    let port = match port.split_once(':') {
        Some((_, number)) if !number.contains(':') => number,
        _ => port,
    };
    let port = port.split_once('►').map_or(port, |(number, _)| number);
    port.split_once('╱')
        .map_or(port, |(number, _)| number)
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PortSpec {
    pub local: u16,
    pub remote: u16,
}

impl PortSpec {
    /// Parses `local:remote`, or a single port used on both ends. Named and
    /// protocol-suffixed ports are accepted in either position.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (local, remote) = match raw.rsplit_once(':') {
            Some((local, remote)) if local.parse::<u16>().is_ok() => (local, remote),
            _ => (raw, raw),
        };
        Some(Self {
            local: strip_port(local).parse().ok()?,
            remote: strip_port(remote).parse().ok()?,
        })
    }
}

impl Display for PortSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

pub trait Forwarder: Send + Sync {
    fn path(&self) -> &str;

    fn container(&self) -> Option<&str>;

    fn ports(&self) -> &[PortSpec];

    fn active(&self) -> bool;

    fn age(&self) -> String;

    fn stop(&self);

    fn key(&self) -> String {
        session_key(self.path(), self.container())
    }
}

#[derive(Default)]
pub struct Forwarders {
    sessions: Mutex<HashMap<String, Arc<dyn Forwarder>>>,
}

impl Forwarders {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Forwarder>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a running session. A session already holding the same key
    /// is stopped and replaced.
    pub fn start(&self, forwarder: Arc<dyn Forwarder>) -> String {
        let key = forwarder.key();
        debug!("register port-forward {key}");
        let replaced = self.sessions().insert(key.clone(), forwarder);
        if let Some(previous) = replaced {
            previous.stop();
        }
        key
    }

    pub fn stop(&self, key: &str) -> bool {
        let removed = self.sessions().remove(key);
        match removed {
            Some(forwarder) => {
                debug!("stop port-forward {key}");
                forwarder.stop();
                true
            }
            None => false,
        }
    }

    /// Stops every session for `path`. Without a container qualifier every
    /// container session of that resource goes.
    pub fn kill(&self, path: &str) -> usize {
        let has_container = path.contains(':');
        let victims = {
            let mut sessions = self.sessions();
            let keys = sessions
                .keys()
                .filter(|key| {
                    let victim = if has_container {
                        key.as_str()
                    } else {
                        key.split(':').next().unwrap_or_default()
                    };
                    victim == path
                })
                .cloned()
                .collect::<Vec<_>>();
            keys.into_iter()
                .filter_map(|key| sessions.remove(&key).map(|forwarder| (key, forwarder)))
                .collect::<Vec<_>>()
        };

        for (key, forwarder) in &victims {
            debug!("stop + delete port-forward {key}");
            forwarder.stop();
        }
        victims.len()
    }

    pub fn delete_all(&self) -> usize {
        let victims = self.sessions().drain().collect::<Vec<_>>();
        for (key, forwarder) in &victims {
            debug!("deleting port-forward {key}");
            forwarder.stop();
        }
        victims.len()
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Forwarder>> {
        self.sessions().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.sessions().keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForwardSpec {
    pub path: String,
    pub container: Option<String>,
    pub address: String,
    pub ports: Vec<PortSpec>,
}

#[derive(Debug)]
pub struct ForwardExit {
    pub key: String,
    pub result: std::result::Result<ExitStatus, String>,
}

pub struct KubectlForwarder {
    spec: ForwardSpec,
    started: Timestamp,
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl KubectlForwarder {
    /// Spawns the tunnel. The process is killed on `stop`; its exit is
    /// reported on `exits` either way.
    pub fn spawn(spec: ForwardSpec, exits: mpsc::UnboundedSender<ForwardExit>) -> Result<Self> {
        let (namespace, name) = namespaced(&spec.path);
        let mut command = TokioCommand::new("kubectl");
        command.arg("port-forward");
        if !namespace.is_empty() {
            command.arg("-n").arg(namespace);
        }
        command
            .arg(format!("pod/{name}"))
            .arg("--address")
            .arg(&spec.address)
            .args(spec.ports.iter().map(PortSpec::to_string))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = command.spawn()?;

        let key = session_key(&spec.path, spec.container.as_deref());
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        debug!("port-forward {key} started pid={:?}", child.id());

        let token = cancel.clone();
        let done = finished.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = token.cancelled() => match child.kill().await {
                    Ok(()) => child.wait().await,
                    Err(error) => Err(error),
                },
            };
            done.store(true, Ordering::SeqCst);
            let _ = exits.send(ForwardExit {
                key,
                result: status.map_err(|error| error.to_string()),
            });
        });

        Ok(Self {
            spec,
            started: Timestamp::now(),
            cancel,
            finished,
        })
    }
}

impl Forwarder for KubectlForwarder {
    fn path(&self) -> &str {
        &self.spec.path
    }

    fn container(&self) -> Option<&str> {
        self.spec.container.as_deref()
    }

    fn ports(&self) -> &[PortSpec] {
        &self.spec.ports
    }

    fn active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.finished.load(Ordering::SeqCst)
    }

    fn age(&self) -> String {
        let elapsed = Timestamp::now().as_second() - self.started.as_second();
        format_elapsed_seconds(elapsed.max(0))
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
