//! Control channel: framed message queues, liveness ping, remote lifecycle
//!
//! The host creates every resource, launches the remote and pings it. If the
//! remote stops answering after having answered at least once, the host
//! tears everything down and starts over exactly once per lost connection;
//! the GUI then re-requests state with `RequestSync`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::{IpcError, IpcResult};
use super::liveness::{Liveness, PingThread, Tick};
use super::process::{RemoteLauncher, RemoteProcess};
use super::queue::SharedQueue;
use super::region::ShmNamespace;
use super::telemetry::{LevelMeterStatus, TelemetryRegion};
use super::{resource_name, HOST_TO_REMOTE_SUFFIX, REMOTE_TO_HOST_SUFFIX, TEST_MODE_ID};
use crate::config::IpcConfig;
use crate::protocol::{GlobalMessage, Message};

/// Which end of the channel this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Editor process: owns resources, launches and pings the remote
    Host,
    /// Engine process
    Remote,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queues and telemetry for one connection
struct Link {
    outbound: SharedQueue,
    inbound: SharedQueue,
    telemetry: TelemetryRegion,
}

impl Link {
    /// (outbound, inbound) queue names as seen from `role`
    fn queue_names(instance_id: &str, role: Role) -> IpcResult<(String, String)> {
        let to_remote = resource_name(instance_id, HOST_TO_REMOTE_SUFFIX)?;
        let to_host = resource_name(instance_id, REMOTE_TO_HOST_SUFFIX)?;
        Ok(match role {
            Role::Host => (to_remote, to_host),
            Role::Remote => (to_host, to_remote),
        })
    }

    fn create(namespace: &ShmNamespace, instance_id: &str, role: Role, config: &IpcConfig) -> IpcResult<Self> {
        let (outbound, inbound) = Self::queue_names(instance_id, role)?;
        Ok(Self {
            outbound: SharedQueue::create(namespace, &outbound, config.queue_depth, config.max_message_size)?,
            inbound: SharedQueue::create(namespace, &inbound, config.queue_depth, config.max_message_size)?,
            telemetry: TelemetryRegion::create(namespace, instance_id)?,
        })
    }

    fn open(namespace: &ShmNamespace, instance_id: &str, role: Role, config: &IpcConfig) -> IpcResult<Self> {
        let timeout = config.peer_open_timeout();
        let (outbound, inbound) = Self::queue_names(instance_id, role)?;
        Ok(Self {
            outbound: SharedQueue::open(namespace, &outbound, timeout)?,
            inbound: SharedQueue::open(namespace, &inbound, timeout)?,
            telemetry: TelemetryRegion::open(namespace, instance_id, timeout)?,
        })
    }
}

struct ProcessSlot {
    launcher: Box<dyn RemoteLauncher>,
    child: Option<Box<dyn RemoteProcess>>,
}

/// State shared with the ping thread
struct ControlShared {
    instance_id: String,
    role: Role,
    namespace: ShmNamespace,
    config: IpcConfig,
    link: Mutex<Option<Link>>,
    /// Host role only
    process: Mutex<Option<ProcessSlot>>,
    liveness: Liveness,
    reconnects: AtomicU64,
    ping_frame: Vec<u8>,
    quit_frame: Vec<u8>,
}

impl ControlShared {
    fn new(instance_id: &str, role: Role, config: &IpcConfig, launcher: Option<Box<dyn RemoteLauncher>>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            role,
            namespace: ShmNamespace::from_config(config),
            config: config.clone(),
            link: Mutex::new(None),
            process: Mutex::new(launcher.map(|launcher| ProcessSlot { launcher, child: None })),
            liveness: Liveness::new(config.ping_countdown_ticks()),
            reconnects: AtomicU64::new(0),
            ping_frame: Message::Global(GlobalMessage::Ping).encode(),
            quit_frame: Message::Global(GlobalMessage::Quit).encode(),
        }
    }

    fn send_bytes(&self, bytes: &[u8]) -> IpcResult<()> {
        match lock(&self.link).as_mut() {
            Some(link) => link.outbound.try_send(bytes),
            None => Err(IpcError::Disconnected),
        }
    }

    fn try_receive(&self) -> Option<Vec<u8>> {
        let bytes = lock(&self.link).as_mut()?.inbound.try_receive()?;
        if self.role == Role::Host && bytes == self.ping_frame {
            self.liveness.ping_received();
        }
        Some(bytes)
    }

    /// Host: stop any running remote, recreate resources, launch a new remote
    fn initialise(&self) -> IpcResult<()> {
        self.shutdown_remote();

        // Old regions must be gone before new ones take their names
        drop(lock(&self.link).take());
        let link = Link::create(&self.namespace, &self.instance_id, self.role, &self.config)?;
        *lock(&self.link) = Some(link);

        if let Some(slot) = lock(&self.process).as_mut() {
            slot.child = Some(slot.launcher.launch(&self.instance_id)?);
        }

        self.liveness.reset();
        Ok(())
    }

    /// Ask the remote to quit, then kill it if it outlives the grace period
    fn shutdown_remote(&self) {
        let mut process = lock(&self.process);
        let Some(mut child) = process.as_mut().and_then(|slot| slot.child.take()) else {
            return;
        };
        if !child.is_running() {
            return;
        }

        if let Err(e) = self.send_bytes(&self.quit_frame) {
            log::debug!("Quit not delivered to '{}': {}", self.instance_id, e);
        }
        if !child.wait_timeout(self.config.quit_grace()) {
            log::warn!("Remote '{}' ignored Quit, killing it", self.instance_id);
            child.kill();
        }
    }

    /// One ping-thread cycle
    fn heartbeat(&self) {
        if let Err(e) = self.send_bytes(&self.ping_frame) {
            log::trace!("Ping not delivered to '{}': {}", self.instance_id, e);
        }

        match self.liveness.tick() {
            Tick::Alive | Tick::AwaitingFirstReply => {}
            Tick::Lost => {
                log::warn!("Remote '{}' stopped answering pings, restarting it", self.instance_id);
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.initialise() {
                    log::error!("Failed to restart remote '{}': {}", self.instance_id, e);
                    self.liveness.reset();
                }
            }
        }
    }
}

/// Bidirectional framed control channel
///
/// Sends never block. In the host role a background `ipc-ping` thread
/// watches the remote and restarts it when it goes silent.
pub struct ControlChannel {
    shared: Arc<ControlShared>,
    pinger: Option<PingThread>,
}

impl ControlChannel {
    /// Create all resources, launch the remote and start pinging it
    pub fn connect_host(
        instance_id: &str,
        config: &IpcConfig,
        launcher: Box<dyn RemoteLauncher>,
    ) -> IpcResult<Self> {
        let shared = Arc::new(ControlShared::new(instance_id, Role::Host, config, Some(launcher)));
        shared.initialise()?;

        let pinger = {
            let shared = Arc::clone(&shared);
            PingThread::spawn(config.ping_interval(), move || shared.heartbeat())?
        };

        log::info!("Control channel '{}' connected as host", instance_id);
        Ok(Self {
            shared,
            pinger: Some(pinger),
        })
    }

    /// Attach to the host's resources (or create them for [`TEST_MODE_ID`])
    pub fn connect_remote(instance_id: &str, config: &IpcConfig) -> IpcResult<Self> {
        let shared = ControlShared::new(instance_id, Role::Remote, config, None);
        let link = if instance_id == TEST_MODE_ID {
            Link::create(&shared.namespace, instance_id, Role::Remote, config)?
        } else {
            Link::open(&shared.namespace, instance_id, Role::Remote, config)?
        };
        *lock(&shared.link) = Some(link);

        log::info!("Control channel '{}' connected as remote", instance_id);
        Ok(Self {
            shared: Arc::new(shared),
            pinger: None,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn namespace(&self) -> &ShmNamespace {
        &self.shared.namespace
    }

    /// Enqueue a raw frame; a full queue drops it
    pub fn send_message(&self, bytes: &[u8]) -> IpcResult<()> {
        self.shared.send_bytes(bytes)
    }

    /// Encode and enqueue a message
    pub fn send(&self, message: &Message) -> IpcResult<()> {
        self.send_message(&message.encode())
    }

    /// Next raw frame, if one is waiting
    pub fn try_receive_raw(&self) -> Option<Vec<u8>> {
        self.shared.try_receive()
    }

    /// Drain and decode every waiting frame in arrival order
    ///
    /// Frames that fail to decode are logged and skipped.
    pub fn receive_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(bytes) = self.try_receive_raw() {
            match Message::decode(&bytes) {
                Ok(message) => messages.push(message),
                Err(e) => log::warn!("Dropping undecodable control frame ({} bytes): {}", bytes.len(), e),
            }
        }
        messages
    }

    /// Record a ping reply from the remote
    pub fn ping_received(&self) {
        self.shared.liveness.ping_received();
    }

    /// Host: restart the remote now
    pub fn reconnect(&self) -> IpcResult<()> {
        if self.shared.role != Role::Host {
            return Ok(());
        }
        self.shared.reconnects.fetch_add(1, Ordering::Relaxed);
        self.shared.initialise()
    }

    /// Number of restarts since connecting
    pub fn reconnect_count(&self) -> u64 {
        self.shared.reconnects.load(Ordering::Relaxed)
    }

    /// Remote: publish meter values
    pub fn send_level_meter_status(&self, left: f32, right: f32, midi_in: bool, midi_out: bool) {
        if let Some(link) = lock(&self.shared.link).as_ref() {
            link.telemetry.write(LevelMeterStatus {
                left,
                right,
                midi_in,
                midi_out,
            });
        }
    }

    /// Host: latest meter values
    pub fn receive_level_meter_status(&self) -> Option<LevelMeterStatus> {
        lock(&self.shared.link).as_ref().map(|link| link.telemetry.read())
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Some(mut pinger) = self.pinger.take() {
            pinger.stop();
        }
        if self.shared.role == Role::Host {
            self.shared.shutdown_remote();
            log::info!("Control channel '{}' closed", self.shared.instance_id);
        }
    }
}
