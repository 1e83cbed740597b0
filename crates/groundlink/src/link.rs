use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use groundlink_interface::{ConnectionError, ConnectionState, Interface, InterfaceHandle};
use groundlink_limits::LimitsTransition;
use groundlink_packet::{Packet, PacketIdentity};
use tracing::{debug, info};

use crate::context::GroundContext;
use crate::error::{GroundError, Result};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Called on the link thread for every delivered packet.
pub type PacketObserver = Box<dyn FnMut(&Packet, &[LimitsTransition]) + Send>;

/// Read loop for one interface on its own thread.
///
/// Connects, reads packets in framing order and delivers each one to the
/// context. When the connection fails or drops, the thread waits
/// `reconnect_delay` and connects again until stopped.
pub struct LinkThread {
    handle: InterfaceHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LinkThread {
    pub fn spawn(interface: Interface, context: Arc<GroundContext>) -> Result<Self> {
        Self::builder(interface, context).spawn()
    }

    pub fn builder(interface: Interface, context: Arc<GroundContext>) -> LinkBuilder {
        LinkBuilder {
            interface,
            context,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            observer: None,
        }
    }

    pub fn handle(&self) -> &InterfaceHandle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Ask the thread to stop without waiting for it.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.disconnect();
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!(interface = %self.handle.name(), "link thread panicked");
            }
        }
    }
}

impl Drop for LinkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct LinkBuilder {
    interface: Interface,
    context: Arc<GroundContext>,
    reconnect_delay: Duration,
    observer: Option<PacketObserver>,
}

impl LinkBuilder {
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn observer(
        mut self,
        observer: impl FnMut(&Packet, &[LimitsTransition]) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Register the interface for its targets' commands and start reading.
    pub fn spawn(self) -> Result<LinkThread> {
        let handle = self.interface.handle();
        let name = handle.name().to_string();
        let stop = Arc::new(AtomicBool::new(false));

        let targets = self.interface.config().target_names.clone();
        self.context.register_interface(handle.clone(), &targets);

        let worker = Worker {
            interface: self.interface,
            context: Arc::clone(&self.context),
            reconnect_delay: self.reconnect_delay,
            observer: self.observer,
            stop: Arc::clone(&stop),
            seen: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name(format!("link-{name}"))
            .spawn(move || worker.run())
            .map_err(|source| {
                self.context.unregister_interface(&name);
                GroundError::Spawn {
                    interface: name.clone(),
                    source,
                }
            })?;

        Ok(LinkThread {
            handle,
            stop,
            thread: Some(thread),
        })
    }
}

struct Worker {
    interface: Interface,
    context: Arc<GroundContext>,
    reconnect_delay: Duration,
    observer: Option<PacketObserver>,
    stop: Arc<AtomicBool>,
    /// Telemetry received on the current connection, set stale when it ends.
    seen: Vec<PacketIdentity>,
}

impl Worker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(mut self) {
        info!(interface = %self.interface.name(), "link thread started");
        while !self.stopped() {
            if self.interface.state() == ConnectionState::Closed {
                if self.interface.connect().is_err() {
                    // Reported through the interface's connection sink.
                    self.wait_before_reconnect();
                    continue;
                }
                if self.stopped() {
                    break;
                }
            }

            match self.interface.read_packet() {
                Ok(mut packet) => {
                    if !self.seen.contains(packet.identity()) {
                        self.seen.push(packet.identity().clone());
                    }
                    let transitions = self.context.deliver(&mut packet);
                    if let Some(observer) = self.observer.as_mut() {
                        observer(&packet, &transitions);
                    }
                }
                Err(err) => {
                    self.connection_lost(&err);
                    if !self.stopped() {
                        self.wait_before_reconnect();
                    }
                }
            }
        }
        self.interface.disconnect();
        self.context.unregister_interface(self.interface.name());
        info!(interface = %self.interface.name(), "link thread stopped");
    }

    fn connection_lost(&mut self, err: &ConnectionError) {
        debug!(interface = %self.interface.name(), error = %err, "read loop interrupted");
        for identity in self.seen.drain(..) {
            self.context.set_stale(&identity);
        }
    }

    fn wait_before_reconnect(&self) {
        let deadline = Instant::now() + self.reconnect_delay;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;
    use std::sync::mpsc;

    use groundlink_interface::InterfaceConfig;
    use groundlink_limits::{ItemKey, LimitsState};
    use groundlink_packet::{
        DataType, DefinitionTable, ItemDefinition, LimitsDefinition, PacketDefinition, Thresholds,
        Value, ValueType,
    };
    use groundlink_transport::TransportConfig;

    use super::*;

    fn socket_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "groundlink-link-{tag}-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn context() -> Arc<GroundContext> {
        let mut telemetry = DefinitionTable::new();
        telemetry.insert(
            PacketDefinition::define(
                "INST",
                "HEALTH",
                vec![
                    ItemDefinition::new("LENGTH", 0, 16, DataType::Uint),
                    ItemDefinition::new("TEMP", 16, 8, DataType::Uint).with_limits(
                        LimitsDefinition::new(Thresholds::new(10.0, 20.0, 80.0, 90.0)),
                    ),
                ],
            )
            .unwrap(),
        );
        Arc::new(GroundContext::new(
            Arc::new(DefinitionTable::new()),
            Arc::new(telemetry),
        ))
    }

    fn interface(context: &GroundContext, path: &PathBuf) -> Interface {
        let mut config = InterfaceConfig::new(
            "INST_INT",
            TransportConfig::Unix { path: path.clone() },
        );
        config.target_names = vec!["INST".to_string()];
        Interface::new(
            config,
            Arc::clone(context.telemetry()),
            Arc::clone(context.commands()),
        )
        .unwrap()
    }

    #[test]
    fn delivers_packets_and_reconnects() {
        let path = socket_path("deliver");
        let context = context();
        let (tx, rx) = mpsc::channel();

        // Nothing listens yet: the first attempts fail and are retried.
        let link = LinkThread::builder(interface(&context, &path), Arc::clone(&context))
            .reconnect_delay(Duration::from_millis(20))
            .observer(move |packet: &Packet, transitions: &[LimitsTransition]| {
                let _ = tx.send((packet.received_count(), transitions.len()));
            })
            .spawn()
            .unwrap();
        assert!(context.interface_for("inst").is_some());
        thread::sleep(Duration::from_millis(60));

        let listener = UnixListener::bind(&path).unwrap();
        let (mut target, _) = listener.accept().unwrap();
        target.write_all(&[0, 3, 50, 0, 3, 95]).unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (1, 1));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (2, 1));
        let key = ItemKey::new("INST", "HEALTH", "TEMP");
        assert_eq!(context.limits_state(&key), LimitsState::RedHigh);

        // Dropping the target marks its telemetry stale; the link reconnects.
        drop(target);
        let (mut target, _) = listener.accept().unwrap();
        assert_eq!(context.limits_state(&key), LimitsState::Stale);
        target.write_all(&[0, 3, 40]).unwrap();
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (3, 1));

        let api_value = context
            .current()
            .read(&PacketIdentity::new("INST", "HEALTH"), "TEMP", ValueType::Raw)
            .unwrap();
        assert_eq!(api_value, Value::Uint(40));

        link.stop();
        assert!(context.interface_for("INST").is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stop_interrupts_reconnect_wait() {
        let path = socket_path("stop");
        let context = context();
        let link = LinkThread::builder(interface(&context, &path), Arc::clone(&context))
            .reconnect_delay(Duration::from_secs(60))
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(link.is_running());

        let started = Instant::now();
        link.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
