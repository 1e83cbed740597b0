use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use groundlink_frame::{FrameError, FrameReader, FrameWriter};
use groundlink_packet::{DefinitionTable, Packet, PacketDefinition};
use groundlink_task::{TaskError, TaskHandle, TaskRunner};
use groundlink_transport::{LinkStream, TransportError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{InterfaceConfig, PollingConfig};
use crate::error::{ConnectionError, Result};
use crate::hooks::{HookChain, PacketHook};
use crate::sink::{ConnectionSink, TracingConnectionSink};
use crate::state::ConnectionState;

/// How many bytes of an unidentified frame are echoed into the log.
const LOGGED_UNKNOWN_BYTES: usize = 16;

/// Traffic counters since the interface was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub read_count: u64,
    pub write_count: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    read_count: AtomicU64,
    write_count: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State every clone of an interface handle sees.
struct Shared {
    config: InterfaceConfig,
    commands: Arc<DefinitionTable>,
    state: Mutex<ConnectionState>,
    writer: Mutex<Option<FrameWriter<LinkStream>>>,
    /// Polling to run whenever the interface is connected.
    polling: Mutex<Option<PollingConfig>>,
    poller: Mutex<Option<TaskHandle>>,
    write_hooks: Mutex<HookChain>,
    runner: Mutex<Option<TaskRunner>>,
    sink: Mutex<Arc<dyn ConnectionSink>>,
    counters: Counters,
}

impl Shared {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn sink(&self) -> Arc<dyn ConnectionSink> {
        Arc::clone(&lock(&self.sink))
    }

    fn notify(&self, from: ConnectionState, to: ConnectionState) {
        self.sink().state_changed(self.name(), from, to);
    }

    fn begin_connect(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Closed {
                return Err(ConnectionError::AlreadyConnected(self.name().to_string()));
            }
            *state = ConnectionState::Connecting;
        }
        self.notify(ConnectionState::Closed, ConnectionState::Connecting);
        Ok(())
    }

    fn establish_failed(&self, source: TransportError) -> ConnectionError {
        let error = ConnectionError::Establish {
            interface: self.name().to_string(),
            source,
        };
        *lock(&self.state) = ConnectionState::Closed;
        self.sink().connection_error(self.name(), &error);
        self.notify(ConnectionState::Connecting, ConnectionState::Closed);
        error
    }

    /// Finish a connect on an established stream and hand back its reader.
    fn attach(self: &Arc<Self>, stream: LinkStream) -> Result<FrameReader<LinkStream>> {
        let streams = stream
            .set_read_timeout(self.config.read_timeout())
            .and_then(|()| stream.set_write_timeout(self.config.write_timeout()))
            .and_then(|()| stream.try_clone());
        let reader_stream = match streams {
            Ok(reader_stream) => reader_stream,
            Err(source) => return Err(self.establish_failed(source)),
        };

        let framing = self.config.framing.clone();
        *lock(&self.writer) = Some(FrameWriter::new(stream, framing.clone()));
        *lock(&self.state) = ConnectionState::Connected;
        self.notify(ConnectionState::Connecting, ConnectionState::Connected);

        let polling = lock(&self.polling).clone();
        if let Some(polling) = polling {
            if let Err(err) = self.spawn_poller(&polling) {
                self.sink().connection_error(self.name(), &err);
            }
        }

        Ok(FrameReader::new(reader_stream, framing))
    }

    /// Move to CLOSED, reporting `error` first. Returns false when the
    /// interface was already closed.
    fn close(&self, error: Option<&ConnectionError>) -> bool {
        let previous = {
            let mut state = lock(&self.state);
            let previous = *state;
            if previous == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closed;
            previous
        };

        if let Some(writer) = lock(&self.writer).take() {
            if let Err(err) = writer.get_ref().shutdown() {
                debug!(interface = %self.name(), error = %err, "shutdown failed");
            }
        }
        self.cancel_poller();

        if let Some(error) = error {
            self.sink().connection_error(self.name(), error);
        }
        self.notify(previous, ConnectionState::Closed);
        true
    }

    /// Close the connection after a stream failure.
    fn fail(&self, err: FrameError) -> ConnectionError {
        let error = if err.is_timeout() {
            ConnectionError::Timeout {
                interface: self.name().to_string(),
                source: err,
            }
        } else {
            ConnectionError::Frame(err)
        };
        if self.close(Some(&error)) {
            error
        } else {
            // Disconnected from another thread while this one was blocked.
            ConnectionError::NotConnected(self.name().to_string())
        }
    }

    fn write_bytes(&self, bytes: &[u8], framed: bool) -> Result<()> {
        let result = {
            let mut writer = lock(&self.writer);
            let Some(writer) = writer.as_mut() else {
                return Err(ConnectionError::NotConnected(self.name().to_string()));
            };
            if framed {
                writer.write_frame(bytes)
            } else {
                writer.write_raw(bytes)
            }
        };

        match result {
            Ok(()) => {
                self.counters.write_count.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_written
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            // Nothing was sent; the stream is still in step.
            Err(err @ (FrameError::Encode(_) | FrameError::InvalidConfig(_))) => Err(err.into()),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn write_packet(&self, packet: &Packet) -> Result<()> {
        let hooks = lock(&self.write_hooks).clone();
        let packet = hooks.apply(packet.clone());
        self.write_bytes(packet.buffer(), true)?;
        debug!(interface = %self.name(), packet = %packet.identity(), "packet written");
        Ok(())
    }

    fn start_polling(self: &Arc<Self>, polling: PollingConfig) -> Result<()> {
        *lock(&self.polling) = Some(polling.clone());
        if self.state() == ConnectionState::Connected {
            self.spawn_poller(&polling)?;
        }
        Ok(())
    }

    /// Replace the active poller. The previous one is cancelled before the
    /// new one is scheduled.
    fn spawn_poller(self: &Arc<Self>, polling: &PollingConfig) -> Result<()> {
        let definition = self
            .commands
            .lookup(&polling.packet.target, &polling.packet.packet)
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownPacket(polling.packet.clone()))?;
        let packet = Packet::command(definition)?;
        let runner = match lock(&self.runner).clone() {
            Some(runner) => runner,
            None => TaskRunner::current()?,
        };

        let task_name = format!("poll {} {}", self.name(), packet.identity());
        let shared = Arc::downgrade(self);
        let mut poller = lock(&self.poller);
        if let Some(previous) = poller.take() {
            previous.cancel();
            debug!(interface = %self.name(), task = %previous.name(), "previous poller cancelled");
        }
        *poller = Some(runner.schedule(task_name, polling.schedule(), move || {
            let Some(shared) = shared.upgrade() else {
                return Ok(());
            };
            match shared.write_packet(&packet) {
                Ok(()) | Err(ConnectionError::NotConnected(_)) => Ok(()),
                Err(err) => Err(TaskError::other(err)),
            }
        }));
        Ok(())
    }

    fn cancel_poller(&self) {
        if let Some(poller) = lock(&self.poller).take() {
            poller.cancel();
            debug!(interface = %self.name(), task = %poller.name(), "poller cancelled");
        }
    }

    fn is_polling(&self) -> bool {
        lock(&self.poller)
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    fn stats(&self) -> InterfaceStats {
        InterfaceStats {
            read_count: self.counters.read_count.load(Ordering::Relaxed),
            write_count: self.counters.write_count.load(Ordering::Relaxed),
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// One connection to a target: its lifecycle, its reader and its writer.
///
/// The interface owns the reading side and is driven by a single thread.
/// Writes, polling and disconnects are also available through
/// [`InterfaceHandle`] clones from other threads.
pub struct Interface {
    shared: Arc<Shared>,
    reader: Option<FrameReader<LinkStream>>,
    telemetry: Arc<DefinitionTable>,
    unknown: Arc<PacketDefinition>,
    read_hooks: HookChain,
}

impl Interface {
    /// `telemetry` identifies inbound frames; `commands` supplies polling packets.
    /// Polling in `config` starts on every connect.
    pub fn new(
        config: InterfaceConfig,
        telemetry: Arc<DefinitionTable>,
        commands: Arc<DefinitionTable>,
    ) -> Result<Self> {
        config.framing.validate()?;
        let polling = config.polling.clone();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                commands,
                state: Mutex::new(ConnectionState::Closed),
                writer: Mutex::new(None),
                polling: Mutex::new(polling),
                poller: Mutex::new(None),
                write_hooks: Mutex::new(HookChain::new()),
                runner: Mutex::new(None),
                sink: Mutex::new(Arc::new(TracingConnectionSink)),
                counters: Counters::default(),
            }),
            reader: None,
            telemetry,
            unknown: Arc::new(PacketDefinition::unknown()),
            read_hooks: HookChain::new(),
        })
    }

    /// Runner for the polling task. Defaults to the ambient tokio runtime.
    pub fn with_runner(self, runner: TaskRunner) -> Self {
        *lock(&self.shared.runner) = Some(runner);
        self
    }

    pub fn with_sink(self, sink: Arc<dyn ConnectionSink>) -> Self {
        *lock(&self.shared.sink) = sink;
        self
    }

    pub fn with_read_hook(mut self, hook: impl PacketHook + 'static) -> Self {
        self.read_hooks.push(hook);
        self
    }

    pub fn add_write_hook(&self, hook: impl PacketHook + 'static) {
        lock(&self.shared.write_hooks).push(hook);
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn stats(&self) -> InterfaceStats {
        self.shared.stats()
    }

    pub fn handle(&self) -> InterfaceHandle {
        InterfaceHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Establish the configured transport. Fails unless CLOSED; a failed
    /// attempt leaves the interface CLOSED and is not retried.
    pub fn connect(&mut self) -> Result<()> {
        self.shared.begin_connect()?;
        let config = &self.shared.config;
        let stream = match config.transport.connect(config.connect_timeout()) {
            Ok(stream) => stream,
            Err(source) => return Err(self.shared.establish_failed(source)),
        };
        self.reader = Some(self.shared.attach(stream)?);
        Ok(())
    }

    /// Take over an already established stream, e.g. one accepted by a server.
    pub fn connect_with(&mut self, stream: LinkStream) -> Result<()> {
        self.shared.begin_connect()?;
        self.reader = Some(self.shared.attach(stream)?);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.shared.close(None);
        self.reader = None;
    }

    /// Read, identify and return the next packet (blocking).
    ///
    /// Frames that match no telemetry definition of this interface's targets
    /// come back bound to `UNKNOWN UNKNOWN`. Any stream failure closes the
    /// connection.
    pub fn read_packet(&mut self) -> Result<Packet> {
        if self.shared.state() != ConnectionState::Connected {
            self.reader = None;
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(ConnectionError::NotConnected(self.name().to_string()));
        };

        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.reader = None;
                return Err(self.shared.fail(err));
            }
        };

        let definition = match self
            .telemetry
            .identify(&frame, &self.shared.config.target_names)
        {
            Some(definition) => Arc::clone(definition),
            None => {
                warn!(
                    interface = %self.name(),
                    length = frame.len(),
                    leading = %hex::encode_upper(&frame[..frame.len().min(LOGGED_UNKNOWN_BYTES)]),
                    "unidentified packet"
                );
                Arc::clone(&self.unknown)
            }
        };

        let counters = &self.shared.counters;
        counters.read_count.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes_read
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        let mut packet = Packet::bind(definition, frame);
        packet.set_received_time(SystemTime::now());
        Ok(self.read_hooks.apply(packet))
    }

    /// Frame and send `packet`. Write hooks act on a copy.
    pub fn write_packet(&self, packet: &Packet) -> Result<()> {
        self.shared.write_packet(packet)
    }

    /// Send bytes without framing or hooks.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        self.shared.write_bytes(bytes, false)
    }

    /// Send `polling.packet` on a fixed interval while connected, replacing
    /// any previous polling.
    pub fn start_polling(&self, polling: PollingConfig) -> Result<()> {
        self.shared.start_polling(polling)
    }

    pub fn stop_polling(&self) {
        *lock(&self.shared.polling) = None;
        self.shared.cancel_poller();
    }

    pub fn is_polling(&self) -> bool {
        self.shared.is_polling()
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        self.shared.close(None);
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle for writing to, polling on and disconnecting an interface
/// from threads other than its reader.
#[derive(Clone)]
pub struct InterfaceHandle {
    shared: Arc<Shared>,
}

impl InterfaceHandle {
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn stats(&self) -> InterfaceStats {
        self.shared.stats()
    }

    pub fn write_packet(&self, packet: &Packet) -> Result<()> {
        self.shared.write_packet(packet)
    }

    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        self.shared.write_bytes(bytes, false)
    }

    pub fn start_polling(&self, polling: PollingConfig) -> Result<()> {
        self.shared.start_polling(polling)
    }

    pub fn stop_polling(&self) {
        *lock(&self.shared.polling) = None;
        self.shared.cancel_poller();
    }

    /// Close the connection. A read blocked on the interface returns
    /// `NotConnected`.
    pub fn disconnect(&self) {
        self.shared.close(None);
    }
}

impl fmt::Debug for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceHandle")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use groundlink_frame::LengthFraming;
    use groundlink_packet::{DataType, ItemDefinition, PacketIdentity, Value, ValueType};
    use groundlink_task::TaskSink;
    use groundlink_transport::TransportConfig;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
        errors: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
            self.transitions.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl ConnectionSink for RecordingSink {
        fn state_changed(&self, _interface: &str, from: ConnectionState, to: ConnectionState) {
            self.transitions.lock().unwrap().push((from, to));
        }

        fn connection_error(&self, _interface: &str, error: &ConnectionError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[derive(Default)]
    struct RecordingTaskSink {
        stopped: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
    }

    impl TaskSink for RecordingTaskSink {
        fn task_failed(&self, task: &str, _error: &TaskError) {
            self.failed.lock().unwrap().push(task.to_string());
        }

        fn task_stopped(&self, task: &str) {
            self.stopped.lock().unwrap().push(task.to_string());
        }
    }

    fn telemetry() -> Arc<DefinitionTable> {
        let mut table = DefinitionTable::new();
        table.insert(
            PacketDefinition::define(
                "INST",
                "HEALTH",
                vec![
                    ItemDefinition::new("LENGTH", 0, 16, DataType::Uint),
                    ItemDefinition::new("PKTID", 16, 8, DataType::Uint).with_id_value(1u64),
                    ItemDefinition::new("TEMP", 24, 16, DataType::Uint),
                ],
            )
            .unwrap(),
        );
        Arc::new(table)
    }

    fn commands() -> Arc<DefinitionTable> {
        let mut table = DefinitionTable::new();
        for (name, opcode) in [("NOOP", 9u64), ("PING", 10u64)] {
            table.insert(
                PacketDefinition::define(
                    "INST",
                    name,
                    vec![
                        ItemDefinition::new("LENGTH", 0, 16, DataType::Uint),
                        ItemDefinition::new("OPCODE", 16, 8, DataType::Uint).with_id_value(opcode),
                    ],
                )
                .unwrap(),
            );
        }
        Arc::new(table)
    }

    fn config() -> InterfaceConfig {
        InterfaceConfig::new(
            "INST_INT",
            TransportConfig::Unix {
                path: "/nonexistent/groundlink/inst.sock".into(),
            },
        )
    }

    fn interface(sink: &Arc<RecordingSink>) -> Interface {
        Interface::new(config(), telemetry(), commands())
            .unwrap()
            .with_sink(Arc::clone(sink) as Arc<dyn ConnectionSink>)
    }

    /// Connected interface plus a frame reader on the far end of the pair.
    fn connected(interface: &mut Interface) -> (UnixStream, FrameReader<LinkStream>) {
        let (near, far) = UnixStream::pair().unwrap();
        interface.connect_with(LinkStream::from_unix(near)).unwrap();
        let far_reader = FrameReader::for_link(
            LinkStream::from_unix(far.try_clone().unwrap()),
            LengthFraming::default(),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
        (far, far_reader)
    }

    fn opcodes(reader: &mut FrameReader<LinkStream>) -> Vec<u8> {
        let mut opcodes = Vec::new();
        loop {
            match reader.read_frame() {
                Ok(frame) => opcodes.push(frame[2]),
                Err(FrameError::ConnectionClosed) => return opcodes,
                Err(err) if err.is_timeout() => return opcodes,
                Err(err) => panic!("unexpected frame error: {err}"),
            }
        }
    }

    #[test]
    fn reads_identified_and_unknown_packets() {
        use std::io::Write;

        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);
        let (mut far, _far_reader) = connected(&mut interface);
        assert_eq!(interface.state(), ConnectionState::Connected);
        assert_eq!(
            sink.transitions(),
            vec![
                (ConnectionState::Closed, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Connected),
            ]
        );

        far.write_all(&[0x00, 0x05, 0x01, 0x12, 0x34, 0x00, 0x03, 0x7F])
            .unwrap();

        let mut health = interface.read_packet().unwrap();
        assert_eq!(health.identity(), &PacketIdentity::new("INST", "HEALTH"));
        assert_eq!(
            health.read("TEMP", ValueType::Converted).unwrap(),
            Value::Uint(0x1234)
        );
        assert!(health.received_time().is_some());

        let unknown = interface.read_packet().unwrap();
        assert_eq!(unknown.identity(), &PacketIdentity::unknown());
        assert_eq!(unknown.buffer(), &[0x00, 0x03, 0x7F]);

        let stats = interface.stats();
        assert_eq!((stats.read_count, stats.bytes_read), (2, 8));
    }

    #[test]
    fn failed_connect_returns_to_closed() {
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);

        let err = interface.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::Establish { .. }));
        assert_eq!(interface.state(), ConnectionState::Closed);
        assert_eq!(
            sink.transitions(),
            vec![
                (ConnectionState::Closed, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Closed),
            ]
        );
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn second_connect_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);
        let _far = connected(&mut interface);

        let (near, _other) = UnixStream::pair().unwrap();
        let err = interface
            .connect_with(LinkStream::from_unix(near))
            .unwrap_err();
        assert!(matches!(err, ConnectionError::AlreadyConnected(_)));
        assert_eq!(interface.state(), ConnectionState::Connected);
    }

    #[test]
    fn peer_close_ends_connection() {
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);
        let (far, far_reader) = connected(&mut interface);
        drop(far_reader);
        drop(far);

        let err = interface.read_packet().unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Frame(FrameError::ConnectionClosed)
        ));
        assert_eq!(interface.state(), ConnectionState::Closed);
        assert_eq!(sink.errors().len(), 1);
        assert!(matches!(
            interface.read_packet(),
            Err(ConnectionError::NotConnected(_))
        ));
    }

    #[test]
    fn read_timeout_closes_connection() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = config();
        config.read_timeout_ms = Some(20);
        let mut interface = Interface::new(config, telemetry(), commands())
            .unwrap()
            .with_sink(Arc::clone(&sink) as Arc<dyn ConnectionSink>);
        let _far = connected(&mut interface);

        let err = interface.read_packet().unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert_eq!(interface.state(), ConnectionState::Closed);
        assert_eq!(
            sink.transitions().last(),
            Some(&(ConnectionState::Connected, ConnectionState::Closed))
        );
    }

    #[test]
    fn write_hooks_change_only_the_sent_copy() {
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);
        let (_far, mut far_reader) = connected(&mut interface);
        interface.add_write_hook(|mut packet: Packet| {
            packet
                .write("OPCODE", &Value::Uint(0x2A), ValueType::Raw)
                .unwrap();
            packet
        });

        let definition = commands().lookup("INST", "NOOP").cloned().unwrap();
        let packet = Packet::command(definition).unwrap();
        interface.write_packet(&packet).unwrap();

        let frame = far_reader.read_frame().unwrap();
        assert_eq!(frame.as_ref(), &[0x00, 0x03, 0x2A]);
        assert_eq!(packet.buffer(), &[0x00, 0x00, 0x09]);

        interface.write_raw(&[0xFF]).unwrap();
        assert_eq!(interface.stats().write_count, 2);
    }

    #[test]
    fn handle_disconnect_unblocks_reader() {
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);
        let _far = connected(&mut interface);
        let handle = interface.handle();

        let reader = std::thread::spawn(move || {
            let result = interface.read_packet();
            (result, interface)
        });
        std::thread::sleep(Duration::from_millis(50));
        handle.disconnect();

        let (result, interface) = reader.join().unwrap();
        assert!(matches!(result, Err(ConnectionError::NotConnected(_))));
        assert_eq!(interface.state(), ConnectionState::Closed);
        assert!(sink.errors().is_empty());
        assert!(matches!(
            handle.write_raw(&[1]),
            Err(ConnectionError::NotConnected(_))
        ));
    }

    #[test]
    fn polling_unknown_packet_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink);
        let _far = connected(&mut interface);

        let polling = PollingConfig::new(PacketIdentity::new("INST", "RESET"), Duration::from_millis(10));
        let err = interface.start_polling(polling).unwrap_err();
        assert!(matches!(err, ConnectionError::UnknownPacket(_)));
        assert!(!interface.is_polling());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn restarting_polling_leaves_one_poller() {
        let tasks = Arc::new(RecordingTaskSink::default());
        let runner = TaskRunner::current()
            .unwrap()
            .with_sink(Arc::clone(&tasks) as Arc<dyn TaskSink>);
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink).with_runner(runner);
        let (_far, mut far_reader) = connected(&mut interface);

        let every = Duration::from_millis(10);
        interface
            .start_polling(PollingConfig::new(PacketIdentity::new("INST", "NOOP"), every))
            .unwrap();
        interface
            .start_polling(PollingConfig::new(PacketIdentity::new("INST", "PING"), every))
            .unwrap();
        assert!(interface.is_polling());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            tasks.stopped.lock().unwrap().as_slice(),
            &["poll INST_INT INST NOOP".to_string()]
        );

        interface.stop_polling();
        assert!(!interface.is_polling());
        let sent = tokio::task::spawn_blocking(move || opcodes(&mut far_reader))
            .await
            .unwrap();

        // At most the iteration in flight when the first poller was cancelled.
        assert!(sent.iter().filter(|&&opcode| opcode == 9).count() <= 1);
        assert!(sent.iter().filter(|&&opcode| opcode == 10).count() >= 2);
        assert!(tasks.failed.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn polling_follows_connection_state() {
        let runner = TaskRunner::current().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut interface = interface(&sink).with_runner(runner);

        let polling = PollingConfig::new(PacketIdentity::new("inst", "noop"), Duration::from_millis(10));
        interface.start_polling(polling).unwrap();
        assert!(!interface.is_polling());

        let (_far, mut far_reader) = connected(&mut interface);
        assert!(interface.is_polling());

        interface.disconnect();
        assert!(!interface.is_polling());

        let sent = tokio::task::spawn_blocking(move || opcodes(&mut far_reader))
            .await
            .unwrap();
        assert!(sent.iter().all(|&opcode| opcode == 9));

        let (_far, _far_reader) = connected(&mut interface);
        assert!(interface.is_polling());
        interface.stop_polling();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn configured_polling_starts_on_connect() {
        let mut config = config();
        config.polling = Some(PollingConfig::new(
            PacketIdentity::new("INST", "PING"),
            Duration::from_millis(10),
        ));
        let mut interface = Interface::new(config, telemetry(), commands())
            .unwrap()
            .with_runner(TaskRunner::current().unwrap());
        assert!(!interface.is_polling());

        let (_far, _far_reader) = connected(&mut interface);
        assert!(interface.is_polling());
        interface.disconnect();
        assert!(!interface.is_polling());
    }
}
