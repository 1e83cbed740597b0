use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use groundlink_interface::InterfaceHandle;
use groundlink_limits::{
    ItemKey, LimitsEngine, LimitsGroup, LimitsGroups, LimitsResponse, LimitsState,
    LimitsTransition,
};
use groundlink_packet::{DefinitionTable, Packet, PacketDefinition, PacketIdentity, Value, ValueType};
use groundlink_task::{TaskHandle, TaskRunner};
use tracing::debug;

use crate::current::CurrentValueTable;
use crate::error::{GroundError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Interface that carries commands for a set of targets.
struct Route {
    /// Upper-cased. Empty serves every target.
    targets: Vec<String>,
    handle: InterfaceHandle,
}

impl Route {
    fn serves(&self, target: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == target)
    }
}

/// Everything the station shares between interfaces, link threads and the
/// entry points: definitions, current values, limits and command routes.
///
/// Build one at startup and pass it around behind an `Arc`.
pub struct GroundContext {
    commands: Arc<DefinitionTable>,
    telemetry: Arc<DefinitionTable>,
    current: CurrentValueTable,
    limits: Mutex<LimitsEngine>,
    groups: Mutex<LimitsGroups>,
    routes: Mutex<Vec<Route>>,
    runner: Option<TaskRunner>,
}

impl GroundContext {
    pub fn new(commands: Arc<DefinitionTable>, telemetry: Arc<DefinitionTable>) -> Self {
        let current = CurrentValueTable::seeded(&telemetry);
        Self {
            commands,
            telemetry,
            current,
            limits: Mutex::new(LimitsEngine::new()),
            groups: Mutex::new(LimitsGroups::new()),
            routes: Mutex::new(Vec::new()),
            runner: None,
        }
    }

    pub fn with_limits(mut self, engine: LimitsEngine) -> Self {
        self.limits = Mutex::new(engine);
        self
    }

    /// Runner for limits group evaluators. Defaults to the ambient tokio runtime.
    pub fn with_runner(mut self, runner: TaskRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn commands(&self) -> &Arc<DefinitionTable> {
        &self.commands
    }

    pub fn telemetry(&self) -> &Arc<DefinitionTable> {
        &self.telemetry
    }

    pub fn current(&self) -> &CurrentValueTable {
        &self.current
    }

    pub fn command_definition(&self, target: &str, packet: &str) -> Result<&Arc<PacketDefinition>> {
        self.commands
            .lookup(target, packet)
            .ok_or_else(|| GroundError::UnknownPacket(PacketIdentity::new(target, packet)))
    }

    /// Command packet with `params` written over its defaults. Parameters are
    /// converted values: state names and write conversions apply.
    pub fn build_command(&self, target: &str, packet: &str, params: &[(&str, Value)]) -> Result<Packet> {
        let definition = self.command_definition(target, packet)?;
        let mut command = Packet::command(Arc::clone(definition))?;
        for (name, value) in params {
            command.write(name, value, ValueType::Converted)?;
        }
        Ok(command)
    }

    /// Route commands for `targets` (all targets when empty) to `handle`.
    /// Routes registered earlier win.
    pub fn register_interface(&self, handle: InterfaceHandle, targets: &[String]) {
        debug!(interface = %handle.name(), targets = ?targets, "interface registered");
        lock(&self.routes).push(Route {
            targets: targets.iter().map(|t| t.to_ascii_uppercase()).collect(),
            handle,
        });
    }

    pub fn unregister_interface(&self, name: &str) {
        lock(&self.routes).retain(|route| route.handle.name() != name);
    }

    pub fn interface_for(&self, target: &str) -> Option<InterfaceHandle> {
        let target = target.to_ascii_uppercase();
        lock(&self.routes)
            .iter()
            .find(|route| route.serves(&target))
            .map(|route| route.handle.clone())
    }

    /// Write `packet` on the interface serving its target.
    pub fn send_command(&self, packet: &Packet) -> Result<()> {
        let target = &packet.identity().target;
        let handle = self
            .interface_for(target)
            .ok_or_else(|| GroundError::NoInterface(target.clone()))?;
        handle.write_packet(packet)?;
        Ok(())
    }

    /// Record an identified telemetry packet and check its limits on the
    /// calling thread. The packet's received count is updated.
    ///
    /// Responses run after the limits lock is released and before this
    /// returns, so they may query the context.
    pub fn deliver(&self, packet: &mut Packet) -> Vec<LimitsTransition> {
        self.current.store(packet);
        let check = self.limits().evaluate(packet);
        check.respond(packet)
    }

    /// Exclusive access to the limits engine.
    pub fn limits(&self) -> MutexGuard<'_, LimitsEngine> {
        lock(&self.limits)
    }

    pub fn limits_state(&self, item: &ItemKey) -> LimitsState {
        self.limits().state(item)
    }

    pub fn set_response(&self, item: ItemKey, response: impl LimitsResponse + 'static) {
        self.limits().set_response(item, response);
    }

    /// Mark every item of `packet` STALE, e.g. when its data stops arriving.
    pub fn set_stale(&self, packet: &PacketIdentity) {
        self.limits().set_stale(packet);
    }

    pub fn add_limits_group(&self, group: LimitsGroup) {
        lock(&self.groups).add(group);
    }

    /// Start evaluators for the limits groups added since the last call.
    pub fn start_limits_groups(&self) -> Result<Vec<TaskHandle>> {
        let runner = match &self.runner {
            Some(runner) => runner.clone(),
            None => TaskRunner::current()?,
        };
        let control = self.limits().control().clone();
        Ok(lock(&self.groups).spawn(&runner, &control))
    }

    pub fn limits_group_names(&self) -> Vec<String> {
        lock(&self.groups).names().map(str::to_string).collect()
    }

    /// Returns false for an unknown group.
    pub fn enable_limits_group(&self, group: &str) -> bool {
        let control = self.limits().control().clone();
        lock(&self.groups).enable_group(group, &control)
    }

    /// Returns false for an unknown group.
    pub fn disable_limits_group(&self, group: &str) -> bool {
        let control = self.limits().control().clone();
        lock(&self.groups).disable_group(group, &control)
    }
}

impl fmt::Debug for GroundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroundContext")
            .field("commands", &self.commands.len())
            .field("telemetry", &self.telemetry.len())
            .finish_non_exhaustive()
    }
}
