use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use groundlink_task::{TaskHandle, TaskRunner, TaskSchedule};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::control::{ItemKey, LimitsControl};

/// How often a limits group re-evaluates its predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsGroupConfig {
    pub interval_ms: u64,
    pub initial_delay_ms: u64,
}

impl Default for LimitsGroupConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            initial_delay_ms: 0,
        }
    }
}

impl LimitsGroupConfig {
    pub fn schedule(&self) -> TaskSchedule {
        TaskSchedule::every(Duration::from_millis(self.interval_ms))
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
    }
}

type Predicate = Box<dyn FnMut() -> bool + Send>;

/// Items whose limits checking follows a predicate.
pub struct LimitsGroup {
    name: String,
    items: Vec<ItemKey>,
    predicate: Predicate,
    config: LimitsGroupConfig,
}

impl LimitsGroup {
    pub fn new(
        name: impl AsRef<str>,
        items: Vec<ItemKey>,
        predicate: impl FnMut() -> bool + Send + 'static,
    ) -> Self {
        Self {
            name: name.as_ref().to_ascii_uppercase(),
            items,
            predicate: Box::new(predicate),
            config: LimitsGroupConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LimitsGroupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[ItemKey] {
        &self.items
    }

    /// Schedule the evaluator for this group.
    ///
    /// The first evaluation applies the predicate's value; later evaluations
    /// only act when the value changes. Disabling an item leaves its confirmed
    /// limits state as it was.
    pub fn spawn(self, runner: &TaskRunner, control: LimitsControl) -> TaskHandle {
        let LimitsGroup {
            name,
            items,
            mut predicate,
            config,
        } = self;
        let mut applied: Option<bool> = None;

        runner.schedule(format!("limits-group {name}"), config.schedule(), move || {
            let enabled = predicate();
            if applied != Some(enabled) {
                if enabled {
                    control.enable_items(&items);
                } else {
                    control.disable_items(&items);
                }
                info!(group = %name, enabled, items = items.len(), "limits group toggled");
                applied = Some(enabled);
            }
            Ok(())
        })
    }
}

impl fmt::Debug for LimitsGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitsGroup")
            .field("name", &self.name)
            .field("items", &self.items)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Registry of limits groups by name.
#[derive(Debug, Default)]
pub struct LimitsGroups {
    members: BTreeMap<String, Vec<ItemKey>>,
    unscheduled: Vec<LimitsGroup>,
}

impl LimitsGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, group: LimitsGroup) {
        self.members
            .insert(group.name.clone(), group.items.clone());
        self.unscheduled.push(group);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn items(&self, group: &str) -> Option<&[ItemKey]> {
        self.members
            .get(&group.to_ascii_uppercase())
            .map(Vec::as_slice)
    }

    /// Start an evaluator for every group added since the last call.
    pub fn spawn(&mut self, runner: &TaskRunner, control: &LimitsControl) -> Vec<TaskHandle> {
        self.unscheduled
            .drain(..)
            .map(|group| group.spawn(runner, control.clone()))
            .collect()
    }

    /// Enable every item of `group` directly. Returns false for an unknown group.
    pub fn enable_group(&self, group: &str, control: &LimitsControl) -> bool {
        let Some(items) = self.items(group) else {
            return false;
        };
        control.enable_items(items);
        true
    }

    /// Disable every item of `group` directly. Returns false for an unknown group.
    pub fn disable_group(&self, group: &str, control: &LimitsControl) -> bool {
        let Some(items) = self.items(group) else {
            return false;
        };
        control.disable_items(items);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;
    use groundlink_packet::{
        DataType, ItemDefinition, LimitsDefinition, Packet, PacketDefinition, Thresholds, Value,
        ValueType,
    };

    use super::*;
    use crate::engine::LimitsEngine;
    use crate::state::LimitsState;

    fn packet(temp: i64) -> Packet {
        let definition = PacketDefinition::define(
            "INST",
            "HEALTH",
            vec![ItemDefinition::new("TEMP1", 0, 16, DataType::Int).with_limits(
                LimitsDefinition::new(Thresholds::new(-80.0, -70.0, 60.0, 80.0)),
            )],
        )
        .unwrap();
        let mut packet = Packet::bind(Arc::new(definition), BytesMut::zeroed(2));
        packet
            .write("TEMP1", &Value::Int(temp), ValueType::Raw)
            .unwrap();
        packet
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn predicate_edges_gate_evaluation() {
        let runner = TaskRunner::current().unwrap();
        let mut engine = LimitsEngine::new();
        let key = ItemKey::new("INST", "HEALTH", "TEMP1");
        let flag = Arc::new(AtomicBool::new(false));
        let predicate_flag = Arc::clone(&flag);

        let group = LimitsGroup::new("power", vec![key.clone()], move || {
            predicate_flag.load(Ordering::SeqCst)
        })
        .with_config(LimitsGroupConfig {
            interval_ms: 10,
            initial_delay_ms: 0,
        });
        let task = group.spawn(&runner, engine.control().clone());

        settle().await;
        assert!(engine.check(&mut packet(0)).is_empty());
        assert_eq!(engine.state(&key), LimitsState::Stale);

        flag.store(true, Ordering::SeqCst);
        settle().await;
        assert_eq!(engine.check(&mut packet(0)).len(), 1);
        assert_eq!(engine.state(&key), LimitsState::Green);

        flag.store(false, Ordering::SeqCst);
        settle().await;
        assert!(engine.check(&mut packet(100)).is_empty());
        assert_eq!(engine.state(&key), LimitsState::Green);

        task.cancel();
        task.join().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn only_edges_override_manual_changes() {
        let runner = TaskRunner::current().unwrap();
        let control = LimitsControl::new();
        let key = ItemKey::new("INST", "HEALTH", "TEMP1");
        let mut groups = LimitsGroups::new();
        groups.add(
            LimitsGroup::new("thermal", vec![key.clone()], || true).with_config(
                LimitsGroupConfig {
                    interval_ms: 10,
                    initial_delay_ms: 0,
                },
            ),
        );

        let tasks = groups.spawn(&runner, &control);
        assert_eq!(tasks.len(), 1);
        assert!(groups.spawn(&runner, &control).is_empty());

        settle().await;
        assert!(control.is_enabled(&key, false));

        // A steady predicate does not undo a manual disable.
        assert!(groups.disable_group("THERMAL", &control));
        settle().await;
        assert!(!control.is_enabled(&key, true));

        assert!(groups.enable_group("thermal", &control));
        assert!(control.is_enabled(&key, false));
        assert!(!groups.enable_group("missing", &control));

        for task in tasks {
            task.cancel();
        }
    }

    #[test]
    fn registry_lists_members() {
        let mut groups = LimitsGroups::new();
        let key = ItemKey::new("INST", "HEALTH", "TEMP1");
        groups.add(LimitsGroup::new("thermal", vec![key.clone()], || false));

        assert_eq!(groups.names().collect::<Vec<_>>(), vec!["THERMAL"]);
        assert_eq!(groups.items("Thermal"), Some(&[key][..]));
    }
}
