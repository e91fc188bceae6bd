//! Feedback evaluation and variable values for a host UI
//!
//! A host re-evaluates its feedbacks whenever the driver reports a state
//! change. Each feedback lists the change kinds it depends on so hosts can
//! skip the ones a change cannot affect. [`FeedbackMonitor`] does that
//! bookkeeping for the feedbacks declared in the config file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::protocol::address::{ChannelAddress, ChannelType};
use crate::state::{ChannelStateStore, StateChange, StateKind};

/// Boolean feedback over console state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feedback {
    /// Lit while the channel is muted
    ChannelMute { address: ChannelAddress },
    /// Lit while the fader sits at or above the threshold
    FaderAbove { address: ChannelAddress, threshold_db: f64 },
    /// Lit while the scene is the last one recalled
    CurrentScene { scene: u16 },
}

impl Feedback {
    /// Evaluate against the current store contents
    pub fn evaluate(&self, store: &ChannelStateStore) -> bool {
        match *self {
            Feedback::ChannelMute { address } => store.get(address).muted,
            Feedback::FaderAbove {
                address,
                threshold_db,
            } => store.get(address).fader_db >= threshold_db,
            Feedback::CurrentScene { scene } => store.current_scene() == Some(scene),
        }
    }

    /// Whether a change of the given kind may flip this feedback
    pub fn depends_on(&self, kind: StateKind) -> bool {
        match (self, kind) {
            (_, StateKind::Reset) => true,
            (Feedback::ChannelMute { .. }, StateKind::Mute) => true,
            (Feedback::FaderAbove { .. }, StateKind::Fader) => true,
            (Feedback::CurrentScene { .. }, StateKind::Scene) => true,
            _ => false,
        }
    }

    /// Whether this particular change may flip this feedback
    pub fn affected_by(&self, change: StateChange) -> bool {
        if !self.depends_on(change.kind()) {
            return false;
        }
        match (self, change.address()) {
            (Feedback::ChannelMute { address }, Some(changed))
            | (Feedback::FaderAbove { address, .. }, Some(changed)) => *address == changed,
            _ => true,
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::ChannelMute { address } => write!(f, "{} muted", address),
            Feedback::FaderAbove {
                address,
                threshold_db,
            } => write!(f, "{} fader >= {} dB", address, format_db(*threshold_db)),
            Feedback::CurrentScene { scene } => write!(f, "scene {} current", scene),
        }
    }
}

/// Last known value of each watched feedback
#[derive(Debug, Default)]
pub struct FeedbackMonitor {
    entries: Vec<(Feedback, bool)>,
}

impl FeedbackMonitor {
    pub fn new(feedbacks: &[Feedback], store: &ChannelStateStore) -> Self {
        Self {
            entries: feedbacks
                .iter()
                .map(|feedback| (*feedback, feedback.evaluate(store)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-evaluate the feedbacks `change` may affect
    ///
    /// Returns the ones whose value flipped, with their new value.
    pub fn on_change(&mut self, store: &ChannelStateStore, change: StateChange) -> Vec<(Feedback, bool)> {
        let mut flipped = Vec::new();
        for (feedback, value) in self.entries.iter_mut() {
            if !feedback.affected_by(change) {
                continue;
            }
            let current = feedback.evaluate(store);
            if current != *value {
                *value = current;
                flipped.push((*feedback, current));
            }
        }
        flipped
    }
}

/// Variable name prefix for a channel type
fn variable_prefix(channel_type: ChannelType) -> &'static str {
    match channel_type {
        ChannelType::Input => "ch",
        ChannelType::FxSend => "fx_send",
        ChannelType::FxReturn => "fx_return",
        ChannelType::Mix => "mix",
        ChannelType::Dca => "dca",
    }
}

/// Variable id, e.g. `ch_5_name` or `dca_2_fader`
pub fn variable_id(address: ChannelAddress, attribute: &str) -> String {
    format!(
        "{}_{}_{}",
        variable_prefix(address.channel_type()),
        address.index(),
        attribute
    )
}

/// Format a fader position the way variables show it
pub fn format_db(db: f64) -> String {
    format!("{:.1}", db)
}

/// Name and fader variables for one channel
pub fn channel_variables(store: &ChannelStateStore, address: ChannelAddress) -> [(String, String); 2] {
    let state = store.get(address);
    [
        (variable_id(address, "name"), state.name),
        (variable_id(address, "fader"), format_db(state.fader_db)),
    ]
}

/// Every variable the store backs
pub fn all_variables(store: &ChannelStateStore) -> BTreeMap<String, String> {
    store
        .iter()
        .flat_map(|(address, _)| channel_variables(store, *address))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(channel_type: ChannelType, index: u16) -> ChannelAddress {
        ChannelAddress::new(channel_type, index).unwrap()
    }

    #[test]
    fn test_mute_feedback() {
        let mut store = ChannelStateStore::new();
        let feedback = Feedback::ChannelMute { address: addr(ChannelType::Mix, 1) };
        assert!(!feedback.evaluate(&store));
        store.set_mute(addr(ChannelType::Mix, 1), true);
        assert!(feedback.evaluate(&store));
        assert!(feedback.depends_on(StateKind::Mute));
        assert!(!feedback.depends_on(StateKind::Name));
    }

    #[test]
    fn test_fader_threshold_feedback() {
        let mut store = ChannelStateStore::new();
        let address = addr(ChannelType::Input, 3);
        let feedback = Feedback::FaderAbove { address, threshold_db: -10.0 };
        assert!(!feedback.evaluate(&store));
        store.set_fader(address, -10.0);
        assert!(feedback.evaluate(&store));
        store.set_fader(address, -10.5);
        assert!(!feedback.evaluate(&store));
    }

    #[test]
    fn test_scene_feedback_cleared_by_reset() {
        let mut store = ChannelStateStore::new();
        let feedback = Feedback::CurrentScene { scene: 12 };
        store.set_current_scene(12);
        assert!(feedback.evaluate(&store));
        store.reset();
        assert!(!feedback.evaluate(&store));
        assert!(feedback.depends_on(StateKind::Reset));
    }

    #[test]
    fn test_affected_by_matches_channel() {
        let feedback = Feedback::ChannelMute { address: addr(ChannelType::Input, 1) };
        assert!(feedback.affected_by(StateChange::Mute(addr(ChannelType::Input, 1))));
        assert!(!feedback.affected_by(StateChange::Mute(addr(ChannelType::Input, 2))));
        assert!(!feedback.affected_by(StateChange::Fader(addr(ChannelType::Input, 1))));
        assert!(feedback.affected_by(StateChange::Reset));
        assert!(Feedback::CurrentScene { scene: 3 }.affected_by(StateChange::Scene(7)));
    }

    #[test]
    fn test_monitor_reports_flips_only() {
        let mut store = ChannelStateStore::new();
        let address = addr(ChannelType::Dca, 2);
        let mute = Feedback::ChannelMute { address };
        let scene = Feedback::CurrentScene { scene: 4 };
        let mut monitor = FeedbackMonitor::new(&[mute, scene], &store);
        assert_eq!(monitor.len(), 2);

        let change = store.set_mute(address, true);
        assert_eq!(monitor.on_change(&store, change), vec![(mute, true)]);
        let change = store.set_mute(address, true);
        assert!(monitor.on_change(&store, change).is_empty());

        let change = store.set_current_scene(4);
        assert_eq!(monitor.on_change(&store, change), vec![(scene, true)]);

        let change = store.reset();
        assert_eq!(monitor.on_change(&store, change), vec![(mute, false), (scene, false)]);
    }

    #[test]
    fn test_display() {
        let feedback = Feedback::FaderAbove { address: addr(ChannelType::Mix, 1), threshold_db: -6.0 };
        assert_eq!(feedback.to_string(), "mix 1 fader >= -6.0 dB");
    }

    #[test]
    fn test_variables() {
        let mut store = ChannelStateStore::new();
        store.set_name(addr(ChannelType::Input, 5), "Kick".to_string());

        let vars = all_variables(&store);
        assert_eq!(vars.len(), 256);
        assert_eq!(vars["ch_5_name"], "Kick");
        assert_eq!(vars["ch_5_fader"], "-54.0");
        assert_eq!(vars["fx_send_8_fader"], "0.0");
        assert_eq!(vars["dca_16_name"], "");
    }
}
