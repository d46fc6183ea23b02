//! Authoritative chain-state reconciliation for one rack device.
//!
//! The manager mirrors which chain is selected on the peer and keeps
//! that mirror consistent across local commands, remote notifications,
//! and reloads. Collaborators are passed into each operation; the
//! manager owns no transport.

use std::sync::mpsc::{self, Receiver, Sender};

use log::{error, info};
use rosc::{OscMessage, OscType};

use chainsel_osc::{OscClient, OscRouter, RequestError, Route};
use chainsel_types::{Chain, ChainState, RackDevice};

use super::strategy::ChainSwitching;
use super::{int_arg, string_arg};

pub const CHAIN_NAMES_ADDR: &str = "/live/device/get/chains/name";
pub const CHAIN_COLORS_ADDR: &str = "/live/device/get/chains/color_index";
pub const SELECTED_CHAIN_ADDR: &str = "/live/device/get/selected_chain";
pub const SET_SELECTED_CHAIN_ADDR: &str = "/live/device/set/selected_chain";
/// Chain-list-changed notifications arrive on this address.
pub const CHAINS_CHANGED_ADDR: &str = "/live/device/get/chains";
pub const START_LISTEN_CHAINS_ADDR: &str = "/live/device/start_listen/chains";
pub const STOP_LISTEN_CHAINS_ADDR: &str = "/live/device/stop_listen/chains";
pub const START_LISTEN_SELECTED_ADDR: &str = "/live/device/start_listen/selected_chain";
pub const STOP_LISTEN_SELECTED_ADDR: &str = "/live/device/stop_listen/selected_chain";

/// Local mirror of one rack's chain selection.
pub struct ChainManager {
    chains: Vec<Chain>,
    active_chain_index: i32,
    rack: Option<RackDevice>,
    strategy: Box<dyn ChainSwitching>,
    chains_route: Option<Route>,
    selected_route: Option<Route>,
    state_subs: Vec<Sender<ChainState>>,
}

impl ChainManager {
    pub fn new(strategy: Box<dyn ChainSwitching>) -> Self {
        Self {
            chains: Vec::new(),
            active_chain_index: -1,
            rack: None,
            strategy,
            chains_route: None,
            selected_route: None,
            state_subs: Vec::new(),
        }
    }

    /// Snapshot of the combined state (a defensive copy).
    pub fn state(&self) -> ChainState {
        ChainState {
            chains: self.chains.clone(),
            active_chain_index: self.active_chain_index,
            rack: self.rack.clone(),
        }
    }

    pub fn rack(&self) -> Option<&RackDevice> {
        self.rack.as_ref()
    }

    pub fn active_chain_index(&self) -> i32 {
        self.active_chain_index
    }

    /// Typed state-change subscription; every externally observable
    /// mutation emits a full snapshot. Dead receivers are pruned on emit.
    pub fn subscribe(&mut self) -> Receiver<ChainState> {
        let (tx, rx) = mpsc::channel();
        self.state_subs.push(tx);
        rx
    }

    /// Adopt a rack: release the previous one, reload its chains, and
    /// subscribe to its notifications. Never fails from the caller's
    /// side; an unreachable peer leaves an empty chain list behind.
    pub fn set_rack(&mut self, rack: RackDevice, osc: &mut OscClient, router: &mut OscRouter) {
        self.release(osc, router);
        info!(
            target: "chain",
            "rack set to track {} device {}",
            rack.track_id, rack.device_id
        );
        self.rack = Some(rack);
        self.load_chains(osc);
        self.subscribe_listeners(osc, router);
        self.emit_state();
    }

    /// Release the current rack's subscriptions and reset to empty.
    pub fn clear_rack(&mut self, osc: &mut OscClient, router: &mut OscRouter) {
        self.release(osc, router);
        self.rack = None;
        self.chains.clear();
        self.active_chain_index = -1;
        self.emit_state();
    }

    /// Switch to the chain at `index`.
    ///
    /// The previous chain is deactivated before the new one is
    /// activated, back-to-back without awaiting replies, so at most one
    /// chain stays continuously active on the peer. No-op when no rack
    /// is set or the index is out of bounds.
    pub fn select_chain(&mut self, index: i32, osc: &OscClient) {
        let Some(rack) = self.rack.clone() else {
            return;
        };
        if index < 0 || index as usize >= self.chains.len() {
            return;
        }
        if self.active_chain_index >= 0 && self.active_chain_index != index {
            self.strategy.deactivate(osc, &rack, self.active_chain_index);
        }
        self.strategy.activate(osc, &rack, index);
        osc.send(
            SET_SELECTED_CHAIN_ADDR,
            vec![
                OscType::Int(rack.track_id),
                OscType::Int(rack.device_id),
                OscType::Int(index),
            ],
        );
        self.active_chain_index = index;
        self.update_active_flags(index);
        self.emit_state();
    }

    /// Select the next chain, wrapping past the end.
    pub fn select_next(&mut self, osc: &OscClient) {
        if self.chains.is_empty() {
            return;
        }
        let len = self.chains.len() as i32;
        self.select_chain((self.active_chain_index + 1).rem_euclid(len), osc);
    }

    /// Select the previous chain, wrapping past the start.
    pub fn select_previous(&mut self, osc: &OscClient) {
        if self.chains.is_empty() {
            return;
        }
        let len = self.chains.len() as i32;
        self.select_chain((self.active_chain_index - 1).rem_euclid(len), osc);
    }

    /// Apply routed notifications. A chain-list change triggers a full
    /// reload; a selected-chain change updates the active index in
    /// place. Call once per event-loop turn, after routing.
    pub fn poll(&mut self, osc: &mut OscClient) {
        let mut reload = false;
        let mut selected_updates = Vec::new();

        while let Some(msg) = self.chains_route.as_ref().and_then(|r| r.try_recv()) {
            if self.is_for_current_rack(&msg) {
                reload = true;
            }
        }
        while let Some(msg) = self.selected_route.as_ref().and_then(|r| r.try_recv()) {
            if self.is_for_current_rack(&msg) {
                selected_updates.push(msg.args.get(2).map(int_arg).unwrap_or(0));
            }
        }

        if reload {
            info!(target: "chain", "chain list changed, reloading");
            self.load_chains(osc);
            self.emit_state();
        } else {
            for index in selected_updates {
                self.active_chain_index = index;
                self.update_active_flags(index);
                self.emit_state();
            }
        }
    }

    /// Reload the chain sequence and active index from the peer.
    ///
    /// All queries are fired up front and the replies collected as a
    /// batch. A flagged chain wins over the peer's selected-chain value;
    /// the two diverge after external edits. Any query failing fails the
    /// whole reload: state resets to empty and the error is logged.
    fn load_chains(&mut self, osc: &mut OscClient) {
        let Some(rack) = self.rack.clone() else {
            return;
        };
        let flags_addr = self.strategy.flags_address();
        let ids = vec![OscType::Int(rack.track_id), OscType::Int(rack.device_id)];

        osc.send(CHAIN_NAMES_ADDR, ids.clone());
        osc.send(CHAIN_COLORS_ADDR, ids.clone());
        osc.send(flags_addr, ids.clone());
        osc.send(SELECTED_CHAIN_ADDR, ids);

        let collected = (|| {
            let names = osc.wait_for(CHAIN_NAMES_ADDR)?;
            let colors = osc.wait_for(CHAIN_COLORS_ADDR)?;
            let flags = osc.wait_for(flags_addr)?;
            let selected = osc.wait_for(SELECTED_CHAIN_ADDR)?;
            Ok::<_, RequestError>((names, colors, flags, selected))
        })();

        let (names_msg, colors_msg, flags_msg, selected_msg) = match collected {
            Ok(msgs) => msgs,
            Err(e) => {
                error!(
                    target: "chain",
                    "loading chains for track {} device {} failed: {}",
                    rack.track_id, rack.device_id, e
                );
                self.chains.clear();
                self.active_chain_index = -1;
                return;
            }
        };

        // Replies carry [track_id, device_id, values...].
        let names: Vec<String> = names_msg.args.iter().skip(2).map(string_arg).collect();
        let colors: Vec<i32> = colors_msg.args.iter().skip(2).map(int_arg).collect();
        let flags: Vec<i32> = flags_msg.args.iter().skip(2).map(int_arg).collect();
        let selected = selected_msg.args.get(2).map(int_arg).unwrap_or(0);

        let flagged = flags.iter().position(|&f| f != 0);
        self.active_chain_index = if names.is_empty() {
            -1
        } else {
            match flagged {
                Some(i) => i as i32,
                None => selected,
            }
        };

        self.chains = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Chain {
                index: i as i32,
                name,
                color_index: colors.get(i).copied().unwrap_or(0),
                is_active: i as i32 == self.active_chain_index,
            })
            .collect();

        self.strategy
            .apply_reloaded(osc, &rack, self.chains.len(), self.active_chain_index);
        info!(
            target: "chain",
            "loaded {} chains, active {}",
            self.chains.len(),
            self.active_chain_index
        );
    }

    fn subscribe_listeners(&mut self, osc: &OscClient, router: &mut OscRouter) {
        let Some(rack) = &self.rack else {
            return;
        };
        let ids = vec![OscType::Int(rack.track_id), OscType::Int(rack.device_id)];
        osc.send(START_LISTEN_CHAINS_ADDR, ids.clone());
        osc.send(START_LISTEN_SELECTED_ADDR, ids);
        self.chains_route = Some(router.on(CHAINS_CHANGED_ADDR));
        self.selected_route = Some(router.on(SELECTED_CHAIN_ADDR));
    }

    fn release(&mut self, osc: &OscClient, router: &mut OscRouter) {
        if let Some(rack) = &self.rack {
            let ids = vec![OscType::Int(rack.track_id), OscType::Int(rack.device_id)];
            osc.send(STOP_LISTEN_CHAINS_ADDR, ids.clone());
            osc.send(STOP_LISTEN_SELECTED_ADDR, ids);
        }
        if let Some(route) = self.chains_route.take() {
            router.unsubscribe(route);
        }
        if let Some(route) = self.selected_route.take() {
            router.unsubscribe(route);
        }
    }

    /// Notifications embed the rack ids; the transport is shared, so
    /// anything addressed to another rack is dropped here.
    fn is_for_current_rack(&self, msg: &OscMessage) -> bool {
        let Some(rack) = &self.rack else {
            return false;
        };
        let track = msg.args.first().map(int_arg).unwrap_or(-1);
        let device = msg.args.get(1).map(int_arg).unwrap_or(-1);
        track == rack.track_id && device == rack.device_id
    }

    fn update_active_flags(&mut self, active: i32) {
        for chain in &mut self.chains {
            chain.is_active = chain.index == active;
        }
    }

    fn emit_state(&mut self) {
        let state = self.state();
        self.state_subs.retain(|tx| tx.send(state.clone()).is_ok());
    }
}
