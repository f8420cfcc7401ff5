//! Session and subscription state.

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::protocol::{Connect, SubAck, SubscribeFilter, SubscribeReturnCode};
use crate::types::QoS;

/// Per-connection session data, handed to every [`Handler`](crate::Handler) callback.
#[derive(Debug)]
pub struct Session {
    config: ClientConfig,
    connected_at: Option<Instant>,
    subscriptions: SubscriptionState,
}

impl Session {
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connected_at: None,
            subscriptions: SubscriptionState::default(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// When the current connection was accepted.
    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    pub fn subscriptions(&self) -> &SubscriptionState {
        &self.subscriptions
    }

    /// Acknowledged subscriptions and their granted QoS.
    pub fn topics(&self) -> &BTreeMap<String, QoS> {
        &self.subscriptions.topics
    }

    pub(crate) fn subscriptions_mut(&mut self) -> &mut SubscriptionState {
        &mut self.subscriptions
    }

    pub(crate) fn set_connected_at(&mut self, at: Option<Instant>) {
        self.connected_at = at;
    }

    pub(crate) fn connect_packet(&self) -> Connect {
        let config = &self.config;
        Connect {
            protocol: config.protocol_version,
            keep_alive: config.keep_alive,
            client_id: config.client_id.clone(),
            clean_session: config.clean_session,
            will: config.will.clone(),
            username: config.username.clone(),
            password: config.password.clone().map(Into::into),
        }
    }
}

/// Current subscriptions plus requests not yet sent or not yet acknowledged.
#[derive(Debug, Default)]
pub struct SubscriptionState {
    topics: BTreeMap<String, QoS>,
    to_subscribe: BTreeMap<String, QoS>,
    to_unsubscribe: Vec<String>,
    subscribe_awaits: HashMap<u16, Vec<SubscribeFilter>>,
    unsubscribe_awaits: HashMap<u16, Vec<String>>,
}

impl SubscriptionState {
    pub fn topics(&self) -> &BTreeMap<String, QoS> {
        &self.topics
    }

    /// Whether any subscribe or unsubscribe request is queued or in flight.
    pub fn has_pending(&self) -> bool {
        !self.to_subscribe.is_empty()
            || !self.to_unsubscribe.is_empty()
            || !self.subscribe_awaits.is_empty()
            || !self.unsubscribe_awaits.is_empty()
    }

    /// Nothing pending and nothing subscribed.
    pub fn is_idle(&self) -> bool {
        !self.has_pending() && self.topics.is_empty()
    }

    pub(crate) fn queue_subscribe(&mut self, filters: impl IntoIterator<Item = (String, QoS)>) {
        for (filter, qos) in filters {
            self.to_unsubscribe.retain(|f| f != &filter);
            self.to_subscribe.insert(filter, qos);
        }
    }

    pub(crate) fn queue_unsubscribe(&mut self, filters: impl IntoIterator<Item = String>) {
        for filter in filters {
            self.to_subscribe.remove(&filter);
            if !self.to_unsubscribe.contains(&filter) {
                self.to_unsubscribe.push(filter);
            }
        }
    }

    pub(crate) fn take_subscribe(&mut self) -> Vec<SubscribeFilter> {
        std::mem::take(&mut self.to_subscribe)
            .into_iter()
            .map(|(filter, qos)| SubscribeFilter::new(filter, qos))
            .collect()
    }

    pub(crate) fn take_unsubscribe(&mut self) -> Vec<String> {
        std::mem::take(&mut self.to_unsubscribe)
    }

    pub(crate) fn await_subscribe(&mut self, pkid: u16, filters: Vec<SubscribeFilter>) {
        self.subscribe_awaits.insert(pkid, filters);
    }

    pub(crate) fn await_unsubscribe(&mut self, pkid: u16, filters: Vec<String>) {
        self.unsubscribe_awaits.insert(pkid, filters);
    }

    /// Apply a SUBACK. Returns whether it matched an outstanding request.
    ///
    /// A SUBACK whose code count differs from the request changes nothing.
    pub(crate) fn complete_subscribe(&mut self, suback: &SubAck) -> bool {
        let Some(filters) = self.subscribe_awaits.remove(&suback.pkid) else {
            warn!("SUBACK for unknown pkid={}", suback.pkid);
            return false;
        };

        if filters.len() != suback.return_codes.len() {
            warn!(
                "SUBACK pkid={} has {} return codes for {} topics, ignoring",
                suback.pkid,
                suback.return_codes.len(),
                filters.len()
            );
            return true;
        }

        for (filter, code) in filters.into_iter().zip(&suback.return_codes) {
            match code {
                SubscribeReturnCode::Success(granted) => {
                    debug!("Subscribed to {} with qos {:?}", filter.filter, granted);
                    self.topics.insert(filter.filter, *granted);
                }
                SubscribeReturnCode::Failure => {
                    warn!("Subscription to {} was rejected", filter.filter);
                }
            }
        }
        true
    }

    /// Apply an UNSUBACK. Returns the filters that were removed.
    pub(crate) fn complete_unsubscribe(&mut self, pkid: u16) -> Option<Vec<String>> {
        let Some(filters) = self.unsubscribe_awaits.remove(&pkid) else {
            warn!("UNSUBACK for unknown pkid={}", pkid);
            return None;
        };
        for filter in &filters {
            self.topics.remove(filter);
            debug!("Unsubscribed from {}", filter);
        }
        Some(filters)
    }

    /// Queue everything again for a fresh connection.
    ///
    /// Current subscriptions and requests that never got their ack are sent
    /// again on the next loop iteration.
    pub(crate) fn requeue(&mut self) {
        let mut resubscribe: Vec<(String, QoS)> = self
            .topics
            .iter()
            .map(|(filter, qos)| (filter.clone(), *qos))
            .collect();
        for (_, filters) in self.subscribe_awaits.drain() {
            resubscribe.extend(filters.into_iter().map(|f| (f.filter, f.qos)));
        }
        let unsubscribe: Vec<String> = self
            .unsubscribe_awaits
            .drain()
            .flat_map(|(_, f)| f)
            .collect();

        self.queue_subscribe(resubscribe);
        self.queue_unsubscribe(unsubscribe);
    }
}
