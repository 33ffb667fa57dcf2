//! Events - Race notifications and the bus that delivers them
//!
//! The coordinator publishes into a queue while it mutates state; queued
//! events are dispatched in order by [`EventBus::process`]. Listeners are
//! registered through [`EventBus::subscribe`] and stay registered for as long
//! as the returned [`Subscription`] is alive.

use std::mem;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::race_server::player::PlayerId;
use crate::race_server::ranking::RaceResult;
use crate::race_server::sections::SectionId;

/// Power-up kinds a player can pick up on the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUpKind {
    /// Collector runs faster
    SpeedUp,
    /// Everyone except the collector runs slower
    SlowDown,
}

/// Something observers may want to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RaceEvent {
    PlayerJoined { id: PlayerId, name: String, slot: u32 },
    AllPlayersJoined,
    AllAvatarsReady,
    CountdownStarted,
    CountdownTick(u32),
    RaceStarted,
    PlayerStunned(PlayerId),
    PlayerResumed(PlayerId),
    PlayerEliminated(PlayerId),
    PowerUpApplied { collector: PlayerId, kind: PowerUpKind },
    SectionSpawned { id: SectionId, start_offset: f32, variant: usize },
    SectionRetired(SectionId),
    RaceFinished(Vec<RaceResult>),
    RaceReset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SubscriberId(u64);

type Listener = Box<dyn FnMut(&RaceEvent) + Send>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(SubscriberId, Listener)>,
    dispatching: bool,
    // Unsubscribed while their listener vector was checked out for dispatch
    removed: Vec<SubscriberId>,
}

impl Registry {
    fn remove(&mut self, id: SubscriberId) {
        self.listeners.retain(|(sub_id, _)| *sub_id != id);
        if self.dispatching {
            self.removed.push(id);
        }
    }
}

/// Event bus for race notifications
#[derive(Default)]
pub struct EventBus {
    queue: Vec<RaceEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next dispatch
    pub fn publish(&mut self, event: RaceEvent) {
        self.queue.push(event);
    }

    /// Register a listener. It is removed when the handle is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&RaceEvent) + Send + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriberId(registry.next_id);
        registry.listeners.push((id, Box::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver all queued events to the listeners, oldest first, and hand
    /// them back to the caller.
    pub fn process(&mut self) -> Vec<RaceEvent> {
        let events = mem::take(&mut self.queue);
        if events.is_empty() {
            return events;
        }

        // Listeners run without the lock held so they may subscribe or drop
        // handles from inside a callback.
        let mut active = {
            let mut registry = self.registry.lock();
            registry.dispatching = true;
            mem::take(&mut registry.listeners)
        };

        for event in &events {
            for (_, listener) in active.iter_mut() {
                listener(event);
            }
        }

        let mut registry = self.registry.lock();
        registry.dispatching = false;
        let removed = mem::take(&mut registry.removed);
        active.retain(|(id, _)| !removed.contains(id));
        let added = mem::take(&mut registry.listeners);
        active.extend(added);
        registry.listeners = active;

        events
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

/// Scoped listener registration. Dropping it deregisters the listener.
#[must_use = "the listener is removed as soon as the subscription is dropped"]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.id);
        }
    }
}
