//! Event kinds produced by the simulated game loop

use event_engine::events::{Event, EventBase};
use event_engine::pool::{EventPool, Poolable};

/// Two bodies touched this tick
#[derive(Debug, Default)]
pub struct CollisionEvent {
    base: EventBase,
    pub entity_a: u32,
    pub entity_b: u32,
    pub impulse: f32,
}

impl CollisionEvent {
    /// Fill a pooled instance
    pub fn set(&mut self, entity_a: u32, entity_b: u32, impulse: f32, priority: i32) {
        self.entity_a = entity_a;
        self.entity_b = entity_b;
        self.impulse = impulse;
        self.base.priority = priority;
    }
}

impl Event for CollisionEvent {
    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn is_disposed(&self) -> bool {
        self.base.is_disposed()
    }

    fn is_poolable(&self) -> bool {
        self.base.is_poolable()
    }

    fn dispose(&mut self) {
        self.base.dispose();
    }
}

impl Poolable for CollisionEvent {
    fn initialize(&mut self) {
        self.base.initialize();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.entity_a = 0;
        self.entity_b = 0;
        self.impulse = 0.0;
    }
}

/// An entity should appear next tick
#[derive(Debug, Default)]
pub struct SpawnEvent {
    base: EventBase,
    pub archetype: u16,
    pub position: [f32; 3],
}

impl SpawnEvent {
    /// Fill a pooled instance
    pub fn set(&mut self, archetype: u16, position: [f32; 3], priority: i32) {
        self.archetype = archetype;
        self.position = position;
        self.base.priority = priority;
    }
}

impl Event for SpawnEvent {
    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn is_disposed(&self) -> bool {
        self.base.is_disposed()
    }

    fn is_poolable(&self) -> bool {
        self.base.is_poolable()
    }

    fn dispose(&mut self) {
        self.base.dispose();
    }
}

impl Poolable for SpawnEvent {
    fn initialize(&mut self) {
        self.base.initialize();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.archetype = 0;
        self.position = [0.0; 3];
    }
}

/// Per-event handling cost, batched for the telemetry sink
#[derive(Debug, Default)]
pub struct TelemetrySample {
    base: EventBase,
    pub kind: &'static str,
    pub priority_seen: i32,
}

impl Event for TelemetrySample {
    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn is_disposed(&self) -> bool {
        self.base.is_disposed()
    }

    fn is_poolable(&self) -> bool {
        self.base.is_poolable()
    }

    fn dispose(&mut self) {
        self.base.dispose();
    }
}

impl Poolable for TelemetrySample {
    fn initialize(&mut self) {
        self.base.initialize();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.kind = "";
        self.priority_seen = 0;
    }
}

/// Closed set of kinds sharing the main queue
#[derive(Debug)]
pub enum SimEvent {
    /// Physics contact
    Collision(CollisionEvent),
    /// Entity spawn request
    Spawn(SpawnEvent),
}

impl SimEvent {
    /// Short label for logs and telemetry
    pub fn label(&self) -> &'static str {
        match self {
            Self::Collision(_) => "collision",
            Self::Spawn(_) => "spawn",
        }
    }

    /// Hand the inner event back to its pool
    pub fn release_to(self, pool: &EventPool) {
        match self {
            Self::Collision(event) => pool.release(event),
            Self::Spawn(event) => pool.release(event),
        };
    }

    fn inner(&self) -> &dyn Event {
        match self {
            Self::Collision(event) => event,
            Self::Spawn(event) => event,
        }
    }
}

impl Event for SimEvent {
    fn priority(&self) -> i32 {
        self.inner().priority()
    }

    fn is_disposed(&self) -> bool {
        self.inner().is_disposed()
    }

    fn is_poolable(&self) -> bool {
        self.inner().is_poolable()
    }

    fn dispose(&mut self) {
        match self {
            Self::Collision(event) => event.dispose(),
            Self::Spawn(event) => event.dispose(),
        }
    }
}
