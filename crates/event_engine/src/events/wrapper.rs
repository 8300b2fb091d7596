//! Generic payload wrapper event
//!
//! Lets plain values (`u32`, small structs, ...) travel through the queue and
//! batch processor without a dedicated event kind. Wrappers are pooled per
//! payload kind by [`crate::pool::WrapperPool`].

use super::{Event, EventBase};
use crate::pool::Poolable;

/// Event carrying an arbitrary payload
#[derive(Debug)]
pub struct EventWrapper<T> {
    base: EventBase,
    payload: Option<T>,
    source: Option<&'static str>,
    immediate: bool,
}

impl<T: Send + 'static> EventWrapper<T> {
    /// Wrap a payload without going through a pool
    pub fn new(payload: T, source: Option<&'static str>, priority: i32, immediate: bool) -> Self {
        let mut wrapper = Self::default();
        wrapper.fill(payload, source, priority, immediate);
        wrapper
    }

    /// Populate a freshly initialized wrapper
    pub(crate) fn fill(
        &mut self,
        payload: T,
        source: Option<&'static str>,
        priority: i32,
        immediate: bool,
    ) {
        self.payload = Some(payload);
        self.source = source;
        self.base.priority = priority;
        self.immediate = immediate;
    }

    /// Borrow the payload
    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// Mutably borrow the payload
    pub fn payload_mut(&mut self) -> Option<&mut T> {
        self.payload.as_mut()
    }

    /// Take the payload out, leaving the wrapper empty
    pub fn take_payload(&mut self) -> Option<T> {
        self.payload.take()
    }

    /// Name of the producer, if one was given
    pub fn source(&self) -> Option<&'static str> {
        self.source
    }

    /// Whether the producer asked for same-tick delivery
    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    /// Change the priority before the wrapper is enqueued
    pub fn set_priority(&mut self, priority: i32) {
        self.base.priority = priority;
    }
}

impl<T> Default for EventWrapper<T> {
    fn default() -> Self {
        Self {
            base: EventBase::default(),
            payload: None,
            source: None,
            immediate: false,
        }
    }
}

impl<T: Send + 'static> Event for EventWrapper<T> {
    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn is_disposed(&self) -> bool {
        self.base.is_disposed()
    }

    fn is_poolable(&self) -> bool {
        self.base.is_poolable()
    }

    // A wrapper whose payload was taken has nothing left to dispatch.
    fn is_valid(&self) -> bool {
        !self.base.is_disposed() && self.payload.is_some()
    }

    fn dispose(&mut self) {
        self.base.dispose();
    }
}

impl<T: Send + 'static> Poolable for EventWrapper<T> {
    fn initialize(&mut self) {
        self.base.initialize();
    }

    fn reset(&mut self) {
        self.base.reset();
        self.payload = None;
        self.source = None;
        self.immediate = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_validity_tracks_payload() {
        let mut wrapper = EventWrapper::new(42_u32, Some("network"), 3, true);
        assert!(wrapper.is_valid());
        assert_eq!(wrapper.priority(), 3);
        assert_eq!(wrapper.source(), Some("network"));
        assert!(wrapper.is_immediate());

        assert_eq!(wrapper.take_payload(), Some(42));
        assert!(!wrapper.is_valid());
    }

    #[test]
    fn test_reset_clears_payload_and_flags() {
        let mut wrapper = EventWrapper::new(String::from("secret"), Some("loader"), 9, true);
        wrapper.reset();

        assert!(wrapper.payload().is_none());
        assert!(wrapper.source().is_none());
        assert!(!wrapper.is_immediate());
        assert_eq!(wrapper.priority(), 0);
    }
}
