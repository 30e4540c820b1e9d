//! Per-facet change detection
//!
//! Each facet keeps a shadow of the last value *observed from the network*
//! (not the last value notified). The shadow is refreshed on every accepted
//! poll; a notification is due only when the new key differs from it.
//!
//! Polls may overlap and complete out of order. Every request takes a ticket
//! when it is issued, and a completion whose ticket is older than the newest
//! completion already applied is discarded instead of regressing the shadow.

/// Issue order of one request for one facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Outcome of feeding a completed poll to a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Differs from the shadow; notify
    Changed,
    /// Same as the shadow; shadow refreshed, no notification
    Unchanged,
    /// A newer request already completed; ignored entirely
    Stale,
}

impl Observation {
    pub fn is_changed(self) -> bool {
        self == Observation::Changed
    }
}

#[derive(Debug)]
pub struct ChangeDetector<K> {
    last: Option<K>,
    issued: u64,
    applied: u64,
}

impl<K> Default for ChangeDetector<K> {
    fn default() -> Self {
        Self {
            last: None,
            issued: 0,
            applied: 0,
        }
    }
}

impl<K: PartialEq> ChangeDetector<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a ticket for a request about to be sent.
    pub fn ticket(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    pub fn observe(&mut self, ticket: Ticket, key: K) -> Observation {
        if ticket.0 <= self.applied {
            return Observation::Stale;
        }
        self.applied = ticket.0;

        let changed = self.last.as_ref() != Some(&key);
        self.last = Some(key);
        if changed {
            Observation::Changed
        } else {
            Observation::Unchanged
        }
    }

    pub fn last(&self) -> Option<&K> {
        self.last.as_ref()
    }

    /// Drop the shadow only; the next accepted observation counts as a change.
    pub fn forget(&mut self) {
        self.last = None;
    }

    /// Forget the shadow. Tickets issued before the reset become stale, so a
    /// response from a previous session can never land in the new one.
    pub fn reset(&mut self) {
        self.last = None;
        self.applied = self.issued;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_a_change() {
        let mut d = ChangeDetector::new();
        let t = d.ticket();
        assert_eq!(d.observe(t, 55), Observation::Changed);
        assert_eq!(d.last(), Some(&55));
    }

    #[test]
    fn repeated_value_notifies_once() {
        let mut d = ChangeDetector::new();
        let t1 = d.ticket();
        let t2 = d.ticket();
        assert!(d.observe(t1, 55).is_changed());
        assert_eq!(d.observe(t2, 55), Observation::Unchanged);
    }

    #[test]
    fn out_of_order_completion_is_discarded() {
        let mut d = ChangeDetector::new();
        let older = d.ticket();
        let newer = d.ticket();
        assert!(d.observe(newer, "a1".to_string()).is_changed());
        assert_eq!(d.observe(older, "a0".to_string()), Observation::Stale);
        assert_eq!(d.last().map(String::as_str), Some("a1"));
    }

    #[test]
    fn forget_keeps_in_flight_tickets_valid() {
        let mut d = ChangeDetector::new();
        let t = d.ticket();
        assert!(d.observe(t, "h1").is_changed());

        let in_flight = d.ticket();
        d.forget();
        assert_eq!(d.observe(in_flight, "h1"), Observation::Changed);
    }

    #[test]
    fn reset_forgets_shadow_and_invalidates_in_flight_tickets() {
        let mut d = ChangeDetector::new();
        let t = d.ticket();
        assert!(d.observe(t, true).is_changed());

        let in_flight = d.ticket();
        d.reset();
        assert_eq!(d.last(), None);
        assert_eq!(d.observe(in_flight, true), Observation::Stale);

        // Same value as before the reset still counts as a change
        let t = d.ticket();
        assert_eq!(d.observe(t, true), Observation::Changed);
    }
}
