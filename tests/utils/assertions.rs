//! Test assertion helpers - fluent API for verifying received events
#![allow(dead_code)] // Test utilities may not all be used in every test

use serde_json::Value;

use cloudclip::websockets::{EventName, OutboundEvent};

use super::setup::TestSetup;

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct EventAssertion {
    client: String,
    events: Vec<OutboundEvent>,
}

impl EventAssertion {
    /// Takes everything `client` received since the last check
    pub async fn for_client(setup: &TestSetup, client: &str) -> Self {
        Self {
            client: client.to_string(),
            events: setup.sink(client).take_events().await,
        }
    }

    /// Asserts the exact sequence of event names
    pub fn names(self, expected: &[EventName]) -> Self {
        let names: Vec<EventName> = self.events.iter().map(|e| e.event).collect();
        assert_eq!(names, expected, "{} received unexpected events", self.client);
        self
    }

    pub fn nothing(self) {
        assert!(
            self.events.is_empty(),
            "{} should not have received anything, got {:?}",
            self.client,
            self.events
        );
    }

    /// Payload of the only event named `name`
    pub fn single(&self, name: EventName) -> &Value {
        let matching: Vec<&OutboundEvent> = self.events.iter().filter(|e| e.event == name).collect();
        assert_eq!(
            matching.len(),
            1,
            "{} should have received exactly one {} event",
            self.client,
            name
        );
        &matching[0].data
    }

    /// Payloads of every event named `name`, in arrival order
    pub fn all(&self, name: EventName) -> Vec<&Value> {
        self.events
            .iter()
            .filter(|e| e.event == name)
            .map(|e| &e.data)
            .collect()
    }
}
