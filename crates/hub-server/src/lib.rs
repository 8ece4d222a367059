//! Hub server wiring: MQTT ingest dispatch for the coordination core.

pub mod ingest;
