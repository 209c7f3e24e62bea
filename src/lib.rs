//! exam-shell: event-driven application shell for exam and student records.
//!
//! ARCHITECTURE
//! ============
//! Components never hold references to each other. They talk through three
//! coordination pieces:
//!
//! - [`broker::EventBroker`] turns request events into HTTP fetches and
//!   republishes results as ready events (single-flight, cancellable).
//! - [`router::Router`] maps the navigation hash to a view and publishes
//!   `router-update` with a freshly built instance.
//! - [`registry::ComponentRegistry`] loads and defines each component tag at
//!   most once.
//!
//! [`app::App`] wires them together with a shared [`bus::EventBus`] and
//! [`navigation::Navigation`].

pub mod app;
pub mod broker;
pub mod bus;
pub mod config;
pub mod console;
pub mod events;
pub mod fetch;
pub mod navigation;
pub mod registry;
pub mod router;
pub mod shell;
pub mod views;
