//! Declarative verification scenarios.
//!
//! A scenario file describes one run: session options, pre-navigation
//! scripts, mock routes in registration order, and the steps to execute.
//!
//! ```yaml
//! version: "1.0"
//! name: club-overview
//! base_url: http://localhost:3000
//! routes:
//!   - id: club
//!     pattern: "**/api/club/1"
//!     method: GET
//!     json: { id: 1, name: "My Club" }
//! steps:
//!   - navigate: { url: /club }
//!   - wait: { route: club }
//!   - expect_text: { selector: ".club-name", equals: "My Club" }
//! ```

mod runner;
mod schema;

pub use schema::{
    InitScriptSpec, RouteSpec, Scenario, SessionSection, Step, WaitStep, SCENARIO_VERSION,
};
