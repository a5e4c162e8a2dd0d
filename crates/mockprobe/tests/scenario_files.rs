//! The scenario files shipped under `scenarios/` parse, validate and
//! register their routes the way the pages expect.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use mockprobe::network::RouteDecision;
use mockprobe::{HttpMethod, InterceptedRequest, Scenario, UnmatchedPolicy};
use std::path::PathBuf;

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

fn load(name: &str) -> Scenario {
    Scenario::load(scenarios_dir().join(name)).unwrap()
}

#[test]
fn test_every_shipped_scenario_is_valid() {
    let mut seen = 0;
    for entry in std::fs::read_dir(scenarios_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let scenario = Scenario::load(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
        assert!(scenario.issues().is_empty());
        scenario.session_config().unwrap();
        seen += 1;
    }
    assert!(seen >= 5);
}

#[test]
fn test_user_management_routes_do_not_overlap() {
    let table = load("user_management.yaml").route_table().unwrap();
    let users = table
        .matching_route("http://localhost:3000/api/admin/users?page=0&size=20", &HttpMethod::Get)
        .unwrap();
    assert_eq!(users.label, "users");
    let dashboard = table
        .matching_route("http://localhost:3000/api/admin/users/dashboard", &HttpMethod::Get)
        .unwrap();
    assert_eq!(dashboard.label, "dashboard");
}

#[test]
fn test_user_management_injects_admin() {
    let config = load("user_management.yaml").session_config().unwrap();
    assert_eq!(config.init_scripts.len(), 1);
    assert!(config.init_scripts[0].source().contains("ROLE_ADMIN"));
}

#[test]
fn test_team_aborts_unmocked_calls() {
    let scenario = load("team.yaml");
    assert_eq!(scenario.session_config().unwrap().unmatched, UnmatchedPolicy::Abort);
    let table = scenario.route_table().unwrap();
    let history = InterceptedRequest::new(
        HttpMethod::Get,
        "http://localhost:3000/api/injuries/team/1/history",
    );
    assert!(matches!(table.dispatch(&history), RouteDecision::Abort(_)));
}

#[test]
fn test_registration_only_answers_post() {
    let table = load("infrastructure.yaml").route_table().unwrap();
    assert!(table
        .matching_route("http://localhost:3000/api/user/register", &HttpMethod::Get)
        .is_none());
    let post = InterceptedRequest::new(HttpMethod::Post, "http://localhost:3000/api/user/register");
    let RouteDecision::Fulfill(response) = table.dispatch(&post) else {
        panic!("registration should be mocked");
    };
    assert_eq!(response.status, 201);
}
