//! Edge case and boundary condition tests for the interlocking core

use std::sync::Arc;

use rs_interlock::parsing::{parse_abort_signal, parse_normal_turnout, parse_turnout};
use rs_interlock::{
    Config, DeviceClass, DeviceState, ErrorKind, InterlockTable, IoDocument, RouteState,
    SectionState, SignalState, SimulatedController, SimulatorConfig, StationConfig,
    StationManager, TurnoutState, Violation,
};

fn station(table: &str, sim: SimulatedController) -> StationManager<SimulatedController> {
    StationManager::new(
        Arc::new(sim),
        InterlockTable::from_json_str(table).unwrap(),
        Config::default(),
    )
}

fn instant() -> SimulatedController {
    SimulatedController::new(SimulatorConfig::instant())
}

// ============================================================================
// Token Boundaries
// ============================================================================

#[test]
fn turnout_tokens_from_the_table_grammar() {
    let cmds = parse_turnout("(5/6)").unwrap();
    assert_eq!(cmds.len(), 2);
    assert_eq!(cmds[0].id, "5");
    assert_eq!(cmds[1].state, TurnoutState::Reversed);

    assert!(parse_turnout("abc").is_err());
    assert!(parse_turnout("5-6").is_err());
    assert_eq!(parse_normal_turnout("(5)").unwrap()[0].state, TurnoutState::Normal);
}

#[test]
fn abort_signal_only_looks_at_id() {
    assert_eq!(parse_abort_signal("D7-anything").unwrap().state, SignalState::Blue);
    assert_eq!(parse_abort_signal("SD7-L").unwrap().state, SignalState::Red);
}

// ============================================================================
// Table Loading
// ============================================================================

#[test]
fn malformed_turnout_token_is_fatal_at_load() {
    let err = InterlockTable::from_json_str(r#"{"R": {"turnouts": ["5", "(7"]}}"#).unwrap_err();
    assert!(format!("{:#}", err).contains("(7"));
}

#[test]
fn malformed_json_is_fatal_at_load() {
    assert!(InterlockTable::from_json_str("[1, 2").is_err());
    assert!(IoDocument::from_json_str("{\"sections\": 5}").is_err());
}

#[test]
fn missing_documents_are_fatal() {
    let config = Config::default().with_station(
        StationConfig::default()
            .with_interlock_path("/nonexistent/interlock.json")
            .with_io_path("/nonexistent/io.json"),
    );
    assert!(StationManager::simulated(config).is_err());
}

#[test]
fn empty_table_loads() {
    let table = InterlockTable::from_json_str("{}").unwrap();
    assert!(table.is_empty());
}

#[test]
fn enemy_reference_to_unknown_route_is_tolerated() {
    let table = InterlockTable::from_json_str(r#"{"R": {"enemies": ["GHOST"]}}"#).unwrap();
    let r = table.get("R").unwrap();
    assert!(table.living_among(&r.enemies).is_empty());
}

// ============================================================================
// Degenerate Routes
// ============================================================================

#[tokio::test]
async fn route_without_devices_toggles() {
    let station = station(r#"{"EMPTY": {"buttons": ["E"]}}"#, instant());
    station.create_route("EMPTY").await.unwrap();
    assert_eq!(station.route_by_name("EMPTY").unwrap().state(), RouteState::Alive);
    station.cancel_route("EMPTY").await.unwrap();
    assert_eq!(station.route_by_name("EMPTY").unwrap().state(), RouteState::Idle);
}

#[tokio::test]
async fn route_listing_itself_as_enemy_is_not_blocked() {
    let station = station(r#"{"SELF": {"enemies": ["SELF"], "conflicts": ["SELF"]}}"#, instant());
    station.create_route("SELF").await.unwrap();
}

#[tokio::test]
async fn section_unknown_to_controller_is_not_free() {
    let station = station(r#"{"R": {"sections": ["ZZ"]}}"#, instant());
    let err = station.create_route("R").await.unwrap_err();
    assert!(err.has_violation(|v| matches!(v, Violation::SectionsNotFree { sections } if sections == &["ZZ"])));
}

#[tokio::test]
async fn cancel_of_idle_route_is_rejected() {
    let station = station(r#"{"R": {}}"#, instant());
    let err = station.cancel_route("R").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_violation(|v| matches!(v, Violation::NotLivingRoute { .. })));
}

#[tokio::test]
async fn unknown_route_and_buttons_are_not_found() {
    let station = station(r#"{"R": {"buttons": ["A", "B"]}}"#, instant());
    assert_eq!(station.cancel_route("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(station.route_by_buttons::<&str>(&[]).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(station.route_by_buttons(&["B", "A"]).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(station.route_by_buttons(&["A", "B"]).unwrap().id, "R");
}

// ============================================================================
// Broken Devices
// ============================================================================

#[tokio::test]
async fn broken_device_is_frozen_until_repaired() {
    let sim = instant().with_turnout("1", TurnoutState::Broken);
    let station = station("{}", sim);
    let mut events = station.subscribe();

    station.controller().set_turnout("1", TurnoutState::Normal);
    assert_eq!(station.refresh_station_status(), 0);
    assert_eq!(station.turnout_state("1"), Some(TurnoutState::Broken));
    assert!(events.drain().is_empty());

    let event = station.repair_device(DeviceClass::Turnout, "1").unwrap();
    assert_eq!(event.old, DeviceState::Turnout(TurnoutState::Broken));
    assert_eq!(event.new, DeviceState::Turnout(TurnoutState::Normal));
    assert_eq!(events.drain(), vec![event]);
}

#[test]
fn repair_of_unknown_device_does_nothing() {
    let station = station("{}", instant());
    assert!(station.repair_device(DeviceClass::Signal, "nope").is_none());
}

#[tokio::test]
async fn broken_turnout_previous_state_is_not_reverted_to() {
    let sim = instant().with_section("1G", SectionState::Free).with_turnout("1", TurnoutState::Unknown);
    sim.stick(DeviceClass::Turnout, "1");
    let station = StationManager::new(
        Arc::new(sim),
        InterlockTable::from_json_str(r#"{"R": {"sections": ["1G"], "turnouts": ["(1)"]}}"#).unwrap(),
        Config::default().with_actuation(
            rs_interlock::ActuationConfig::default()
                .with_deadline_ms(50)
                .with_poll_interval_ms(5),
        ),
    );

    let err = station.create_route("R").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceTimeout);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    // Only the original command; no revert to Unknown.
    assert_eq!(station.controller().writes().len(), 1);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn resubscribe_ends_previous_stream() {
    let station = station("{}", instant().with_section("1G", SectionState::Free));
    let mut first = station.subscribe();
    let mut second = station.subscribe();

    station.controller().set_section("1G", SectionState::Occupied);
    station.refresh_station_status();

    assert!(first.next().await.is_none());
    let event = second.next().await.unwrap();
    assert_eq!(event.id, "1G");
}

#[test]
fn zero_capacity_is_clamped() {
    let config = Config::default().with_events(rs_interlock::EventConfig::default().with_capacity(0));
    let station = StationManager::new(
        Arc::new(instant().with_section("1G", SectionState::Free)),
        InterlockTable::default(),
        config,
    );
    let mut events = station.subscribe();
    station.controller().set_section("1G", SectionState::Occupied);
    station.refresh_station_status();
    assert_eq!(events.drain().len(), 1);
}
