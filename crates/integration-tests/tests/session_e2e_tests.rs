// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! End-to-end tests: a real session and socket transport against a scripted engine.

use std::path::Path;

use dbgp_common::{BreakpointLocation, DebuggerConfig};
use dbgp_integration_tests::test_utils::{engine::FakeEngine, harness::SessionHarness, init};
use dbgp_protocol::{
    testing::{breakpoint_set_xml, context_xml, stack_xml, status_xml, FrameXml, PropertyXml},
    CommandKind,
};
use dbgp_session::{SessionEvent, SessionStatus};
use tracing::info;

const SCRIPT: &str = "file:///srv/app/index.php";

#[tokio::test]
async fn test_attach_replay_step_and_inspect() {
    init::init_test_environment();
    info!("Testing a full attach, break and inspect cycle");

    let mut h = SessionHarness::start(
        DebuggerConfig::default(),
        &["/srv/app/index.php:4", "render()"],
    )
    .await
    .unwrap();
    let mut engine = FakeEngine::connect(h.addr).await.unwrap();
    engine.handshake(SCRIPT).await.unwrap();
    h.pump_until(|e| matches!(e, SessionEvent::EngineAttached { .. })).await.unwrap();

    engine.expect("feature_set").await.unwrap();
    engine.expect("feature_set").await.unwrap();
    let (line_bp, line_id) = engine.expect("breakpoint_set").await.unwrap();
    assert_eq!(line_bp.arg_value('f'), Some(SCRIPT));
    assert_eq!(line_bp.arg_value('n'), Some("4"));
    let (call_bp, call_id) = engine.expect("breakpoint_set").await.unwrap();
    assert_eq!(call_bp.arg_value('m'), Some("render"));
    let (_, step_id) = engine.expect("step_into").await.unwrap();
    assert_eq!(step_id.0, 5);

    engine.send(&breakpoint_set_xml(call_id, "2")).await.unwrap();
    engine.send(&breakpoint_set_xml(line_id, "1")).await.unwrap();
    engine.send(&status_xml("step_into", step_id, "break")).await.unwrap();
    h.pump_until(|e| *e == SessionEvent::StatusChanged { status: SessionStatus::Break })
        .await
        .unwrap();

    let bp = h.session.breakpoints().get(&BreakpointLocation::line("/srv/app/index.php", 4)).unwrap();
    assert_eq!(bp.engine_id.as_deref(), Some("1"));

    let (_, stack_id) = engine.expect("stack_get").await.unwrap();
    let frames = [
        FrameXml::new("render", "file:///srv/app/view.php", 12),
        FrameXml::new("{main}", SCRIPT, 4),
    ];
    engine.send(&stack_xml(stack_id, &frames)).await.unwrap();
    h.pump_until(|e| matches!(e, SessionEvent::StackReplaced { frames } if frames.len() == 2))
        .await
        .unwrap();
    assert_eq!(h.session.stack()[1].file, Path::new("/srv/app/index.php"));

    h.session.load_stack_frame(1).unwrap();
    let (get, get_id) = engine.expect("context_get").await.unwrap();
    assert_eq!(get.arg_value('d'), Some("1"));
    let locals = [PropertyXml::new("$title", "$title", "string").value("héllo\nwörld")];
    engine.send(&context_xml(get_id, &locals)).await.unwrap();
    h.pump_until(|e| matches!(e, SessionEvent::FrameLoaded { .. })).await.unwrap();

    let title = h.session.frame(1).unwrap().variable("$title").unwrap();
    assert_eq!(title.value.as_deref(), Some("héllo\nwörld"));
}

#[tokio::test]
async fn test_handshake_split_across_reads() {
    init::init_test_environment();
    info!("Testing a handshake written in small pieces");

    let mut h = SessionHarness::start(DebuggerConfig::default(), &[]).await.unwrap();
    let mut engine = FakeEngine::connect(h.addr).await.unwrap();
    engine.send_chunked(&dbgp_protocol::testing::init_xml(SCRIPT), 7).await.unwrap();

    let attached = h.pump_until(|e| matches!(e, SessionEvent::EngineAttached { .. })).await.unwrap();
    assert_eq!(
        attached,
        SessionEvent::EngineAttached {
            language: Some("PHP".to_string()),
            file: Some("/srv/app/index.php".into()),
            idekey: Some("dbgp".to_string()),
        }
    );
    let (command, _) = engine.expect("feature_set").await.unwrap();
    assert_eq!(command.kind(), &CommandKind::FeatureSet);
}

#[tokio::test]
async fn test_reconnect_replays_breakpoints() {
    init::init_test_environment();
    info!("Testing re-listen and breakpoint replay after a disconnect");

    let config = DebuggerConfig { break_on_first_line: false, ..Default::default() };
    let mut h = SessionHarness::start(config, &["/srv/app/index.php:9"]).await.unwrap();

    let mut engine = FakeEngine::connect(h.addr).await.unwrap();
    engine.handshake(SCRIPT).await.unwrap();
    h.pump_until(|e| matches!(e, SessionEvent::EngineAttached { .. })).await.unwrap();
    engine.expect("feature_set").await.unwrap();
    engine.expect("feature_set").await.unwrap();
    let (_, first_id) = engine.expect("breakpoint_set").await.unwrap();
    engine.expect("run").await.unwrap();
    engine.send(&breakpoint_set_xml(first_id, "100")).await.unwrap();
    h.pump_until(|e| match e {
        SessionEvent::BreakpointsChanged { breakpoints } => {
            breakpoints.first().is_some_and(|b| b.engine_id.is_some())
        }
        _ => false,
    })
    .await
    .unwrap();

    engine.hang_up().await.unwrap();
    h.pump_until(|e| *e == SessionEvent::Disconnected).await.unwrap();
    let addr = h.wait_listening().await.unwrap();
    assert_eq!(addr.port(), h.addr.port());
    assert!(h.session.breakpoints().all().iter().all(|b| b.engine_id.is_none()));
    assert_eq!(h.session.pending_commands(), 0);

    let mut engine = FakeEngine::connect(addr).await.unwrap();
    engine.handshake(SCRIPT).await.unwrap();
    h.pump_until(|e| matches!(e, SessionEvent::EngineAttached { .. })).await.unwrap();
    engine.expect("feature_set").await.unwrap();
    engine.expect("feature_set").await.unwrap();
    let (replayed, second_id) = engine.expect("breakpoint_set").await.unwrap();
    assert_eq!(replayed.arg_value('n'), Some("9"));
    assert!(second_id > first_id, "transaction ids continue across connections");
}

#[tokio::test]
async fn test_stopping_engine_is_stopped() {
    init::init_test_environment();
    info!("Testing the stopping handshake");

    let config = DebuggerConfig { auto_attach: false, ..Default::default() };
    let mut h = SessionHarness::start(config, &[]).await.unwrap();
    let mut engine = FakeEngine::connect(h.addr).await.unwrap();
    engine.handshake(SCRIPT).await.unwrap();
    h.pump_until(|e| matches!(e, SessionEvent::EngineAttached { .. })).await.unwrap();

    engine.expect("feature_set").await.unwrap();
    engine.expect("feature_set").await.unwrap();
    let (_, step_id) = engine.expect("step_into").await.unwrap();
    engine.send(&status_xml("step_into", step_id, "stopping")).await.unwrap();
    h.pump_until(|e| *e == SessionEvent::StatusChanged { status: SessionStatus::Stopping })
        .await
        .unwrap();

    let (_, stop_id) = engine.expect("stop").await.unwrap();
    engine.send(&status_xml("stop", stop_id, "stopped")).await.unwrap();
    h.pump_until(|e| *e == SessionEvent::StatusChanged { status: SessionStatus::Stopped })
        .await
        .unwrap();

    engine.hang_up().await.unwrap();
    h.pump_until(|e| *e == SessionEvent::Disconnected).await.unwrap();
    assert_eq!(h.session.status(), SessionStatus::Disconnected);
}
