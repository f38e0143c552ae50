//! End-to-end tests driving the [`Chamber`] facade over a scripted
//! transport: handshake, polling, recording, operator commands, and
//! connection loss.

use std::path::Path;
use std::time::Duration;

use chamber_daq::transport::mock::MockTransport;
use chamber_daq::{Chamber, ChamberConfig, ChamberError, ChamberEvent, ValveMode};

fn test_config(dir: &Path, failure_threshold: u32) -> ChamberConfig {
    let mut config = ChamberConfig::default();
    config.acquisition.poll_interval_ms = 10;
    config.acquisition.failure_threshold = failure_threshold;
    config.chart.history_window_secs = 1;
    config.logging.output_dir = dir.to_path_buf();
    config
}

/// Pushes the two handshake replies every startup consumes.
fn push_handshake(mock: &MockTransport, threshold: &str, mode: &str) {
    mock.push_reply(threshold);
    mock.push_reply(mode);
}

#[tokio::test(start_paused = true)]
async fn polling_recording_and_log_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockTransport::new();
    push_handshake(&mock, "60", "0");
    mock.push_reply("100\t20.0\t21.0\t40.0\t0");
    mock.push_reply("1100\t20.5\t21.5\t45.0\t1");
    mock.push_reply("2100\t21.0\t22.0\t50.0\t0");

    let chamber = Chamber::start(test_config(dir.path(), 100), mock.clone())
        .await
        .unwrap();
    let mut rx = chamber.subscribe();

    chamber.start_session("humidity ramp").unwrap();
    assert!(chamber.is_recording());
    let log_path = loop {
        match rx.recv().await.unwrap() {
            ChamberEvent::SessionStarted(path) => break path,
            other => panic!("unexpected event before session start: {other:?}"),
        }
    };

    for _ in 0..3 {
        assert_eq!(rx.recv().await.unwrap(), ChamberEvent::CycleCompleted);
    }

    // Every cycle landed in the snapshot and the history buffers.
    let state = chamber.state();
    assert_eq!(state.temp_a, 21.0);
    assert_eq!(state.humidity, 50.0);
    assert_eq!(state.humidity_threshold, 60.0);
    assert!(!state.valve_open);
    assert_eq!(chamber.history().temp_b.len(), 3);

    chamber.stop_session();
    assert_eq!(rx.recv().await.unwrap(), ChamberEvent::SessionStopped);

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.starts_with("[HEADER]\nhumidity ramp\n\n[DATA]\n"));
    let data_lines: Vec<&str> = contents
        .lines()
        .skip_while(|line| *line != "[DATA]")
        .skip(3) // marker, column names, units
        .collect();
    assert_eq!(data_lines.len(), 3);
    assert!(data_lines[0].ends_with("\t20.0\t21.0\t40.0\t0"));
    assert!(data_lines[1].ends_with("\t20.5\t21.5\t45.0\t1"));
    assert!(data_lines[0].starts_with("0.0\t"));

    chamber.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connection_loss_latches_and_blocks_resume() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockTransport::new();
    push_handshake(&mock, "50", "0");
    mock.push_reply("100\t20.0\t21.0\t40.0\t0");
    // Script exhausted: the next poll fails and trips the latch.

    let chamber = Chamber::start(test_config(dir.path(), 1), mock.clone())
        .await
        .unwrap();
    let mut rx = chamber.subscribe();

    chamber.start_session("soak test").unwrap();
    assert!(matches!(
        rx.recv().await.unwrap(),
        ChamberEvent::SessionStarted(_)
    ));
    assert_eq!(rx.recv().await.unwrap(), ChamberEvent::CycleCompleted);

    // The session is closed before the loss is announced.
    assert_eq!(rx.recv().await.unwrap(), ChamberEvent::SessionStopped);
    assert_eq!(rx.recv().await.unwrap(), ChamberEvent::ConnectionLost);

    assert!(chamber.is_connection_lost());
    assert!(!chamber.is_recording());
    assert!(matches!(
        chamber.resume_polling(),
        Err(ChamberError::ConnectionLost)
    ));

    // Polling has stopped: no further queries reach the device.
    let polls_at_loss = mock.queries().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mock.queries().len(), polls_at_loss);

    chamber.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn operator_commands_reach_the_device_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockTransport::new();
    push_handshake(&mock, "50", "1");

    let chamber = Chamber::start(test_config(dir.path(), 100), mock.clone())
        .await
        .unwrap();

    assert_eq!(chamber.set_humidity_threshold(72.6).unwrap(), 72.6);
    assert_eq!(chamber.set_humidity_threshold(150.0).unwrap(), 100.0);
    chamber.set_valve_mode(ValveMode::OpenWhenBelow).unwrap();

    while mock.writes().len() < 3 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(
        mock.writes(),
        vec![
            "th73".to_string(),
            "th100".to_string(),
            "open when sub humi".to_string(),
        ]
    );

    let state = chamber.state();
    assert_eq!(state.humidity_threshold, 100.0);
    assert!(!state.open_when_above_threshold);

    chamber.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sessions_spanning_one_run_use_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockTransport::new();
    push_handshake(&mock, "50", "0");
    for _ in 0..4 {
        mock.push_reply("100\t20.0\t21.0\t40.0\t0");
    }

    let chamber = Chamber::start(test_config(dir.path(), 100), mock)
        .await
        .unwrap();
    let mut rx = chamber.subscribe();

    chamber.start_session("first").unwrap();
    let first = match rx.recv().await.unwrap() {
        ChamberEvent::SessionStarted(path) => path,
        other => panic!("unexpected event: {other:?}"),
    };
    chamber.stop_session();

    chamber.start_session("second").unwrap();
    let second = chamber.logger().current_file().unwrap();
    assert_ne!(first, second);

    chamber.shutdown().await;
    // Shutdown closed the second session; both files are complete.
    assert!(std::fs::read_to_string(&second)
        .unwrap()
        .contains("[DATA]"));
}
