//! Integration tests for the session engine against a scripted TCP peer.
//!
//! Each test spawns a one-connection listener that reads CRLF-terminated
//! frames and replies from a canned script, then drives the real client
//! through the full send/receive/validate cycle.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use pretty_assertions::assert_eq;

use shsworks_client::{Arg, Number, Session, ShsClient, ShsError};

const OK_ANSWER: &str = "Stop|JID=001|OP=;ST=;SN=|1=Ok|1\r\n";
const BUSY_ANSWER: &str =
    "Stop|JID=001|OP=;ST=;SN=|0=Busy|SHSWorks blocked (live or static mode)!\r\n";

/// Spawn a listener that serves one connection: for each scripted reply it
/// reads one CRLF-terminated frame, answers, and finally closes. Returns
/// the port and a handle yielding the raw frames received.
fn spawn_server(replies: Vec<String>) -> (u16, JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock listener");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut received = Vec::new();
        for reply in replies {
            let mut frame = Vec::new();
            let mut chunk = [0u8; 256];
            while !frame.ends_with(b"\r\n") {
                let n = stream.read(&mut chunk).expect("read frame");
                if n == 0 {
                    return received;
                }
                frame.extend_from_slice(&chunk[..n]);
            }
            received.push(frame);
            stream.write_all(reply.as_bytes()).expect("write reply");
        }
        received
    });
    (port, handle)
}

fn frames_as_strings(frames: &[Vec<u8>]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| String::from_utf8_lossy(frame).into_owned())
        .collect()
}

#[test]
fn zero_arg_command_ends_with_empty_argument_field() {
    let (port, server) = spawn_server(vec![OK_ANSWER.to_string()]);
    let mut session = Session::new("127.0.0.1", port);

    session.send_command(0, &[]).expect("test command");

    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|00|\r\n"]);
}

#[test]
fn select_field_round_trip_succeeds_against_the_canned_answer() {
    let (port, server) = spawn_server(vec![OK_ANSWER.to_string()]);
    let mut session = Session::new("127.0.0.1", port);

    let answer = session
        .send_command(16, &[Arg::from(42)])
        .expect("select_field");

    assert_eq!(answer, OK_ANSWER);
    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|16|42\r\n"]);
}

#[test]
fn job_id_increments_once_per_physical_transmission() {
    let (port, server) = spawn_server(vec![OK_ANSWER.to_string(), OK_ANSWER.to_string()]);
    let mut session = Session::new("127.0.0.1", port);

    session.send_command(2, &[]).expect("grab_org");
    session.send_command(3, &[]).expect("grab_ref");

    assert_eq!(session.jid(), 2);
    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|02|\r\n", "Start|001|03|\r\n"]);
}

#[test]
fn busy_answer_triggers_one_stop_live_exchange_then_a_retransmission() {
    let (port, server) = spawn_server(vec![
        BUSY_ANSWER.to_string(),
        OK_ANSWER.to_string(),
        OK_ANSWER.to_string(),
    ]);
    let mut session = Session::new("127.0.0.1", port);

    let answer = session
        .send_command(16, &[Arg::from(42)])
        .expect("recovered command");

    // caller observes only the retransmission's outcome
    assert_eq!(answer, OK_ANSWER);
    // three transmissions in, the job id advanced by three
    assert_eq!(session.jid(), 3);

    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(
        frames,
        vec![
            "Start|000|16|42\r\n",
            "Start|001|08|\r\n",
            "Start|002|16|42\r\n",
        ]
    );
}

#[test]
fn persistent_busy_state_surfaces_still_busy_after_the_bounded_retries() {
    let (port, server) = spawn_server(vec![
        BUSY_ANSWER.to_string(),
        OK_ANSWER.to_string(),
        BUSY_ANSWER.to_string(),
    ]);
    let mut session = Session::new("127.0.0.1", port);
    session.set_busy_retry_limit(1);

    let err = session.send_command(4, &[]).unwrap_err();

    match err {
        ShsError::StillBusy { attempts, command } => {
            assert_eq!(attempts, 1);
            assert!(command.starts_with("evaluation(): "));
        }
        other => panic!("expected StillBusy, got {other:?}"),
    }
    // original + stop-live + retransmission all counted
    assert_eq!(session.jid(), 3);
    drop(session);
    server.join().expect("server");
}

#[test]
fn non_success_error_code_yields_protocol_error_with_the_trailing_message() {
    let (port, _server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|2=Failed|no frame available\r\n".to_string(),
    ]);
    let mut session = Session::new("127.0.0.1", port);

    let err = session.send_command(2, &[]).unwrap_err();

    match err {
        ShsError::Protocol {
            command,
            code,
            message,
        } => {
            assert_eq!(command, "grab_org(): Start|000|02|");
            assert_eq!(code, "2=Failed");
            assert_eq!(message.as_deref(), Some("no frame available"));
        }
        other => panic!("expected Protocol, got {other:?}"),
    }
}

#[test]
fn non_success_error_code_without_a_trailing_field_omits_the_message() {
    let (port, _server) =
        spawn_server(vec!["Stop|JID=001|OP=;ST=;SN=|2=Failed\r\n".to_string()]);
    let mut session = Session::new("127.0.0.1", port);

    match session.send_command(0, &[]).unwrap_err() {
        ShsError::Protocol { message, .. } => assert_eq!(message, None),
        other => panic!("expected Protocol, got {other:?}"),
    }
}

#[test]
fn unknown_command_marker_wins_over_error_code_inspection() {
    // the error-code field here would itself be a failure, but the
    // unknown-command scan runs first
    let (port, _server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|0=Err|Unknown command\r\n".to_string(),
    ]);
    let mut session = Session::new("127.0.0.1", port);

    match session.send_command(0, &[]).unwrap_err() {
        ShsError::UnknownCommand { command } => {
            assert_eq!(command, "test(): Start|000|00|");
        }
        other => panic!("expected UnknownCommand, got {other:?}"),
    }
}

#[test]
fn unknown_command_scan_matches_both_case_variants() {
    let (port, _server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|0=Err|Unknown Command\r\n".to_string(),
    ]);
    let mut session = Session::new("127.0.0.1", port);
    assert!(matches!(
        session.send_command(0, &[]).unwrap_err(),
        ShsError::UnknownCommand { .. }
    ));
}

#[test]
fn refused_connection_reports_connection_failure_with_the_port() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let mut session = Session::new("127.0.0.1", port);
    match session.connect().unwrap_err() {
        ShsError::ConnectionFailure { port: reported, .. } => assert_eq!(reported, port),
        other => panic!("expected ConnectionFailure, got {other:?}"),
    }
    assert!(!session.is_open());
}

#[test]
fn truncated_answer_reports_connection_lost_with_attribution() {
    // reply lacks the CRLF terminator, then the peer closes
    let (port, _server) = spawn_server(vec!["Stop|JID=001|OP=".to_string()]);
    let mut session = Session::new("127.0.0.1", port);

    match session.send_command(0, &[]).unwrap_err() {
        ShsError::ConnectionLost { command, .. } => {
            assert_eq!(command, "test(): Start|000|00|");
        }
        other => panic!("expected ConnectionLost, got {other:?}"),
    }
    // the dead socket was dropped; an explicit connect would re-establish
    assert!(!session.is_open());
}

#[test]
fn oversized_command_is_rejected_before_any_connection_attempt() {
    // port 1 is not listening; an attempted connect would fail loudly
    let mut session = Session::new("127.0.0.1", 1);
    let long_arg = "a".repeat(5000);

    let err = session.send_command(5, &[Arg::from(long_arg)]).unwrap_err();

    assert!(matches!(err, ShsError::InvalidArgument(_)));
    // the counter advanced even though the frame was rejected
    assert_eq!(session.jid(), 1);
    assert!(!session.is_open());
}

#[test]
fn arguments_are_transmitted_as_windows_1252_bytes() {
    let (port, server) = spawn_server(vec![OK_ANSWER.to_string()]);
    let mut session = Session::new("127.0.0.1", port);

    session
        .send_command(5, &[Arg::from("münchen")])
        .expect("load_setup");

    let frames = server.join().expect("server");
    let mut expected = b"Start|000|05|m".to_vec();
    expected.push(0xFC); // 'ü' as a single Windows-1252 byte
    expected.extend_from_slice(b"nchen\r\n");
    assert_eq!(frames, vec![expected]);
}

#[test]
fn cam_settings_decode_with_per_field_numeric_typing() {
    let (port, _server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|1=Ok|SHS:BUS=0;CAM=0;TRI=0;ASH=1;AVE=8;SHU=1000;BRI=0;GAI=2\
         |VCC:AVE=1;GAI=1.0\r\n"
            .to_string(),
    ]);
    let mut client = ShsClient::new("127.0.0.1", port);

    let settings = client.get_cam_settings().expect("camera settings");

    assert_eq!(settings["SHS"]["AVE"], Number::Int(8));
    assert_eq!(settings["VCC"]["GAI"], Number::Float(1.0));
}

#[test]
fn empty_pass_fail_values_probe_reports_evaluation_switched_off() {
    let (port, server) = spawn_server(vec![
        // get_pf_values: empty payload
        "Stop|JID=001|OP=;ST=;SN=|1=Ok|\r\n".to_string(),
        // get_par bPassFail: disabled
        "Stop|JID=002|OP=;ST=;SN=|1=Ok|bPassFail=0\r\n".to_string(),
    ]);
    let mut client = ShsClient::new("127.0.0.1", port);

    let err = client.get_pf_values().unwrap_err();

    assert!(matches!(err, ShsError::PassFailEvaluationOff));
    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|24|\r\n", "Start|001|26|bPassFail\r\n"]);
}

#[test]
fn empty_pass_fail_indices_probe_reports_nothing_selected() {
    let (port, _server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|1=Ok|\r\n".to_string(),
        "Stop|JID=002|OP=;ST=;SN=|1=Ok|bPassFail=1\r\n".to_string(),
    ]);
    let mut client = ShsClient::new("127.0.0.1", port);

    let err = client.get_pf_indices().unwrap_err();

    assert!(matches!(err, ShsError::NoPassFailItemsSelected));
}

#[test]
fn evaluation_correlates_values_with_the_configured_indices() {
    let (port, server) = spawn_server(vec![
        // evaluation values, in item order
        "Stop|JID=001|OP=;ST=;SN=|1=Ok|0.25 1\r\n".to_string(),
        // configured pass/fail indices
        "Stop|JID=002|OP=;ST=;SN=|1=Ok|0 6\r\n".to_string(),
    ]);
    let mut client = ShsClient::new("127.0.0.1", port);

    let result = client.evaluation().expect("evaluation");

    assert_eq!(result.get(0), Some(Number::Float(0.25)));
    assert_eq!(result.get(6), Some(Number::Int(1)));
    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|04|\r\n", "Start|001|07|\r\n"]);
}

#[test]
fn set_pf_item_use_frames_the_flag_as_an_integer() {
    let (port, server) = spawn_server(vec![OK_ANSWER.to_string(), OK_ANSWER.to_string()]);
    let mut client = ShsClient::new("127.0.0.1", port);

    client.set_pf_item_use(6, true).expect("switch on");
    client.set_pf_item_use(6, false).expect("switch off");

    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|37|6|1\r\n", "Start|001|37|6|0\r\n"]);
}

#[test]
fn get_version_returns_the_bare_payload_token() {
    let (port, _server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|1=Ok|12.000.1 (SVN1178) (September 8 2020)\r\n".to_string(),
    ]);
    let mut client = ShsClient::new("127.0.0.1", port);

    let version = client.get_version().expect("version");

    assert_eq!(version, "12.000.1 (SVN1178) (September 8 2020)");
}

#[test]
fn set_cam_setting_frames_the_group_token_assignment() {
    use shsworks_client::{CamSetting, Camera};

    let (port, server) = spawn_server(vec![OK_ANSWER.to_string()]);
    let mut client = ShsClient::new("127.0.0.1", port);

    client
        .set_cam_setting(Camera::Shs, CamSetting::Ave, 8)
        .expect("set averaging");

    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|10|SHS:AVE=8\r\n"]);
}

#[test]
fn field_stats_query_decodes_the_fixed_order_block() {
    use shsworks_client::FieldPart;

    let (port, server) = spawn_server(vec![
        "Stop|JID=001|OP=;ST=;SN=|1=Ok|0.5 6.5 1.0 6.8 -9.9 3.3 0.0 13.2 3.1\r\n".to_string(),
    ]);
    let mut client = ShsClient::new("127.0.0.1", port);

    let stats = client
        .get_field_stats(42, FieldPart::Org)
        .expect("field stats");

    assert_eq!(stats.pv, 13.2);
    assert_eq!(stats.rms, 3.1);
    let frames = frames_as_strings(&server.join().expect("server"));
    assert_eq!(frames, vec!["Start|000|35|42|ORG\r\n"]);
}
