#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/groundlink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Station with one telemetry packet, one command and one Unix interface.
fn write_station(dir: &Path, socket: &Path) -> PathBuf {
    let station = serde_json::json!({
        "telemetry": [{
            "target": "INST", "packet": "HEALTH",
            "items": [
                {"name": "LENGTH", "bit_offset": 0, "bit_size": 16, "data_type": "UINT"},
                {"name": "PKTID", "bit_offset": 16, "bit_size": 8, "data_type": "UINT", "id_value": 1},
                {"name": "TEMP", "bit_offset": 24, "bit_size": 8, "data_type": "UINT",
                 "limits": {"sets": {"DEFAULT": {
                     "red_low": 10.0, "yellow_low": 20.0, "yellow_high": 80.0, "red_high": 90.0}}}}
            ]
        }],
        "commands": [{
            "target": "INST", "packet": "COLLECT",
            "items": [
                {"name": "LENGTH", "bit_offset": 0, "bit_size": 16, "data_type": "UINT", "default": 6},
                {"name": "OPCODE", "bit_offset": 16, "bit_size": 8, "data_type": "UINT",
                 "id_value": 9, "default": 9},
                {"name": "TYPE", "bit_offset": 24, "bit_size": 8, "data_type": "UINT",
                 "states": {"NORMAL": 0, "SPECIAL": 1}},
                {"name": "COUNT", "bit_offset": 32, "bit_size": 16, "data_type": "UINT"}
            ]
        }],
        "interfaces": [{
            "name": "INST_INT",
            "transport": {"type": "unix", "path": socket},
            "read_timeout_ms": 5000,
            "target_names": ["INST"]
        }]
    });
    let path = dir.join("station.json");
    std::fs::write(&path, station.to_string()).expect("station file should be writable");
    path
}

fn groundlink() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_groundlink"));
    command.arg("--log-level").arg("error");
    command
}

fn accept_within(listener: &UnixListener, timeout: Duration) -> UnixStream {
    listener
        .set_nonblocking(true)
        .expect("listener should go non-blocking");
    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_nonblocking(false)
                    .expect("stream should go blocking");
                return stream;
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    panic!("accept timeout");
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(err) => panic!("accept failed: {err}"),
        }
    }
}

#[test]
fn version_prints_package_version() {
    let output = groundlink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("groundlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn decode_identifies_and_checks_limits() {
    let dir = unique_temp_dir("decode");
    let station = write_station(&dir, &dir.join("unused.sock"));

    let output = groundlink()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg("--station")
        .arg(&station)
        .arg("0004015F")
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("decode should print json");
    assert_eq!(report["target"], "INST");
    assert_eq!(report["packet"], "HEALTH");
    assert_eq!(report["received_count"], 1);
    assert_eq!(report["buffer"], "0004015F");
    let temp = &report["items"][2];
    assert_eq!(temp["name"], "TEMP");
    assert_eq!(temp["value"], 95);
    assert_eq!(temp["limits"], "RED_HIGH");
    assert_eq!(report["transitions"][0]["previous"], "STALE");
    assert_eq!(report["transitions"][0]["current"], "RED_HIGH");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_unmatched_bytes_report_unknown() {
    let dir = unique_temp_dir("unknown");
    let station = write_station(&dir, &dir.join("unused.sock"));

    let output = groundlink()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg("-s")
        .arg(&station)
        .arg("00 04 07 20")
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("decode should print json");
    assert_eq!(report["target"], "UNKNOWN");
    assert_eq!(report["packet"], "UNKNOWN");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_invalid_hex_returns_60() {
    let dir = unique_temp_dir("badhex");
    let station = write_station(&dir, &dir.join("unused.sock"));

    let output = groundlink()
        .arg("decode")
        .arg("-s")
        .arg(&station)
        .arg("zz")
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_station_file_returns_3() {
    let dir = unique_temp_dir("nostation");
    let output = groundlink()
        .arg("decode")
        .arg("-s")
        .arg(dir.join("missing.json"))
        .arg("00")
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn frame_splits_stream_and_reports_remainder() {
    let output = groundlink()
        .arg("--format")
        .arg("json")
        .arg("frame")
        .arg("0003AA0003BB00")
        .output()
        .expect("frame should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("frame should print json");
    assert_eq!(report["frames"], serde_json::json!(["0003AA", "0003BB"]));
    assert_eq!(report["remainder"], 1);
}

#[test]
fn frame_rejects_oversized_length() {
    let output = groundlink()
        .arg("frame")
        .arg("00FF")
        .arg("--max-length")
        .arg("16")
        .output()
        .expect("frame should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn send_writes_framed_command() {
    let dir = unique_temp_dir("send");
    let socket = dir.join("inst.sock");
    let station = write_station(&dir, &socket);
    let listener = UnixListener::bind(&socket).expect("listener should bind");

    let target = thread::spawn(move || {
        let mut stream = accept_within(&listener, Duration::from_secs(5));
        let mut received = Vec::new();
        stream
            .read_to_end(&mut received)
            .expect("command bytes should arrive");
        received
    });

    let output = groundlink()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg("-s")
        .arg(&station)
        .arg("inst")
        .arg("collect")
        .arg("--set")
        .arg("TYPE=SPECIAL")
        .arg("--set")
        .arg("COUNT=3")
        .output()
        .expect("send should run");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send should print json");
    assert_eq!(report["interface"], "INST_INT");
    assert_eq!(report["buffer"], "000609010003");
    assert_eq!(target.join().unwrap(), vec![0, 6, 9, 1, 0, 3]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_dry_run_needs_no_interface() {
    let dir = unique_temp_dir("dryrun");
    let station = write_station(&dir, &dir.join("unused.sock"));

    let output = groundlink()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg("-s")
        .arg(&station)
        .arg("INST")
        .arg("COLLECT")
        .arg("--set")
        .arg("COUNT=0x0102")
        .arg("--dry-run")
        .output()
        .expect("send should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send should print json");
    assert_eq!(report["buffer"], "000609000102");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_without_listener_returns_3() {
    let dir = unique_temp_dir("nolistener");
    let station = write_station(&dir, &dir.join("missing.sock"));

    let output = groundlink()
        .arg("send")
        .arg("-s")
        .arg(&station)
        .arg("INST")
        .arg("COLLECT")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_unknown_command_returns_64() {
    let dir = unique_temp_dir("unknowncmd");
    let station = write_station(&dir, &dir.join("unused.sock"));

    let output = groundlink()
        .arg("send")
        .arg("-s")
        .arg(&station)
        .arg("INST")
        .arg("ABORT")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_prints_received_telemetry() {
    let dir = unique_temp_dir("listen");
    let socket = dir.join("inst.sock");
    let station = write_station(&dir, &socket);
    let listener = UnixListener::bind(&socket).expect("listener should bind");

    let child = groundlink()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg("-s")
        .arg(&station)
        .arg("INST_INT")
        .arg("--count")
        .arg("1")
        .arg("--reconnect-delay")
        .arg("100ms")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");

    let mut stream = accept_within(&listener, Duration::from_secs(5));
    stream
        .write_all(&[0x00, 0x04, 0x01, 0x32])
        .expect("telemetry should be writable");

    let output = child.wait_with_output().expect("listen should exit");
    drop(stream);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().expect("one packet should be printed");
    let report: serde_json::Value = serde_json::from_str(line).expect("listen should print json");
    assert_eq!(report["packet"], "HEALTH");
    assert_eq!(report["items"][2]["value"], 50);
    assert_eq!(report["items"][2]["limits"], "GREEN");

    let _ = std::fs::remove_dir_all(&dir);
}
