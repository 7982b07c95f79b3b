use std::io::Write;

use assert_cmd::Command;
use predicates as pred;
use predicates::prelude::*;
use tempfile::NamedTempFile;

#[test]
fn end_to_end_outputs_expected_limits() {
    // c1: 700 held then released, 500 confirmed -> 500 available
    // c2: 200 released, 100 left outstanding -> 900 available
    // c3: 400 abandoned, reclaimed -> 1000 available
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        "type, customer, ref, amount, cutoff\n\
    request, c1, a, 700\n\
    request, c1, b, 500\n\
    release, c1, a,\n\
    request, c1, b, 500\n\
    confirm, c1, b,\n\
    confirm, c1, b,\n\
    request, c2, x, 200\n\
    request, c2, y, 100\n\
    release, c2, x\n\
    request, c2, z, 1000.0001\n\
    request, c3, p, 400\n\
    reclaim, c3, , , 2100-01-01T00:00:00Z\n\
    bogus, c1, a,\n\
    confirm, c4, nothing"
    )
    .unwrap();

    let exe = env!("CARGO_BIN_EXE_quota_ledger");
    let mut cmd = Command::new(exe);
    cmd.arg(file.path())
        .env("QUOTA_LEDGER_DEFAULT_MAX_LIMIT", "1000")
        .env("RUST_LOG", "off");

    cmd.assert()
        .success()
        .stdout(pred::str::contains("customer,avail_amount,max_amount"))
        .stdout(pred::str::contains("c1,500.0000,1000.0000"))
        .stdout(pred::str::contains("c2,900.0000,1000.0000"))
        .stdout(pred::str::contains("c3,1000.0000,1000.0000"))
        .stdout(pred::str::contains("c4").not())
        .stderr(pred::str::contains("Insufficient available amount for customer c1"))
        .stderr(pred::str::contains("Reservation"))
        .stderr(pred::str::contains("Invalid amount 1000.0001"))
        .stderr(pred::str::contains("Invalid command type"));
}

#[test]
fn settings_file_sets_default_limit() {
    let mut config = NamedTempFile::new().expect("create temp file");
    writeln!(config, "default_max_limit: 250\ndefault_reservation_ttl: 1m").unwrap();

    let mut commands = NamedTempFile::new().expect("create temp file");
    writeln!(
        commands,
        "type, customer, ref, amount\n\
    request, acme, r1, 100.12345"
    )
    .unwrap();

    let exe = env!("CARGO_BIN_EXE_quota_ledger");
    let mut cmd = Command::new(exe);
    cmd.arg(commands.path())
        .arg("--config")
        .arg(config.path())
        .env_remove("QUOTA_LEDGER_DEFAULT_MAX_LIMIT")
        .env("RUST_LOG", "off");

    cmd.assert()
        .success()
        .stdout(pred::str::contains("acme,149.8766,250.0000"));
}

#[test]
fn missing_input_file_fails() {
    let exe = env!("CARGO_BIN_EXE_quota_ledger");
    Command::new(exe)
        .arg("/nonexistent/commands.csv")
        .env("RUST_LOG", "off")
        .assert()
        .failure();
}
