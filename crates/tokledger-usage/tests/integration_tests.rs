//! Integration tests for tokledger-usage with on-disk session logs.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tempfile::tempdir;
use tokledger_usage::{
    DeviceExport, EventReader, GoalProgress, LedgerStore, Pace, Pricing, aggregate_devices,
};

fn period_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()
}

fn cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()
}

fn usage_line(ts: &str, input: u64, output: u64) -> String {
    format!(
        r#"{{"type":"assistant","timestamp":"{ts}","message":{{"model":"claude-sonnet-4-5","usage":{{"input_tokens":{input},"output_tokens":{output},"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}}}}"#
    )
}

fn write_log(dir: &Path, name: &str, lines: &[String]) {
    fs::create_dir_all(dir).unwrap();
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(dir.join(name), content).unwrap();
}

/// Three in-period events and one from before the period.
fn seed_logs(root: &Path) {
    write_log(
        &root.join("project-a"),
        "session-1.jsonl",
        &[
            usage_line("2025-09-30T23:00:00.000Z", 5000, 5000),
            usage_line("2025-10-05T12:00:00.000Z", 1000, 500),
            r#"{"type":"user","timestamp":"2025-10-05T12:00:01.000Z","message":{"role":"user","content":"hi"}}"#.to_string(),
            usage_line("2025-10-05T12:00:02.000Z", 1000, 500),
        ],
    );
    write_log(
        &root.join("project-b"),
        "session-2.jsonl",
        &[usage_line("2025-10-06T08:00:00.000Z", 1000, 500)],
    );
}

#[test]
fn test_scan_merge_counts_in_period_events() {
    let tmp = tempdir().unwrap();
    let logs = tmp.path().join("projects");
    seed_logs(&logs);

    let reader = EventReader::new(&logs, cutoff());
    let store = LedgerStore::new(tmp.path().join("cumulative_usage.json"), period_start());

    let result = store.merge(reader.events()).unwrap();

    assert_eq!(result.new_sessions, 3);
    assert_eq!(result.cumulative.tokens.input_tokens, 3000);
    assert_eq!(result.cumulative.tokens.output_tokens, 1500);
    assert_eq!(result.cumulative.total_sessions, 3);
}

#[test]
fn test_rescan_is_idempotent_across_reader_runs() {
    let tmp = tempdir().unwrap();
    let logs = tmp.path().join("projects");
    seed_logs(&logs);
    let store = LedgerStore::new(tmp.path().join("cumulative_usage.json"), period_start());

    store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();
    let second = store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();

    assert_eq!(second.new_sessions, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(second.cumulative.total_sessions, 3);
}

#[test]
fn test_deleting_logs_keeps_totals() {
    let tmp = tempdir().unwrap();
    let logs = tmp.path().join("projects");
    seed_logs(&logs);
    let store = LedgerStore::new(tmp.path().join("cumulative_usage.json"), period_start());
    let first = store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();

    fs::remove_dir_all(&logs).unwrap();
    let after = store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();

    assert_eq!(after.new_sessions, 0);
    assert_eq!(after.cumulative, first.cumulative);
}

#[test]
fn test_appended_event_is_added_exactly_once() {
    let tmp = tempdir().unwrap();
    let logs = tmp.path().join("projects");
    seed_logs(&logs);
    let store = LedgerStore::new(tmp.path().join("cumulative_usage.json"), period_start());
    store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();

    let path = logs.join("project-b").join("session-2.jsonl");
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str(&usage_line("2025-10-07T09:00:00.000Z", 200, 100));
    content.push('\n');
    fs::write(&path, content).unwrap();

    let result = store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();
    assert_eq!(result.new_sessions, 1);
    assert_eq!(result.cumulative.tokens.input_tokens, 3200);

    let again = store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();
    assert_eq!(again.new_sessions, 0);
    assert_eq!(again.cumulative.total_sessions, 4);
}

#[test]
fn test_moving_a_log_between_projects_is_not_double_counted() {
    let tmp = tempdir().unwrap();
    let logs = tmp.path().join("projects");
    seed_logs(&logs);
    let store = LedgerStore::new(tmp.path().join("cumulative_usage.json"), period_start());
    store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();

    let archive = logs.join("archive");
    fs::create_dir_all(&archive).unwrap();
    fs::rename(
        logs.join("project-b").join("session-2.jsonl"),
        archive.join("session-2.jsonl"),
    )
    .unwrap();

    let result = store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();
    assert_eq!(result.new_sessions, 0);
}

#[test]
fn test_two_devices_sum_in_fleet_totals() {
    let tmp = tempdir().unwrap();
    let data_dir = tmp.path().join("data");

    for (device, input, output, day) in [("laptop", 100, 50, 5), ("desk", 200, 25, 6)] {
        let logs = tmp.path().join(device);
        write_log(
            &logs,
            "s.jsonl",
            &[usage_line(&format!("2025-10-0{day}T10:00:00Z"), input, output)],
        );
        let store = LedgerStore::new(tmp.path().join(format!("{device}-ledger.json")), period_start());
        store.merge(EventReader::new(&logs, cutoff()).events()).unwrap();

        let ledger = store.load().unwrap();
        DeviceExport::from_ledger(&ledger, device, &Pricing::default(), Utc::now())
            .write_to(&data_dir)
            .unwrap();
    }

    let fleet = aggregate_devices(&data_dir).unwrap();

    assert_eq!(fleet.usage.tokens.input_tokens, 300);
    assert_eq!(fleet.usage.tokens.output_tokens, 75);
    assert_eq!(fleet.usage.total_sessions, 2);
    let ids: Vec<_> = fleet.devices.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(ids, ["desk", "laptop"]);

    let now = cutoff() + Duration::days(10);
    let progress = GoalProgress::calculate(&fleet.usage, 1000, cutoff(), now + Duration::days(10), now);
    assert!((progress.percent - 37.5).abs() < 1e-9);
    assert!(matches!(progress.pace(), Pace::Behind { .. }));
}

#[test]
fn test_scan_stats_count_skips() {
    let tmp = tempdir().unwrap();
    let logs = tmp.path().join("projects");
    seed_logs(&logs);
    write_log(&logs, "broken.jsonl", &["{ nope".to_string()]);

    let stats = EventReader::new(&logs, cutoff()).events().into_stats();

    assert_eq!(stats.files, 3);
    assert_eq!(stats.events, 3);
    assert_eq!(stats.before_cutoff, 1);
    assert_eq!(stats.no_usage, 1);
    assert_eq!(stats.malformed, 1);
}
