use std::fs;
use tempfile::TempDir;

use dualrag_core::data_processor::DataProcessor;
use dualrag_core::types::Scalar;

#[test]
fn process_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("submit.txt"), "To submit an event, open the organizer dashboard.\n").unwrap();

    let processor = DataProcessor::new();
    let records = processor.process_directory(dir).expect("process");

    assert_eq!(records.len(), 1, "one small paragraph becomes one record");
    assert_eq!(records[0].id, "submit:0");
    assert_eq!(records[0].metadata.get("category"), Some(&Scalar::Text("misc".into())));
}

#[test]
fn ids_are_stable_across_runs_and_categories_follow_subdirs() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("faq")).unwrap();
    fs::write(dir.join("faq/tickets.txt"), "Refunds take five days.\n\nTickets are emailed.").unwrap();
    fs::write(dir.join("about.txt"), "EventHub lists local events.").unwrap();

    let processor = DataProcessor::new();
    let first = processor.process_directory(dir).expect("first run");
    let second = processor.process_directory(dir).expect("second run");

    let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, second.iter().map(|r| r.id.as_str()).collect::<Vec<_>>());
    let faq = first.iter().find(|r| r.id == "faq/tickets:0").expect("faq record");
    assert_eq!(faq.metadata.get("category"), Some(&Scalar::Text("faq".into())));
}

#[test]
fn empty_directory_yields_no_records() {
    let tmp = TempDir::new().unwrap();
    let records = DataProcessor::new().process_directory(tmp.path()).expect("process");
    assert!(records.is_empty());
}

#[test]
fn same_file_name_in_different_subdirs_keeps_both() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("faq")).unwrap();
    fs::create_dir_all(dir.join("policy")).unwrap();
    fs::write(dir.join("faq/refunds.txt"), "Ask support for a refund.").unwrap();
    fs::write(dir.join("policy/refunds.txt"), "Refunds close 48 hours before the event.").unwrap();

    let records = DataProcessor::new().process_directory(dir).expect("process");
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["faq/refunds:0", "policy/refunds:0"]);
}
