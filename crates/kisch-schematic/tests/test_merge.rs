mod test_utils;

use test_utils::{resource, setup_test_env, FIXTURE};

use kisch_schematic::{MergeOutcome, MergePolicy, Schematic, SchematicError};
use std::fs;
use uuid::Uuid;

const R1: &str = "8d1b8c52-31a7-4d0b-b6a4-1e9f3c2d7a10";
const VIN_WIRE: &str = "d5f7b9c1-6e8a-4c0d-9f1b-2a3b4c5d6e17";

const EXTERNAL_WIRE: &str = "\t(wire
		(pts
			(xy 114.3 63.5) (xy 127 63.5)
		)
		(stroke
			(width 0)
			(type default)
		)
		(uuid \"0d2f4a6c-8e1b-4c3d-a5f7-9b1d3e5f7a20\")
	)
";

fn uuid(text: &str) -> Uuid {
    Uuid::parse_str(text).unwrap()
}

/// The fixture as another editor would leave it: a note moved and a wire added.
fn edited_elsewhere() -> String {
    resource(FIXTURE)
        .replace("(at 88.9 55.88 0)", "(at 88.9 50.8 0)")
        .replacen("\t(sheet_instances", &format!("{EXTERNAL_WIRE}\t(sheet_instances"), 1)
}

#[test]
fn test_merge_keeps_both_sides() {
    let dir = setup_test_env();
    let path = dir.path().join(FIXTURE);
    let mut sch = Schematic::load(&path).unwrap();
    sch.component_mut_by_reference("R1").unwrap().set_value("10k");

    let disk = edited_elsewhere();
    fs::write(&path, &disk).unwrap();
    let report = sch.merge_from_path(&path, MergePolicy::Report).unwrap();

    assert!(!report.has_conflicts());
    assert_eq!(report.outcome(&uuid(R1)), Some(MergeOutcome::ModelChanged));
    let summary: Vec<String> = report
        .entries
        .iter()
        .map(|e| format!("{} {:?}", e.kind, e.outcome))
        .collect();
    insta::assert_snapshot!(summary.join("\n"), @r"
    junction Unchanged
    no_connect Unchanged
    wire Unchanged
    wire Unchanged
    wire Unchanged
    label Unchanged
    text DiskChanged
    symbol ModelChanged
    wire DiskOnly
    ");

    assert_eq!(sch.to_string(), disk.replace(r#""Value" "4k7""#, r#""Value" "10k""#));
    assert_eq!(sch.wires().count(), 4);
    assert_eq!(sch.get_by_reference("R1").unwrap().value(), "10k");

    // The merged copy is the new baseline, so a second merge is a no-op.
    let merged = sch.to_string();
    let report = sch.merge_from_disk(&disk, MergePolicy::Report).unwrap();
    assert_eq!(report.count(MergeOutcome::ModelChanged), 1);
    assert_eq!(sch.to_string(), merged);
}

#[test]
fn test_conflict_is_reported_then_resolved() {
    let dir = setup_test_env();
    let mut sch = Schematic::load(dir.path().join(FIXTURE)).unwrap();
    sch.component_mut_by_reference("R1").unwrap().set_value("10k");
    let disk = resource(FIXTURE).replace(r#""Value" "4k7""#, r#""Value" "2k2""#);

    let err = sch.merge_from_disk(&disk, MergePolicy::Report).unwrap_err();
    match err {
        SchematicError::MergeConflict { uuids } => assert_eq!(uuids, vec![R1.to_string()]),
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(sch.get_by_reference("R1").unwrap().value(), "10k");

    let report = sch.merge_from_disk(&disk, MergePolicy::PreferDisk).unwrap();
    assert_eq!(report.conflicts, vec![uuid(R1)]);
    assert_eq!(sch.get_by_reference("R1").unwrap().value(), "2k2");
    assert_eq!(sch.to_string(), disk);
}

#[test]
fn test_prefer_model_keeps_memory_edit() {
    let dir = setup_test_env();
    let mut sch = Schematic::load(dir.path().join(FIXTURE)).unwrap();
    sch.component_mut_by_reference("R1").unwrap().set_value("10k");
    let disk = resource(FIXTURE).replace(r#""Value" "4k7""#, r#""Value" "2k2""#);

    let report = sch.merge_from_disk(&disk, MergePolicy::PreferModel).unwrap();
    assert_eq!(report.outcome(&uuid(R1)), Some(MergeOutcome::BothChanged));
    assert_eq!(sch.get_by_reference("R1").unwrap().value(), "10k");
}

#[test]
fn test_memory_removal_survives_merge() {
    let dir = setup_test_env();
    let mut sch = Schematic::load(dir.path().join(FIXTURE)).unwrap();
    assert!(sch.remove_wire(&uuid(VIN_WIRE)));

    let fixture = resource(FIXTURE);
    let report = sch.merge_from_disk(&fixture, MergePolicy::Report).unwrap();
    assert_eq!(report.outcome(&uuid(VIN_WIRE)), Some(MergeOutcome::ModelRemoved));
    assert_eq!(sch.wires().count(), 2);

    let wire_start = fixture.find("\t(wire\n\t\t(pts\n\t\t\t(xy 101.6 63.5)").unwrap();
    let wire_end = wire_start + fixture[wire_start..].find("\n\t)\n").unwrap() + "\n\t)\n".len();
    let mut expected = fixture.clone();
    expected.replace_range(wire_start..wire_end, "");
    assert_eq!(sch.to_string(), expected);
}

#[test]
fn test_disk_removal_is_kept() {
    let dir = setup_test_env();
    let mut sch = Schematic::load(dir.path().join(FIXTURE)).unwrap();
    let disk = resource(FIXTURE).replace(
        "\t(no_connect\n\t\t(at 101.6 88.9)\n\t\t(uuid \"a2c4e6f8-0b1d-4f3a-8c5e-7a9b1c3d5e14\")\n\t)\n",
        "",
    );
    let report = sch.merge_from_disk(&disk, MergePolicy::Report).unwrap();
    assert_eq!(report.count(MergeOutcome::DiskChanged), 1);
    assert!(sch.no_connects().is_empty());
    assert_eq!(sch.to_string(), disk);
}
