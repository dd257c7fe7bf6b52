mod common;

use std::fs;

use common::{STAGED_CSV, SYSTEM_CSV, TestWorkspace};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

#[test]
fn load_autofills_and_compute_uses_manual_codes() {
    let workspace = TestWorkspace::new();
    let staged = workspace.write("staged.csv", STAGED_CSV);

    workspace
        .command()
        .args(["load", "--target", "top", staged.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Loaded 1 row(s) into top"))
        .stdout(contains("plant_code = P1"))
        .stdout(contains("cost_center_code = C1"));

    assert!(workspace.state_dir().join("system.json").exists());
    assert!(workspace.state_dir().join("config.json").exists());

    workspace
        .command()
        .arg("compute")
        .assert()
        .success()
        .stdout(contains("PROCESS_COST"))
        .stdout(contains("PROCESS_COST: 215.00"));
}

#[test]
fn compute_requires_codes() {
    let workspace = TestWorkspace::new();
    let system = workspace.write("system.csv", SYSTEM_CSV);
    workspace
        .command()
        .args(["load", system.to_str().unwrap()])
        .assert()
        .success();

    workspace
        .command()
        .arg("compute")
        .assert()
        .failure()
        .stderr(contains("No value for 'plant_code'"));

    workspace
        .command()
        .args(["compute", "--plant", "P2", "--cost-center", "C1"])
        .assert()
        .success()
        .stdout(contains("PROCESS_COST: 12.00"));
}

#[test]
fn compute_reads_formula_file_from_state_dir_and_writes_output() {
    let workspace = TestWorkspace::new();
    let system = workspace.write("system.csv", SYSTEM_CSV);
    workspace
        .command()
        .args(["load", system.to_str().unwrap()])
        .assert()
        .success();
    fs::write(
        workspace.state_dir().join("formulas.csv"),
        "Formül Adı;Formül\nTOPLAM;AMOR + ENER\n",
    )
    .expect("write formulas");

    let output = workspace.path().join("computed.csv");
    workspace
        .command()
        .args([
            "compute",
            "--plant",
            "P1",
            "--cost-center",
            "C2",
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("TOPLAM: 50.00"))
        .stdout(contains("PROCESS_COST").not());

    let written = fs::read_to_string(&output).expect("read output");
    let header = written.lines().next().unwrap();
    assert!(header.starts_with("AMOR,DIS,EDIS,ENER,GUG,source_file"));
    assert!(header.ends_with("TOPLAM"));
}

#[test]
fn stage_import_undo_round_trip() {
    let workspace = TestWorkspace::new();
    let system = workspace.write("system.csv", SYSTEM_CSV);
    let staged = workspace.write("staged.csv", STAGED_CSV);

    workspace
        .command()
        .args(["load", system.to_str().unwrap()])
        .assert()
        .success();
    workspace
        .command()
        .args(["load", "--target", "bottom", staged.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Loaded 1 row(s) into bottom"));

    workspace
        .command()
        .arg("import")
        .assert()
        .success()
        .stdout(contains("Removed 1 row(s), added 1 row(s)"));

    workspace
        .command()
        .args(["show", "--target", "top", "--plant", "P1", "--cost-center", "C1"])
        .assert()
        .success()
        .stdout(contains("staged.csv"))
        .stdout(contains("system.csv").not());

    workspace.command().arg("undo").assert().success();

    workspace
        .command()
        .args(["show", "--target", "top", "--plant", "P1", "--cost-center", "C1"])
        .assert()
        .success()
        .stdout(contains("system.csv"))
        .stdout(contains("staged.csv").not());
}

#[test]
fn map_prints_matches_and_export_writes_processed_view() {
    let workspace = TestWorkspace::new();
    let data = workspace.write("plants.csv", "Site,CC,Equipment Code,Qty\nP1,C1,M7,3\n");
    workspace
        .command()
        .args(["load", data.to_str().unwrap()])
        .assert()
        .success();

    workspace
        .command()
        .arg("map")
        .assert()
        .success()
        .stdout(contains("İş Yeri Kodu <- Site (exact)"))
        .stdout(contains("Makine Kodu <- Equipment Code (exact)"))
        .stdout(contains("Malzeme Adı <- (unmatched)"));

    let output = workspace.path().join("processed.csv");
    workspace
        .command()
        .args([
            "export",
            "--target",
            "processed",
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();
    let contents = fs::read_to_string(&output).expect("read export");
    assert_eq!(
        contents,
        "İş Yeri Kodu,Masraf Yeri Kodu,Makine Kodu,Makine Adı,Malzeme Adı,source_file\n\
         P1,C1,M7,,,plants.csv\n"
    );
}

#[test]
fn manual_edit_and_reset() {
    let workspace = TestWorkspace::new();
    workspace
        .command()
        .args(["manual", "plant_code=P9", "machine_code=M1"])
        .assert()
        .success()
        .stdout(contains("machine_code = M1"))
        .stdout(contains("plant_code = P9"));

    workspace
        .command()
        .args(["edit", "add-row"])
        .assert()
        .failure()
        .stderr(contains("no table is loaded in the top buffer"));

    let system = workspace.write("system.csv", SYSTEM_CSV);
    workspace
        .command()
        .args(["load", system.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("plant_code = ").not());

    workspace
        .command()
        .args(["edit", "delete-row", "7"])
        .assert()
        .failure()
        .stderr(contains("out of range"));
    workspace
        .command()
        .args(["edit", "add-column", "Not"])
        .assert()
        .success();

    workspace
        .command()
        .args(["reset", "--target", "all"])
        .assert()
        .success();
    assert!(!workspace.state_dir().join("system.json").exists());
    workspace
        .command()
        .arg("manual")
        .assert()
        .success()
        .stdout(contains("plant_code").not());
}

#[test]
fn set_cell_then_search_finds_edited_row() {
    let workspace = TestWorkspace::new();
    let system = workspace.write("system.csv", SYSTEM_CSV);
    workspace
        .command()
        .args(["load", system.to_str().unwrap()])
        .assert()
        .success();

    workspace
        .command()
        .args(["edit", "set-cell", "2", "Masraf Yeri Kodu", "  Bakım "])
        .assert()
        .success()
        .stdout(contains("Updated top row 2, column 'Masraf Yeri Kodu'"));
    workspace
        .command()
        .args(["edit", "set-cell", "0", "Yok", "x"])
        .assert()
        .failure()
        .stderr(contains("column 'Yok' does not exist"));

    workspace
        .command()
        .args(["show", "--search", "BAK"])
        .assert()
        .success()
        .stdout(contains("P2"))
        .stdout(contains("P1").not());

    workspace
        .command()
        .args(["edit", "set-cell", "2", "Masraf Yeri Kodu"])
        .assert()
        .success();
    workspace
        .command()
        .args(["show", "--search", "bakım"])
        .assert()
        .success()
        .stdout(contains("The top buffer has no matching rows"));
}
