use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use refget_loader::app::{App, ManifestAction};
use refget_loader::error::RefgetError;
use refget_loader::layout::UnitLayout;
use refget_loader::manifest::{Manifest, ManifestBuilder};
use refget_loader::status::{JobsetStatus, Status};

const LOADER_HEADER: &str = "timestamp,completed,trunc512,md5,seq_path,json_path\n";
const FULL_HEADER: &str = "trunc512,md5,ga4gh,length\n";

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    unit: UnitLayout,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let unit = UnitLayout::at(root.join("unit"), "SPQE01".parse().unwrap());
        std::fs::create_dir_all(unit.output_dir()).unwrap();
        std::fs::write(root.join("config.json"), "{}").unwrap();
        Self {
            _temp: temp,
            root,
            unit,
        }
    }

    fn write_tables(&self, loader_rows: &[&str], full_rows: &[&str]) {
        let mut loader = LOADER_HEADER.to_string();
        for row in loader_rows {
            loader.push_str(row);
            loader.push('\n');
        }
        let mut full = FULL_HEADER.to_string();
        for row in full_rows {
            full.push_str(row);
            full.push('\n');
        }
        std::fs::write(self.unit.loader_table(), loader).unwrap();
        std::fs::write(self.unit.full_table(), full).unwrap();
    }

    fn config_path(&self) -> Utf8PathBuf {
        self.root.join("config.json")
    }
}

#[test]
fn completed_rows_join_into_one_entry_per_primary() {
    let fixture = Fixture::new();
    fixture.write_tables(
        &[
            "2019-08-02,1,T1,M1,/u/seq/T1.seq,/u/json/T1.json",
            "2019-08-02,1,T2,M2,/u/seq/T2.seq,/u/json/T2.json",
            "2019-08-02,1,T1,M1,/u/seq/T1.seq,/u/json/T1.json",
        ],
        &["T2,M2,SQ.P2,20", "T1,M1,SQ.P1,10"],
    );
    let config_path = fixture.config_path();

    let manifest = ManifestBuilder::new(&fixture.unit, &config_path)
        .build()
        .unwrap();

    assert_eq!(manifest.entries.len(), 2);
    assert_eq!(manifest.entries[0].primary_checksum, "SQ.P1");
    assert_eq!(manifest.entries[0].secondary_checksums, vec!["T1", "M1"]);
    assert_eq!(manifest.entries[0].sequence_path, "/u/seq/T1.seq");
    assert_eq!(manifest.entries[1].primary_checksum, "SQ.P2");
    assert_eq!(manifest.additional.len(), 1);
    assert_eq!(
        manifest.additional[0].destination,
        "metadata/csv/SPQE01.full.csv"
    );
    assert_eq!(manifest.additional[0].source, fixture.unit.full_table().as_str());

    let rendered = manifest.render();
    assert!(rendered.starts_with(&format!(
        "# Refget loader manifest\n# config file: {config_path}\ncompleted\tseq\tmetadata\tprimary_id\ttrunc512_id\tmd5_id\n"
    )));
    assert!(rendered.contains("1\t/u/seq/T1.seq\t/u/json/T1.json\tSQ.P1\tT1\tM1\n"));
    assert_eq!(Manifest::parse(&rendered).unwrap(), manifest);
}

#[test]
fn incomplete_row_aborts_the_whole_manifest() {
    let fixture = Fixture::new();
    fixture.write_tables(
        &[
            "2019-08-02,1,T1,M1,/u/seq/T1.seq,/u/json/T1.json",
            "2019-08-02,0,T2,M2,/u/seq/T2.seq,/u/json/T2.json",
        ],
        &["T1,M1,SQ.P1,10", "T2,M2,SQ.P2,20"],
    );
    let config_path = fixture.config_path();

    let err = ManifestBuilder::new(&fixture.unit, &config_path)
        .build()
        .unwrap_err();

    assert_matches!(err, RefgetError::IncompleteConversion(message) if message.contains("T2"));
}

#[test]
fn missing_full_row_is_incomplete() {
    let fixture = Fixture::new();
    fixture.write_tables(
        &["2019-08-02,1,T1,M1,/u/seq/T1.seq,/u/json/T1.json"],
        &["T9,M9,SQ.P9,10"],
    );
    let config_path = fixture.config_path();

    assert_matches!(
        ManifestBuilder::new(&fixture.unit, &config_path).build(),
        Err(RefgetError::IncompleteConversion(_))
    );
}

#[test]
fn manifest_step_writes_file_and_keeps_unit_running() {
    let fixture = Fixture::new();
    fixture.write_tables(
        &["2019-08-02,1,T1,M1,/u/seq/T1.seq,/u/json/T1.json"],
        &["T1,M1,SQ.P1,10"],
    );
    let mut status = JobsetStatus::load(fixture.unit.status_path()).unwrap();
    status.set_status_running();
    status.write().unwrap();

    let result = App::new()
        .manifest(fixture.unit.dir(), "SPQE01", &fixture.config_path())
        .unwrap();

    assert_eq!(result.action, ManifestAction::Written);
    assert_eq!(result.status, Status::Running);
    let manifest = Manifest::read(&fixture.unit.manifest_path()).unwrap();
    assert!(manifest.config_path.ends_with("config.json"));
    assert_eq!(manifest.entries.len(), 1);

    let again = App::new()
        .manifest(fixture.unit.dir(), "SPQE01", &fixture.config_path())
        .unwrap();
    assert_eq!(again.action, ManifestAction::AlreadyPresent);
}

#[test]
fn manifest_step_failure_is_recorded_without_partial_file() {
    let fixture = Fixture::new();
    fixture.write_tables(
        &["2019-08-02,0,T1,M1,/u/seq/T1.seq,/u/json/T1.json"],
        &["T1,M1,SQ.P1,10"],
    );

    let result = App::new()
        .manifest(fixture.unit.dir(), "SPQE01", &fixture.config_path())
        .unwrap();

    assert_eq!(result.action, ManifestAction::Failed);
    assert!(!fixture.unit.manifest_path().as_std_path().exists());
    let status = JobsetStatus::load(fixture.unit.status_path()).unwrap();
    assert_eq!(status.status(), Status::Failed);
    assert!(status.message().starts_with("incorrectly processed seq(s) in loader table"));
}

#[test]
fn manifest_step_leaves_settled_unit_alone() {
    let fixture = Fixture::new();
    fixture.write_tables(
        &["2019-08-02,1,T1,M1,/u/seq/T1.seq,/u/json/T1.json"],
        &["T1,M1,SQ.P1,10"],
    );
    let mut status = JobsetStatus::load(fixture.unit.status_path()).unwrap();
    status.set_status_failure();
    status.write().unwrap();

    let result = App::new()
        .manifest(fixture.unit.dir(), "SPQE01", &fixture.config_path())
        .unwrap();

    assert_eq!(result.action, ManifestAction::Skipped);
    assert!(!fixture.unit.manifest_path().as_std_path().exists());
}
