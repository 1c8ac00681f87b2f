use std::io::{Cursor, Read};

use camino::Utf8PathBuf;

use refget_loader::app::{App, LoadOptions};
use refget_loader::config::{Config, ConfigLoader, ResolvedConfig};
use refget_loader::error::RefgetError;
use refget_loader::output::JsonOutput;
use refget_loader::scanner::SearchClient;
use refget_loader::status::Status;

struct MockSearch(String);

impl SearchClient for MockSearch {
    fn search(&self, _query: &str) -> Result<Box<dyn Read + Send>, RefgetError> {
        Ok(Box::new(Cursor::new(self.0.clone().into_bytes())))
    }
}

fn assembly(accession: &str, url: &str) -> String {
    format!(
        "<ASSEMBLY accession=\"{accession}\"><ASSEMBLY_LINKS><ASSEMBLY_LINK><URL_LINK><LABEL>WGS_SET_FLATFILE</LABEL><URL>{url}</URL></URL_LINK></ASSEMBLY_LINK></ASSEMBLY_LINKS></ASSEMBLY>"
    )
}

fn setup() -> (tempfile::TempDir, Utf8PathBuf, ResolvedConfig) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let config: Config = serde_json::from_value(serde_json::json!({
        "source": {
            "type": "ena_assembly",
            "processing_dir": root.join("processing").as_str(),
            "start_date": "2019-08-02",
            "number_of_days": 1,
            "ena_refget_processor_script": "true",
            "url_prefix": "ftp://host",
            "mount_path": root.join("mount").as_str()
        },
        "destination": {"type": "aws_s3", "bucket_name": "refget"}
    }))
    .unwrap();
    let config = ConfigLoader::resolve_config(config, root.join("config.json")).unwrap();

    let input = root.join("mount/wgs/SPQ/SPQE01.dat.gz");
    std::fs::create_dir_all(input.parent().unwrap()).unwrap();
    std::fs::write(&input, b"ID").unwrap();
    (temp, root, config)
}

fn search_body() -> String {
    format!(
        "{}{}",
        assembly("GCA_1", "ftp://host/wgs/SPQ/SPQE01.dat.gz"),
        assembly("GCA_2", "ftp://host/wgs/MIS/MISS01.dat.gz")
    )
}

#[test]
fn dry_run_builds_jobs_without_dispatching() {
    let (_temp, _root, config) = setup();

    let result = App::new()
        .load(&config, MockSearch(search_body()), LoadOptions { dry_run: true })
        .unwrap();

    assert!(result.dry_run);
    assert!(result.execution.is_none());
    assert_eq!(result.jobs.len(), 3);
    assert_eq!(result.windows.len(), 1);
    assert_eq!(result.windows[0].records, 2);
    JsonOutput::print_load(&result).unwrap();
}

#[test]
fn load_dispatches_to_local_environment() {
    let (_temp, _root, config) = setup();

    let result = App::new()
        .with_loader_command("true")
        .load(&config, MockSearch(search_body()), LoadOptions::default())
        .unwrap();

    let execution = result.execution.unwrap();
    assert!(execution.is_clean(), "{execution:?}");
    assert_eq!(
        execution.executed,
        vec!["process.SPQE01", "manifest.SPQE01", "upload.SPQE01"]
    );
}

#[test]
fn status_lists_every_unit() {
    let (_temp, root, config) = setup();
    App::new()
        .load(&config, MockSearch(search_body()), LoadOptions { dry_run: true })
        .unwrap();

    let result = App::new().status(&root.join("processing")).unwrap();

    let summary = result
        .units
        .iter()
        .map(|unit| (unit.object_id.as_str(), unit.status))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![("GCA_2", Status::Failed), ("GCA_1", Status::Running)]
    );
    assert!(result.units[0].message.contains("MISS01.dat.gz"));
}
