//! End-to-end runs over temporary input folders.

use approx::assert_abs_diff_eq;
use g4post_io::{read_table, BatchSizing, Error, FileStatus, Runner};
use g4post_pipeline::{Resources, RunConfig};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

fn events(edep: &[&[f64]]) -> String {
    let mut offsets = vec![0];
    let mut data = Vec::new();
    for event in edep {
        data.extend_from_slice(event);
        offsets.push(data.len());
    }
    json!({
        "length": edep.len(),
        "columns": {
            "edep": {"dtype": "float64", "depth": 2, "offsets": [offsets], "data": data}
        }
    })
    .to_string()
}

fn config(input: &Path, output: &Path, para: &Value, modules: &Value) -> RunConfig {
    let json = json!({
        "io": {"input": {"folder": input, "format": "json"}, "output": output},
        "para": para,
        "input": {"tree": "hit", "var": {"edep": "hit/edep"}},
        "output": ["esum"],
        "modules": modules
    });
    RunConfig::from_json(&json.to_string()).unwrap()
}

fn sum_modules() -> Value {
    json!([
        {"name": "esum", "module": "sum", "input": {"val": "edep"}, "output": {"val": "esum"}}
    ])
}

fn esum(path: &Path) -> Vec<f64> {
    read_table(path)
        .unwrap()
        .column("esum")
        .unwrap()
        .to_float()
        .unwrap()
        .flatten()
}

#[test]
fn test_per_file_outputs() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("a.json"), events(&[&[1.0, 2.0], &[3.0]])).unwrap();
    fs::write(input.path().join("b.part.json"), events(&[&[0.5, 0.25]])).unwrap();

    let out_dir = output.path().join("reduced");
    let config = config(
        input.path(),
        &out_dir,
        &json!({"threads": 2, "step_size": 1}),
        &sum_modules(),
    );
    let resources = Resources::new();
    let report = Runner::new(&config, &resources).run().unwrap();

    assert_eq!(report.written(), 2);
    assert_eq!(report.rows(), 3);
    assert!(report.combined.is_none());
    assert_eq!(esum(&out_dir.join("a.json")), vec![3.0, 3.0]);
    assert_eq!(esum(&out_dir.join("b.part.json")), vec![0.75]);
}

#[test]
fn test_summarize_keeps_input_order_and_survives_failures() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("c.json"), events(&[&[0.5, 0.25]])).unwrap();
    fs::write(input.path().join("a.json"), events(&[&[1.0, 2.0], &[3.0]])).unwrap();
    fs::write(input.path().join("b.json"), "{\"length\": 1, \"columns\": {}}").unwrap();

    let combined = output.path().join("all.json");
    let config = config(
        input.path(),
        &combined,
        &json!({"threads": 3, "mode": "summarize"}),
        &sum_modules(),
    );
    let resources = Resources::new();
    let report = Runner::new(&config, &resources)
        .with_sizing(BatchSizing::default().with_memory_budget_bytes(64))
        .run()
        .unwrap();

    assert_eq!(report.written(), 2);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.outcomes[1].status,
        FileStatus::Failed(Error::MissingBranch { .. })
    ));
    assert_eq!(report.combined.as_deref(), Some(combined.as_path()));

    let values = esum(&combined);
    assert_eq!(values.len(), 3);
    for (got, want) in values.iter().zip([3.0, 3.0, 0.75]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }

    let again = Runner::new(&config, &resources).run().unwrap();
    assert_eq!(again.skipped(), 3);
    assert!(again.combined.is_none());
}

#[test]
fn test_window_pipeline_across_batches() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let file = json!({
        "length": 2,
        "columns": {
            "time": {"dtype": "float64", "depth": 2, "offsets": [[0, 3, 4]], "data": [0.0, 5.0, 20.0, 1.0]},
            "edep": {"dtype": "float64", "depth": 2, "offsets": [[0, 3, 4]], "data": [1.0, 2.0, 4.0, 8.0]},
            "vol": {"dtype": "int64", "depth": 2, "offsets": [[0, 3, 4]], "data": [1, 1, 2, 1]}
        }
    });
    fs::write(input.path().join("run.json"), file.to_string()).unwrap();

    let json = json!({
        "io": {"input": {"folder": input.path(), "format": "json"}, "output": output.path()},
        "para": {"threads": 1, "step_size": 1},
        "input": {"tree": "hit", "var": {"t": "hit/time", "edep": "hit/edep", "vol": "hit/vol"}},
        "output": ["w_t", "esum"],
        "modules": [
            {
                "name": "window",
                "module": "window",
                "para": {"dT": 10.0},
                "input": {"t": "t", "t_all": "t", "edep": "edep", "vol": "vol"},
                "output": {"w_t": "w_t", "t_sub": "t_sub", "edep": "edep", "vol": "vol"}
            },
            {"name": "esum", "module": "sum", "input": {"val": "edep"}, "output": {"val": "esum"}}
        ]
    });
    let config = RunConfig::from_json(&json.to_string()).unwrap();
    let resources = Resources::new();
    let report = Runner::new(&config, &resources).run().unwrap();
    assert_eq!(report.written(), 1);

    let table = read_table(&output.path().join("run.json")).unwrap();
    assert_eq!(table.len(), 2);
    let w_t = table.column("w_t").unwrap().to_float().unwrap().flatten();
    // times are relative to each event's earliest hit
    assert_eq!(w_t, vec![0.0, 20.0, 0.0]);
    assert_eq!(esum(&output.path().join("run.json")), vec![3.0, 4.0, 8.0]);
}

#[test]
fn test_active_time_without_registry_fails_before_processing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("a.json"), events(&[&[1.0]])).unwrap();
    let config = config(
        input.path(),
        output.path(),
        &json!({"threads": 1}),
        &json!([
            {
                "name": "livetime",
                "module": "detector_active_time",
                "input": {"edep": "edep", "vol": "edep"},
                "output": {"edep": "esum"}
            }
        ]),
    );
    let resources = Resources::new();
    let err = Runner::new(&config, &resources).run().unwrap_err();
    assert!(err.is_config());
    assert!(!output.path().join("a.json").exists());
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn test_failed_write_is_retried_on_rerun() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("a.json"), events(&[&[1.0]])).unwrap();
    let json = json!({
        "io": {
            "input": {"folder": input.path(), "format": "json"},
            "output": output.path(),
            "output_format": "hdf5"
        },
        "para": {"threads": 1, "step_size": 1},
        "input": {"tree": "hit", "var": {"edep": "hit/edep"}},
        "output": ["esum"],
        "modules": sum_modules()
    });
    let config = RunConfig::from_json(&json.to_string()).unwrap();
    let resources = Resources::new();

    for _ in 0..2 {
        let report = Runner::new(&config, &resources).run().unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 0);
        assert!(!report.outcomes[0].output.exists());
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
    }
}
