use cpml::core::io::descriptors::{descriptor_file_name, read_descriptor_rows};
use cpml::core::io::npy;
use cpml::core::models::topology::BondClass;
use cpml::engine::collector::{PREDICTED_DIPOLE_FILE, REFERENCE_DIPOLE_FILE};
use cpml::engine::comm::ProcessGroup;
use cpml::engine::config::{ConfigError, Mode, RunConfig, RunConfigBuilder};
use cpml::engine::error::EngineError;
use cpml::engine::progress::{Progress, ProgressReporter};
use cpml::workflows::pipeline::{self, PipelineSummary};
use nalgebra::Vector3;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

const BOX: f64 = 15.0;
const MOLECULES: usize = 2;

const METHANOL_ITP: &str = "\
[ moleculetype ]
MOL   3

[ atoms ]
;  nr  type  resnr  residue  atom  cgnr  charge
    1   c3     1     MOL      C1     1    0.117
    2   oh     1     MOL      O1     2   -0.599
    3   h1     1     MOL      H1     3    0.029
    4   h1     1     MOL      H2     4    0.029
    5   h1     1     MOL      H3     5    0.029
    6   ho     1     MOL      H4     6    0.396

[ bonds ]
    1   2
    1   3
    1   4
    1   5
    2   6
";

/// Methanol atoms relative to the carbon, in topology order.
fn methanol_atoms() -> [Vector3<f64>; 6] {
    [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.43, 0.0, 0.0),
        Vector3::new(-0.36, 1.03, 0.0),
        Vector3::new(-0.36, -0.51, 0.89),
        Vector3::new(-0.36, -0.51, -0.89),
        Vector3::new(1.75, 0.90, 0.0),
    ]
}

const BONDS: [(usize, usize); 5] = [(0, 1), (0, 2), (0, 3), (0, 4), (1, 5)];

/// Two lone-pair markers on the oxygen plus one marker slightly off each bond centre.
fn methanol_markers(atoms: &[Vector3<f64>; 6]) -> Vec<Vector3<f64>> {
    let mut markers = vec![
        atoms[1] + Vector3::new(0.0, 0.0, 0.3),
        atoms[1] + Vector3::new(0.0, 0.0, -0.3),
    ];
    for (k, &(a, b)) in BONDS.iter().enumerate() {
        let offset = 0.01 * (k as f64 + 1.0);
        markers.push((atoms[a] + atoms[b]) / 2.0 + Vector3::new(offset, -offset, 0.5 * offset));
    }
    markers
}

fn wrap(v: Vector3<f64>) -> Vector3<f64> {
    v.map(|c| c.rem_euclid(BOX))
}

fn trajectory_records(frames: usize) -> String {
    let origins = [Vector3::new(3.0, 4.0, 5.0), Vector3::new(14.2, 9.0, 7.5)];
    let drifts = [Vector3::new(0.07, -0.04, 0.05), Vector3::new(-0.05, 0.06, 0.02)];
    let atoms_per_frame = MOLECULES * (6 + 7);

    let mut text = String::new();
    for frame in 0..frames {
        let mut atoms = Vec::new();
        let mut markers = Vec::new();
        for m in 0..MOLECULES {
            let shift = origins[m] + drifts[m] * frame as f64;
            let mut local = methanol_atoms();
            // Flex the hydroxyl hydrogen so frames differ internally.
            local[5] += Vector3::new(0.0, 0.01 * (frame % 5) as f64, 0.0);
            markers.extend(methanol_markers(&local).into_iter().map(|p| wrap(p + shift)));
            atoms.extend(local.iter().map(|p| wrap(p + shift)));
        }
        writeln!(text, "{atoms_per_frame}").unwrap();
        writeln!(
            text,
            "Lattice=\"{BOX} 0.0 0.0 0.0 {BOX} 0.0 0.0 0.0 {BOX}\" Properties=species:S:1:pos:R:3 frame={frame}"
        )
        .unwrap();
        let symbols = ["C", "O", "H", "H", "H", "H"];
        for (i, p) in atoms.iter().enumerate() {
            writeln!(text, "{} {:.8} {:.8} {:.8}", symbols[i % 6], p.x, p.y, p.z).unwrap();
        }
        for p in &markers {
            writeln!(text, "X {:.8} {:.8} {:.8}", p.x, p.y, p.z).unwrap();
        }
    }
    text
}

fn linear_model(width: usize, seed: usize) -> String {
    let weights: Vec<Vec<f64>> = (0..3)
        .map(|row| {
            (0..width)
                .map(|col| ((row * 7 + col * 13 + seed) % 11) as f64 * 1e-3 - 5e-3)
                .collect()
        })
        .collect();
    serde_json::json!({
        "layers": [
            { "weights": weights, "bias": [0.1, -0.2, 0.3], "activation": "identity" }
        ]
    })
    .to_string()
}

struct Fixture {
    dir: TempDir,
    topology: PathBuf,
    trajectory: PathBuf,
    models: PathBuf,
}

impl Fixture {
    fn new(frames: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let topology = dir.path().join("methanol.itp");
        let trajectory = dir.path().join("methanol.xyz");
        let models = dir.path().join("models");
        std::fs::write(&topology, METHANOL_ITP).unwrap();
        std::fs::write(&trajectory, trajectory_records(frames)).unwrap();
        std::fs::create_dir(&models).unwrap();
        // No cc or ring model: methanol has no such sites.
        for (seed, label) in ["ch", "oh", "co", "o"].iter().enumerate() {
            std::fs::write(models.join(format!("model_{label}.json")), linear_model(288, seed)).unwrap();
        }
        Self {
            dir,
            topology,
            trajectory,
            models,
        }
    }

    fn corrupt_frame(&self, frame: usize) {
        let text = std::fs::read_to_string(&self.trajectory).unwrap();
        let record_lines = MOLECULES * 13 + 2;
        let target = frame * record_lines + 2;
        let corrupted: Vec<String> = text
            .lines()
            .enumerate()
            .map(|(i, line)| if i == target { "C abc 0.0 0.0".to_string() } else { line.to_string() })
            .collect();
        std::fs::write(&self.trajectory, corrupted.join("\n") + "\n").unwrap();
    }

    fn save_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self, mode: Mode, save: &str, frame_limit: Option<usize>) -> RunConfig {
        let (descriptor, predict, labels) = match mode {
            Mode::DescriptorOnly => (true, false, false),
            Mode::Label => (true, false, true),
            Mode::Predict => (false, true, false),
            Mode::LabelAndPredict => (true, true, true),
        };
        RunConfigBuilder::new()
            .topology_path(self.topology.clone())
            .trajectory_path(self.trajectory.clone())
            .save_dir(self.save_dir(save))
            .calc_descriptor(descriptor)
            .calc_predict(predict)
            .has_reference_labels(labels)
            .model_dir(predict.then(|| self.models.clone()))
            .frame_limit(frame_limit)
            .build()
            .unwrap()
    }
}

fn run_group(size: usize, config: &RunConfig) -> Vec<Result<PipelineSummary, EngineError>> {
    ProcessGroup::new(size)
        .unwrap()
        .launch(|comm| {
            let reporter = ProgressReporter::new();
            let config = config.clone();
            pipeline::run(&comm, move || Ok(config), &reporter)
        })
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

fn root_summary(results: Vec<Result<PipelineSummary, EngineError>>) -> PipelineSummary {
    let mut summaries: Vec<PipelineSummary> = results.into_iter().map(Result::unwrap).collect();
    summaries.remove(0)
}

fn read_rows(path: &Path) -> Vec<Vec<f64>> {
    npy::read_matrix(path).unwrap()
}

#[test]
fn ten_frames_on_four_ranks_use_three_rounds() {
    let fixture = Fixture::new(10);
    let config = fixture.config(Mode::Predict, "out", None);
    let results = run_group(4, &config);

    for (rank, result) in results.iter().enumerate() {
        let summary = result.as_ref().unwrap();
        assert_eq!(summary.rank, rank);
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.total_frames, 10);
        assert_eq!(summary.worker_count, 4);
        assert_eq!(summary.collected.is_some(), rank == 0);
    }

    let root = root_summary(results);
    let collected = root.collected.unwrap();
    assert_eq!(collected.frame_indices, (0..10).collect::<Vec<_>>());
    assert_eq!(collected.predicted_dipoles.as_ref().unwrap().len(), 10);
    assert_eq!(read_rows(&fixture.save_dir("out").join(PREDICTED_DIPOLE_FILE)).len(), 10);
    assert!(!fixture.save_dir("out").join(REFERENCE_DIPOLE_FILE).exists());
}

#[test]
fn dipoles_do_not_depend_on_group_size() {
    let fixture = Fixture::new(7);
    let mut outputs = Vec::new();
    for size in [1, 3, 4] {
        let save = format!("out-{size}");
        let config = fixture.config(Mode::LabelAndPredict, &save, None);
        let root = root_summary(run_group(size, &config));
        assert_eq!(root.mode, Mode::LabelAndPredict);
        let collected = root.collected.unwrap();
        outputs.push((
            collected.reference_dipoles.unwrap(),
            collected.predicted_dipoles.unwrap(),
            read_rows(&fixture.save_dir(&save).join(PREDICTED_DIPOLE_FILE)),
        ));
    }

    let (reference, predicted, stored) = &outputs[0];
    assert_eq!(reference.len(), 7);
    assert!(predicted.iter().flatten().all(|v| v.is_finite()));
    assert_eq!(stored[2], predicted[2].to_vec());
    for other in &outputs[1..] {
        assert_eq!(&other.0, reference);
        assert_eq!(&other.1, predicted);
        assert_eq!(&other.2, stored);
    }
}

#[test]
fn reference_dipole_matches_marker_offsets() {
    let fixture = Fixture::new(2);
    let config = fixture.config(Mode::Label, "out", None);
    let root = root_summary(run_group(2, &config));
    let reference = root.collected.unwrap().reference_dipoles.unwrap();

    // Lone-pair markers cancel; each bond marker is displaced by (o, -o, o/2).
    let coef = cpml::core::utils::units::CHARGE_ANGSTROM_TO_DEBYE;
    let offsets: f64 = (1..=5).map(|k| 0.01 * k as f64).sum();
    let per_molecule = -2.0 * coef * Vector3::new(offsets, -offsets, 0.5 * offsets);
    let expected = per_molecule * MOLECULES as f64;
    for row in reference {
        let got = Vector3::new(row[0], row[1], row[2]);
        assert!((got - expected).norm() < 1e-5, "got {got:?}, expected {expected:?}");
    }
}

#[test]
fn descriptor_files_are_written_per_frame_and_class() {
    let fixture = Fixture::new(5);
    let single = fixture.config(Mode::DescriptorOnly, "one", None);
    let group = fixture.config(Mode::DescriptorOnly, "three", None);
    let one = root_summary(run_group(1, &single)).collected.unwrap();
    let three = root_summary(run_group(3, &group)).collected.unwrap();

    // Four non-empty classes per frame; cc and ring have no sites.
    assert_eq!(one.written.len(), 5 * 4);
    assert_eq!(three.written.len(), 5 * 4);
    assert!(one.reference_dipoles.is_none() && one.predicted_dipoles.is_none());

    for frame in 0..5 {
        let ch = descriptor_file_name(BondClass::CarbonHydrogen, frame);
        let rows = read_descriptor_rows(&fixture.save_dir("one").join(&ch)).unwrap();
        assert_eq!(rows.len(), 3 * MOLECULES);
        assert!(rows.iter().all(|row| row.len() == 288));
        assert_eq!(rows, read_descriptor_rows(&fixture.save_dir("three").join(&ch)).unwrap());

        let ring = descriptor_file_name(BondClass::Ring, frame);
        assert!(!fixture.save_dir("one").join(ring).exists());
    }
}

#[test]
fn zero_frames_run_no_rounds_and_persist_empty_arrays() {
    let fixture = Fixture::new(3);
    let config = fixture.config(Mode::LabelAndPredict, "out", Some(0));
    let results = run_group(3, &config);
    assert!(results.iter().all(|r| r.as_ref().unwrap().rounds == 0));

    let collected = root_summary(results).collected.unwrap();
    assert!(collected.frame_indices.is_empty());
    assert!(read_rows(&fixture.save_dir("out").join(PREDICTED_DIPOLE_FILE)).is_empty());
    assert!(read_rows(&fixture.save_dir("out").join(REFERENCE_DIPOLE_FILE)).is_empty());
}

#[test]
fn empty_trajectory_runs_no_rounds_and_persists_empty_arrays() {
    let fixture = Fixture::new(0);
    assert_eq!(std::fs::metadata(&fixture.trajectory).unwrap().len(), 0);
    let config = fixture.config(Mode::LabelAndPredict, "out", None);
    let results = run_group(3, &config);
    assert!(results.iter().all(|r| r.as_ref().unwrap().rounds == 0));

    let root = root_summary(results);
    assert_eq!(root.total_frames, 0);
    assert!(root.collected.unwrap().frame_indices.is_empty());
    assert!(read_rows(&fixture.save_dir("out").join(PREDICTED_DIPOLE_FILE)).is_empty());
    assert!(read_rows(&fixture.save_dir("out").join(REFERENCE_DIPOLE_FILE)).is_empty());
}

#[test]
fn frame_limit_caps_the_counted_frames() {
    let fixture = Fixture::new(6);
    let capped = root_summary(run_group(4, &fixture.config(Mode::Predict, "capped", Some(5))));
    assert_eq!(capped.total_frames, 5);
    assert_eq!(capped.rounds, 2);

    let generous = root_summary(run_group(4, &fixture.config(Mode::Predict, "all", Some(100))));
    assert_eq!(generous.total_frames, 6);
}

#[test]
fn configuration_errors_stop_every_rank() {
    let results: Vec<_> = ProcessGroup::new(3)
        .unwrap()
        .launch(|comm| {
            let reporter = ProgressReporter::new();
            pipeline::run(&comm, || Err(ConfigError::NoStageEnabled), &reporter)
        })
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert!(matches!(results[0], Err(EngineError::Config(ConfigError::NoStageEnabled))));
    for result in &results[1..] {
        assert!(matches!(result, Err(EngineError::Aborted { .. })));
    }
}

#[test]
fn missing_topology_stops_every_rank() {
    let fixture = Fixture::new(2);
    let mut config = fixture.config(Mode::DescriptorOnly, "out", None);
    config.topology_path = fixture.save_dir("missing.itp");
    let results = run_group(2, &config);
    assert!(matches!(results[0], Err(EngineError::Topology(_))));
    match &results[1] {
        Err(EngineError::Aborted { reason }) => assert!(reason.contains("missing.itp")),
        other => panic!("expected an abort, got {other:?}"),
    }
    assert!(!fixture.save_dir("out").exists());
}

#[test]
fn unreadable_frame_aborts_the_round_loop_without_persisting() {
    let fixture = Fixture::new(10);
    fixture.corrupt_frame(6);
    let config = fixture.config(Mode::Predict, "out", None);
    let results = run_group(4, &config);

    assert!(matches!(results[0], Err(EngineError::Trajectory(_))));
    for result in &results[1..] {
        assert!(matches!(result, Err(EngineError::Aborted { .. })));
    }
    assert!(!fixture.save_dir("out").join(PREDICTED_DIPOLE_FILE).exists());
}

#[test]
fn aborted_descriptor_run_leaves_the_save_directory_empty() {
    let fixture = Fixture::new(10);
    fixture.corrupt_frame(6);
    let config = fixture.config(Mode::DescriptorOnly, "out", None);
    let results = run_group(4, &config);

    assert!(matches!(results[0], Err(EngineError::Trajectory(_))));
    let leftovers: Vec<_> = std::fs::read_dir(fixture.save_dir("out"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "found {leftovers:?}");
}

#[test]
fn progress_is_reported_once_per_round() {
    let fixture = Fixture::new(5);
    let config = fixture.config(Mode::Predict, "out", None);
    let rounds = Mutex::new(Vec::new());
    let results = ProcessGroup::new(2).unwrap().launch(|comm| {
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::RoundFinished { round, frames } = event {
                rounds.lock().unwrap().push((round, frames));
            }
        }));
        let config = config.clone();
        pipeline::run(&comm, move || Ok(config), &reporter)
    });
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));
    assert_eq!(rounds.into_inner().unwrap(), vec![(0, 2), (1, 2), (2, 1)]);
}
