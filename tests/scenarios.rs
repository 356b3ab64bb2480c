//! End-to-end checks of catalog building and windowed detection on synthetic genomes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use krarity::builder::{build_catalog, sketch_file};
use krarity::catalog::Catalog;
use krarity::detector::{DetectionRecord, DetectorParams, DetectorState, NoveltyDetector};
use krarity::io_utils::find_genome_files;
use krarity::kmer::reverse_complement;
use krarity::report::{RecordSink, TsvSink, TSV_HEADER};
use krarity::sketch_params::SketchParams;
use krarity::windows::ReadStream;
use krarity::{KrarityError, Result};

const GENOME_LENGTH: usize = 50_000;
const READ_LENGTH: usize = 150;

fn random_genome(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

/// Error-free read from a random position and strand of a random genome.
fn sample_read(rng: &mut StdRng, genomes: &[&[u8]]) -> Vec<u8> {
    let genome = genomes[rng.gen_range(0..genomes.len())];
    let start = rng.gen_range(0..=genome.len() - READ_LENGTH);
    let read = &genome[start..start + READ_LENGTH];
    if rng.gen_range(0..2) == 0 {
        read.to_vec()
    } else {
        reverse_complement(read)
    }
}

fn write_fasta(path: &Path, seq: &[u8]) {
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, ">{}", path.file_stem().unwrap().to_string_lossy()).unwrap();
    for line in seq.chunks(80) {
        file.write_all(line).unwrap();
        file.write_all(b"\n").unwrap();
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    catalog: Catalog,
    genome_a: Vec<u8>,
    genome_b: Vec<u8>,
    genome_c: Vec<u8>,
}

/// Catalog over two random genomes A and B, plus an unrelated genome C.
fn fixture(seed: u64) -> Fixture {
    let mut rng = StdRng::seed_from_u64(seed);
    let genome_a = random_genome(&mut rng, GENOME_LENGTH);
    let genome_b = random_genome(&mut rng, GENOME_LENGTH);
    let genome_c = random_genome(&mut rng, GENOME_LENGTH);

    let dir = tempdir().unwrap();
    let path_a = dir.path().join("A.fna");
    let path_b = dir.path().join("B.fna");
    write_fasta(&path_a, &genome_a);
    write_fasta(&path_b, &genome_b);

    let params = SketchParams::new(31, 14).unwrap();
    let report = build_catalog(&[path_a, path_b], &params, "AB").unwrap();
    assert_eq!(report.successes, 2);

    Fixture {
        _dir: dir,
        catalog: report.catalog,
        genome_a,
        genome_b,
        genome_c,
    }
}

fn detect(catalog: &Catalog, reads: Vec<Vec<u8>>, params: DetectorParams) -> Vec<DetectionRecord> {
    NoveltyDetector::new(catalog, params)
        .run(reads.into_iter().map(Ok))
        .collect::<Result<_>>()
        .unwrap()
}

#[test]
fn test_reference_reads_never_alert() {
    let fx = fixture(1);
    let mut rng = StdRng::seed_from_u64(11);
    let reads: Vec<Vec<u8>> = (0..50_000)
        .map(|_| sample_read(&mut rng, &[fx.genome_a.as_slice(), fx.genome_b.as_slice()]))
        .collect();

    let params = DetectorParams::new(1000, 5, 3.0, 0.20, 0.01).unwrap();
    let records = detect(&fx.catalog, reads, params);

    assert_eq!(records.len(), 50);
    assert!(records.iter().all(|r| !r.partial && r.reads == 1000));
    assert!(records[..5].iter().all(|r| r.state == DetectorState::Calibrating && r.threshold.is_none()));
    assert!(records[5..].iter().all(|r| r.state == DetectorState::Monitoring && r.threshold.is_some()));
    assert!(records.iter().all(|r| !r.alert));

    // every read k-mer is already in the catalog, so the union never grows
    assert!(records.iter().all(|r| r.rho == 0.0));
}

#[test]
fn test_injected_foreign_reads_alert() {
    let fx = fixture(2);
    let mut rng = StdRng::seed_from_u64(22);

    // reads 10,750..11,250 come from C, spanning windows 11 and 12
    let reads: Vec<Vec<u8>> = (0..50_000)
        .map(|i| {
            if (10_750..11_250).contains(&i) {
                sample_read(&mut rng, &[fx.genome_c.as_slice()])
            } else {
                sample_read(&mut rng, &[fx.genome_a.as_slice(), fx.genome_b.as_slice()])
            }
        })
        .collect();

    let params = DetectorParams::new(1000, 5, 3.0, 0.20, 0.01).unwrap();
    let records = detect(&fx.catalog, reads, params);
    assert_eq!(records.len(), 50);

    let alerts: Vec<u64> = records.iter().filter(|r| r.alert).map(|r| r.window_id).collect();
    assert_eq!(alerts, vec![11, 12]);

    for record in &records[10..12] {
        assert!(record.rho > record.threshold.unwrap());
        assert!(record.rho > 0.1);
    }
    assert!(records[12..].iter().all(|r| !r.alert && r.rho == 0.0));
}

#[test]
fn test_build_skips_corrupt_genomes() {
    let dir = tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let mut valid = Vec::new();
    for i in 0..7 {
        let path = dir.path().join(format!("genome_{i}.fna"));
        write_fasta(&path, &random_genome(&mut rng, 5_000));
        valid.push(path);
    }

    let corrupt: Vec<PathBuf> = ["corrupt_0.fna", "corrupt_1.fna", "corrupt_2.fna"]
        .iter()
        .map(|name| dir.path().join(name))
        .collect();
    fs::write(&corrupt[0], "this is not a sequence file\n").unwrap();
    fs::write(&corrupt[1], "").unwrap();
    fs::write(&corrupt[2], [0u8, 1, 2, 3, 255, 254]).unwrap();

    let genome_files = find_genome_files(dir.path()).unwrap();
    assert_eq!(genome_files.len(), 10);

    let params = SketchParams::new(21, 12).unwrap();
    let report = build_catalog(&genome_files, &params, "mixed").unwrap();

    assert_eq!(report.file_count, 10);
    assert_eq!(report.successes, 7);
    let failed: Vec<PathBuf> = report.failures.iter().map(|f| f.path.clone()).collect();
    assert_eq!(failed, corrupt);

    let mut sequential = params.create_sketch();
    for path in &valid {
        sequential = sequential.merge(&sketch_file(path, &params).unwrap().sketch).unwrap();
    }
    assert_eq!(report.catalog.sketch(), &sequential);

    let estimate = report.estimate();
    let truth = 7.0 * (5_000.0 - 20.0);
    assert!((estimate - truth).abs() / truth < 3.0 * 1.04 / 64.0);
}

#[test]
fn test_short_stream_single_partial_window() {
    let fx = fixture(4);
    let mut rng = StdRng::seed_from_u64(44);
    let reads: Vec<Vec<u8>> = (0..250)
        .map(|_| sample_read(&mut rng, &[fx.genome_a.as_slice()]))
        .collect();

    let records = detect(&fx.catalog, reads, DetectorParams::new(1000, 5, 3.0, 0.20, 0.01).unwrap());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].window_id, 1);
    assert!(records[0].partial);
    assert_eq!(records[0].reads, 250);
    assert_eq!(records[0].state, DetectorState::Calibrating);
    assert_eq!(records[0].threshold, None);
    assert!(!records[0].alert);
}

#[test]
fn test_catalog_file_and_read_file_round_trip() {
    let fx = fixture(5);
    let dir = tempdir().unwrap();

    let catalog_path = dir.path().join("AB.sketch");
    fx.catalog.save(&catalog_path).unwrap();
    let catalog = Catalog::load(&catalog_path).unwrap();
    assert_eq!(catalog, fx.catalog);
    assert_eq!(catalog.name(), "AB");

    let mut rng = StdRng::seed_from_u64(55);
    let reads_path = dir.path().join("sample.fq");
    let mut file = fs::File::create(&reads_path).unwrap();
    for i in 0..2_500 {
        let read = sample_read(&mut rng, &[fx.genome_a.as_slice(), fx.genome_b.as_slice()]);
        writeln!(file, "@read{i}").unwrap();
        file.write_all(&read).unwrap();
        writeln!(file, "\n+").unwrap();
        file.write_all(&vec![b'I'; read.len()]).unwrap();
        file.write_all(b"\n").unwrap();
    }
    drop(file);

    let mut stream = ReadStream::open(&reads_path).unwrap();
    let params = DetectorParams::new(1000, 2, 3.0, 0.20, 0.01).unwrap();
    let mut sink = TsvSink::new(Vec::new()).unwrap();
    for record in NoveltyDetector::new(&catalog, params).run(stream.by_ref()) {
        sink.write_record(&record.unwrap()).unwrap();
    }
    sink.finish().unwrap();
    assert_eq!(stream.records(), 2_500);

    let table = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], TSV_HEADER);
    assert!(lines[1].starts_with("1\t0.000000\t\tCALIBRATING\tfalse\tfalse\t1000\t"));
    assert!(lines[3].starts_with("3\t0.000000\t0.010000\tMONITORING\tfalse\ttrue\t500\t"));
}

#[test]
fn test_incompatible_catalog_is_rejected() {
    let fx = fixture(6);
    let mut window = SketchParams::new(31, 12).unwrap().create_sketch();
    window.add_seq(&fx.genome_a[..500]);

    let mut detector = NoveltyDetector::new(&fx.catalog, DetectorParams::default());
    assert!(matches!(
        detector.evaluate_sketch(&window, 1, true),
        Err(KrarityError::PrecisionMismatch { .. })
    ));
}

#[test]
fn test_malformed_read_record_aborts_analysis() {
    let fx = fixture(7);
    let dir = tempdir().unwrap();

    let mut rng = StdRng::seed_from_u64(77);
    let reads_path = dir.path().join("truncated.fq");
    let mut file = fs::File::create(&reads_path).unwrap();
    for i in 0..30 {
        let read = sample_read(&mut rng, &[fx.genome_a.as_slice()]);
        writeln!(file, "@read{i}").unwrap();
        file.write_all(&read).unwrap();
        // read 25 is missing most of its quality string
        let qual_len = if i == 25 { 3 } else { read.len() };
        writeln!(file, "\n+").unwrap();
        file.write_all(&vec![b'I'; qual_len]).unwrap();
        file.write_all(b"\n").unwrap();
    }
    drop(file);

    let mut stream = ReadStream::open(&reads_path).unwrap();
    let params = DetectorParams::new(10, 1, 3.0, 0.20, 0.01).unwrap();
    let results: Vec<Result<DetectionRecord>> =
        NoveltyDetector::new(&fx.catalog, params).run(stream.by_ref()).collect();

    assert_eq!(results.len(), 3);
    assert!(results[..2].iter().all(|r| r.is_ok()));
    assert!(matches!(results[2], Err(KrarityError::Parse(_))));
    assert_eq!(stream.records(), 25);
}
