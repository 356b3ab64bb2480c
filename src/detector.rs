//! This module implements the windowed novelty detector.
//!
//! Reads are consumed in windows of W reads. Each window is sketched into an
//! ephemeral sketch S which is united with the catalog R to estimate the
//! fraction of the window's distinct k-mers that are absent from the catalog:
//!
//! ```text
//! rho = max(0, |R ∪ S| - |R|) / |S|      (0 if |S| = 0)
//! ```
//!
//! The detector starts out calibrating: the rho of the first C windows are
//! collected and summarized into a fixed threshold `tau = mu + k_sigma * sigma`,
//! after which every window with `rho > tau` raises an alert. `rho` subtracts two
//! noisy estimates, so it is treated as a relative signal against this
//! data-driven baseline rather than as an exact measurement.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{KrarityError, Result};
use crate::sketch::CardinalitySketch;
use crate::windows::{Window, Windows};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    window_size: usize,
    calibration_windows: usize,
    sigma_multiplier: f64,
    safety_ceiling: f64,
    min_threshold_gap: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            window_size: 10_000,
            calibration_windows: 5,
            sigma_multiplier: 3.0,
            safety_ceiling: 0.20,
            min_threshold_gap: 0.01,
        }
    }
}

impl DetectorParams {
    pub fn new(
        window_size: usize,
        calibration_windows: usize,
        sigma_multiplier: f64,
        safety_ceiling: f64,
        min_threshold_gap: f64,
    ) -> Result<Self> {
        if window_size == 0 {
            return Err(KrarityError::InvalidParameter("window size must be at least 1".to_string()));
        }

        if calibration_windows == 0 {
            return Err(KrarityError::InvalidParameter(
                "at least one calibration window is required".to_string(),
            ));
        }

        if !(sigma_multiplier.is_finite() && sigma_multiplier >= 0.0) {
            return Err(KrarityError::InvalidParameter(format!(
                "sigma multiplier must be a non-negative number, got {sigma_multiplier}"
            )));
        }

        if !(safety_ceiling.is_finite() && safety_ceiling > 0.0) {
            return Err(KrarityError::InvalidParameter(format!(
                "safety ceiling must be a positive number, got {safety_ceiling}"
            )));
        }

        if !(min_threshold_gap.is_finite() && min_threshold_gap >= 0.0) {
            return Err(KrarityError::InvalidParameter(format!(
                "minimum threshold gap must be a non-negative number, got {min_threshold_gap}"
            )));
        }

        Ok(DetectorParams {
            window_size,
            calibration_windows,
            sigma_multiplier,
            safety_ceiling,
            min_threshold_gap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn calibration_windows(&self) -> usize {
        self.calibration_windows
    }

    pub fn sigma_multiplier(&self) -> f64 {
        self.sigma_multiplier
    }

    pub fn safety_ceiling(&self) -> f64 {
        self.safety_ceiling
    }

    pub fn min_threshold_gap(&self) -> f64 {
        self.min_threshold_gap
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    Calibrating,
    Monitoring,
}

impl fmt::Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorState::Calibrating => write!(f, "CALIBRATING"),
            DetectorState::Monitoring => write!(f, "MONITORING"),
        }
    }
}

/// Outcome of evaluating one window.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    /// 1-based position of the window in the stream.
    pub window_id: u64,
    pub rho: f64,
    /// Detection threshold, absent while calibrating.
    pub threshold: Option<f64>,
    /// State the window was evaluated in.
    pub state: DetectorState,
    pub alert: bool,
    /// True for a trailing window holding fewer than W reads.
    pub partial: bool,
    pub reads: usize,
    /// |S|
    pub card_window: f64,
    /// |R ∪ S|
    pub card_union: f64,
    /// |R|
    pub card_catalog: f64,
    pub elapsed: Duration,
}

/// Baseline statistics of the calibration windows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
}

/// Summarize calibration observations into a detection threshold.
///
/// The threshold is `mean + sigma_multiplier * std_dev` (sample standard
/// deviation, 0 for a single observation), raised to at least
/// `mean + min_threshold_gap`. A mean above the safety ceiling indicates the
/// calibration period itself was anomalous, in which case the ceiling is used.
pub fn calibrate(observations: &[f64], params: &DetectorParams) -> Option<Calibration> {
    if observations.is_empty() {
        return None;
    }

    let n = observations.len() as f64;
    let mean = observations.iter().sum::<f64>() / n;
    let std_dev = if observations.len() > 1 {
        let ss: f64 = observations.iter().map(|x| (x - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    let threshold = if mean > params.safety_ceiling {
        params.safety_ceiling
    } else {
        (mean + params.sigma_multiplier * std_dev).max(mean + params.min_threshold_gap)
    };

    Some(Calibration {
        mean,
        std_dev,
        threshold,
    })
}

/// Fraction of a window's distinct k-mers not covered by the catalog.
pub fn novelty_ratio(card_window: f64, card_union: f64, card_catalog: f64) -> f64 {
    if card_window > 0.0 {
        (card_union - card_catalog).max(0.0) / card_window
    } else {
        0.0
    }
}

/// Calibration and alerting state machine over a read stream.
pub struct NoveltyDetector<'c> {
    catalog: &'c Catalog,
    params: DetectorParams,
    card_catalog: f64,
    state: DetectorState,
    calibration: Vec<f64>,
    threshold: Option<f64>,
    windows_evaluated: u64,
}

impl<'c> NoveltyDetector<'c> {
    pub fn new(catalog: &'c Catalog, params: DetectorParams) -> Self {
        NoveltyDetector {
            catalog,
            params,
            card_catalog: catalog.cardinality(),
            state: DetectorState::Calibrating,
            calibration: Vec::with_capacity(params.calibration_windows),
            threshold: None,
            windows_evaluated: 0,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn windows_evaluated(&self) -> u64 {
        self.windows_evaluated
    }

    /// Sketch a window of reads and evaluate it.
    pub fn evaluate_window<T: AsRef<[u8]>>(&mut self, window: &Window<T>) -> Result<DetectionRecord> {
        let start = Instant::now();

        let mut sketch = self.catalog.params().create_sketch();
        for read in &window.reads {
            sketch.add_seq(read.as_ref());
        }

        let mut record = self.evaluate_sketch(&sketch, window.reads.len(), window.partial)?;
        record.elapsed = start.elapsed();
        Ok(record)
    }

    /// Evaluate an already sketched window.
    pub fn evaluate_sketch(
        &mut self,
        sketch: &CardinalitySketch,
        reads: usize,
        partial: bool,
    ) -> Result<DetectionRecord> {
        let union = self.catalog.union(sketch)?;
        let card_window = sketch.estimate();
        let card_union = union.estimate();
        let rho = novelty_ratio(card_window, card_union, self.card_catalog);

        self.windows_evaluated += 1;
        let window_id = self.windows_evaluated;
        let state = self.state;

        let (threshold, alert) = match self.state {
            DetectorState::Calibrating => {
                self.observe_calibration(rho);
                (None, false)
            }
            DetectorState::Monitoring => {
                let tau = self.threshold.unwrap_or(self.params.safety_ceiling);
                let alert = rho > tau;
                if alert {
                    warn!("Window {}: ALERT (rho = {:.4}, threshold = {:.4})", window_id, rho, tau);
                } else if window_id % 5 == 0 {
                    debug!("Window {}: OK (rho = {:.4})", window_id, rho);
                }
                (Some(tau), alert)
            }
        };

        Ok(DetectionRecord {
            window_id,
            rho,
            threshold,
            state,
            alert,
            partial,
            reads,
            card_window,
            card_union,
            card_catalog: self.card_catalog,
            elapsed: Duration::ZERO,
        })
    }

    fn observe_calibration(&mut self, rho: f64) {
        self.calibration.push(rho);
        if self.calibration.len() < self.params.calibration_windows {
            return;
        }

        if let Some(calibration) = calibrate(&self.calibration, &self.params) {
            if calibration.mean > self.params.safety_ceiling {
                warn!(
                    "Calibration mean rho {:.4} exceeds safety ceiling; using threshold {:.4}.",
                    calibration.mean, calibration.threshold
                );
            }
            info!(
                "Calibration complete: mean rho = {:.4}, sd = {:.4}, threshold = {:.4}",
                calibration.mean, calibration.std_dev, calibration.threshold
            );

            self.threshold = Some(calibration.threshold);
            self.state = DetectorState::Monitoring;
            self.calibration.clear();
        }
    }

    /// Lazily evaluate a read stream window by window.
    ///
    /// Dropping the returned iterator cancels the analysis at a window boundary.
    pub fn run<I, T>(self, reads: I) -> Detections<'c, I::IntoIter>
    where
        I: IntoIterator<Item = Result<T>>,
        T: AsRef<[u8]>,
    {
        let window_size = self.params.window_size;
        Detections {
            detector: self,
            windows: Windows::new(reads.into_iter(), window_size),
        }
    }
}

/// Detection records of a read stream, in window order.
pub struct Detections<'c, I> {
    detector: NoveltyDetector<'c>,
    windows: Windows<I>,
}

impl<'c, I> Detections<'c, I> {
    pub fn detector(&self) -> &NoveltyDetector<'c> {
        &self.detector
    }
}

impl<I, T> Iterator for Detections<'_, I>
where
    I: Iterator<Item = Result<T>>,
    T: AsRef<[u8]>,
{
    type Item = Result<DetectionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.windows.next()? {
            Ok(window) => Some(self.detector.evaluate_window(&window)),
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sketch_params::SketchParams;

    fn params(window_size: usize, calibration_windows: usize) -> DetectorParams {
        DetectorParams::new(window_size, calibration_windows, 2.0, 0.20, 0.01).unwrap()
    }

    fn catalog_of(seqs: &[&[u8]]) -> Catalog {
        let mut sketch = SketchParams::new(5, 10).unwrap().create_sketch();
        for seq in seqs {
            sketch.add_seq(seq);
        }
        Catalog::new(sketch, None)
    }

    fn reads(seqs: &[&[u8]]) -> Vec<Result<Vec<u8>>> {
        seqs.iter().map(|s| Ok(s.to_vec())).collect()
    }

    const REF: &[u8] = b"ACGGTCATTGACCATGGACTTACGATCGATCGGATCCATGCA";

    #[test]
    fn test_params_validation() {
        assert!(DetectorParams::new(0, 5, 3.0, 0.2, 0.01).is_err());
        assert!(DetectorParams::new(10, 0, 3.0, 0.2, 0.01).is_err());
        assert!(DetectorParams::new(10, 5, -1.0, 0.2, 0.01).is_err());
        assert!(DetectorParams::new(10, 5, 3.0, 0.0, 0.01).is_err());
        assert!(DetectorParams::new(10, 5, 3.0, 0.2, f64::NAN).is_err());
        assert_eq!(DetectorParams::default(), DetectorParams::new(10_000, 5, 3.0, 0.2, 0.01).unwrap());
    }

    #[test]
    fn test_novelty_ratio() {
        assert_eq!(novelty_ratio(0.0, 100.0, 100.0), 0.0);
        assert_eq!(novelty_ratio(50.0, 125.0, 100.0), 0.5);
        // noise pushing the union below the catalog is clamped
        assert_eq!(novelty_ratio(50.0, 98.0, 100.0), 0.0);
    }

    #[test]
    fn test_calibrate() {
        let p = params(10, 5);

        // mean 0.02, sample sd 0.01 -> 0.02 + 2 * 0.01
        let c = calibrate(&[0.01, 0.02, 0.03], &p).unwrap();
        assert!((c.mean - 0.02).abs() < 1e-12);
        assert!((c.std_dev - 0.01).abs() < 1e-12);
        assert!((c.threshold - 0.04).abs() < 1e-12);

        // single sample: sd 0, threshold floored at mean + gap
        let c = calibrate(&[0.05], &p).unwrap();
        assert_eq!(c.std_dev, 0.0);
        assert!((c.threshold - 0.06).abs() < 1e-12);

        // constant baseline also uses the gap
        let c = calibrate(&[0.0, 0.0, 0.0], &p).unwrap();
        assert!((c.threshold - 0.01).abs() < 1e-12);

        // anomalous calibration period clamps to the ceiling
        let c = calibrate(&[0.5, 0.6, 0.7], &p).unwrap();
        assert_eq!(c.threshold, 0.20);

        assert!(calibrate(&[], &p).is_none());
    }

    #[test]
    fn test_state_machine() {
        let catalog = catalog_of(&[REF]);
        let mut detector = NoveltyDetector::new(&catalog, params(1, 2));
        assert_eq!(detector.state(), DetectorState::Calibrating);

        let known = Window { reads: vec![REF.to_vec()], partial: false };
        let novel = Window { reads: vec![b"TTTTTTTTTTGGGGGGGGGGCCCCCAAAAATATATGCGC".to_vec()], partial: false };

        let r1 = detector.evaluate_window(&known).unwrap();
        assert_eq!((r1.window_id, r1.state, r1.threshold, r1.alert), (1, DetectorState::Calibrating, None, false));
        assert_eq!(r1.rho, 0.0);
        assert_eq!(r1.card_union, r1.card_catalog);

        // the window completing calibration is still reported as calibrating
        let r2 = detector.evaluate_window(&known).unwrap();
        assert_eq!((r2.state, r2.threshold, r2.alert), (DetectorState::Calibrating, None, false));
        assert_eq!(detector.state(), DetectorState::Monitoring);
        assert!((detector.threshold().unwrap() - 0.01).abs() < 1e-12);

        let r3 = detector.evaluate_window(&known).unwrap();
        assert_eq!((r3.window_id, r3.state, r3.alert), (3, DetectorState::Monitoring, false));
        assert_eq!(r3.threshold, detector.threshold());

        let r4 = detector.evaluate_window(&novel).unwrap();
        assert!(r4.rho > 0.5);
        assert!(r4.alert);

        let r5 = detector.evaluate_window(&known).unwrap();
        assert!(!r5.alert);
        assert_eq!(detector.windows_evaluated(), 5);
    }

    #[test]
    fn test_empty_window_has_zero_rho() {
        let catalog = catalog_of(&[REF]);
        let mut detector = NoveltyDetector::new(&catalog, params(2, 5));

        // reads shorter than k or entirely ambiguous yield no k-mers
        let window = Window { reads: vec![b"ACG".to_vec(), b"NNNNNNNN".to_vec()], partial: false };
        let record = detector.evaluate_window(&window).unwrap();
        assert_eq!(record.card_window, 0.0);
        assert_eq!(record.rho, 0.0);
        assert_eq!(record.reads, 2);
    }

    #[test]
    fn test_short_stream_yields_one_partial_window() {
        let catalog = catalog_of(&[REF]);
        let detector = NoveltyDetector::new(&catalog, params(10, 5));

        let records: Vec<DetectionRecord> = detector
            .run(reads(&[REF, REF, REF]))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].partial);
        assert_eq!(records[0].reads, 3);
        assert_eq!(records[0].state, DetectorState::Calibrating);
        assert_eq!(records[0].threshold, None);
        assert!(!records[0].alert);
    }

    #[test]
    fn test_run_emits_one_record_per_window() {
        let catalog = catalog_of(&[REF]);
        let detector = NoveltyDetector::new(&catalog, params(2, 1));

        let records: Vec<DetectionRecord> = detector
            .run(reads(&[REF, REF, REF, REF, REF]))
            .collect::<Result<_>>()
            .unwrap();

        let ids: Vec<u64> = records.iter().map(|r| r.window_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let partial: Vec<bool> = records.iter().map(|r| r.partial).collect();
        assert_eq!(partial, vec![false, false, true]);
        assert_eq!(records[0].state, DetectorState::Calibrating);
        assert_eq!(records[1].state, DetectorState::Monitoring);
        assert_eq!(records[2].state, DetectorState::Monitoring);
    }

    #[test]
    fn test_stream_error_aborts_run() {
        let catalog = catalog_of(&[REF]);
        let detector = NoveltyDetector::new(&catalog, params(2, 1));

        let stream = vec![
            Ok(REF.to_vec()),
            Ok(REF.to_vec()),
            Ok(REF.to_vec()),
            Err(KrarityError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated gzip stream",
            ))),
            Ok(REF.to_vec()),
        ];
        let results: Vec<Result<DetectionRecord>> = detector.run(stream).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(KrarityError::Io(_))));
    }

    #[test]
    fn test_cancel_at_window_boundary() {
        let catalog = catalog_of(&[REF]);
        let detector = NoveltyDetector::new(&catalog, params(1, 5));

        let mut detections = detector.run(reads(&[REF, REF, REF, REF]));
        assert!(detections.next().unwrap().is_ok());
        assert!(detections.next().unwrap().is_ok());
        assert_eq!(detections.detector().windows_evaluated(), 2);
        drop(detections);
        assert_eq!(catalog.sketch().estimate(), catalog.cardinality());
    }
}
