//! # Projection
//!
//! Reduces the signature set to 2D display coordinates.
//!
//! ## Methods
//! - `pca`: top two principal components by power iteration on the covariance
//!   of the centered signatures, the second one deflated against the first.
//!   Only two components of a ~128-dim space are needed so no full
//!   eigendecomposition is done.
//! - `random`: two random orthonormal directions.
//!
//! ## Post-processing
//! Both methods rescale each axis into `[-50, 50]` and add a `[-0.5, 0.5)`
//! jitter so that near-duplicate models do not sit exactly on top of each
//! other. Records without a usable signature get uniform random coordinates.
//!
//! ## Reproducibility
//! Every run owns a [`ChaCha8Rng`] seeded with [`PROJECTION_SEED`] and draws
//! from it in a fixed order: component initialisation, jitter for projected
//! records in store order, then coordinates for the remaining records in
//! store order. Identical input gives bit-identical output.
use bank::models::{ModelRecord, ProjectionMethod};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

pub const PROJECTION_SEED: u64 = 42;
pub const POWER_ITERATIONS: usize = 120;
pub const HALF_SPAN: f64 = 50.0;
pub const JITTER: f64 = 0.5;

const NORMALIZE_EPSILON: f64 = 1e-10;
const DEGENERATE_EPSILON: f64 = 1e-8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionSummary {
    pub method: ProjectionMethod,
    pub projected: usize,
    pub randomized: usize,
    pub dimension: Option<usize>,
}

pub struct ProjectionEngine {
    method: ProjectionMethod,
    rng: ChaCha8Rng,
}

impl ProjectionEngine {
    pub fn new(method: ProjectionMethod) -> Self {
        Self::with_seed(method, PROJECTION_SEED)
    }

    pub fn with_seed(method: ProjectionMethod, seed: u64) -> Self {
        Self {
            method,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn method(&self) -> ProjectionMethod {
        self.method
    }

    /// Overwrites `x`/`y` on every record.
    ///
    /// Consumes the engine so that each run starts from a fresh seed.
    pub fn project(mut self, records: &mut [ModelRecord]) -> ProjectionSummary {
        let (participants, dimension) = usable_signatures(records);

        if participants.len() < 2 {
            warn!(
                "Only {} model(s) with a usable signature, using random coordinates",
                participants.len()
            );

            records.iter_mut().for_each(|record| self.randomize(record));

            return ProjectionSummary {
                method: self.method,
                projected: 0,
                randomized: records.len(),
                dimension,
            };
        }

        let rows: Vec<&[f64]> = participants
            .iter()
            .filter_map(|&i| records[i].signature())
            .collect();

        let raw = match self.method {
            ProjectionMethod::Pca => self.pca(&rows),
            ProjectionMethod::Random => self.random_projection(&rows),
        };
        let scaled = rescale(&raw);

        let mut is_projected = vec![false; records.len()];
        for (&i, (x, y)) in participants.iter().zip(scaled) {
            let jitter_x = self.jitter();
            let jitter_y = self.jitter();

            records[i].x = Some(x + jitter_x);
            records[i].y = Some(y + jitter_y);
            is_projected[i] = true;
        }

        let mut randomized = 0;
        for (record, _) in records
            .iter_mut()
            .zip(is_projected)
            .filter(|(_, projected)| !projected)
        {
            self.randomize(record);
            randomized += 1;
        }

        debug!(
            "Projected {} records with {}, randomized {}",
            participants.len(),
            self.method,
            randomized
        );

        ProjectionSummary {
            method: self.method,
            projected: participants.len(),
            randomized,
            dimension,
        }
    }

    fn pca(&mut self, rows: &[&[f64]]) -> Vec<(f64, f64)> {
        let centered = center(rows);
        let (first, second) = self.principal_components(&centered);

        centered
            .iter()
            .map(|row| (dot(row, &first), dot(row, &second)))
            .collect()
    }

    fn principal_components(&mut self, centered: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
        let dimension = centered[0].len();

        let (first, _) = self.power_iteration(centered, None);
        let (mut second, norm) = self.power_iteration(centered, Some(&first));

        if norm < DEGENERATE_EPSILON {
            debug!("Second component degenerate (norm {norm:e}), substituting a random direction");

            second = self.random_vector(dimension);
            orthogonalize(&mut second, &first);
            normalize(&mut second);
        }

        (first, second)
    }

    /// Returns the converged direction and the norm of the last `XᵗXv` step.
    fn power_iteration(&mut self, centered: &[Vec<f64>], deflate: Option<&[f64]>) -> (Vec<f64>, f64) {
        let mut v = self.random_vector(centered[0].len());
        if let Some(basis) = deflate {
            orthogonalize(&mut v, basis);
        }
        normalize(&mut v);

        let mut last_norm = 0.0;
        for _ in 0..POWER_ITERATIONS {
            let mut w = covariance_product(centered, &v);
            if let Some(basis) = deflate {
                orthogonalize(&mut w, basis);
            }

            last_norm = norm(&w);
            if last_norm < DEGENERATE_EPSILON {
                break;
            }

            w.iter_mut().for_each(|x| *x /= last_norm);
            v = w;
        }

        (v, last_norm)
    }

    fn random_projection(&mut self, rows: &[&[f64]]) -> Vec<(f64, f64)> {
        let dimension = rows[0].len();

        let mut first = self.random_vector(dimension);
        let mut second = self.random_vector(dimension);

        normalize(&mut first);
        orthogonalize(&mut second, &first);
        normalize(&mut second);

        rows.iter()
            .map(|row| (dot(row, &first), dot(row, &second)))
            .collect()
    }

    fn random_vector(&mut self, dimension: usize) -> Vec<f64> {
        (0..dimension).map(|_| self.rng.gen_range(-1.0..1.0)).collect()
    }

    fn jitter(&mut self) -> f64 {
        self.rng.gen_range(-JITTER..JITTER)
    }

    fn randomize(&mut self, record: &mut ModelRecord) {
        record.x = Some(self.rng.gen_range(-HALF_SPAN..HALF_SPAN));
        record.y = Some(self.rng.gen_range(-HALF_SPAN..HALF_SPAN));
    }
}

/// Indices of records that take part in the projection, and their dimension.
///
/// The first non-empty, finite signature fixes the dimension. Signatures of
/// another length are left out.
fn usable_signatures(records: &[ModelRecord]) -> (Vec<usize>, Option<usize>) {
    let mut dimension = None;
    let mut indices = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let Some(signature) = record.signature() else {
            continue;
        };
        if signature.is_empty() || !signature.iter().all(|v| v.is_finite()) {
            warn!("Model {} has an unusable signature, skipping projection", record.id);
            continue;
        }

        match dimension {
            None => dimension = Some(signature.len()),
            Some(d) if d != signature.len() => {
                warn!(
                    "Model {} has a {}-dim signature, expected {d}, skipping projection",
                    record.id,
                    signature.len()
                );
                continue;
            }
            Some(_) => {}
        }

        indices.push(i);
    }

    (indices, dimension)
}

fn center(rows: &[&[f64]]) -> Vec<Vec<f64>> {
    let dimension = rows[0].len();
    let count = rows.len() as f64;

    let mut mean = vec![0.0; dimension];
    for row in rows {
        for (m, v) in mean.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= count);

    rows.iter()
        .map(|row| row.iter().zip(&mean).map(|(v, m)| v - m).collect())
        .collect()
}

/// `Xᵗ(Xv)` without forming the covariance matrix.
fn covariance_product(centered: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; v.len()];

    for row in centered {
        let projection = dot(row, v);
        for (o, x) in out.iter_mut().zip(row) {
            *o += x * projection;
        }
    }

    out
}

/// Rescales both axes independently into `[-HALF_SPAN, HALF_SPAN]`.
fn rescale(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let (x_min, x_range) = axis_bounds(points.iter().map(|p| p.0));
    let (y_min, y_range) = axis_bounds(points.iter().map(|p| p.1));
    let span = HALF_SPAN * 2.0;

    points
        .iter()
        .map(|&(x, y)| {
            (
                ((x - x_min) / x_range - 0.5) * span,
                ((y - y_min) / y_range - 0.5) * span,
            )
        })
        .collect()
}

fn axis_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    });

    let range = max - min;
    if range.abs() < f64::EPSILON || !range.is_finite() {
        (min, 1.0)
    } else {
        (min, range)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// Normalizes in place unless the vector is (numerically) zero.
fn normalize(v: &mut [f64]) {
    let n = norm(v);
    if n >= NORMALIZE_EPSILON {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

/// Removes the component of `v` along the unit vector `basis`.
fn orthogonalize(v: &mut [f64], basis: &[f64]) {
    let p = dot(v, basis);
    for (x, b) in v.iter_mut().zip(basis) {
        *x -= p * b;
    }
}
