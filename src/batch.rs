//! Batch driver: photos × months → jobs → parallel composition.
//!
//! ## Month ranges
//!
//! | Syntax | Months |
//! |---|---|
//! | `M/YEAR` | one month |
//! | `M1-M2/YEAR` | `M1` through `M2` (`M2 > M1`, may pass 12) |
//! | `M:SPAN/YEAR` | `SPAN` months from `M`; `SPAN = 0` means one per photo |
//!
//! Month or year 0 stands for the current one. Months past December roll
//! into the next year.
//!
//! ## Photo assignment
//!
//! Photos are sorted, optionally sampled, then assigned round-robin: month
//! `i` gets photo `i % photos`. Output names get a `YYYY-MM_` prefix when
//! requested, or automatically when sampling or when photos repeat.
//!
//! ## Failure policy
//!
//! The first failing job sets a shared cancellation flag. Jobs not yet
//! started are skipped; jobs already running finish.

use crate::cache::{CacheStats, PlacementCache, cache_enabled};
use crate::compose::{ComposeRecord, Composer, Job};
use crate::config::PrefixMode;
use crate::imaging::supported_input_extensions;
use chrono::Datelike;
use rand::Rng;
use rand::seq::index;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid range '{0}': {1}")]
    Range(String, String),
    #[error("{0}")]
    Options(String),
    #[error("input image '{}' does not exist", .0.display())]
    MissingInput(PathBuf),
    #[error("--outfile is the same file as the input, aborting")]
    OutfileIsInput,
    #[error("no photos match '{0}'")]
    NoPhotos(String),
    #[error("cannot sample {requested} photos out of {available}")]
    Sample { requested: usize, available: usize },
}

// =============================================================================
// Month ranges
// =============================================================================

fn parse_int(s: &str, what: &str, spec: &str) -> Result<i64, BatchError> {
    s.trim().parse::<i64>().map_err(|_| {
        BatchError::Range(spec.to_string(), format!("invalid {} '{}'", what, s.trim()))
    })
}

/// Month 1–12, or 0 for the current month.
fn parse_month(s: &str, spec: &str, current: u32) -> Result<u32, BatchError> {
    let m = parse_int(s, "month", spec)?;
    if !(0..=12).contains(&m) {
        return Err(BatchError::Range(
            spec.to_string(),
            format!("month {} out of range 0-12", m),
        ));
    }
    Ok(if m == 0 { current } else { m as u32 })
}

/// `(first month, span)` of `M`, `M1-M2` or `M:SPAN`.
pub fn parse_month_range(s: &str, current_month: u32) -> Result<(u32, u32), BatchError> {
    if let Some((m, span)) = s.split_once(':') {
        let month = parse_month(m, s, current_month)?;
        let span = parse_int(span, "month span", s)?;
        if span < 0 {
            return Err(BatchError::Range(s.to_string(), "negative month span".into()));
        }
        Ok((month, span as u32))
    } else if let Some((m1, m2)) = s.split_once('-') {
        let month = parse_month(m1, s, current_month)?;
        let last = parse_int(m2, "month", s)?;
        if last <= month as i64 {
            return Err(BatchError::Range(
                s.to_string(),
                format!("last month should be greater than {}", month),
            ));
        }
        Ok((month, (last - month as i64 + 1) as u32))
    } else {
        Ok((parse_month(s, s, current_month)?, 1))
    }
}

/// Expand `MONTHS/YEAR` into `(month, year)` pairs.
///
/// `today` is `(month, year)` for the 0 placeholders; a zero span becomes
/// `span_hint`.
pub fn parse_range(
    spec: &str,
    span_hint: usize,
    today: (u32, i32),
) -> Result<Vec<(u32, i32)>, BatchError> {
    let (months, year) = spec
        .split_once('/')
        .ok_or_else(|| BatchError::Range(spec.to_string(), "expected MONTHS/YEAR".into()))?;
    let (mut month, mut span) = parse_month_range(months, today.0)?;
    if span == 0 {
        span = span_hint as u32;
    }
    let year = parse_int(year, "year", spec)?;
    if year < 0 {
        return Err(BatchError::Range(spec.to_string(), "negative year".into()));
    }
    let mut year = if year == 0 { today.1 } else { year as i32 };

    let mut out = Vec::with_capacity(span as usize);
    for _ in 0..span {
        out.push((month, year));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    Ok(out)
}

/// Current `(month, year)` in local time.
pub fn today() -> (u32, i32) {
    let now = chrono::Local::now();
    (now.month(), now.year())
}

// =============================================================================
// Photo collection
// =============================================================================

/// Match a file name against `*` and `?` wildcards.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

fn files_in(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

/// Resolve an input into a sorted photo list.
///
/// A file is used as is; a directory yields its supported images; anything
/// else is a wildcard pattern over the file names of its parent directory.
pub fn collect_photos(input: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut photos: Vec<PathBuf> = if input.is_dir() {
        files_in(input).filter(|p| has_supported_extension(p)).collect()
    } else {
        let pattern = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent = match input.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Ok(Vec::new());
        }
        files_in(&parent)
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| wildcard_match(&pattern, &n.to_string_lossy()))
            })
            .collect()
    };
    photos.sort();
    Ok(photos)
}

// =============================================================================
// Output naming
// =============================================================================

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Output path for `photo`: `<outdir>/<prefix><stem>.<ext>`.
///
/// `format` replaces the extension when non-empty. A generated name that
/// would overwrite the input gets `_cal` appended to the stem; an explicit
/// `outfile` that names the input is an error.
pub fn output_path(
    photo: &Path,
    outdir: &Path,
    prefix: &str,
    format: &str,
    outfile: Option<&Path>,
) -> Result<PathBuf, BatchError> {
    let stem = photo
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = if format.is_empty() {
        photo
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        format.to_string()
    };
    let name = |suffix: &str| {
        if ext.is_empty() {
            format!("{}{}{}", prefix, stem, suffix)
        } else {
            format!("{}{}{}.{}", prefix, stem, suffix, ext)
        }
    };

    let out = match outfile {
        Some(f) => f.to_path_buf(),
        None => outdir.join(name("")),
    };
    if same_file(photo, &out) {
        if outfile.is_some() {
            return Err(BatchError::OutfileIsInput);
        }
        return Ok(outdir.join(name("_cal")));
    }
    Ok(out)
}

// =============================================================================
// Planning
// =============================================================================

/// Run options that only make sense on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    pub input: PathBuf,
    /// Month range; `None` composes a single photo.
    pub range: Option<String>,
    /// Random photo sample size; `Some(0)` means one photo per month, at most all.
    pub sample: Option<usize>,
    pub shuffle: bool,
    pub outfile: Option<PathBuf>,
    pub outdir: PathBuf,
    pub format: String,
    pub prefix: PrefixMode,
}

impl BatchOptions {
    /// Reject contradictory combinations.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.sample.is_some() && self.range.is_none() {
            return Err(BatchError::Options("--sample requested without --range".into()));
        }
        if self.outfile.is_some() && self.range.is_some() {
            return Err(BatchError::Options(
                "you cannot specify both --outfile and --range".into(),
            ));
        }
        if self.sample.is_some() && self.shuffle {
            return Err(BatchError::Options(
                "you cannot specify both --shuffle and --sample".into(),
            ));
        }
        Ok(())
    }

    /// Sample size with `shuffle` folded in.
    pub fn effective_sample(&self) -> Option<usize> {
        if self.shuffle { Some(0) } else { self.sample }
    }
}

/// Jobs for a run plus what the driver needs to know about them.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub jobs: Vec<Job>,
    pub num_photos: usize,
    pub use_cache: bool,
}

/// Turn options into jobs.
///
/// `today` resolves the 0 placeholders of the month range.
pub fn plan_jobs<R: Rng + ?Sized>(
    options: &BatchOptions,
    today: (u32, i32),
    rng: &mut R,
) -> Result<Plan, BatchError> {
    options.validate()?;

    let Some(range) = &options.range else {
        if !options.input.is_file() {
            return Err(BatchError::MissingInput(options.input.clone()));
        }
        let output = output_path(
            &options.input,
            &options.outdir,
            "",
            &options.format,
            options.outfile.as_deref(),
        )?;
        return Ok(Plan {
            jobs: vec![Job {
                photo: options.input.clone(),
                output,
                month: None,
                index: 1,
                total: 1,
            }],
            num_photos: 1,
            use_cache: false,
        });
    };

    let mut photos = collect_photos(&options.input)?;
    let months = parse_range(range, photos.len(), today)?;
    if photos.is_empty() {
        return Err(BatchError::NoPhotos(options.input.display().to_string()));
    }

    let sample = options.effective_sample();
    if let Some(n) = sample {
        let n = if n == 0 {
            months.len().min(photos.len())
        } else {
            n
        };
        if n > photos.len() {
            return Err(BatchError::Sample {
                requested: n,
                available: photos.len(),
            });
        }
        photos = index::sample(rng, photos.len(), n)
            .into_iter()
            .map(|i| photos[i].clone())
            .collect();
    }
    let nf = photos.len();
    if nf == 0 {
        return Err(BatchError::NoPhotos(options.input.display().to_string()));
    }

    let with_prefix = match options.prefix {
        PrefixMode::Yes => true,
        PrefixMode::No => false,
        PrefixMode::Auto => sample.is_some() || months.len() > nf,
    };

    let total = months.len();
    let jobs = months
        .iter()
        .enumerate()
        .map(|(i, &(m, y))| {
            let photo = photos[i % nf].clone();
            let prefix = if with_prefix {
                format!("{:04}-{:02}_", y, m)
            } else {
                String::new()
            };
            let output = output_path(&photo, &options.outdir, &prefix, &options.format, None)?;
            Ok(Job {
                photo,
                output,
                month: Some((m, y)),
                index: i + 1,
                total,
            })
        })
        .collect::<Result<Vec<_>, BatchError>>()?;

    Ok(Plan {
        jobs,
        num_photos: nf,
        use_cache: cache_enabled(nf, total),
    })
}

// =============================================================================
// Running
// =============================================================================

/// A job that did not produce a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub job: Job,
    pub error: String,
}

/// Results of a run, in job order.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub records: Vec<ComposeRecord>,
    pub failures: Vec<Failure>,
    /// Jobs never started because an earlier one failed.
    pub skipped: Vec<Job>,
    pub cache: Option<CacheStats>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

enum Outcome {
    Done(ComposeRecord),
    Failed(Failure),
    Skipped(Job),
}

/// Compose every job on the global rayon pool.
pub fn run(composer: &Composer<'_>, jobs: &[Job], cache: Option<&PlacementCache>) -> BatchSummary {
    let cancelled = AtomicBool::new(false);

    let outcomes: Vec<Outcome> = jobs
        .par_iter()
        .map(|job| {
            if cancelled.load(Ordering::SeqCst) {
                return Outcome::Skipped(job.clone());
            }
            match composer.compose(job) {
                Ok(record) => Outcome::Done(record),
                Err(e) => {
                    cancelled.store(true, Ordering::SeqCst);
                    log::error!("[{}/{}] {}: {}", job.index, job.total, job.photo.display(), e);
                    Outcome::Failed(Failure {
                        job: job.clone(),
                        error: e.to_string(),
                    })
                }
            }
        })
        .collect();

    let mut summary = BatchSummary {
        cache: cache.map(PlacementCache::stats),
        ..BatchSummary::default()
    };
    for outcome in outcomes {
        match outcome {
            Outcome::Done(r) => summary.records.push(r),
            Outcome::Failed(f) => summary.failures.push(f),
            Outcome::Skipped(j) => summary.skipped.push(j),
        }
    }
    summary
}
