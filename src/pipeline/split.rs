//! Splitting: one PDF → size-bounded shards `{prefix}_{n}.pdf`.
//!
//! ## Algorithm
//!
//! Greedy, single pass, no backtracking. Pages are appended one at a time to
//! the current shard, which is written to its final filename after every
//! append and measured on disk. Once the file reaches the ceiling the shard is
//! closed and the next page starts a new one. A shard therefore overshoots
//! the ceiling by at most its last page, and a single page larger than the
//! ceiling ends up alone in its own shard.
//!
//! Rewriting the shard on every append costs O(pages²) bytes of I/O per shard
//! but the size it reports is the real file size, not an estimate.
//!
//! ## Failures
//!
//! A page that cannot be copied or whose shard cannot be saved is logged and
//! recorded as a [`PageError`]; the loop moves on. A page whose save failed
//! but which lands on disk with a later successful save of the same shard is
//! not reported. Each save goes to a temporary file that replaces the shard
//! only once complete, so a failed save never damages a shard already on
//! disk. Only opening the source and creating the output directory are fatal.

use crate::config::SplitConfig;
use crate::error::{PageError, SplitError};
use crate::output::{ShardInfo, SplitReport};
use crate::pipeline::compose::{self, ComposeError, PageAccumulator};
use crate::progress::Stage;
use lopdf::{Document, ObjectId};
use crate::pipeline::input;
use std::fmt::{self, Display};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

const MIB: f64 = 1024.0 * 1024.0;

/// The per-shard operations the greedy loop needs.
pub trait ShardBuilder {
    type Error: Display;

    /// Append page `index` (0-based position in the source) to the current shard.
    fn append_page(&mut self, index: usize) -> Result<(), Self::Error>;

    /// Serialise the current shard into `file`.
    fn write_to(&mut self, file: &mut File) -> Result<(), Self::Error>;

    /// Pages in the current shard.
    fn page_count(&self) -> usize;

    /// Discard the current shard and start an empty one.
    fn reset(&mut self);
}

/// [`ShardBuilder`] backed by `lopdf`, copying pages out of a loaded document.
pub struct LopdfShardBuilder<'a> {
    source: &'a Document,
    page_ids: Vec<ObjectId>,
    shard: PageAccumulator,
}

impl<'a> LopdfShardBuilder<'a> {
    pub fn new(source: &'a Document) -> Self {
        Self {
            source,
            page_ids: compose::page_ids(source),
            shard: PageAccumulator::new(),
        }
    }

    pub fn source_page_count(&self) -> usize {
        self.page_ids.len()
    }
}

impl ShardBuilder for LopdfShardBuilder<'_> {
    type Error = ComposeError;

    fn append_page(&mut self, index: usize) -> Result<(), ComposeError> {
        let page_id = *self
            .page_ids
            .get(index)
            .ok_or(ComposeError::MissingPage(index))?;
        self.shard.import_page(self.source, page_id)?;
        Ok(())
    }

    fn write_to(&mut self, file: &mut File) -> Result<(), ComposeError> {
        self.shard.write_to(file)
    }

    fn page_count(&self) -> usize {
        self.shard.page_count()
    }

    fn reset(&mut self) {
        self.shard = PageAccumulator::new();
    }
}

/// State of the shard currently being filled.
struct OpenShard {
    info: ShardInfo,
    /// Pages appended since the last successful write.
    unsaved: bool,
    /// How many of `info.pages` the file on disk holds.
    pages_on_disk: usize,
    /// Save failures not yet superseded by a later successful write.
    pending_errors: Vec<PageError>,
}

impl OpenShard {
    fn new(index: usize, config: &SplitConfig) -> Self {
        Self {
            info: ShardInfo {
                index,
                path: config.shard_path(index),
                pages: Vec::new(),
                size_bytes: 0,
            },
            unsaved: false,
            pages_on_disk: 0,
            pending_errors: Vec::new(),
        }
    }
}

/// Run the greedy split over `labels.len()` source pages.
///
/// `labels[i]` is the page number reported for source position `i` (in the
/// orchestrated pipeline, the original document's page number). The output
/// directory must already exist.
pub fn split_with<B: ShardBuilder>(
    builder: &mut B,
    labels: &[usize],
    config: &SplitConfig,
) -> SplitReport {
    let total = labels.len();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Split, total);
    }

    let mut report = SplitReport::default();
    let mut shard = OpenShard::new(1, config);

    for (position, &page) in labels.iter().enumerate() {
        let shard_index = shard.info.index;

        if let Err(e) = builder.append_page(position) {
            warn!("Error adding page {} to shard {}: {}", page, shard_index, e);
            let detail = e.to_string();
            if let Some(cb) = cb {
                cb.on_page_error(Stage::Split, page, total, &detail);
            }
            report.page_errors.push(PageError::InsertFailed {
                page,
                shard: shard_index,
                detail,
            });
            continue;
        }
        shard.info.pages.push(page);
        shard.unsaved = true;

        match save_shard(builder, &shard.info.path) {
            Ok(size) => {
                mark_saved(&mut shard, size);
                info!(
                    "Added page {} to {}. Current size: {:.2} MB",
                    page,
                    shard.info.path.display(),
                    size as f64 / MIB
                );
                if let Some(cb) = cb {
                    cb.on_page_complete(Stage::Split, page, total);
                }

                if size >= config.max_shard_bytes {
                    info!(
                        "Shard {} reached {:.2} MB (ceiling {:.2} MB); starting a new file",
                        shard_index,
                        size as f64 / MIB,
                        config.max_shard_bytes as f64 / MIB
                    );
                    let next = OpenShard::new(shard_index + 1, config);
                    close_shard(std::mem::replace(&mut shard, next), &mut report, config);
                    builder.reset();
                }
            }
            Err(e) => {
                warn!(
                    "Error saving {} after adding page {}: {}",
                    shard.info.path.display(),
                    page,
                    e
                );
                let detail = e.to_string();
                if let Some(cb) = cb {
                    cb.on_page_error(Stage::Split, page, total, &detail);
                }
                shard.pending_errors.push(PageError::SaveFailed {
                    page,
                    shard: shard_index,
                    detail,
                });
            }
        }
    }

    if shard.unsaved && builder.page_count() > 0 {
        debug!("Persisting final shard {}", shard.info.index);
        match save_shard(builder, &shard.info.path) {
            Ok(size) => mark_saved(&mut shard, size),
            Err(e) => error!(
                "Error saving final shard {}: {}",
                shard.info.path.display(),
                e
            ),
        }
    }
    close_shard(shard, &mut report, config);

    info!(
        "Split complete: {} shard(s), {} of {} pages written",
        report.shards.len(),
        report.written_pages(),
        total
    );
    report
}

/// A shard save that failed in the builder or on the filesystem.
enum SaveError<E> {
    Builder(E),
    Io(io::Error),
}

impl<E> From<io::Error> for SaveError<E> {
    fn from(e: io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl<E: Display> Display for SaveError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Builder(e) => e.fmt(f),
            SaveError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

/// Write the current shard over `path` and return its size on disk.
///
/// A failed save leaves the previous version of the file intact.
fn save_shard<B: ShardBuilder>(builder: &mut B, path: &Path) -> Result<u64, SaveError<B::Error>> {
    compose::replace_file(path, |file| builder.write_to(file).map_err(SaveError::Builder))
}

fn mark_saved(shard: &mut OpenShard, size: u64) {
    shard.info.size_bytes = size;
    shard.unsaved = false;
    shard.pages_on_disk = shard.info.pages.len();
    shard.pending_errors.clear();
}

/// Move a finished shard into the report; drop it if nothing reached disk.
fn close_shard(mut shard: OpenShard, report: &mut SplitReport, config: &SplitConfig) {
    report.page_errors.append(&mut shard.pending_errors);
    if shard.pages_on_disk == 0 {
        return;
    }
    shard.info.pages.truncate(shard.pages_on_disk);
    if let Some(cb) = config.progress_callback.as_ref() {
        cb.on_shard_complete(shard.info.index, shard.info.pages.len(), shard.info.size_bytes);
    }
    report.shards.push(shard.info);
}

/// Split the PDF at `path` into shards under `config.output_dir`.
///
/// Shard page numbers are the page numbers of `path` itself (1-indexed).
///
/// # Errors
/// * [`SplitError::OutputDirFailed`] if the output directory cannot be created.
/// * [`SplitError::CorruptPdf`] if `path` cannot be parsed.
pub fn split_intermediate(path: &Path, config: &SplitConfig) -> Result<SplitReport, SplitError> {
    split_labelled(path, None, config)
}

/// Like [`split_intermediate`], reporting `labels[i]` as the page number of
/// page `i + 1` of `path`.
pub(crate) fn split_labelled(
    path: &Path,
    labels: Option<&[usize]>,
    config: &SplitConfig,
) -> Result<SplitReport, SplitError> {
    if input::collides_with_shards(path, config) {
        return Err(SplitError::InvalidConfig(format!(
            "'{}' would be overwritten by its own shards; choose another output directory or prefix",
            path.display()
        )));
    }

    let source = Document::load(path).map_err(|e| SplitError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    fs::create_dir_all(&config.output_dir).map_err(|e| SplitError::OutputDirFailed {
        path: config.output_dir.clone(),
        source: e,
    })?;
    let mut builder = LopdfShardBuilder::new(&source);
    let page_count = builder.source_page_count();
    info!("Opened {} with {} pages", path.display(), page_count);

    let labels: Vec<usize> = match labels {
        Some(labels) if labels.len() == page_count => labels.to_vec(),
        Some(labels) => {
            warn!(
                "Expected {} pages in {} but found {}; numbering pages from 1",
                labels.len(),
                path.display(),
                page_count
            );
            (1..=page_count).collect()
        }
        None => (1..=page_count).collect(),
    };

    Ok(split_with(&mut builder, &labels, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SplitProgressCallback;
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    const HALF_MIB: u64 = 512 * 1024;

    /// Writes a file whose size is the sum of the synthetic page sizes.
    struct FakeBuilder {
        page_sizes: Vec<u64>,
        current: Vec<usize>,
        fail_append: HashSet<usize>,
        /// Fail the write that happens right after appending these positions.
        fail_write_after: HashSet<usize>,
        last_appended: Option<usize>,
    }

    impl FakeBuilder {
        fn uniform(pages: usize, size: u64) -> Self {
            Self::with_sizes(vec![size; pages])
        }

        fn with_sizes(page_sizes: Vec<u64>) -> Self {
            Self {
                page_sizes,
                current: Vec::new(),
                fail_append: HashSet::new(),
                fail_write_after: HashSet::new(),
                last_appended: None,
            }
        }
    }

    impl ShardBuilder for FakeBuilder {
        type Error = String;

        fn append_page(&mut self, index: usize) -> Result<(), String> {
            if self.fail_append.contains(&index) {
                return Err(format!("cannot copy page at {index}"));
            }
            self.current.push(index);
            self.last_appended = Some(index);
            Ok(())
        }

        fn write_to(&mut self, file: &mut File) -> Result<(), String> {
            if let Some(last) = self.last_appended.take() {
                if self.fail_write_after.contains(&last) {
                    return Err("disk full".into());
                }
            }
            let size: u64 = self.current.iter().map(|&i| self.page_sizes[i]).sum();
            file.write_all(&vec![0u8; size as usize])
                .map_err(|e| e.to_string())
        }

        fn page_count(&self) -> usize {
            self.current.len()
        }

        fn reset(&mut self) {
            self.current.clear();
        }
    }

    fn config(dir: &Path, max_shard_bytes: u64) -> SplitConfig {
        SplitConfig::builder()
            .output_dir(dir)
            .max_shard_bytes(max_shard_bytes)
            .build()
            .unwrap()
    }

    fn labels(n: usize) -> Vec<usize> {
        (1..=n).collect()
    }

    #[test]
    fn ten_half_mib_pages_make_shards_of_nine_and_one() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), crate::config::DEFAULT_MAX_SHARD_BYTES);
        let mut builder = FakeBuilder::uniform(10, HALF_MIB);

        let report = split_with(&mut builder, &labels(10), &cfg);

        assert!(report.page_errors.is_empty());
        let counts: Vec<usize> = report.shards.iter().map(|s| s.pages.len()).collect();
        assert_eq!(counts, vec![9, 1]);
        assert_eq!(report.shards[0].pages, labels(9));
        assert_eq!(report.shards[1].pages, vec![10]);
        assert_eq!(report.shards[0].size_bytes, 9 * HALF_MIB);
        assert!(dir.path().join("split_1.pdf").exists());
        assert!(dir.path().join("split_2.pdf").exists());
        assert!(!dir.path().join("split_3.pdf").exists());
    }

    #[test]
    fn shards_respect_the_ceiling_property() {
        let dir = tempfile::tempdir().unwrap();
        let sizes = vec![300, 800, 100, 100, 2500, 50, 700, 400, 400, 90];
        let ceiling = 1000;
        let cfg = config(dir.path(), ceiling);
        let mut builder = FakeBuilder::with_sizes(sizes.clone());

        let report = split_with(&mut builder, &labels(sizes.len()), &cfg);

        let all: Vec<usize> = report.shards.iter().flat_map(|s| s.pages.clone()).collect();
        assert_eq!(all, labels(sizes.len()), "every page once, in order");

        let last = report.shards.len() - 1;
        for (i, shard) in report.shards.iter().enumerate() {
            let last_page = *shard.pages.last().unwrap();
            let without_last = shard.size_bytes - sizes[last_page - 1];
            assert!(without_last < ceiling, "shard {} overshoots by more than one page", shard.index);
            if i != last {
                assert!(shard.size_bytes >= ceiling, "non-final shard {} under ceiling", shard.index);
            }
        }
    }

    #[test]
    fn oversized_page_gets_its_own_shard() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 1000);
        let mut builder = FakeBuilder::with_sizes(vec![5000, 10, 10]);

        let report = split_with(&mut builder, &labels(3), &cfg);
        assert_eq!(report.shards[0].pages, vec![1]);
        assert_eq!(report.shards[1].pages, vec![2, 3]);
    }

    #[test]
    fn insert_failure_skips_page_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 10_000);
        let mut builder = FakeBuilder::uniform(4, 100);
        builder.fail_append.insert(1);

        let report = split_with(&mut builder, &labels(4), &cfg);
        assert_eq!(report.shards.len(), 1);
        assert_eq!(report.shards[0].pages, vec![1, 3, 4]);
        assert_eq!(
            report.page_errors,
            vec![PageError::InsertFailed {
                page: 2,
                shard: 1,
                detail: "cannot copy page at 1".into(),
            }]
        );
    }

    #[test]
    fn save_failure_recovered_by_later_save_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 10_000);
        let mut builder = FakeBuilder::uniform(3, 100);
        builder.fail_write_after.insert(1);

        let report = split_with(&mut builder, &labels(3), &cfg);
        assert!(report.page_errors.is_empty());
        assert_eq!(report.shards[0].pages, vec![1, 2, 3]);
        assert_eq!(report.shards[0].size_bytes, 300);
    }

    #[test]
    fn final_unsaved_pages_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 10_000);
        let mut builder = FakeBuilder::uniform(2, 100);
        builder.fail_write_after.insert(1);

        let report = split_with(&mut builder, &labels(2), &cfg);
        assert!(report.page_errors.is_empty());
        assert_eq!(report.shards[0].pages, vec![1, 2]);
        assert_eq!(fs::metadata(dir.path().join("split_1.pdf")).unwrap().len(), 200);
    }

    #[test]
    fn shard_that_never_saved_reports_its_pages() {
        struct NoDisk;
        impl ShardBuilder for NoDisk {
            type Error = &'static str;
            fn append_page(&mut self, _: usize) -> Result<(), &'static str> {
                Ok(())
            }
            fn write_to(&mut self, _: &mut File) -> Result<(), &'static str> {
                Err("read-only filesystem")
            }
            fn page_count(&self) -> usize {
                1
            }
            fn reset(&mut self) {}
        }

        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 10_000);
        let report = split_with(&mut NoDisk, &labels(2), &cfg);
        assert!(report.shards.is_empty());
        let failed: Vec<usize> = report.page_errors.iter().map(PageError::page).collect();
        assert_eq!(failed, vec![1, 2]);
    }

    #[test]
    fn labels_are_reported_as_page_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 10_000);
        let mut builder = FakeBuilder::uniform(3, 10);
        let report = split_with(&mut builder, &[2, 5, 9], &cfg);
        assert_eq!(report.shards[0].pages, vec![2, 5, 9]);
    }

    #[test]
    fn shard_events_reach_the_callback() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<(usize, usize)>>);
        impl SplitProgressCallback for Recorder {
            fn on_shard_complete(&self, index: usize, pages: usize, _size: u64) {
                self.0.lock().unwrap().push((index, pages));
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let cfg = SplitConfig::builder()
            .output_dir(dir.path())
            .max_shard_bytes(250)
            .progress_callback(recorder.clone())
            .build()
            .unwrap();
        let mut builder = FakeBuilder::uniform(5, 100);
        split_with(&mut builder, &labels(5), &cfg);

        assert_eq!(*recorder.0.lock().unwrap(), vec![(1, 3), (2, 2)]);
    }

    #[test]
    fn unreadable_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.pdf");
        fs::write(&bogus, b"this is not a pdf").unwrap();
        let cfg = config(&dir.path().join("out"), 10_000);
        let err = split_intermediate(&bogus, &cfg).unwrap_err();
        assert!(matches!(err, SplitError::CorruptPdf { .. }));
        assert!(!dir.path().join("out").exists(), "no output directory for a bad source");
    }

    #[test]
    fn failed_save_keeps_the_last_good_shard_file() {
        /// Two saves succeed; every later save writes a few bytes and fails.
        struct FillsUp {
            pages: usize,
            saves: usize,
        }
        impl ShardBuilder for FillsUp {
            type Error = String;
            fn append_page(&mut self, _: usize) -> Result<(), String> {
                self.pages += 1;
                Ok(())
            }
            fn write_to(&mut self, file: &mut File) -> Result<(), String> {
                self.saves += 1;
                if self.saves > 2 {
                    file.write_all(b"partial").map_err(|e| e.to_string())?;
                    return Err("no space left on device".into());
                }
                file.write_all(&vec![0u8; 100 * self.pages])
                    .map_err(|e| e.to_string())
            }
            fn page_count(&self) -> usize {
                self.pages
            }
            fn reset(&mut self) {
                self.pages = 0;
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), 10_000);
        let mut builder = FillsUp { pages: 0, saves: 0 };

        let report = split_with(&mut builder, &labels(3), &cfg);

        assert_eq!(report.shards.len(), 1);
        let shard = &report.shards[0];
        assert_eq!(shard.pages, vec![1, 2]);
        assert_eq!(shard.size_bytes, 200);
        assert_eq!(fs::metadata(&shard.path).unwrap().len(), 200);
        let failed: Vec<usize> = report.page_errors.iter().map(PageError::page).collect();
        assert_eq!(failed, vec![3]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "temporary file left behind");
    }

    #[test]
    fn splitting_a_file_into_its_own_shard_name_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("split_1.pdf");
        fs::write(&source, b"%PDF-1.7\n").unwrap();
        let cfg = config(dir.path(), 10_000);

        let err = split_intermediate(&source, &cfg).unwrap_err();
        assert!(matches!(err, SplitError::InvalidConfig(_)));
        assert_eq!(fs::read(&source).unwrap(), b"%PDF-1.7\n");
    }
}
