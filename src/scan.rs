//! Parallel scan orchestration.
//!
//! Discovery runs on the calling thread and feeds a bounded queue; a fixed
//! pool of workers drains it, each with its own parser, all writing into one
//! `ChannelRegistry`. The rayon scope is the completion barrier: when it
//! returns every worker has exited and the registry can be frozen.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::extract::analyze_file;
use crate::parser::{GoParser, ParseError};
use crate::registry::{ChannelRegistry, RegistrySnapshot};

/// Default number of parallel workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default capacity of the file queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Errors that abort a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Exclude {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("starting worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Parser(#[from] ParseError),
}

/// File counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_discovered: usize,
    pub files_analyzed: usize,
    /// Files that could not be read or parsed.
    pub files_skipped: usize,
    pub usages_dropped: usize,
}

/// Result of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub snapshot: RegistrySnapshot,
    pub stats: ScanStats,
}

#[derive(Default)]
struct Counters {
    discovered: AtomicUsize,
    analyzed: AtomicUsize,
    skipped: AtomicUsize,
    dropped: AtomicUsize,
}

impl Counters {
    fn stats(&self) -> ScanStats {
        ScanStats {
            files_discovered: self.discovered.load(Ordering::Relaxed),
            files_analyzed: self.analyzed.load(Ordering::Relaxed),
            files_skipped: self.skipped.load(Ordering::Relaxed),
            usages_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Scans a directory tree for Go channel usage.
pub struct Scanner {
    workers: usize,
    queue_capacity: usize,
    exclude: GlobSet,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            exclude: GlobSet::empty(),
        }
    }

    /// Set the number of parallel workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the capacity of the bounded file queue (minimum 1).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Skip files whose root-relative path matches any of these globs.
    pub fn exclude(mut self, patterns: &[String]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| ScanError::Exclude {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        self.exclude = builder.build().map_err(|source| ScanError::Exclude {
            pattern: patterns.join(", "),
            source,
        })?;
        Ok(self)
    }

    /// Scan `root` and return the frozen registry.
    ///
    /// A directory-walk error stops discovery; files already queued are still
    /// drained before the error is returned. Per-file failures are logged
    /// and counted, never returned.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome, ScanError> {
        if self.workers == 0 {
            return Err(ScanError::NoWorkers);
        }

        let parsers = (0..self.workers)
            .map(|_| GoParser::new())
            .collect::<Result<Vec<_>, _>>()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("channeling-worker-{}", index))
            .build()?;

        let registry = ChannelRegistry::new();
        let counters = Counters::default();
        let (queue_tx, queue_rx) = crossbeam_channel::bounded::<PathBuf>(self.queue_capacity);

        let walked = pool.in_place_scope(|scope| {
            for (id, parser) in parsers.into_iter().enumerate() {
                let queue = queue_rx.clone();
                let registry = &registry;
                let counters = &counters;
                scope.spawn(move |_| run_worker(id, parser, queue, registry, counters));
            }
            drop(queue_rx);

            let walked = self.feed(root, &queue_tx, &counters);
            drop(queue_tx);
            walked
        });

        let stats = counters.stats();
        walked?;

        info!(
            files = stats.files_discovered,
            analyzed = stats.files_analyzed,
            skipped = stats.files_skipped,
            channels = registry.len(),
            "scan complete"
        );

        Ok(ScanOutcome {
            snapshot: registry.snapshot(),
            stats,
        })
    }

    fn feed(&self, root: &Path, queue: &Sender<PathBuf>, counters: &Counters) -> Result<(), ScanError> {
        for path in discover(root, &self.exclude) {
            let path = path?;
            counters.discovered.fetch_add(1, Ordering::Relaxed);
            if queue.send(path).is_err() {
                // Every worker is gone; nothing left to feed.
                break;
            }
        }
        Ok(())
    }
}

/// Lazily enumerate `.go` files under `root` in name order.
pub fn discover<'a>(
    root: &'a Path,
    exclude: &'a GlobSet,
) -> impl Iterator<Item = Result<PathBuf, ScanError>> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    return Some(Err(ScanError::Walk { path, source }));
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("go") {
                return None;
            }
            let relative = path.strip_prefix(root).unwrap_or(path);
            if exclude.is_match(relative) {
                debug!(file = %path.display(), "excluded");
                return None;
            }
            Some(Ok(path.to_path_buf()))
        })
}

fn run_worker(
    id: usize,
    mut parser: GoParser,
    queue: Receiver<PathBuf>,
    registry: &ChannelRegistry,
    counters: &Counters,
) {
    for path in queue.iter() {
        match analyze_file(&mut parser, &path, registry) {
            Ok(stats) => {
                counters.analyzed.fetch_add(1, Ordering::Relaxed);
                counters.dropped.fetch_add(stats.usages_dropped, Ordering::Relaxed);
                debug!(
                    worker = id,
                    file = %path.display(),
                    declarations = stats.declarations,
                    usages = stats.usages_recorded,
                    dropped = stats.usages_dropped,
                    "analyzed"
                );
            }
            Err(e) => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, file = %path.display(), error = %e, "skipping file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.go", "package b\n");
        write(temp.path(), "a.go", "package a\n");
        write(temp.path(), "README.md", "# hi\n");
        write(temp.path(), "vendor/dep/dep.go", "package dep\n");
        write(temp.path(), "pkg/x_test.go", "package pkg\n");

        let empty = GlobSet::empty();
        let all: Vec<_> = discover(temp.path(), &empty)
            .map(|p| p.unwrap().strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            all,
            vec![
                PathBuf::from("a.go"),
                PathBuf::from("b.go"),
                PathBuf::from("pkg/x_test.go"),
                PathBuf::from("vendor/dep/dep.go"),
            ]
        );

        let scanner = Scanner::new().exclude(&["vendor/**".to_string()]).unwrap();
        let kept = discover(temp.path(), &scanner.exclude).count();
        assert_eq!(kept, 3);
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let err = Scanner::new().exclude(&["[unclosed".to_string()]).err().unwrap();
        assert!(matches!(err, ScanError::Exclude { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let temp = TempDir::new().unwrap();
        let err = Scanner::new().workers(0).scan(temp.path()).unwrap_err();
        assert!(matches!(err, ScanError::NoWorkers));
    }

    #[test]
    fn test_missing_root_is_walk_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let err = Scanner::new().scan(&missing).unwrap_err();
        match err {
            ScanError::Walk { path, .. } => assert_eq!(path, missing),
            other => panic!("expected walk error, got {}", other),
        }
    }

    #[test]
    fn test_scan_skips_broken_files() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "ok.go",
            "package main\n\nfunc main() {\n    ch := make(chan int)\n    ch <- 1\n}\n",
        );
        write(temp.path(), "broken.go", "package main\n\nfunc main( {\n");

        let outcome = Scanner::new().workers(2).scan(temp.path()).unwrap();
        assert_eq!(outcome.stats.files_discovered, 2);
        assert_eq!(outcome.stats.files_analyzed, 1);
        assert_eq!(outcome.stats.files_skipped, 1);
        assert_eq!(outcome.snapshot.get("ch").unwrap().send_count(), 1);
    }

    #[test]
    fn test_tiny_queue_does_not_stall() {
        let temp = TempDir::new().unwrap();
        for i in 0..40 {
            write(
                temp.path(),
                &format!("f{:02}.go", i),
                &format!("package main\n\nfunc f{}() {{\n    c{} := make(chan int)\n    <-c{}\n}}\n", i, i, i),
            );
        }

        let outcome = Scanner::new()
            .workers(3)
            .queue_capacity(1)
            .scan(temp.path())
            .unwrap();
        assert_eq!(outcome.stats.files_analyzed, 40);
        assert_eq!(outcome.snapshot.len(), 40);
    }

    #[test]
    fn test_single_file_root() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "solo.go", "package main\n\nfunc main() {\n    q := make(chan bool)\n}\n");

        let outcome = Scanner::new().scan(&temp.path().join("solo.go")).unwrap();
        assert_eq!(outcome.stats.files_analyzed, 1);
        assert!(outcome.snapshot.get("q").is_some());
    }
}
