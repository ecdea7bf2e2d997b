//! Multi-file search: every file of a day group is queried on its own
//! thread and the outputs are merged by time as they arrive.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use serde::Serialize;
use tracing::{debug, info};

use crate::collector::LogFile;
use crate::error::{QueryError, Result};
use crate::merge::{merge_outputs, MergeSource};
use crate::pipe::{pipe, PipeWriter, DEFAULT_DEPTH};
use crate::printer::{OutputMode, RequestPrinter};
use crate::query::{QueryEngine, QueryStats};

const WORKER_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub files: u64,
    pub chunks: u64,
    pub per_file: Vec<(PathBuf, QueryStats)>,
}

fn query_into(
    engine: &QueryEngine,
    log: &Path,
    mode: OutputMode,
    writer: PipeWriter,
) -> Result<QueryStats> {
    let out = BufWriter::with_capacity(WORKER_BUFFER, writer);
    let mut printer = RequestPrinter::new(out, mode)?;
    engine.run(log, &mut printer)
}

/// Queries every group in order, merging the files within a group by time.
pub fn search<W: Write + ?Sized>(
    engine: &QueryEngine,
    groups: &[Vec<LogFile>],
    mode: OutputMode,
    out: &mut W,
) -> Result<SearchStats> {
    let headers = mode != OutputMode::Perf;
    let mut stats = SearchStats::default();

    for group in groups {
        info!(files = group.len(), "searching log group");
        let (chunks, results) = thread::scope(|scope| {
            let mut sources = Vec::with_capacity(group.len());
            let mut workers = Vec::with_capacity(group.len());
            for file in group {
                let (writer, reader) = pipe(DEFAULT_DEPTH);
                let path = file.path.as_path();
                workers.push((
                    path,
                    scope.spawn(move || query_into(engine, path, mode, writer)),
                ));
                sources.push(MergeSource::new(
                    path.display().to_string(),
                    BufReader::new(reader),
                ));
            }

            let merged = merge_outputs(sources, out, headers);
            let results: Vec<(PathBuf, Result<QueryStats>)> = workers
                .into_iter()
                .map(|(path, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(QueryError::Worker {
                            path: path.to_path_buf(),
                            reason: "query thread panicked".to_string(),
                        })
                    });
                    (path.to_path_buf(), result)
                })
                .collect();
            (merged, results)
        });

        // A worker failure explains a short merge better than the merge error.
        for (path, result) in results {
            let file_stats = result?;
            debug!(path = %path.display(), ?file_stats, "file searched");
            stats.per_file.push((path, file_stats));
            stats.files += 1;
        }
        stats.chunks += chunks?;
    }

    Ok(stats)
}
