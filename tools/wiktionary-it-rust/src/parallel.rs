//! Processing strategies for a dump.
//!
//! - Sequential (baseline)
//! - Batch-parallel (scoped threads over batches of pages)
//! - Channel-pipeline (reader thread, worker pool, single collector)
//!
//! Every strategy commits pages to the lexicon in input order, so all three
//! produce the same output for the same dump.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::config::ParserConfig;
use crate::dump::{self, PageFilter, RawPage, SkipReason};
use crate::error::{ExtractError, Result};
use crate::parser;
use crate::record::{Entry, Lexicon};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Strategy {
    /// Sequential processing (baseline)
    #[default]
    Sequential,
    /// Batch-parallel using std::thread
    BatchParallel,
    /// Channel-based pipeline (producer-consumer)
    ChannelPipeline,
}

/// What happens to the run when one page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the whole run with the page error.
    #[default]
    FailFast,
    /// Log the error, count it and move on.
    Skip,
}

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of threads for batch-parallel processing
    pub num_threads: usize,
    /// Pages per batch
    pub batch_size: usize,
    /// Capacity of each pipeline channel
    pub channel_buffer: usize,
    /// Number of worker threads for the pipeline
    pub num_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
        Self {
            num_threads: cpus,
            batch_size: 1000,
            channel_buffer: 10000,
            num_workers: cpus.saturating_sub(1).max(1),
        }
    }
}

/// Everything a run needs besides the reader and the parser tables.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub strategy: Strategy,
    pub parallel: ParallelConfig,
    /// Stop after this many `<page>` elements.
    pub page_limit: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub filter: PageFilter,
}

impl RunOptions {
    fn limit_reached(&self, pages_read: usize) -> bool {
        self.page_limit.is_some_and(|limit| pages_read >= limit)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub pages_processed: usize,
    pub entries_extracted: usize,
    pub no_language: usize,
    pub special: usize,
    pub no_text: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub elapsed: Duration,
}

/// Result of a complete run.
#[derive(Debug)]
pub struct Extraction {
    pub lexicon: Lexicon,
    pub stats: Stats,
}

#[derive(Debug)]
pub enum PageOutcome {
    Entry { title: String, entry: Entry },
    /// Parsed, but no section in the target language.
    NoLanguage,
    Skipped(SkipReason),
    NoText,
    Failed(ExtractError),
}

/// Result of page processing. One is produced for every page id.
#[derive(Debug)]
pub struct ProcessedPage {
    pub page_id: usize,
    pub outcome: PageOutcome,
}

/// Filter, parse and classify one `<page>` element.
pub fn process_page(page_xml: &str, page_id: usize, filter: &PageFilter, config: &ParserConfig) -> ProcessedPage {
    let outcome = match filter.extract(page_xml, page_id) {
        Err(reason) => PageOutcome::Skipped(reason),
        Ok(RawPage { body: None, .. }) => PageOutcome::NoText,
        Ok(RawPage { title, body: Some(body), .. }) => {
            match parser::parse_page_checked(config, &title, &body) {
                Ok(Some(entry)) => PageOutcome::Entry { title, entry },
                Ok(None) => PageOutcome::NoLanguage,
                Err(err) => PageOutcome::Failed(err),
            }
        }
    };
    ProcessedPage { page_id, outcome }
}

/// Single point where pages enter the lexicon.
struct Collector<'a> {
    lexicon: Lexicon,
    stats: Stats,
    policy: FailurePolicy,
    progress: &'a ProgressBar,
    start_time: Instant,
}

impl<'a> Collector<'a> {
    fn new(policy: FailurePolicy, progress: &'a ProgressBar) -> Self {
        Collector {
            lexicon: Lexicon::new(),
            stats: Stats::default(),
            policy,
            progress,
            start_time: Instant::now(),
        }
    }

    fn commit(&mut self, page: ProcessedPage) -> Result<()> {
        self.stats.pages_processed += 1;

        match page.outcome {
            PageOutcome::Entry { title, entry } => {
                if self.lexicon.insert(title, entry).is_some() {
                    self.stats.duplicates += 1;
                    debug!(page_id = page.page_id, "duplicate title replaces earlier entry");
                }
            }
            PageOutcome::NoLanguage => self.stats.no_language += 1,
            PageOutcome::Skipped(reason) => {
                self.stats.special += 1;
                debug!(page_id = page.page_id, ?reason, "skipped page");
            }
            PageOutcome::NoText => {
                self.stats.no_text += 1;
                debug!(page_id = page.page_id, "page without text");
            }
            PageOutcome::Failed(err) => {
                self.stats.failed += 1;
                match self.policy {
                    FailurePolicy::FailFast => return Err(err),
                    FailurePolicy::Skip => warn!(page_id = page.page_id, "skipping page: {err}"),
                }
            }
        }

        if self.stats.pages_processed % 1000 == 0 {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = self.stats.pages_processed as f64 / elapsed.max(f64::EPSILON);
            self.progress.set_message(format!(
                "Pages: {} | Entries: {} | Rate: {:.0} pg/s",
                self.stats.pages_processed,
                self.lexicon.len(),
                rate
            ));
        }
        Ok(())
    }

    fn finish(mut self) -> Extraction {
        self.stats.entries_extracted = self.lexicon.len();
        self.stats.elapsed = self.start_time.elapsed();
        Extraction {
            lexicon: self.lexicon,
            stats: self.stats,
        }
    }
}

/// Run the strategy named in `options`.
pub fn run(
    reader: impl Read + Send,
    config: &ParserConfig,
    options: &RunOptions,
    progress: &ProgressBar,
) -> Result<Extraction> {
    info!(strategy = ?options.strategy, lang = %config.target_lang, "starting extraction");
    let extraction = match options.strategy {
        Strategy::Sequential => run_sequential(reader, config, options, progress),
        Strategy::BatchParallel => run_batch_parallel(reader, config, options, progress),
        Strategy::ChannelPipeline => run_channel_pipeline(reader, config, options, progress),
    }?;
    info!(
        pages = extraction.stats.pages_processed,
        entries = extraction.stats.entries_extracted,
        "extraction finished"
    );
    Ok(extraction)
}

/// Baseline: parse each page as it is read.
pub fn run_sequential(
    reader: impl Read,
    config: &ParserConfig,
    options: &RunOptions,
    progress: &ProgressBar,
) -> Result<Extraction> {
    let mut collector = Collector::new(options.failure_policy, progress);
    let mut failure = None;
    let mut page_id = 0;

    dump::scan_pages(reader, |page_xml| {
        if options.limit_reached(page_id) {
            return false;
        }
        let page = process_page(&page_xml, page_id, &options.filter, config);
        page_id += 1;
        match collector.commit(page) {
            Ok(()) => true,
            Err(err) => {
                failure = Some(err);
                false
            }
        }
    })?;

    match failure {
        Some(err) => Err(err),
        None => Ok(collector.finish()),
    }
}

/// Strategy 1: Batch-Parallel Processing
/// Collects pages into batches, then processes each batch on scoped threads
pub fn run_batch_parallel(
    reader: impl Read,
    config: &ParserConfig,
    options: &RunOptions,
    progress: &ProgressBar,
) -> Result<Extraction> {
    let batch_size = options.parallel.batch_size.max(1);
    let num_threads = options.parallel.num_threads;
    let mut collector = Collector::new(options.failure_policy, progress);
    let mut batch: Vec<String> = Vec::with_capacity(batch_size);
    let mut page_id = 0;
    let mut failure = None;

    dump::scan_pages(reader, |page_xml| {
        if options.limit_reached(page_id) {
            return false;
        }
        batch.push(page_xml);
        page_id += 1;

        if batch.len() >= batch_size {
            let base_id = page_id - batch.len();
            let results = process_batch_threaded(&batch, base_id, num_threads, &options.filter, config);
            batch.clear();
            for result in results {
                if let Err(err) = collector.commit(result) {
                    failure = Some(err);
                    return false;
                }
            }
        }
        true
    })?;

    if let Some(err) = failure {
        return Err(err);
    }

    // Process remaining batch
    let base_id = page_id - batch.len();
    for result in process_batch_threaded(&batch, base_id, num_threads, &options.filter, config) {
        collector.commit(result)?;
    }

    Ok(collector.finish())
}

/// Process a batch of pages using multiple threads; results keep batch order.
fn process_batch_threaded(
    batch: &[String],
    base_id: usize,
    num_threads: usize,
    filter: &PageFilter,
    config: &ParserConfig,
) -> Vec<ProcessedPage> {
    if batch.is_empty() {
        return vec![];
    }

    let num_threads = num_threads.min(batch.len()).max(1);
    let chunk_size = batch.len().div_ceil(num_threads);

    thread::scope(|s| {
        let handles: Vec<_> = batch
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                let first_id = base_id + i * chunk_size;
                let handle = s.spawn(move || {
                    chunk
                        .iter()
                        .enumerate()
                        .map(|(j, xml)| process_page(xml, first_id + j, filter, config))
                        .collect::<Vec<_>>()
                });
                (chunk, first_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(batch.len());
        for (chunk, first_id, handle) in handles {
            match handle.join() {
                Ok(chunk_results) => results.extend(chunk_results),
                Err(payload) => {
                    let message = parser::panic_message(payload.as_ref());
                    results.extend(failed_chunk(chunk, first_id, &message, filter));
                }
            }
        }
        results
    })
}

/// One `Failed` outcome per page of a chunk whose worker thread died.
fn failed_chunk(chunk: &[String], first_id: usize, message: &str, filter: &PageFilter) -> Vec<ProcessedPage> {
    warn!(first_id, pages = chunk.len(), "batch worker panicked: {message}");
    chunk
        .iter()
        .enumerate()
        .map(|(j, xml)| {
            let page_id = first_id + j;
            let title = filter
                .extract(xml, page_id)
                .map(|raw| raw.title)
                .unwrap_or_else(|_| format!("page {page_id}"));
            ProcessedPage {
                page_id,
                outcome: PageOutcome::Failed(ExtractError::PageFailed {
                    title,
                    message: message.to_string(),
                }),
            }
        })
        .collect()
}

/// Strategy 2: Channel-Pipeline Processing using std::sync::mpsc
/// Reader thread splits pages, workers parse them, the calling thread
/// collects results in page order through a reorder buffer.
pub fn run_channel_pipeline(
    reader: impl Read + Send,
    config: &ParserConfig,
    options: &RunOptions,
    progress: &ProgressBar,
) -> Result<Extraction> {
    let (page_tx, page_rx): (SyncSender<(usize, String)>, Receiver<(usize, String)>) =
        sync_channel(options.parallel.channel_buffer);
    let (result_tx, result_rx): (SyncSender<ProcessedPage>, Receiver<ProcessedPage>) =
        sync_channel(options.parallel.channel_buffer);

    let stop = AtomicBool::new(false);
    let page_rx = Arc::new(Mutex::new(page_rx));
    let mut collector = Collector::new(options.failure_policy, progress);

    let outcome = thread::scope(|s| {
        let stop = &stop;
        let reader_handle = s.spawn(move || read_pages_to_channel(reader, page_tx, options, stop));

        let worker_handles: Vec<_> = (0..options.parallel.num_workers.max(1))
            .map(|_| {
                let rx = Arc::clone(&page_rx);
                let tx = result_tx.clone();
                s.spawn(move || process_pages_worker(rx, tx, &options.filter, config, stop))
            })
            .collect();

        // Channels close once every worker has dropped its handles
        drop(result_tx);
        drop(page_rx);

        let collected = collect_sorted(result_rx, &mut collector);
        if collected.is_err() {
            stop.store(true, Ordering::SeqCst);
        }

        let read = reader_handle.join();
        for handle in worker_handles {
            handle.join().ok();
        }

        collected?;
        match read {
            Ok(result) => result.map(|_| ()).map_err(ExtractError::from),
            Err(_) => Err(ExtractError::Io(std::io::Error::other("reader thread panicked"))),
        }
    });

    outcome.map(|()| collector.finish())
}

fn read_pages_to_channel(
    reader: impl Read,
    tx: SyncSender<(usize, String)>,
    options: &RunOptions,
    stop: &AtomicBool,
) -> std::io::Result<usize> {
    let mut page_id: usize = 0;

    dump::scan_pages(reader, |page_xml| {
        if stop.load(Ordering::Relaxed) || options.limit_reached(page_id) {
            return false;
        }
        if tx.send((page_id, page_xml)).is_err() {
            return false;
        }
        page_id += 1;
        true
    })?;

    Ok(page_id)
}

fn process_pages_worker(
    rx: Arc<Mutex<Receiver<(usize, String)>>>,
    tx: SyncSender<ProcessedPage>,
    filter: &PageFilter,
    config: &ParserConfig,
    stop: &AtomicBool,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        // Try to get next page from shared receiver
        let item = {
            let lock = rx.lock().ok();
            lock.and_then(|guard| guard.recv().ok())
        };

        match item {
            Some((page_id, xml)) => {
                let result = process_page(&xml, page_id, filter, config);
                if tx.send(result).is_err() {
                    break;
                }
            }
            None => break,
        }
    }
}

/// Commit results in page order using a streaming reorder buffer.
///
/// Results that arrive before their predecessors wait in a BTreeMap; the
/// in-order ones are committed immediately.
fn collect_sorted(rx: Receiver<ProcessedPage>, collector: &mut Collector<'_>) -> Result<()> {
    let mut pending: BTreeMap<usize, ProcessedPage> = BTreeMap::new();
    let mut next_expected: usize = 0;

    for result in rx {
        if result.page_id != next_expected {
            pending.insert(result.page_id, result);
            continue;
        }

        collector.commit(result)?;
        next_expected += 1;

        while let Some(buffered) = pending.remove(&next_expected) {
            collector.commit(buffered)?;
            next_expected += 1;
        }
    }

    // Only reachable with gaps, i.e. a worker died mid-page
    if !pending.is_empty() {
        warn!(missing_from = next_expected, buffered = pending.len(), "page ids missing from pipeline");
    }
    for (_, result) in pending {
        collector.commit(result)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page(title: &str, text: &str) -> String {
        format!("<page>\n<title>{title}</title>\n<ns>0</ns>\n<revision><text>{text}</text></revision>\n</page>\n")
    }

    fn dump() -> String {
        let mut xml = String::from("<mediawiki>\n");
        for i in 0..57 {
            xml.push_str(&page(
                &format!("parola{i}"),
                &format!("== {{{{-it-}}}} ==\n{{{{-sost-|it}}}}\n# definizione {i}\n"),
            ));
        }
        xml.push_str(&page("Categoria:Nomi", "x"));
        xml.push_str(&page("house", "== {{-en-}} ==\n# a building\n"));
        xml.push_str(&page("parola3", "== {{-it-}} ==\n{{-agg-|it}}\n# ultima\n"));
        xml.push_str("<page><title>vuota</title><ns>0</ns><text /></page>\n");
        xml.push_str("</mediawiki>\n");
        xml
    }

    fn options(strategy: Strategy) -> RunOptions {
        RunOptions {
            strategy,
            parallel: ParallelConfig {
                num_threads: 3,
                batch_size: 8,
                channel_buffer: 4,
                num_workers: 3,
            },
            ..RunOptions::default()
        }
    }

    fn extract(strategy: Strategy) -> Extraction {
        let config = ParserConfig::default();
        run(dump().as_bytes(), &config, &options(strategy), &ProgressBar::hidden()).unwrap()
    }

    fn entry(title: &str, etymology: &str) -> ProcessedPage {
        let entry = Entry {
            etymology: etymology.to_string(),
            ..Entry::default()
        };
        ProcessedPage {
            page_id: 0,
            outcome: PageOutcome::Entry {
                title: title.to_string(),
                entry,
            },
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Strategies
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn sequential_stats() {
        let run = extract(Strategy::Sequential);
        assert_eq!(run.lexicon.len(), 57);
        assert_eq!(run.stats.pages_processed, 61);
        assert_eq!(run.stats.entries_extracted, 57);
        assert_eq!(run.stats.special, 1);
        assert_eq!(run.stats.no_language, 1);
        assert_eq!(run.stats.no_text, 1);
        assert_eq!(run.stats.duplicates, 1);
        assert_eq!(run.stats.failed, 0);
    }

    #[test]
    fn duplicate_title_last_write_wins_in_place() {
        let run = extract(Strategy::Sequential);
        let titles: Vec<&String> = run.lexicon.iter().map(|(t, _)| t).collect();
        assert_eq!(titles[3], "parola3");
        let slots: Vec<String> = run.lexicon.get("parola3").unwrap().meanings.keys().map(|k| k.to_string()).collect();
        assert_eq!(slots, vec!["agg_0"]);
    }

    #[test]
    fn parallel_strategies_match_sequential() {
        let sequential = extract(Strategy::Sequential);
        for strategy in [Strategy::BatchParallel, Strategy::ChannelPipeline] {
            let parallel = extract(strategy);
            assert_eq!(parallel.lexicon, sequential.lexicon, "{strategy:?}");
            assert_eq!(
                parallel.lexicon.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(),
                sequential.lexicon.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(),
                "{strategy:?}"
            );
            assert_eq!(parallel.stats.pages_processed, sequential.stats.pages_processed);
            assert_eq!(parallel.stats.duplicates, 1);
        }
    }

    #[test]
    fn page_limit_applies_to_every_strategy() {
        let config = ParserConfig::default();
        for strategy in [Strategy::Sequential, Strategy::BatchParallel, Strategy::ChannelPipeline] {
            let mut opts = options(strategy);
            opts.page_limit = Some(10);
            let limited = run(dump().as_bytes(), &config, &opts, &ProgressBar::hidden()).unwrap();
            assert_eq!(limited.stats.pages_processed, 10, "{strategy:?}");
            assert_eq!(limited.lexicon.len(), 10, "{strategy:?}");
        }
    }

    #[test]
    fn empty_input() {
        let config = ParserConfig::default();
        for strategy in [Strategy::Sequential, Strategy::BatchParallel, Strategy::ChannelPipeline] {
            let empty = run(&b""[..], &config, &options(strategy), &ProgressBar::hidden()).unwrap();
            assert!(empty.lexicon.is_empty());
            assert_eq!(empty.stats.pages_processed, 0);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Collector
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn fail_fast_returns_page_error() {
        let pb = ProgressBar::hidden();
        let mut collector = Collector::new(FailurePolicy::FailFast, &pb);
        let failed = ProcessedPage {
            page_id: 0,
            outcome: PageOutcome::Failed(ExtractError::PageFailed {
                title: "casa".to_string(),
                message: "boom".to_string(),
            }),
        };
        let err = collector.commit(failed).unwrap_err();
        assert!(matches!(err, ExtractError::PageFailed { ref title, .. } if title == "casa"));
    }

    #[test]
    fn skip_policy_counts_failures() {
        let pb = ProgressBar::hidden();
        let mut collector = Collector::new(FailurePolicy::Skip, &pb);
        let failed = ProcessedPage {
            page_id: 0,
            outcome: PageOutcome::Failed(ExtractError::PageFailed {
                title: "casa".to_string(),
                message: "boom".to_string(),
            }),
        };
        collector.commit(failed).unwrap();
        collector.commit(entry("tetto", "x")).unwrap();
        let run = collector.finish();
        assert_eq!(run.stats.failed, 1);
        assert_eq!(run.stats.entries_extracted, 1);
    }

    #[test]
    fn dead_batch_worker_fails_its_pages() {
        let chunk = vec![page("casa", "x"), "<page></page>".to_string()];
        let failed = failed_chunk(&chunk, 10, "worker died", &PageFilter::default());

        let ids: Vec<usize> = failed.iter().map(|p| p.page_id).collect();
        assert_eq!(ids, vec![10, 11]);
        let titles: Vec<String> = failed
            .iter()
            .map(|p| match &p.outcome {
                PageOutcome::Failed(ExtractError::PageFailed { title, message }) => {
                    assert_eq!(message, "worker died");
                    title.clone()
                }
                other => panic!("unexpected outcome: {other:?}"),
            })
            .collect();
        assert_eq!(titles, vec!["casa", "page 11"]);

        let pb = ProgressBar::hidden();
        let mut collector = Collector::new(FailurePolicy::FailFast, &pb);
        let mut pages = failed.into_iter();
        assert!(collector.commit(pages.next().unwrap()).is_err());
        assert_eq!(collector.stats.failed, 1);
    }

    #[test]
    fn reorder_buffer_commits_in_page_order() {
        let (tx, rx) = sync_channel(8);
        for (id, title) in [(2, "c"), (0, "a"), (3, "d"), (1, "b")] {
            let mut page = entry(title, title);
            page.page_id = id;
            tx.send(page).unwrap();
        }
        drop(tx);

        let pb = ProgressBar::hidden();
        let mut collector = Collector::new(FailurePolicy::FailFast, &pb);
        collect_sorted(rx, &mut collector).unwrap();
        let run = collector.finish();
        let titles: Vec<&str> = run.lexicon.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c", "d"]);
    }
}
