use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, mpsc};
use std::thread;

use crate::domain::analysis::pipeline::{BucketContext, BucketPipeline, BucketReport};
use crate::domain::network::flow::TimeBucket;
use crate::error::Error;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Outcome of one bucket. Either the full report or the error that failed the bucket.
#[derive(Debug)]
pub struct BucketResult {
    pub timestamp: String,
    pub outcome: Result<BucketReport, Error>,
}

impl BucketResult {
    pub fn report(&self) -> Option<&BucketReport> {
        self.outcome.as_ref().ok()
    }
}

/// Runs every bucket through the pipeline on a fixed pool of worker threads.
///
/// Workers pull buckets from a shared queue and push results into a channel. Each worker owns a
/// clone of the context, so bucket runs share no mutable state. A failing or panicking bucket
/// never stops the others. Results come back sorted by timestamp.
#[derive(Debug, Clone, Copy)]
pub struct ParallelScheduler {
    workers: usize,
}

impl ParallelScheduler {
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, context: &BucketContext, buckets: Vec<TimeBucket>) -> Vec<BucketResult> {
        let total = buckets.len();
        let workers = self.workers.min(total.max(1));

        let (job_tx, job_rx) = mpsc::channel::<TimeBucket>();
        let (result_tx, result_rx) = mpsc::channel::<BucketResult>();
        let jobs = Mutex::new(job_rx);

        for bucket in buckets {
            // The receiver lives until the end of this function.
            let _ = job_tx.send(bucket);
        }
        drop(job_tx);

        log::info!("Scheduling {} buckets on {} workers.", total, workers);

        thread::scope(|scope| {
            for worker in 0..workers {
                let jobs = &jobs;
                let result_tx = result_tx.clone();
                let context = context.clone();

                scope.spawn(move || {
                    let pipeline = BucketPipeline::new(&context);
                    let mut processed = 0;

                    loop {
                        let next = match jobs.lock() {
                            Ok(receiver) => receiver.recv(),
                            Err(_) => {
                                log::error!("WorkerQueuePoisoned: Worker {} stops, another worker panicked.", worker);
                                break;
                            }
                        };

                        let Ok(bucket) = next else {
                            break;
                        };

                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&bucket)))
                            .unwrap_or_else(|payload| Err(Error::BucketPanicked { timestamp: bucket.timestamp.clone(), message: panic_message(payload.as_ref()) }));
                        if let Err(e) = &outcome {
                            log::error!("BucketFailed: Bucket {} produced no output: {}", bucket.timestamp, e);
                        }

                        processed += 1;
                        if result_tx.send(BucketResult { timestamp: bucket.timestamp, outcome }).is_err() {
                            break;
                        }
                    }

                    log::debug!("Worker {} finished after {} buckets.", worker, processed);
                });
            }
        });
        drop(result_tx);

        let mut results: Vec<BucketResult> = result_rx.into_iter().collect();
        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let failed = results.iter().filter(|r| r.outcome.is_err()).count();
        log::info!("Processed {} buckets, {} failed.", results.len(), failed);

        results
    }
}
