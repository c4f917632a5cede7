use clap::{Arg, Command};
use log;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use workpool::{Dispatcher, ErrorKind, Logger, Result, Worker};

static NEXT_MULE_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct MuleItem {
    id: usize,
}

/// Demo worker: one mule per thread, carrying items one at a time.
struct MuleWorker {
    mule_id: usize,
    delay: Duration,
}

impl MuleWorker {
    fn new(delay: Duration) -> Self {
        let mule_id = NEXT_MULE_ID.fetch_add(1, Ordering::SeqCst);
        log::info!("mule-{}: began", mule_id);
        Self { mule_id, delay }
    }
}

impl Drop for MuleWorker {
    fn drop(&mut self) {
        log::info!("mule-{}: finished", self.mule_id);
    }
}

impl Worker<MuleItem> for MuleWorker {
    fn process(&mut self, item: &mut MuleItem) {
        thread::sleep(self.delay);
        log::info!("mule-{} item {}", self.mule_id, item.id);
    }
}

fn main() -> Result<()> {
    Logger::init().map_err(|e| ErrorKind::Other(format!("{:?}", e)))?;

    let matches = Command::new("workpool")
        .version("0.1.0")
        .about("batch worker pool demo")
        .max_term_width(100)
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_name("N")
                .help("number of worker threads (default: available parallelism)")
                .value_parser(clap::value_parser!(usize))
                .num_args(1),
        )
        .arg(
            Arg::new("capacity")
                .long("capacity")
                .value_name("N")
                .help("queue capacity (default: threads * 2)")
                .value_parser(clap::value_parser!(usize))
                .num_args(1),
        )
        .arg(
            Arg::new("batches")
                .long("batches")
                .value_name("N")
                .help("number of enqueue/run cycles")
                .value_parser(clap::value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            Arg::new("delay-ms")
                .long("delay-ms")
                .value_name("MS")
                .help("simulated per-item workload")
                .value_parser(clap::value_parser!(u64))
                .default_value("100"),
        )
        .get_matches();

    let default_threads = thread::available_parallelism().map(usize::from).unwrap_or(4);
    let threads = *matches.get_one::<usize>("threads").unwrap_or(&default_threads);
    let capacity = *matches
        .get_one::<usize>("capacity")
        .unwrap_or(&(threads * 2));
    let batches = *matches.get_one::<usize>("batches").unwrap();
    let delay = Duration::from_millis(*matches.get_one::<u64>("delay-ms").unwrap());

    log::info!(
        "pool: {} threads, capacity {}, {} batches",
        threads,
        capacity,
        batches
    );

    let mut pool = Dispatcher::new(threads, capacity, move || MuleWorker::new(delay))?;

    for batch in 0..batches {
        let mut id = batch * capacity;
        while pool.enqueue(MuleItem { id }) {
            id += 1;
        }
        log::info!("batch {}: {} items enqueued", batch, pool.len());
        // implicit control flow join: a condvar wake, not a thread join
        pool.run();
    }

    pool.shutdown();
    Ok(())
}
