//! The memory worker: periodically probes the target process and feeds
//! observation events onto the bus.
//!
//! One attach attempt walks discovery, attach, locate, observe; any fault
//! falls back to the appropriate earlier stage and the worker never
//! terminates the program on its own. The stop flag is checked on every
//! loop iteration and before every sleep.

use {
    crate::{
        linux::{
            locator::{self, MtAddresses},
            memory::ProcessMemory,
            process,
        },
        message::Message,
        mt19937::Mt19937,
    },
    crossbeam_channel::{SendTimeoutError, Sender},
    log::{debug, error, info, warn},
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    },
};

/// Poll interval while observing a located generator.
const OBSERVE_INTERVAL: Duration = Duration::from_millis(100);
/// Poll interval while waiting for the target process to appear.
const SEARCH_INTERVAL: Duration = Duration::from_millis(1000);
/// Backoff after the target refused memory access.
const DENIED_BACKOFF: Duration = Duration::from_secs(5);
/// How long one enqueue attempt blocks before re-checking the stop flag.
const EMIT_RETRY: Duration = Duration::from_millis(50);

/// Granularity of stop-flag checks while sleeping.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Substring the target process name must contain.
    pub process_name: String,
    /// How many upcoming percentages to project per tick.
    pub lookahead: usize,
}

pub struct MemoryWorker {
    config: WorkerConfig,
    bus: Sender<Message>,
    stop: Arc<AtomicBool>,
}

impl MemoryWorker {
    pub fn new(config: WorkerConfig, bus: Sender<Message>, stop: Arc<AtomicBool>) -> Self {
        Self { config, bus, stop }
    }

    /// Runs until the stop flag is raised. Each pass of the outer loop is
    /// one attach attempt.
    pub fn run(self) {
        info!("memory worker started, watching for `{}`", self.config.process_name);

        while !self.stopped() {
            let pinfo = match process::find_process(&self.config.process_name) {
                Ok(Some(pinfo)) => pinfo,
                Ok(None) => {
                    self.emit(Message::OnlineStatus(false));
                    self.sleep(SEARCH_INTERVAL);
                    continue;
                }
                Err(e) => {
                    error!("cannot enumerate processes: {e}");
                    self.emit(Message::OnlineStatus(false));
                    self.sleep(SEARCH_INTERVAL);
                    continue;
                }
            };

            match ProcessMemory::open(pinfo.pid) {
                Ok(mut mem) => self.observe(&mut mem),
                Err(e) => {
                    warn!("cannot attach to {} (pid {}): {e}", pinfo.name, pinfo.pid);
                    self.emit(Message::OnlineStatus(false));
                    let backoff = if e.is_permission_denied() {
                        DENIED_BACKOFF
                    } else {
                        SEARCH_INTERVAL
                    };
                    self.sleep(backoff);
                }
            }
        }

        debug!("memory worker: exited loop");
    }

    /// Locates the generator and mirrors it until the target goes away or
    /// the stop flag is raised. The memory window is released by the caller
    /// when this returns.
    fn observe(&self, mem: &mut ProcessMemory) {
        let mut rng = Mt19937::new();
        let mut addrs: Option<MtAddresses> = None;

        while !self.stopped() {
            let located = match addrs {
                Some(located) => located,
                None => match locator::find_mt_addresses(mem) {
                    Ok(Some(located)) => {
                        addrs = Some(located);
                        located
                    }
                    Ok(None) => {
                        self.emit(Message::OnlineStatus(false));
                        self.sleep(OBSERVE_INTERVAL);
                        continue;
                    }
                    Err(e) => {
                        warn!("dropping target pid {}: {e}", mem.pid());
                        self.emit(Message::OnlineStatus(false));
                        return;
                    }
                },
            };

            match locator::read_mt_and_mti(mem, located.mt_addr) {
                Ok(data) if data.is_valid() => {
                    self.tick(&mut rng, data);
                }
                Ok(_) => {
                    // Stale addresses; go back to locating.
                    warn!("observed an out-of-range cursor, relocating the generator");
                    addrs = None;
                    self.emit(Message::OnlineStatus(false));
                }
                Err(e) => {
                    warn!("dropping target pid {}: {e}", mem.pid());
                    self.emit(Message::OnlineStatus(false));
                    return;
                }
            }

            self.sleep(OBSERVE_INTERVAL);
        }
    }

    /// One observation tick: re-align the mirror and emit, in order, the
    /// status, the live cursor, and the projected percentages.
    fn tick(&self, rng: &mut Mt19937, data: locator::MtData) {
        let mti = data.mti();
        let synced = rng.has_data() && rng.sync(data.element_at_cursor(), mti);
        if !synced {
            rng.reset_from_state(data.mt_els, mti);
        }

        if rng.has_data() {
            self.emit(Message::OnlineStatus(true));
            self.emit(Message::MtiValue(mti));
            self.emit(Message::NextPercentages(
                rng.next_percentages(self.config.lookahead),
            ));
        } else {
            self.emit(Message::OnlineStatus(false));
            self.emit(Message::MtiValue(mti));
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Enqueues one message. A full bus blocks briefly and retries rather
    /// than dropping; a raised stop flag or a gone consumer abandons the
    /// message.
    fn emit(&self, msg: Message) {
        let mut msg = msg;
        while !self.stopped() {
            match self.bus.send_timeout(msg, EMIT_RETRY) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(back)) => msg = back,
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    /// Sleeps for `total`, waking early when the stop flag is raised.
    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
