//! Per-speaker audio buffering.
//!
//! Voice packets arrive every 20ms per speaking user. Each speaker's packets
//! are queued until that speaker has been silent for longer than the flush
//! delay, at which point everything queued becomes one [`Utterance`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use log::{debug, error};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// A voice participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Speaker {
    pub id: u64,
    pub name: String,
}

impl Speaker {
    /// A speaker whose name could not be looked up.
    pub fn unnamed(id: u64) -> Self {
        Self {
            id,
            name: id.to_string(),
        }
    }
}

/// One flushed run of speech from a single speaker.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: Speaker,
    pub guild_id: u64,
    /// Text channel the join command was issued from
    pub text_channel_id: u64,
    /// Wall-clock time of the first packet
    pub started_at: SystemTime,
    /// Interleaved 16-bit PCM in arrival order
    pub samples: Vec<i16>,
}

/// Silence timeout shared by every capture buffer of the process.
#[derive(Debug)]
pub struct FlushDelay(AtomicU64);

impl FlushDelay {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(delay.as_millis() as u64)))
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, delay: Duration) {
        self.0.store(delay.as_millis() as u64, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct Pending {
    speaker: Speaker,
    payloads: Vec<Vec<i16>>,
    last_packet: Instant,
    started_at: SystemTime,
}

impl Pending {
    fn into_utterance(self, guild_id: u64, text_channel_id: u64) -> Utterance {
        let len = self.payloads.iter().map(Vec::len).sum();
        let mut samples = Vec::with_capacity(len);
        for payload in self.payloads {
            samples.extend(payload);
        }
        Utterance {
            speaker: self.speaker,
            guild_id,
            text_channel_id,
            started_at: self.started_at,
            samples,
        }
    }
}

/// Pending audio of every speaker in one voice call.
#[derive(Debug)]
pub struct CaptureBuffer {
    guild_id: u64,
    text_channel_id: u64,
    delay: Arc<FlushDelay>,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl CaptureBuffer {
    pub fn new(guild_id: u64, text_channel_id: u64, delay: Arc<FlushDelay>) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            text_channel_id,
            delay,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Queues a packet for `speaker`, received at `now`.
    pub fn push(&self, speaker: &Speaker, samples: &[i16], now: Instant, wall: SystemTime) {
        let Ok(mut pending) = self.pending.lock() else {
            error!("Capture buffer lock poisoned, dropping packet");
            return;
        };
        let entry = pending.entry(speaker.id).or_insert_with(|| {
            debug!("{} started speaking", speaker.name);
            Pending {
                speaker: speaker.clone(),
                payloads: Vec::new(),
                last_packet: now,
                started_at: wall,
            }
        });
        entry.payloads.push(samples.to_vec());
        entry.last_packet = now;
    }

    /// Removes every speaker silent for longer than the flush delay.
    pub fn drain_expired(&self, now: Instant) -> Vec<Utterance> {
        let delay = self.delay.get();
        let Ok(mut pending) = self.pending.lock() else {
            error!("Capture buffer lock poisoned");
            return Vec::new();
        };
        let expired: Vec<u64> = pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_packet) > delay)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| pending.remove(&id))
            .map(|p| p.into_utterance(self.guild_id, self.text_channel_id))
            .collect()
    }

    /// Removes everything, regardless of age.
    pub fn drain_all(&self) -> Vec<Utterance> {
        let Ok(mut pending) = self.pending.lock() else {
            error!("Capture buffer lock poisoned");
            return Vec::new();
        };
        pending
            .drain()
            .map(|(_, p)| p.into_utterance(self.guild_id, self.text_channel_id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().map(|p| p.is_empty()).unwrap_or(true)
    }
}

/// Sweeps `buffer` every `poll_interval`, sending expired utterances to `tx`.
///
/// The task ends once the receiving side of `tx` is dropped.
pub fn spawn_flusher(
    buffer: Arc<CaptureBuffer>,
    tx: UnboundedSender<Utterance>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            for utterance in buffer.drain_expired(Instant::now()) {
                debug!(
                    "Flushing {} samples from {}",
                    utterance.samples.len(),
                    utterance.speaker.name
                );
                if tx.send(utterance).is_err() {
                    debug!("Utterance receiver gone, stopping flusher");
                    return;
                }
            }
        }
    })
}
