//! Simulated transport with fault injection.

use crate::context::SimContext;
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;
use v2i_core::MessageKind;
use v2i_env::{Endpoint, EnvError, MessageTransport, PlaybackContext, TransportFactory};

/// A frame that reached the simulated network.
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    /// Virtual time the frame was handed over
    pub at: Duration,

    /// Unit that sent it
    pub unit: String,

    pub kind: Option<MessageKind>,
    pub bytes: Vec<u8>,
}

impl SentFrame {
    /// The vehicle id field that follows the header.
    pub fn vehicle_id(&self) -> Option<i32> {
        let bytes: [u8; 4] = self.bytes.get(8..12)?.try_into().ok()?;
        Some(i32::from_be_bytes(bytes))
    }
}

/// Every frame delivered by the transports sharing it, in send order.
#[derive(Debug, Clone, Default)]
pub struct FrameLog {
    frames: Arc<Mutex<Vec<SentFrame>>>,
    dropped: Arc<AtomicU64>,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, frame: SentFrame) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame);
        }
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Datagrams lost to the loss rate.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn of_kind(&self, kind: MessageKind) -> Vec<SentFrame> {
        self.frames()
            .into_iter()
            .filter(|f| f.kind == Some(kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Faults applied to every send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkConditions {
    /// Probability (0.0 - 1.0) that a datagram silently disappears
    pub loss_rate: f64,

    /// Every n-th send fails and drops the association
    pub fail_every: Option<u64>,

    /// Virtual time spent inside each send
    pub processing_delay: Duration,
}

impl LinkConditions {
    pub fn with_loss(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_failures_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }
}

/// Records frames against the virtual clock instead of sending them.
///
/// Loss is invisible to the sender, as with real UDP. Injected failures are
/// reported and drop the association until the next send.
pub struct SimTransport {
    endpoint: Endpoint,
    label: String,
    ctx: Arc<SimContext>,
    log: FrameLog,
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    attempts: u64,
    connected: bool,
}

impl SimTransport {
    pub fn new(
        endpoint: Endpoint,
        label: impl Into<String>,
        ctx: Arc<SimContext>,
        log: FrameLog,
        conditions: LinkConditions,
        seed: u64,
    ) -> Self {
        Self {
            endpoint,
            label: label.into(),
            ctx,
            log,
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            attempts: 0,
            connected: false,
        }
    }
}

#[async_trait]
impl MessageTransport for SimTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), EnvError> {
        self.attempts += 1;
        if !self.conditions.processing_delay.is_zero() {
            self.ctx.advance_time(self.conditions.processing_delay);
        }

        if let Some(n) = self.conditions.fail_every {
            if self.attempts % n == 0 {
                self.connected = false;
                return Err(EnvError::network(format!("injected failure on send {}", self.attempts)));
            }
        }
        self.connected = true;

        if self.conditions.loss_rate > 0.0 && self.rng.gen::<f64>() < self.conditions.loss_rate {
            self.log.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(unit = %self.label, "datagram lost");
            return Ok(());
        }

        self.log.record(SentFrame {
            at: self.ctx.now(),
            unit: self.label.clone(),
            kind: MessageKind::peek(frame),
            bytes: frame.to_vec(),
        });
        Ok(())
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Opens [`SimTransport`]s that share one context and frame log.
pub struct SimTransportFactory {
    ctx: Arc<SimContext>,
    log: FrameLog,
    conditions: LinkConditions,
    seed: u64,
}

impl SimTransportFactory {
    pub fn new(ctx: Arc<SimContext>, log: FrameLog, conditions: LinkConditions, seed: u64) -> Self {
        Self {
            ctx,
            log,
            conditions,
            seed,
        }
    }

    fn unit_seed(&self, label: &str) -> u64 {
        label
            .bytes()
            .fold(self.seed.wrapping_mul(0x517cc1b727220a95), |h, b| {
                (h ^ b as u64).wrapping_mul(0x100000001b3)
            })
    }
}

impl TransportFactory for SimTransportFactory {
    type Transport = SimTransport;

    fn open(&self, endpoint: &Endpoint, label: &str) -> SimTransport {
        SimTransport::new(
            endpoint.clone(),
            label,
            Arc::clone(&self.ctx),
            self.log.clone(),
            self.conditions.clone(),
            self.unit_seed(label),
        )
    }
}
