//! Keeps configured points of one host fresh.
//!
//! Each host gets a single task that owns the timer, the cache and the write
//! queue. Reads and writes are awaited one after another from that task, so
//! the controller never sees two of our requests at once.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use jiff::Timestamp;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::{MissedTickBehavior, timeout},
};
use tracing::{Instrument, Level, debug, error, span, warn};

use crate::{
    error::ConfigurationError,
    id::Layout,
    protocol::{CachedValue, Controller, Mode, ProtocolError, WriteAck},
};

pub mod entity;
pub mod error;
pub mod schedule;

pub use entity::{EntityConfig, EntityKind, Reading, WriteValue};
pub use error::WriteError;
pub use schedule::{PollingMode, Schedule};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_IDS_PER_REQUEST: usize = 40;
const WRITE_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub name: String,
    pub period: Duration,
    /// bounds every single controller call
    pub timeout: Duration,
    pub max_ids_per_request: usize,
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointUpdate {
    Available(Reading),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointEvent {
    pub entity: String,
    pub update: PointUpdate,
    pub timestamp: Timestamp,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub read_requests: u64,
    pub read_values: u64,
    pub writes: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub struct WriteRequest {
    pub entity: String,
    pub value: WriteValue,
    pub reply: oneshot::Sender<Result<WriteAck, WriteError>>,
}

/// Cheap to clone; every clone feeds the same write queue.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    tx: mpsc::Sender<WriteRequest>,
}

struct Tracked {
    config: EntityConfig,
    cache: Option<CachedValue>,
    schedule: Schedule,
}

pub struct HostPoller<C> {
    config: PollerConfig,
    controller: C,
    entities: Vec<Tracked>,
    events: mpsc::Sender<PointEvent>,
    stats: Stats,
}

pub fn mode_for(layout: Layout) -> Mode {
    match layout {
        Layout::Direct => Mode::Direct,
        Layout::Generic => Mode::Generic,
    }
}

impl PollerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            period: DEFAULT_PERIOD,
            timeout: crate::protocol::DEFAULT_TIMEOUT,
            max_ids_per_request: DEFAULT_MAX_IDS_PER_REQUEST,
            threshold: schedule::DEFAULT_THRESHOLD,
        }
    }
}

impl PollerHandle {
    pub async fn write(&self, entity: impl Into<String>, value: WriteValue) -> Result<WriteAck, WriteError> {
        let (reply, rx) = oneshot::channel();
        let req = WriteRequest {
            entity: entity.into(),
            value,
            reply,
        };
        self.tx.send(req).await.map_err(|_| WriteError::Closed)?;
        rx.await.map_err(|_| WriteError::Closed)?
    }
}

impl<C: Controller + 'static> HostPoller<C> {
    /// Invalid or duplicate entities are reported and left out.
    pub fn new(
        config: PollerConfig,
        controller: C,
        entities: Vec<EntityConfig>,
        events: mpsc::Sender<PointEvent>,
    ) -> Self {
        let mut keys = HashSet::new();
        let mut tracked = Vec::with_capacity(entities.len());

        for entity in entities {
            let res = entity.validate().and_then(|_| match keys.insert(entity.key.clone()) {
                true => Ok(()),
                false => Err(ConfigurationError::DuplicateEntity(entity.key.clone())),
            });
            if let Err(e) = res {
                error!("host {}: skipping entity: {e}", config.name);
                continue;
            }

            tracked.push(Tracked {
                schedule: Schedule::new(entity.polling, config.threshold),
                config: entity,
                cache: None,
            });
        }

        Self {
            config,
            controller,
            entities: tracked,
            events,
            stats: Stats::default(),
        }
    }

    pub fn spawn(self) -> (PollerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(WRITE_QUEUE);
        let span = span!(Level::INFO, "Climatix Host", host = %self.config.name);
        let task = tokio::spawn(self.run(rx).instrument(span));
        (PollerHandle { tx }, task)
    }

    pub async fn run(mut self, mut write_rx: mpsc::Receiver<WriteRequest>) {
        debug!("initializing with {} entities", self.entities.len());

        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                    debug!(
                        read_requests = self.stats.read_requests,
                        read_values = self.stats.read_values,
                        writes = self.stats.writes,
                        failures = self.stats.failures,
                        "tick done"
                    );
                }

                req = write_rx.recv() => {
                    let Some(req) = req else {
                        debug!("all handles dropped, stopping");
                        break;
                    };
                    let res = self.handle_write(&req.entity, req.value).await;
                    if req.reply.send(res).is_err() {
                        debug!("write requester for {} went away", req.entity);
                    }
                }
            }
        }
    }

    pub fn cached(&self, key: &str) -> Option<&CachedValue> {
        self.entities
            .iter()
            .find(|t| t.config.key == key)
            .and_then(|t| t.cache.as_ref())
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Due ids grouped into requests: direct ids deduplicated and chunked,
    /// generic ids one per request.
    fn plan(&mut self) -> Vec<(Mode, Vec<String>)> {
        let mut direct: Vec<String> = Vec::new();
        let mut generic: Vec<String> = Vec::new();

        for t in &mut self.entities {
            if !t.schedule.is_due() {
                t.schedule.skipped();
                continue;
            }
            let id = &t.config.read_id;
            let bucket = match mode_for(id.layout()) {
                Mode::Direct => &mut direct,
                Mode::Generic => &mut generic,
            };
            if !bucket.iter().any(|s| s == id.as_str()) {
                bucket.push(id.as_str().to_string());
            }
        }

        let chunk = self.config.max_ids_per_request.max(1);
        let mut plan: Vec<_> = direct
            .chunks(chunk)
            .map(|c| (Mode::Direct, c.to_vec()))
            .collect();
        plan.extend(generic.into_iter().map(|id| (Mode::Generic, vec![id])));
        plan
    }

    pub async fn poll_once(&mut self) {
        let plan = self.plan();
        let mut events = Vec::new();

        for (mode, ids) in plan {
            let values = self.read_batch(mode, &ids).await;

            for t in &mut self.entities {
                let id = &t.config.read_id;
                if mode_for(id.layout()) != mode || !ids.iter().any(|s| s == id.as_str()) {
                    continue;
                }
                let event = match values.get(id.as_str()) {
                    Some(fresh) => t.update(fresh.clone()),
                    None => t.mark_stale(),
                };
                events.push(event);
            }
        }

        // never block the host task on a slow consumer
        for event in events {
            match self.events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!("event queue full, dropping update for {}", event.entity);
                }
                Err(TrySendError::Closed(event)) => {
                    debug!("event receiver gone, dropping update for {}", event.entity);
                }
            }
        }
    }

    /// Reads one planned batch. An id the controller does not know is
    /// dropped and the rest of the batch is asked for again.
    async fn read_batch(&mut self, mode: Mode, ids: &[String]) -> HashMap<String, CachedValue> {
        let mut pending: Vec<&str> = ids.iter().map(String::as_str).collect();

        while !pending.is_empty() {
            self.stats.read_requests += 1;
            self.stats.read_values += pending.len() as u64;

            let res = match timeout(self.config.timeout, self.controller.read(mode, &pending)).await {
                Ok(res) => res,
                Err(_) => Err(ProtocolError::Timeout),
            };

            match res {
                Ok(values) => return values,
                Err(ProtocolError::MissingId(missing)) if pending.len() > 1 && pending.contains(&missing.as_str()) => {
                    warn!("controller has no value for `{missing}`, reading the rest of the batch again");
                    self.stats.failures += 1;
                    pending.retain(|id| *id != missing);
                }
                Err(e) => {
                    error!("reading {} {mode:?} id(s): {e}", pending.len());
                    self.stats.failures += 1;
                    break;
                }
            }
        }

        HashMap::new()
    }

    pub async fn handle_write(&mut self, key: &str, value: WriteValue) -> Result<WriteAck, WriteError> {
        let entity = self
            .entities
            .iter()
            .find(|t| t.config.key == key)
            .map(|t| &t.config)
            .ok_or_else(|| WriteError::UnknownEntity(key.to_string()))?;

        if entity.readonly {
            return Err(WriteError::ReadOnly(key.to_string()));
        }

        let raw = entity.encode(&value)?;
        let target = entity.write_target().clone();
        debug!("writing {raw} to {key}");

        self.stats.writes += 1;
        let res = timeout(
            self.config.timeout,
            self.controller.write(mode_for(target.layout()), target.as_str(), raw),
        )
        .await;

        match res {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(e)) => {
                self.stats.failures += 1;
                error!("writing {key}: {e}");
                Err(e.into())
            }
            Err(_) => {
                self.stats.failures += 1;
                error!("writing {key}: timed out");
                Err(WriteError::Timeout)
            }
        }
    }
}

impl Tracked {
    fn update(&mut self, fresh: CachedValue) -> PointEvent {
        let changed = match &self.cache {
            Some(old) => old.raw_values != fresh.raw_values,
            None => true,
        };
        self.schedule.polled(changed);

        let event = PointEvent {
            entity: self.config.key.clone(),
            update: PointUpdate::Available(self.config.decode(fresh.value)),
            timestamp: fresh.timestamp,
        };
        self.cache = Some(fresh);
        event
    }

    /// Keeps value and timestamp, only flags them.
    fn mark_stale(&mut self) -> PointEvent {
        self.schedule.failed();
        match &mut self.cache {
            Some(cache) if !cache.stale => {
                warn!("{} is stale", self.config.key);
                cache.stale = true;
            }
            Some(_) => {}
            None => warn!("{} has no value yet", self.config.key),
        }

        PointEvent {
            entity: self.config.key.clone(),
            update: PointUpdate::Unavailable,
            timestamp: Timestamp::now(),
        }
    }
}
