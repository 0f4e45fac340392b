//! Periodic transmission scheduler
//!
//! Each armed message owns one timer task. Records stay in an ordered list;
//! the timer handles live in a separate map keyed by [`PeriodicId`], so the
//! records never carry runtime state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::session::SessionCore;
use crate::sync::lock;
use crate::types::{Frame, PeriodicId, PeriodicMessage, increment_byte};
use crate::{BusError, Result};

#[derive(Debug, Clone)]
struct PeriodicEntry {
    id: PeriodicId,
    message: PeriodicMessage,
}

type Entries = Arc<Mutex<Vec<PeriodicEntry>>>;

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn stop(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task.abort();
        self.task
    }
}

/// Running timers plus the gate that keeps new ones from starting.
struct TimerTable {
    handles: HashMap<PeriodicId, TimerHandle>,
    /// Set by `halt`, cleared by `start_all`; no timer is armed while set
    halted: bool,
}

impl TimerTable {
    fn drain(&mut self) -> Vec<JoinHandle<()>> {
        self.handles.drain().map(|(_, timer)| timer.stop()).collect()
    }
}

/// Ordered periodic messages and their timers.
pub struct TransmitScheduler {
    core: Arc<SessionCore>,
    entries: Entries,
    timers: Mutex<TimerTable>,
    next_id: AtomicU64,
}

impl TransmitScheduler {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self {
            core,
            entries: Arc::new(Mutex::new(Vec::new())),
            timers: Mutex::new(TimerTable { handles: HashMap::new(), halted: true }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Validate and append a message, arming it when the bus is connected.
    pub fn add(&self, message: PeriodicMessage) -> Result<PeriodicId> {
        let message = message.validated()?;
        let id = PeriodicId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%id, msg_id = message.msg_id, cycle_ms = message.cycle_time_ms, "Periodic message added");
        lock(&self.entries).push(PeriodicEntry { id, message });
        self.arm(id);
        Ok(id)
    }

    /// Replace a message in place; its send count carries over and the timer
    /// restarts with the new cycle.
    pub fn update(&self, id: PeriodicId, message: PeriodicMessage) -> Result<()> {
        let mut message = message.validated()?;
        {
            let mut entries = lock(&self.entries);
            let entry = entries.iter_mut().find(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
            message.count = entry.message.count;
            entry.message = message;
        }
        self.disarm(id);
        self.arm(id);
        Ok(())
    }

    /// Stop the message's timer, then drop the entry.
    pub fn remove(&self, id: PeriodicId) -> Result<PeriodicMessage> {
        self.disarm(id);
        let mut entries = lock(&self.entries);
        let index = entries.iter().position(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
        Ok(entries.remove(index).message)
    }

    pub fn pause(&self, id: PeriodicId) -> Result<()> {
        self.set_paused(id, true)?;
        self.disarm(id);
        Ok(())
    }

    pub fn resume(&self, id: PeriodicId) -> Result<()> {
        self.set_paused(id, false)?;
        self.arm(id);
        Ok(())
    }

    /// Flip the paused flag; returns the new value.
    pub fn toggle(&self, id: PeriodicId) -> Result<bool> {
        let paused = self.get(id).ok_or_else(|| unknown(id))?.is_paused;
        if paused {
            self.resume(id)?;
        } else {
            self.pause(id)?;
        }
        Ok(!paused)
    }

    /// Send the current payload once, outside the timer's cadence.
    ///
    /// The payload is not incremented and the timer phase is untouched; the
    /// send count goes up as for a timed send.
    pub async fn send_once(&self, id: PeriodicId) -> Result<Frame> {
        if !self.core.is_connected() {
            return Err(BusError::NotConnected);
        }
        let (msg_id, data, extended) = {
            let mut entries = lock(&self.entries);
            let entry = entries.iter_mut().find(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
            entry.message.count += 1;
            (entry.message.msg_id, entry.message.data.clone(), entry.message.is_extended)
        };
        self.core.send(msg_id, data, extended).await
    }

    /// Disarm every timer. Paused flags are left as they are.
    pub fn stop_all(&self) {
        let stopped = self.take_timers();
        if !stopped.is_empty() {
            info!(count = stopped.len(), "Stopped periodic transmissions");
        }
    }

    /// Arm every message that is cyclic and not paused.
    pub fn start_all(&self) {
        lock(&self.timers).halted = false;
        let ids: Vec<PeriodicId> = lock(&self.entries).iter().map(|entry| entry.id).collect();
        for id in ids {
            self.arm(id);
        }
    }

    /// Stop all timers and drop every message.
    pub fn clear(&self) {
        self.stop_all();
        lock(&self.entries).clear();
    }

    /// Swap the whole list. Nothing changes if any message is invalid.
    pub fn replace_all(&self, messages: Vec<PeriodicMessage>) -> Result<Vec<PeriodicId>> {
        let validated =
            messages.into_iter().map(PeriodicMessage::validated).collect::<Result<Vec<_>>>()?;
        self.clear();
        validated.into_iter().map(|message| self.add(message)).collect()
    }

    pub fn get(&self, id: PeriodicId) -> Option<PeriodicMessage> {
        lock(&self.entries).iter().find(|entry| entry.id == id).map(|entry| entry.message.clone())
    }

    /// All messages in insertion order.
    pub fn list(&self) -> Vec<(PeriodicId, PeriodicMessage)> {
        lock(&self.entries).iter().map(|entry| (entry.id, entry.message.clone())).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Number of timer tasks still running.
    pub fn active_timers(&self) -> usize {
        lock(&self.timers).handles.values().filter(|timer| !timer.task.is_finished()).count()
    }

    pub fn is_armed(&self, id: PeriodicId) -> bool {
        lock(&self.timers).handles.get(&id).is_some_and(|timer| !timer.task.is_finished())
    }

    /// Disarm every timer and wait for the tasks to wind down.
    ///
    /// Nothing is armed again until the next `start_all`, even if messages
    /// are added or resumed in between.
    pub(crate) async fn halt(&self) {
        let tasks = {
            let mut timers = lock(&self.timers);
            timers.halted = true;
            timers.drain()
        };
        for task in tasks {
            // Aborted tasks resolve promptly with a cancellation error
            let _ = task.await;
        }
    }

    fn take_timers(&self) -> Vec<JoinHandle<()>> {
        lock(&self.timers).drain()
    }

    fn set_paused(&self, id: PeriodicId, paused: bool) -> Result<()> {
        let mut entries = lock(&self.entries);
        let entry = entries.iter_mut().find(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
        entry.message.is_paused = paused;
        Ok(())
    }

    fn disarm(&self, id: PeriodicId) {
        if let Some(timer) = lock(&self.timers).handles.remove(&id) {
            trace!(%id, "Timer disarmed");
            timer.stop();
        }
    }

    /// Start the message's timer if it should run and is not running yet.
    ///
    /// The halted flag and connection state are checked under the timer
    /// lock, so a concurrent `halt` either sees the new handle or prevents it.
    fn arm(&self, id: PeriodicId) {
        let mut timers = lock(&self.timers);
        if timers.halted || !self.core.is_connected() {
            return;
        }
        if timers.handles.get(&id).is_some_and(|timer| !timer.task.is_finished()) {
            return;
        }
        let Some(message) = self.get(id) else { return };
        if message.is_paused || !message.is_cyclic() {
            return;
        }

        let period = Duration::from_millis(message.cycle_time_ms);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(timer_task(
            id,
            period,
            Arc::clone(&self.entries),
            Arc::clone(&self.core),
            cancel.clone(),
        ));
        trace!(%id, ?period, "Timer armed");
        timers.handles.insert(id, TimerHandle { cancel, task });
    }
}

impl Drop for TransmitScheduler {
    fn drop(&mut self) {
        lock(&self.timers).drain();
    }
}

async fn timer_task(
    id: PeriodicId,
    period: Duration,
    entries: Entries,
    core: Arc<SessionCore>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !core.is_connected() {
            continue;
        }

        let payload = {
            let mut entries = lock(&entries);
            match entries.iter_mut().find(|entry| entry.id == id) {
                None => break,
                Some(entry) if entry.message.is_paused => None,
                Some(entry) => {
                    let message = &mut entry.message;
                    increment_byte(&mut message.data, message.increment_byte);
                    message.count += 1;
                    Some((message.msg_id, message.data.clone(), message.is_extended))
                }
            }
        };

        if let Some((msg_id, data, extended)) = payload {
            if let Err(err) = core.send(msg_id, data, extended).await {
                debug!(%id, msg_id, "Periodic send failed: {err}");
            }
        }
    }

    trace!(%id, "Timer task ended");
}

fn unknown(id: PeriodicId) -> BusError {
    BusError::UnknownEntry { entity: "periodic message", id: id.value() }
}
