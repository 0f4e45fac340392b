//! Trigger/response rule engine
//!
//! Rules are evaluated in list order against every received frame. Every
//! enabled rule whose trigger id equals the frame id fires; there is no
//! first-match-wins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::session::SessionCore;
use crate::sync::lock;
use crate::types::{Frame, ResponseRule, RuleId, increment_byte};
use crate::{BusError, Result};

#[derive(Debug, Clone)]
struct RuleEntry {
    id: RuleId,
    rule: ResponseRule,
}

/// A rule matched by a frame, waiting out its delay.
struct PendingResponse {
    id: RuleId,
    delay: Duration,
    /// Copy taken when the delay starts, used if the rule is removed mid-delay
    snapshot: ResponseRule,
}

/// Ordered list of response rules plus the master auto-response switch.
pub struct ResponseRuleEngine {
    rules: Mutex<Vec<RuleEntry>>,
    next_id: AtomicU64,
    response_mode: AtomicBool,
}

impl Default for ResponseRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseRuleEngine {
    pub fn new() -> Self {
        Self { rules: Mutex::new(Vec::new()), next_id: AtomicU64::new(1), response_mode: AtomicBool::new(true) }
    }

    fn allocate_id(&self) -> RuleId {
        RuleId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Validate and append a rule.
    pub fn add(&self, rule: ResponseRule) -> Result<RuleId> {
        let rule = rule.validated()?;
        let id = self.allocate_id();
        debug!(%id, trigger = rule.trigger_id, response = rule.response_id, "Response rule added");
        lock(&self.rules).push(RuleEntry { id, rule });
        Ok(id)
    }

    /// Replace a rule in place, keeping its position and id.
    pub fn update(&self, id: RuleId, rule: ResponseRule) -> Result<()> {
        let rule = rule.validated()?;
        let mut rules = lock(&self.rules);
        let entry = rules.iter_mut().find(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
        entry.rule = rule;
        Ok(())
    }

    pub fn remove(&self, id: RuleId) -> Result<ResponseRule> {
        let mut rules = lock(&self.rules);
        let index = rules.iter().position(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
        Ok(rules.remove(index).rule)
    }

    pub fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<()> {
        let mut rules = lock(&self.rules);
        let entry = rules.iter_mut().find(|entry| entry.id == id).ok_or_else(|| unknown(id))?;
        entry.rule.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, id: RuleId) -> Option<ResponseRule> {
        lock(&self.rules).iter().find(|entry| entry.id == id).map(|entry| entry.rule.clone())
    }

    /// All rules in evaluation order.
    pub fn list(&self) -> Vec<(RuleId, ResponseRule)> {
        lock(&self.rules).iter().map(|entry| (entry.id, entry.rule.clone())).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.rules).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.rules).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.rules).clear();
    }

    /// Swap the whole list for `rules`. Nothing changes if any rule is invalid.
    pub fn replace_all(&self, rules: Vec<ResponseRule>) -> Result<Vec<RuleId>> {
        let validated = rules.into_iter().map(ResponseRule::validated).collect::<Result<Vec<_>>>()?;
        let entries: Vec<RuleEntry> =
            validated.into_iter().map(|rule| RuleEntry { id: self.allocate_id(), rule }).collect();
        let ids = entries.iter().map(|entry| entry.id).collect();
        *lock(&self.rules) = entries;
        Ok(ids)
    }

    /// Master switch for auto-responses; rules keep their own enabled flags.
    pub fn set_response_mode(&self, enabled: bool) {
        info!(enabled, "Auto-response mode changed");
        self.response_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn response_mode(&self) -> bool {
        self.response_mode.load(Ordering::Relaxed)
    }

    /// Fire every enabled rule triggered by `frame`, in list order.
    ///
    /// Runs on the receive task. Only the evaluation order is fixed when the
    /// frame arrives: each rule is looked up again right before its own delay
    /// starts and skipped if it no longer matches. Once its
    /// delay has started the response always goes out. Delays are awaited
    /// without holding the rule lock. Returns the number of responses
    /// accepted by the transport.
    pub(crate) async fn respond(&self, core: &SessionCore, frame: &Frame) -> usize {
        if !self.response_mode() {
            return 0;
        }

        let order: Vec<RuleId> = lock(&self.rules)
            .iter()
            .filter(|entry| entry.rule.enabled && entry.rule.trigger_id == frame.id)
            .map(|entry| entry.id)
            .collect();

        let mut fired = 0;
        for id in order {
            let Some(response) = self.pending(id, frame.id) else {
                trace!(%id, "Rule removed or disabled before its turn, skipped");
                continue;
            };
            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }

            let (response_id, data, extended) = self.next_payload(response);
            match core.send(response_id, data, extended).await {
                Ok(_) => fired += 1,
                Err(err) => debug!(trigger = frame.id, response = response_id, "Auto-response not sent: {err}"),
            }
        }
        fired
    }

    /// Current state of a rule about to fire, if it is still present, enabled
    /// and triggered by `trigger`.
    fn pending(&self, id: RuleId, trigger: u32) -> Option<PendingResponse> {
        lock(&self.rules)
            .iter()
            .find(|entry| entry.id == id && entry.rule.enabled && entry.rule.trigger_id == trigger)
            .map(|entry| {
                PendingResponse {
                    id,
                    delay: Duration::from_millis(entry.rule.delay_ms),
                    snapshot: entry.rule.clone(),
                }
            })
    }

    /// Apply the increment and copy out the payload to send.
    fn next_payload(&self, response: PendingResponse) -> (u32, Vec<u8>, bool) {
        let mut rules = lock(&self.rules);
        let rule = match rules.iter_mut().find(|entry| entry.id == response.id) {
            Some(entry) => &mut entry.rule,
            None => {
                debug!(id = %response.id, "Rule removed during its delay, sending captured response");
                let mut rule = response.snapshot;
                increment_byte(&mut rule.response_data, rule.increment_byte);
                return (rule.response_id, rule.response_data, rule.is_extended);
            }
        };
        increment_byte(&mut rule.response_data, rule.increment_byte);
        (rule.response_id, rule.response_data.clone(), rule.is_extended)
    }
}

fn unknown(id: RuleId) -> BusError {
    BusError::UnknownEntry { entity: "response rule", id: id.value() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_rule_leaves_list_untouched() {
        let engine = ResponseRuleEngine::new();
        let id = engine.add(ResponseRule::new(0x100, 0x200, vec![1])).unwrap();

        assert!(engine.add(ResponseRule::new(0x100, 0x200, vec![0u8; 9])).is_err());
        assert!(engine.update(id, ResponseRule::new(0x100, 0x200, vec![0u8; 9])).is_err());
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get(id).unwrap().response_data[0], 1);

        let result = engine.replace_all(vec![
            ResponseRule::new(0x1, 0x2, vec![]),
            ResponseRule::new(0x1, 0x2, vec![0u8; 12]),
        ]);
        assert!(result.is_err());
        assert_eq!(engine.list().len(), 1);
    }

    #[test]
    fn ids_stay_valid_after_removal() {
        let engine = ResponseRuleEngine::new();
        let first = engine.add(ResponseRule::new(0x1, 0x2, vec![])).unwrap();
        let second = engine.add(ResponseRule::new(0x3, 0x4, vec![])).unwrap();
        let third = engine.add(ResponseRule::new(0x5, 0x6, vec![])).unwrap();

        engine.remove(first).unwrap();
        assert_eq!(engine.get(third).unwrap().trigger_id, 0x5);
        engine.set_enabled(second, false).unwrap();
        assert!(!engine.get(second).unwrap().enabled);

        assert!(matches!(engine.remove(first), Err(BusError::UnknownEntry { .. })));
        let order: Vec<RuleId> = engine.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![second, third]);
    }

    #[test]
    fn pending_skips_rules_changed_before_their_turn() {
        let engine = ResponseRuleEngine::new();
        let kept = engine.add(ResponseRule::new(0x1, 0x2, vec![]).with_delay_ms(5)).unwrap();
        let disabled = engine.add(ResponseRule::new(0x1, 0x3, vec![])).unwrap();
        let removed = engine.add(ResponseRule::new(0x1, 0x4, vec![])).unwrap();
        let retargeted = engine.add(ResponseRule::new(0x1, 0x5, vec![])).unwrap();

        engine.set_enabled(disabled, false).unwrap();
        engine.remove(removed).unwrap();
        engine.update(retargeted, ResponseRule::new(0x9, 0x5, vec![])).unwrap();

        assert_eq!(engine.pending(kept, 0x1).unwrap().delay, Duration::from_millis(5));
        assert!(engine.pending(disabled, 0x1).is_none());
        assert!(engine.pending(removed, 0x1).is_none());
        assert!(engine.pending(retargeted, 0x1).is_none());
    }

    #[test]
    fn captured_payload_is_used_after_removal() {
        let engine = ResponseRuleEngine::new();
        let rule = ResponseRule::new(0x1, 0x2, vec![7]).with_increment_byte(0).validated().unwrap();
        let id = engine.add(rule.clone()).unwrap();
        engine.remove(id).unwrap();

        let pending = PendingResponse { id, delay: Duration::ZERO, snapshot: rule };
        let (response_id, data, _) = engine.next_payload(pending);
        assert_eq!(response_id, 0x2);
        assert_eq!(data[0], 8);
    }
}
