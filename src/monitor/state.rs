use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AlertState {
    #[default]
    Clear,
    Warned,
    Escalated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlertTier {
    Warning,
    Escalation,
}

impl AlertTier {
    pub fn message(self) -> &'static str {
        match self {
            AlertTier::Warning => "Are you still there?",
            AlertTier::Escalation => "You have been away for a while. Time to refocus!",
        }
    }
}

/// When the absence counter restarts after an alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RearmPolicy {
    /// Warn at T1, escalate at T1 + T2, then reset and start a new cycle.
    #[default]
    AtEscalation,
    /// Warn at T1, reset, then escalate every T2 ticks until presence returns.
    AfterEveryAlert,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    pub warn_after_ticks: u32,
    pub escalate_after_ticks: u32,
    #[serde(default)]
    pub rearm: RearmPolicy,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warn_after_ticks: 5,
            escalate_after_ticks: 5,
            rearm: RearmPolicy::AtEscalation,
        }
    }
}

impl AlertThresholds {
    pub fn new(warn_after_ticks: u32, escalate_after_ticks: u32, rearm: RearmPolicy) -> Result<Self> {
        let thresholds = Self {
            warn_after_ticks,
            escalate_after_ticks,
            rearm,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.warn_after_ticks == 0 {
            bail!("warn threshold (T1) must be at least one tick");
        }
        if self.escalate_after_ticks == 0 {
            bail!("escalation threshold (T2) must be at least one tick");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttentionState {
    pub consecutive_absent_ticks: u32,
    pub alerts_fired: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub present: bool,
    pub alert: Option<AlertTier>,
    pub state: AlertState,
    pub attention: AttentionState,
}

/// Tiered absence alerts, advanced once per tick.
#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    thresholds: AlertThresholds,
    attention: AttentionState,
    state: AlertState,
}

impl AlertStateMachine {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            attention: AttentionState::default(),
            state: AlertState::Clear,
        }
    }

    pub fn thresholds(&self) -> AlertThresholds {
        self.thresholds
    }

    pub fn attention(&self) -> AttentionState {
        self.attention
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Evaluates one tick. Fires at most one alert.
    pub fn tick(&mut self, present: bool) -> TickOutcome {
        let alert = if present {
            self.attention.consecutive_absent_ticks = 0;
            self.state = AlertState::Clear;
            None
        } else {
            self.attention.consecutive_absent_ticks =
                self.attention.consecutive_absent_ticks.saturating_add(1);
            self.advance_absent()
        };

        if alert.is_some() {
            self.attention.alerts_fired = self.attention.alerts_fired.saturating_add(1);
        }

        TickOutcome {
            present,
            alert,
            state: self.state,
            attention: self.attention,
        }
    }

    fn advance_absent(&mut self) -> Option<AlertTier> {
        let ticks = self.attention.consecutive_absent_ticks;
        let t1 = self.thresholds.warn_after_ticks;
        let t2 = self.thresholds.escalate_after_ticks;

        match self.thresholds.rearm {
            RearmPolicy::AtEscalation => {
                if ticks == t1 {
                    self.state = AlertState::Warned;
                    Some(AlertTier::Warning)
                } else if ticks == t1.saturating_add(t2) {
                    self.attention.consecutive_absent_ticks = 0;
                    self.state = AlertState::Clear;
                    Some(AlertTier::Escalation)
                } else {
                    None
                }
            }
            RearmPolicy::AfterEveryAlert => match self.state {
                AlertState::Clear if ticks == t1 => {
                    self.attention.consecutive_absent_ticks = 0;
                    self.state = AlertState::Warned;
                    Some(AlertTier::Warning)
                }
                AlertState::Warned | AlertState::Escalated if ticks == t2 => {
                    self.attention.consecutive_absent_ticks = 0;
                    self.state = AlertState::Escalated;
                    Some(AlertTier::Escalation)
                }
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(monitor: &mut AlertStateMachine, presence: &[bool]) -> Vec<TickOutcome> {
        presence.iter().map(|present| monitor.tick(*present)).collect()
    }

    #[test]
    fn twelve_absent_ticks_fire_warning_then_escalation() {
        let mut monitor = AlertStateMachine::new(AlertThresholds::default());
        let mut presence = vec![false; 12];
        presence.push(true);

        let outcomes = run(&mut monitor, &presence);

        let alerts: Vec<(usize, AlertTier)> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.alert.map(|tier| (i + 1, tier)))
            .collect();
        assert_eq!(
            alerts,
            vec![(5, AlertTier::Warning), (10, AlertTier::Escalation)]
        );
        assert_eq!(outcomes[4].state, AlertState::Warned);
        assert_eq!(outcomes[9].attention.consecutive_absent_ticks, 0);
        assert_eq!(outcomes[9].state, AlertState::Clear);
        assert_eq!(outcomes[11].attention.consecutive_absent_ticks, 2);
        assert_eq!(outcomes[12].attention.consecutive_absent_ticks, 0);
        assert_eq!(monitor.attention().alerts_fired, 2);
    }

    #[test]
    fn presence_resets_the_counter_before_threshold() {
        let mut monitor = AlertStateMachine::new(AlertThresholds::default());
        let pattern = [false, false, false, false, true, false, false, false, false, true];

        let outcomes = run(&mut monitor, &pattern);

        assert!(outcomes.iter().all(|o| o.alert.is_none()));
        assert_eq!(monitor.attention().alerts_fired, 0);
    }

    #[test]
    fn prolonged_absence_keeps_a_fixed_cadence() {
        let thresholds = AlertThresholds::new(3, 2, RearmPolicy::AtEscalation).unwrap();
        let mut monitor = AlertStateMachine::new(thresholds);

        let outcomes = run(&mut monitor, &[false; 15]);

        let fired: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.alert.is_some())
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(fired, vec![3, 5, 8, 10, 13, 15]);
    }

    #[test]
    fn after_every_alert_policy_escalates_repeatedly() {
        let thresholds = AlertThresholds::new(5, 5, RearmPolicy::AfterEveryAlert).unwrap();
        let mut monitor = AlertStateMachine::new(thresholds);

        let outcomes = run(&mut monitor, &[false; 20]);

        let fired: Vec<(usize, AlertTier)> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.alert.map(|tier| (i + 1, tier)))
            .collect();
        assert_eq!(
            fired,
            vec![
                (5, AlertTier::Warning),
                (10, AlertTier::Escalation),
                (15, AlertTier::Escalation),
                (20, AlertTier::Escalation),
            ]
        );
        assert_eq!(monitor.state(), AlertState::Escalated);

        monitor.tick(true);
        assert_eq!(monitor.state(), AlertState::Clear);
    }

    #[test]
    fn alert_count_matches_threshold_crossings() {
        // Deterministic pseudo-random presence pattern.
        let mut seed: u32 = 0x2545_f491;
        let presence: Vec<bool> = (0..500)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                seed % 11 == 0
            })
            .collect();

        let thresholds = AlertThresholds::new(4, 3, RearmPolicy::AtEscalation).unwrap();
        let mut monitor = AlertStateMachine::new(thresholds);
        let mut crossings = 0;
        let mut run_length = 0u32;
        for present in &presence {
            let outcome = monitor.tick(*present);
            let crossed = if *present {
                run_length = 0;
                false
            } else {
                run_length += 1;
                let in_cycle = (run_length - 1) % 7 + 1;
                in_cycle == 4 || in_cycle == 7
            };
            if crossed {
                crossings += 1;
            }
            assert_eq!(outcome.alert.is_some(), crossed);
        }

        assert_eq!(monitor.attention().alerts_fired, crossings);
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        assert!(AlertThresholds::new(0, 5, RearmPolicy::AtEscalation).is_err());
        assert!(AlertThresholds::new(5, 0, RearmPolicy::AtEscalation).is_err());
    }
}
