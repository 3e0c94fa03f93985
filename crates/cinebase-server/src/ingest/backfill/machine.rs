//! Backfill state machine
//!
//! [`step`] decides what one backfill job does from what it observed. It
//! performs no I/O; the worker gathers the inputs and carries out the
//! effects, so every scheduling rule is testable on its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ingest::config::BackfillConfig;
use crate::ingest::jobs::BackfillStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    #[default]
    NotStarted,
    Running,
    Paused,
    Completed,
}

impl BackfillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillStatus::NotStarted => "not_started",
            BackfillStatus::Running => "running",
            BackfillStatus::Paused => "paused",
            BackfillStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for BackfillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a backfill run, persisted so `resume` can reuse them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackfillSettings {
    pub batch_size: usize,
    pub min_popularity: Option<f64>,
}

impl BackfillSettings {
    pub fn queue_batch(&self) -> BackfillStep {
        BackfillStep::QueueBatch {
            batch_size: self.batch_size,
            min_popularity: self.min_popularity,
        }
    }

    pub fn check_completion(&self) -> BackfillStep {
        BackfillStep::CheckCompletion {
            batch_size: self.batch_size,
            min_popularity: self.min_popularity,
        }
    }
}

impl From<&BackfillStep> for BackfillSettings {
    fn from(step: &BackfillStep) -> Self {
        match *step {
            BackfillStep::QueueBatch {
                batch_size,
                min_popularity,
            }
            | BackfillStep::CheckCompletion {
                batch_size,
                min_popularity,
            } => Self {
                batch_size,
                min_popularity,
            },
        }
    }
}

/// What a step observed
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A queue-batch job started; `pending` backfill fetches are in flight
    QueueBatch {
        status: BackfillStatus,
        settings: BackfillSettings,
        pending: i64,
    },
    /// Gap analysis for a queue-batch job returned these ids
    GapResult {
        status: BackfillStatus,
        settings: BackfillSettings,
        missing: Vec<i64>,
    },
    /// A completion-check job started
    CheckCompletion {
        status: BackfillStatus,
        settings: BackfillSettings,
        in_flight: i64,
    },
}

impl Input {
    fn status(&self) -> BackfillStatus {
        match self {
            Input::QueueBatch { status, .. } | Input::GapResult { status, .. } | Input::CheckCompletion { status, .. } => {
                *status
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Find up to `batch_size` missing ids, then feed them back as
    /// [`Input::GapResult`]
    RunGapAnalysis(BackfillSettings),
    /// Bulk-enqueue backfill fetches and add them to the queued total
    EnqueueFetches(Vec<i64>),
    ScheduleStep { step: BackfillStep, delay: Duration },
    AdvanceBatch,
    SetStatus(BackfillStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub effects: Vec<Effect>,
    /// Short label for logs and job meta
    pub reason: &'static str,
}

impl Transition {
    fn new(reason: &'static str, effects: Vec<Effect>) -> Self {
        Self { effects, reason }
    }

    /// True when the chain ends here
    pub fn is_terminal(&self) -> bool {
        !self
            .effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleStep { .. } | Effect::RunGapAnalysis(_)))
    }
}

pub fn step(config: &BackfillConfig, input: Input) -> Transition {
    if input.status() != BackfillStatus::Running {
        return Transition::new("not_running", Vec::new());
    }

    match input {
        Input::QueueBatch { settings, pending, .. } if pending >= config.pending_threshold => Transition::new(
            "backpressure",
            vec![Effect::ScheduleStep {
                step: settings.check_completion(),
                delay: config.long_recheck(),
            }],
        ),
        Input::QueueBatch { settings, .. } => Transition::new("gap_analysis", vec![Effect::RunGapAnalysis(settings)]),
        Input::GapResult { missing, .. } if missing.is_empty() => {
            Transition::new("gap_closed", vec![Effect::SetStatus(BackfillStatus::Completed)])
        },
        Input::GapResult { settings, missing, .. } => Transition::new(
            "batch_queued",
            vec![
                Effect::EnqueueFetches(missing),
                Effect::ScheduleStep {
                    step: settings.check_completion(),
                    delay: config.short_recheck(),
                },
            ],
        ),
        Input::CheckCompletion {
            settings, in_flight, ..
        } if in_flight > config.high_water => Transition::new(
            "draining",
            vec![Effect::ScheduleStep {
                step: settings.check_completion(),
                delay: config.long_recheck(),
            }],
        ),
        Input::CheckCompletion {
            settings, in_flight, ..
        } if in_flight > 0 => Transition::new(
            "finishing",
            vec![Effect::ScheduleStep {
                step: settings.check_completion(),
                delay: config.short_recheck(),
            }],
        ),
        Input::CheckCompletion { settings, .. } => Transition::new(
            "batch_done",
            vec![
                Effect::AdvanceBatch,
                Effect::ScheduleStep {
                    step: settings.queue_batch(),
                    delay: Duration::ZERO,
                },
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BackfillSettings {
        BackfillSettings {
            batch_size: 1000,
            min_popularity: Some(1.0),
        }
    }

    fn config() -> BackfillConfig {
        BackfillConfig {
            pending_threshold: 5000,
            ..Default::default()
        }
    }

    #[test]
    fn test_backpressure_skips_gap_analysis() {
        let t = step(
            &config(),
            Input::QueueBatch {
                status: BackfillStatus::Running,
                settings: settings(),
                pending: 6000,
            },
        );
        assert_eq!(t.reason, "backpressure");
        assert_eq!(
            t.effects,
            vec![Effect::ScheduleStep {
                step: settings().check_completion(),
                delay: config().long_recheck(),
            }]
        );
    }

    #[test]
    fn test_queue_batch_runs_gap_analysis_below_threshold() {
        let t = step(
            &config(),
            Input::QueueBatch {
                status: BackfillStatus::Running,
                settings: settings(),
                pending: 10,
            },
        );
        assert_eq!(t.effects, vec![Effect::RunGapAnalysis(settings())]);
    }

    #[test]
    fn test_empty_gap_completes() {
        let t = step(
            &config(),
            Input::GapResult {
                status: BackfillStatus::Running,
                settings: settings(),
                missing: vec![],
            },
        );
        assert_eq!(t.effects, vec![Effect::SetStatus(BackfillStatus::Completed)]);
        assert!(t.is_terminal());
    }

    #[test]
    fn test_gap_result_enqueues_and_schedules_check() {
        let t = step(
            &config(),
            Input::GapResult {
                status: BackfillStatus::Running,
                settings: settings(),
                missing: vec![3, 4],
            },
        );
        assert_eq!(t.effects[0], Effect::EnqueueFetches(vec![3, 4]));
        assert!(matches!(
            t.effects[1],
            Effect::ScheduleStep {
                step: BackfillStep::CheckCompletion { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_completion_check_rechecks_by_load() {
        let cfg = config();
        let check = |in_flight| {
            step(
                &cfg,
                Input::CheckCompletion {
                    status: BackfillStatus::Running,
                    settings: settings(),
                    in_flight,
                },
            )
        };

        assert_eq!(check(cfg.high_water + 1).reason, "draining");
        assert_eq!(
            check(cfg.high_water + 1).effects,
            vec![Effect::ScheduleStep {
                step: settings().check_completion(),
                delay: cfg.long_recheck(),
            }]
        );
        assert_eq!(
            check(1).effects,
            vec![Effect::ScheduleStep {
                step: settings().check_completion(),
                delay: cfg.short_recheck(),
            }]
        );
        assert_eq!(
            check(0).effects,
            vec![
                Effect::AdvanceBatch,
                Effect::ScheduleStep {
                    step: settings().queue_batch(),
                    delay: Duration::ZERO,
                },
            ]
        );
    }

    #[test]
    fn test_stopped_loop_does_nothing() {
        for status in [BackfillStatus::Paused, BackfillStatus::Completed, BackfillStatus::NotStarted] {
            let t = step(
                &config(),
                Input::CheckCompletion {
                    status,
                    settings: settings(),
                    in_flight: 0,
                },
            );
            assert!(t.effects.is_empty());
            assert!(t.is_terminal());
        }
    }

    #[test]
    fn test_settings_round_trip_through_steps() {
        let s = settings();
        assert_eq!(BackfillSettings::from(&s.queue_batch()), s);
        assert_eq!(BackfillSettings::from(&s.check_completion()), s);
    }
}
