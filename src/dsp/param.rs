//! Sample-accurate parameter automation.
//!
//! An [`AudioParam`] holds an intrinsic value plus a time-ordered list of
//! automation events, evaluated against the rendering clock the same way the
//! host audio API does it:
//!
//! - `SetValue` jumps at its time.
//! - `LinearRamp` / `ExponentialRamp` run from the previous event's value and
//!   time (or from the intrinsic value at the moment the ramp was scheduled)
//!   to their own value at their end time.
//! - `SetTarget` approaches its target exponentially from its start time.
//!
//! ```
//! use synthlab_core::dsp::param::{AudioParam, Automation};
//!
//! let mut gain = AudioParam::new(0.0);
//! gain.schedule(Automation::SetValue { value: 0.0, time: 0.0 }, 0.0);
//! gain.schedule(Automation::LinearRamp { value: 1.0, end_time: 1.0 }, 0.0);
//! assert!((gain.value_at(0.5) - 0.5).abs() < 1e-12);
//! ```

/// A single automation command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    SetValue {
        value: f64,
        time: f64,
    },
    LinearRamp {
        value: f64,
        end_time: f64,
    },
    ExponentialRamp {
        value: f64,
        end_time: f64,
    },
    SetTarget {
        target: f64,
        start_time: f64,
        time_constant: f64,
    },
}

impl Automation {
    /// The instant the event is ordered by (end time for ramps).
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. } => time,
            Automation::LinearRamp { end_time, .. } => end_time,
            Automation::ExponentialRamp { end_time, .. } => end_time,
            Automation::SetTarget { start_time, .. } => start_time,
        }
    }

    /// Reject events the timeline cannot evaluate.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Automation::SetValue { value, time } => finite(&[value, time]),
            Automation::LinearRamp { value, end_time } => finite(&[value, end_time]),
            Automation::ExponentialRamp { value, end_time } => {
                finite(&[value, end_time])?;
                if value == 0.0 {
                    return Err("exponential ramp target must be non-zero".to_string());
                }
                Ok(())
            }
            Automation::SetTarget {
                target,
                start_time,
                time_constant,
            } => {
                finite(&[target, start_time, time_constant])?;
                if time_constant < 0.0 {
                    return Err(format!("negative time constant {time_constant}"));
                }
                Ok(())
            }
        }
    }
}

fn finite(values: &[f64]) -> Result<(), String> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(v) => Err(format!("non-finite value {v}")),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    event: Automation,
    /// Clock time when the event was inserted; start of a leading ramp.
    scheduled_at: f64,
}

/// What the parameter does after the last event at or before `t`.
#[derive(Debug, Clone, Copy)]
enum Hold {
    Constant(f64),
    Approach {
        from: f64,
        target: f64,
        start: f64,
        time_constant: f64,
    },
}

impl Hold {
    fn eval(self, t: f64) -> f64 {
        match self {
            Hold::Constant(v) => v,
            Hold::Approach {
                from,
                target,
                start,
                time_constant,
            } => {
                if time_constant <= 0.0 {
                    return target;
                }
                target + (from - target) * (-(t - start).max(0.0) / time_constant).exp()
            }
        }
    }
}

/// An automatable parameter.
#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f64,
    events: Vec<Scheduled>,
}

impl AudioParam {
    pub fn new(value: f64) -> Self {
        AudioParam {
            value,
            events: Vec::new(),
        }
    }

    /// Assign immediately, dropping any automation.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.events.clear();
    }

    /// Insert an event in time order. Events with equal times keep insertion order.
    pub fn schedule(&mut self, event: Automation, now: f64) {
        let time = event.time();
        let idx = self.events.partition_point(|s| s.event.time() <= time);
        self.events.insert(
            idx,
            Scheduled {
                event,
                scheduled_at: now,
            },
        );
    }

    /// Remove every event whose time is at or after `from`.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|s| s.event.time() < from);
    }

    /// Number of events still on the timeline.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Evaluate the automated value at clock time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        evaluate(self.value, &self.events, t)
    }

    /// Fold events that can no longer affect values at or after `now`.
    ///
    /// Everything before the last `SetValue` or `SetTarget` that has started
    /// collapses into the intrinsic value, so a stream of glides keeps the
    /// timeline at a constant length.
    pub fn commit(&mut self, now: f64) {
        let anchor = self.events.iter().rposition(|s| {
            matches!(
                s.event,
                Automation::SetValue { time, .. } | Automation::SetTarget { start_time: time, .. }
                    if time <= now
            )
        });
        if let Some(idx) = anchor.filter(|&idx| idx > 0) {
            let start = self.events[idx].event.time();
            self.value = evaluate(self.value, &self.events[..idx], start);
            self.events.drain(..idx);
        }

        let Some(last) = self.events.last() else {
            return;
        };
        if last.event.time() > now {
            return;
        }
        let settled = match last.event {
            Automation::SetTarget { target, .. } => {
                let v = self.value_at(now);
                (v - target).abs() <= 1e-7 * target.abs().max(1.0)
            }
            _ => true,
        };
        if settled {
            let v = match last.event {
                Automation::SetTarget { target, .. } => target,
                _ => self.value_at(now),
            };
            self.set_value(v);
        }
    }
}

fn evaluate(intrinsic: f64, events: &[Scheduled], t: f64) -> f64 {
    let mut hold = Hold::Constant(intrinsic);
    let mut prev_time: Option<f64> = None;

    for s in events {
        match s.event {
            Automation::SetValue { value, time } => {
                if t < time {
                    return hold.eval(t);
                }
                hold = Hold::Constant(value);
                prev_time = Some(time);
            }
            Automation::LinearRamp { value, end_time } => {
                let t0 = prev_time.unwrap_or(s.scheduled_at);
                if t < end_time {
                    if t < t0 {
                        return hold.eval(t);
                    }
                    let v0 = hold.eval(t0);
                    let span = end_time - t0;
                    return v0 + (value - v0) * ((t - t0) / span);
                }
                hold = Hold::Constant(value);
                prev_time = Some(end_time);
            }
            Automation::ExponentialRamp { value, end_time } => {
                let t0 = prev_time.unwrap_or(s.scheduled_at);
                if t < end_time {
                    if t < t0 {
                        return hold.eval(t);
                    }
                    let v0 = hold.eval(t0);
                    // Undefined through zero: hold the start value.
                    if v0 == 0.0 || v0.signum() != value.signum() {
                        return v0;
                    }
                    let span = end_time - t0;
                    return v0 * (value / v0).powf((t - t0) / span);
                }
                hold = Hold::Constant(value);
                prev_time = Some(end_time);
            }
            Automation::SetTarget {
                target,
                start_time,
                time_constant,
            } => {
                if t < start_time {
                    return hold.eval(t);
                }
                hold = Hold::Approach {
                    from: hold.eval(start_time),
                    target,
                    start: start_time,
                    time_constant,
                };
                prev_time = Some(start_time);
            }
        }
    }

    hold.eval(t)
}
