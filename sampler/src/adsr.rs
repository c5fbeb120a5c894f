/// Tolerance for phase targets; levels at or below it count as silence.
pub const SILENCE: f32 = 1.0e-5;

/// ADSR Envelope phases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ADSRPhase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR Envelope parameters
///
/// Published by the control context as a whole snapshot; the render path
/// never sees a partially updated set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeParameters {
    pub attack: f32,  // seconds
    pub decay: f32,   // seconds
    pub sustain: f32, // 0.0 - 1.0 (level)
    pub release: f32, // seconds
}

impl Default for EnvelopeParameters {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.8,
            release: 0.2,
        }
    }
}

impl EnvelopeParameters {
    /// Builds a snapshot, clamping times to be non-negative and the sustain
    /// level into [0, 1]. Non-finite inputs become 0.
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        fn seconds(v: f32) -> f32 {
            if v.is_finite() {
                v.max(0.0)
            } else {
                0.0
            }
        }
        let sustain = if sustain.is_finite() {
            sustain.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            attack: seconds(attack),
            decay: seconds(decay),
            sustain,
            release: seconds(release),
        }
    }

    pub fn percussive() -> Self {
        Self::new(0.001, 0.1, 0.3, 0.05)
    }

    pub fn pad() -> Self {
        Self::new(0.3, 0.2, 0.7, 0.5)
    }

    pub fn pluck() -> Self {
        Self::new(0.001, 0.3, 0.1, 0.1)
    }

    /// Looks up a named preset.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "percussive" => Some(Self::percussive()),
            "pad" => Some(Self::pad()),
            "pluck" => Some(Self::pluck()),
            _ => None,
        }
    }
}

/// Per-voice linear ADSR state machine.
///
/// Each phase moves the level by a per-sample slope derived from the
/// parameters passed to [`EnvelopeGenerator::next_gain`]. Editing the
/// parameters mid-envelope changes the slope from the current level onward;
/// time already spent in a phase is never recomputed.
#[derive(Clone, Debug)]
pub struct EnvelopeGenerator {
    phase: ADSRPhase,
    level: f32,
    // Level at the moment release began; release ramps from here to 0.
    release_from: f32,
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self {
            phase: ADSRPhase::Idle,
            level: 0.0,
            release_from: 0.0,
        }
    }
}

impl EnvelopeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new note. A zero attack lands on full level at once, and a
    /// zero decay on top of it lands on sustain, so a release issued before
    /// the first sample ramps down from there.
    pub fn trigger(&mut self, params: &EnvelopeParameters) {
        self.release_from = 0.0;
        if params.attack > 0.0 {
            self.phase = ADSRPhase::Attack;
            self.level = 0.0;
        } else if params.decay > 0.0 {
            self.phase = ADSRPhase::Decay;
            self.level = 1.0;
        } else {
            self.phase = ADSRPhase::Sustain;
            self.level = params.sustain;
        }
    }

    /// Enters release from whatever level the envelope is currently at.
    pub fn release(&mut self) {
        match self.phase {
            ADSRPhase::Idle | ADSRPhase::Release => {}
            _ => {
                self.phase = ADSRPhase::Release;
                self.release_from = self.level;
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances one sample and returns the gain for it.
    pub fn next_gain(&mut self, params: &EnvelopeParameters, sample_rate: f32) -> f32 {
        loop {
            match self.phase {
                ADSRPhase::Idle => return 0.0,
                ADSRPhase::Attack => {
                    if params.attack <= 0.0 {
                        self.level = 1.0;
                        self.phase = ADSRPhase::Decay;
                        continue;
                    }
                    self.level += 1.0 / (params.attack * sample_rate);
                    if self.level >= 1.0 - SILENCE {
                        self.level = 1.0;
                        self.phase = ADSRPhase::Decay;
                    }
                    return self.level;
                }
                ADSRPhase::Decay => {
                    let sustain = params.sustain;
                    if params.decay <= 0.0 || self.level <= sustain {
                        self.level = sustain;
                        self.phase = ADSRPhase::Sustain;
                        continue;
                    }
                    self.level -= (1.0 - sustain) / (params.decay * sample_rate);
                    if self.level <= sustain + SILENCE {
                        self.level = sustain;
                        self.phase = ADSRPhase::Sustain;
                    }
                    return self.level;
                }
                ADSRPhase::Sustain => {
                    self.level = params.sustain;
                    return self.level;
                }
                ADSRPhase::Release => {
                    if params.release <= 0.0 || self.release_from <= SILENCE {
                        self.level = 0.0;
                        self.phase = ADSRPhase::Idle;
                        return 0.0;
                    }
                    self.level -= self.release_from / (params.release * sample_rate);
                    if self.level <= SILENCE {
                        self.level = 0.0;
                        self.phase = ADSRPhase::Idle;
                    }
                    return self.level;
                }
            }
        }
    }

    pub fn phase(&self) -> ADSRPhase {
        self.phase
    }

    /// The most recently produced gain.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.phase != ADSRPhase::Idle
    }
}
