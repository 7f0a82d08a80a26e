//! Note numbers and frequencies.
//!
//! Notes are MIDI-style integers (A4 = 69, C4 = 60). They are not limited to
//! 0..=127: octave shifting on the keyboard can move past either end.

/// Identifier of a sounding note. MIDI numbering.
pub type NoteId = i32;

/// Concert pitch of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;
/// MIDI number of A4.
pub const A4_NOTE: NoteId = 69;

/// Frequency of `note` at A4 = 440 Hz.
pub fn get_frequency(note: NoteId) -> f64 {
    midi_to_frequency(note, A4_FREQUENCY)
}

/// Convert a MIDI note number to frequency using the given tuning pitch.
///
/// `tuning_pitch` is the frequency of A4 (MIDI 69).
/// Formula: `tuning_pitch * 2^((midi - 69) / 12)`
pub fn midi_to_frequency(note: NoteId, tuning_pitch: f64) -> f64 {
    tuning_pitch * (2.0_f64).powf((f64::from(note) - f64::from(A4_NOTE)) / 12.0)
}

/// Nearest note number for a frequency (inverse of [`midi_to_frequency`]).
pub fn frequency_to_midi(freq: f64, tuning_pitch: f64) -> Option<NoteId> {
    if !(freq > 0.0 && freq.is_finite()) {
        return None;
    }
    let midi = f64::from(A4_NOTE) + 12.0 * (freq / tuning_pitch).log2();
    Some(midi.round() as NoteId)
}

/// Nearest MIDI note (clamped to 0..=127) and the offset from it in cents.
pub fn frequency_to_midi_cents(freq: f64, tuning_pitch: f64) -> (u8, f64) {
    if !(freq > 0.0 && freq.is_finite()) {
        return (0, 0.0);
    }
    let midi_float = f64::from(A4_NOTE) + 12.0 * (freq / tuning_pitch).log2();
    let nearest = midi_float.round();
    let cents = (midi_float - nearest) * 100.0;
    (nearest.clamp(0.0, 127.0) as u8, cents)
}

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<NoteId> {
    let mut chars = note.chars();
    let base = match chars.next()? {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (semitone, octave_str) = match rest.chars().next() {
        Some('#') => (base + 1, &rest[1..]),
        Some('b') => (base - 1, &rest[1..]),
        _ => (base, rest),
    };

    let octave: NoteId = octave_str.parse().ok()?;
    // C4 = 60
    octave.checked_add(1)?.checked_mul(12)?.checked_add(semitone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn a4_and_octave_above() {
        assert_eq!(get_frequency(69), 440.0);
        assert_relative_eq!(get_frequency(81), 880.0, epsilon = 1e-9);
        assert_relative_eq!(get_frequency(57), 220.0, epsilon = 1e-9);
    }

    #[test]
    fn middle_c() {
        assert_relative_eq!(get_frequency(60), 261.6256, epsilon = 1e-3);
    }

    #[test]
    fn extreme_note_numbers_do_not_overflow() {
        assert_eq!(get_frequency(i32::MIN), 0.0);
        assert!(get_frequency(i32::MAX).is_infinite());
        assert!(get_frequency(i32::MIN + 69) >= 0.0);
        assert_eq!(note_to_midi("C2147483647"), None);
    }

    #[test]
    fn custom_tuning() {
        assert_relative_eq!(midi_to_frequency(69, 432.0), 432.0);
    }

    #[test]
    fn note_names() {
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("C#4"), Some(61));
        assert_eq!(note_to_midi("Bb3"), Some(58));
        assert_eq!(note_to_midi("C-1"), Some(0));
        assert_eq!(note_to_midi("H2"), None);
        assert_eq!(note_to_midi(""), None);
        assert_eq!(note_to_midi("C"), None);
    }

    #[test]
    fn cents_offset() {
        let (note, cents) = frequency_to_midi_cents(432.0, 440.0);
        assert_eq!(note, 69);
        assert!((cents + 31.77).abs() < 1.0, "got {cents}");
        assert_eq!(frequency_to_midi_cents(0.0, 440.0), (0, 0.0));
    }

    proptest! {
        #[test]
        fn frequency_is_monotonic(note in -60i32..200) {
            prop_assert!(get_frequency(note + 1) > get_frequency(note));
        }

        #[test]
        fn frequency_round_trips(note in -24i32..160) {
            prop_assert_eq!(frequency_to_midi(get_frequency(note), A4_FREQUENCY), Some(note));
        }
    }
}
