//! Human-readable console lines: one header at startup, one line per tick.

use core::fmt::Write;

use heapless::String;

pub const LINE_CAPACITY: usize = 96;

/// What the inner loop hands to the console for each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiagSample {
    pub theta: f32,
    pub phi: f32,
    pub armed: bool,
}

pub fn header() -> String<LINE_CAPACITY> {
    let mut line = String::new();
    let _ = write!(
        line,
        " Body Angle Estimation theta (rad) | Average Wheel Angle Estimation phi (rad)\r\n\r\n"
    );
    line
}

/// Carriage-return prefixed so a terminal redraws the same row.
pub fn tick_line(sample: &DiagSample) -> String<LINE_CAPACITY> {
    let mut line = String::new();
    let _ = write!(
        line,
        "\r {} theta: {:>8.2} rad   phi: {:>8.2} rad",
        if sample.armed { "ARMED   " } else { "DISARMED" },
        sample.theta,
        sample.phi
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_line_shows_both_angles() {
        let line = tick_line(&DiagSample {
            theta: -0.1234,
            phi: 12.5,
            armed: true,
        });
        assert!(line.starts_with("\r ARMED"));
        assert!(line.contains("theta:    -0.12 rad"));
        assert!(line.contains("phi:    12.50 rad"));
        // Fits a single full-speed USB packet
        assert!(line.len() <= 64);
    }

    #[test]
    fn header_is_not_truncated() {
        let h = header();
        assert!(h.ends_with("\r\n\r\n"));
        assert!(h.contains("theta"));
    }
}
