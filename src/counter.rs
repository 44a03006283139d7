//! Raw/base counter arithmetic
//!
//! WMI reports "raw fraction" and "average base" counters as a numerator column
//! plus a `_Base` denominator column. Base counters are 32 bit on the agent side
//! and wrap around, so the pair has to be corrected before dividing.

/// 2^32, the wrap period of 32 bit base counters
pub const COUNTER_WRAP: f64 = 4_294_967_296.0;

/// Divide `measure` by `base`, first lifting `base` over any 32 bit wraps
///
/// `measure` is expected to already be multiplied by `factor`. When the base
/// lags behind `measure / factor`, the number of missed wraps is estimated as
/// `ceil((measure / factor - base) / 2^32)`. Several wraps between two samples
/// cannot be told apart, so the result may still be wrong in that case.
///
/// Callers must rule out `base == 0`.
pub fn scale_counter(measure: f64, factor: f64, base: f64) -> f64 {
    let mut base = base;
    let times = (measure / factor - base) / COUNTER_WRAP;
    if times > 0.0 {
        base += times.ceil() * COUNTER_WRAP;
    }
    measure / base
}

/// Reinterpret a base counter the agent printed as signed 32 bit
pub fn unsigned_base(raw: i64) -> i64 {
    if raw < 0 {
        raw + (1_i64 << 32)
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale_counter_by_loop(measure: f64, factor: f64, base: f64) -> f64 {
        let mut base = base;
        while base * factor < measure {
            base += COUNTER_WRAP;
        }
        measure / base
    }

    #[test]
    fn test_no_wrap_is_plain_division() {
        assert_eq!(scale_counter(50.0, 1.0, 200.0), 0.25);
        assert_eq!(scale_counter(10893524000.0, 100.0, 4294967295.0), 10893524000.0 / 4294967295.0);
    }

    #[test]
    fn test_wrap_matches_loop() {
        let measure = 1844674407366441.0;
        let expected = scale_counter_by_loop(measure, 1.0, 15143722.0);
        let actual = scale_counter(measure, 1.0, 15143722.0);
        assert!((actual - expected).abs() < 1e-15);
        assert!(actual > 0.0 && actual <= 1.0);
    }

    #[test]
    fn test_wrap_with_factor() {
        let measure = 100.0 * 9_000_000_000.0;
        let actual = scale_counter(measure, 100.0, 1000.0);
        let expected = scale_counter_by_loop(measure, 100.0, 1000.0);
        assert!((actual - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unsigned_base() {
        assert_eq!(unsigned_base(-1), 4294967295);
        assert_eq!(unsigned_base(0), 0);
        assert_eq!(unsigned_base(17), 17);
    }
}
