use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Used for
/// probabilities and multipliers so rolls compare without float drift.
pub type Fixed64 = I32F32;

/// Wall-clock milliseconds, the unit of every timer in the simulation.
pub type Millis = u64;

/// Convert an f64 to Fixed64. Use for initialization and catalog data.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use for display and transcendental math.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}
