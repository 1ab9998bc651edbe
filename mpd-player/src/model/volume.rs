/// Amount a single volume up/down step changes the volume by
pub const VOLUME_STEP: i32 = 5;

/// Clamp a volume value into `0..=100`
pub fn clamp_volume(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}
