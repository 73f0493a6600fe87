//! ArduCopter custom mode numbers.

use fence_core::vehicle::FlightMode;

pub fn from_custom(custom: u32) -> FlightMode {
    match custom {
        0 => FlightMode::Stabilize,
        3 => FlightMode::Auto,
        4 => FlightMode::Guided,
        5 => FlightMode::Loiter,
        6 => FlightMode::Rtl,
        9 => FlightMode::Land,
        other => FlightMode::Other(other),
    }
}

pub fn to_custom(mode: FlightMode) -> u32 {
    match mode {
        FlightMode::Stabilize => 0,
        FlightMode::Auto => 3,
        FlightMode::Guided => 4,
        FlightMode::Loiter => 5,
        FlightMode::Rtl => 6,
        FlightMode::Land => 9,
        FlightMode::Other(custom) => custom,
    }
}
