pub const ANGSTROM: f64 = 1.0e-10;
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;
pub const DEBYE: f64 = 3.33564e-30;

/// Converts (elementary charge x Angstrom) to Debye.
pub const CHARGE_ANGSTROM_TO_DEBYE: f64 = ANGSTROM * ELEMENTARY_CHARGE / DEBYE;
