//! Assigned numbers for the Blood Pressure profile and the cuff itself.

/// Local name the cuff advertises. Matched with exact string equality.
pub const DEVICE_NAME: &str = "BM77";

pub mod services {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    /// Blood Pressure service (org.bluetooth.service.blood_pressure).
    pub const BLOOD_PRESSURE: Uuid = uuid_from_u16(0x1810);
}

pub mod characteristics {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    /// Blood Pressure Measurement characteristic (notify).
    pub const BLOOD_PRESSURE_MEASUREMENT: Uuid = uuid_from_u16(0x2A35);
}
