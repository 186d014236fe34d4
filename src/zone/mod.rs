pub mod record;
#[allow(clippy::module_inception)]
pub mod zone;

pub use record::{RecordSet, SoaRecord, TRANSFER_ORDER};
pub use zone::{APEX, Zone, default_soa};

/// Zone constants
pub mod constants {
    /// Default TTL if not specified (1 hour)
    pub const DEFAULT_TTL: u32 = 3600;
}
