pub mod ipinfo;
pub mod process;

pub use ipinfo::{Enricher, IpInfo, IpInfoCache};
pub use process::{PortResolver, ProcessTracker};
