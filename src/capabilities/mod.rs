pub mod state_aware;
pub mod status_report;

pub use state_aware::{CapabilityMode, StateAwareCapability, DEFAULT_LOOKBACK};
pub use status_report::{parse_status_report, ReportedStep, StatusReport, REPORT_DELIMITER};
