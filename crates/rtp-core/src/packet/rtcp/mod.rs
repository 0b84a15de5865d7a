//! RTCP value types produced and consumed by the incoming pipeline

pub mod nack;
pub mod ntp;
pub mod report_block;
pub mod sender_report;

pub use nack::NackField;
pub use ntp::NtpTimestamp;
pub use report_block::RtcpReportBlock;
pub use sender_report::SenderReportInfo;
