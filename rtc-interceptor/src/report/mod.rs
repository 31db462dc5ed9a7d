//! RTCP receiver reports and the receive statistics behind them.
//!
//! - [`ReceiverReportInterceptor`](receiver::ReceiverReportInterceptor) feeds every
//!   incoming RTP packet into [`ReceiveStatistics`](statistician::ReceiveStatistics)
//!   and emits RTCP Receiver Reports on a fixed interval.
//! - [`StreamStatistician`](statistician::StreamStatistician) keeps per-SSRC loss,
//!   jitter and bitrate counters following RFC 3550 appendix A.
//!
//! # Example
//!
//! ```ignore
//! use rtc_interceptor::{Registry, ReceiverReportBuilder};
//! use std::time::Duration;
//!
//! let chain = Registry::new()
//!     .with(ReceiverReportBuilder::new()
//!         .with_interval(Duration::from_millis(500))
//!         .build())
//!     .build();
//! ```

pub(crate) mod receiver;
pub(crate) mod statistician;
