//! Remote object store access.
//!
//! - [`client`]: capability trait the core depends on (range GET + LIST)
//! - [`s3`]: production implementation backed by the AWS SDK

pub mod client;
pub mod s3;
