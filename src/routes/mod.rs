//! Route handlers
//!
//! - `/health`, `/ready` - liveness/readiness probes
//! - `/v1/*` - the proxy pipeline (C8)
//! - `/admin/*`, `/usage/*` - declared in `crate::admin`

pub mod health;
pub mod proxy;
