//! # Architecture Abstraction Layer
//!
//! Target-specific glue between the kernel's tick interrupt and the
//! scheduler. Only compiled with the `cortex-m` feature.

pub mod cortex_m4;
