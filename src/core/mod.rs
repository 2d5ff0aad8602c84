//! Core module containing the broadcaster machinery
//!
//! This module provides:
//! - KPI snapshots and payloads
//! - NBP packet encoding
//! - State tracking of the latest KPI values
//! - The inbound payload queue
//! - Transport layer (Serial, TCP socket)
//! - The broadcaster loop with rate gating and reconnection
//! - Packet traffic logging

pub mod broadcaster;
pub mod kpi;
pub mod logger;
pub mod packet;
pub mod queue;
pub mod state;
pub mod transport;
