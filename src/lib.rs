//! Custody Sweeper
//!
//! Deposit monitoring and treasury sweep engine for custodial stablecoin
//! addresses on TRON and EVM networks.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     POLL LOOP                         │
//!                 │                                                       │
//!   Chain RPC ◀───┼── monitor ──▶ store ◀── sweep ──▶ Chain RPC           │
//!                 │      │          ▲         │                           │
//!                 │      ▼          │         ▼                           │
//!                 │   notify ───────┼──▶ Ledger (deposit events)          │
//!                 │                 │                                     │
//!   Ledger ───────┼──▶ admin ───────┘  (CREDITED write path)              │
//!                 │                                                       │
//!                 │  ┌──────────────────────────────────────────────────┐ │
//!                 │  │               Cross-Cutting Concerns              │ │
//!                 │  │  config · keys · observability · resilience       │ │
//!                 │  │  lifecycle · pricing                              │ │
//!                 │  └──────────────────────────────────────────────────┘ │
//!                 └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod monitor;
pub mod notify;
pub mod store;
pub mod sweep;

// Outer surfaces
pub mod admin;
pub mod pricing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use error::{CustodyError, CustodyResult};
