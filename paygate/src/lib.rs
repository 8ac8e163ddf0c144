#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for server-side x402 payments on Solana.
//!
//! This crate holds everything that does not need an HTTP stack: the x402
//! version 1 wire format, the supported networks and their USDC
//! deployments, construction of payment requirements, endpoint schemas,
//! validation helpers and the registry of public facilitators.
//!
//! The HTTP middleware built on top of these types lives in `paygate-http`.
//!
//! # Modules
//!
//! - [`chain`] - Supported networks and their USDC deployments
//! - [`facilitators`] - Registry of well-known public facilitators
//! - [`proto`] - Wire format types
//! - [`requirement`] - Construction of USDC payment requirements
//! - [`schema`] - Typed endpoint schemas attached to requirements
//! - [`timeouts`] - Per-operation facilitator timeouts
//! - [`validation`] - Structural validation helpers

pub mod chain;
pub mod facilitators;
pub mod proto;
pub mod requirement;
pub mod schema;
pub mod timeouts;
pub mod validation;

pub use chain::{ChainConfig, Network};
pub use proto::{PaymentPayload, PaymentRequired, PaymentRequirement, SettlementResponse};
pub use requirement::{RequirementError, UsdcRequirementConfig, build_usdc_requirement};
