//! Payment-gated tool-invocation gateway.
//!
//! This crate is the server-side core an MCP-style tool-hosting framework
//! needs: a tool registry, an invocation gateway that optionally gates each
//! call behind a per-call micropayment, a startup manifest writer, and the
//! HTTP surface tying them together.
//!
//! # Overview
//!
//! Tools are named callables with a description and an optional JSON-Schema
//! input constraint, registered once at startup. A single [`PaymentPolicy`]
//! governs the whole gateway: when enabled, every call must carry a
//! [`PaymentProof`] whose settlement reference the verifier confirms against a
//! [`settlement::SettlementLedger`] and consumes exactly once; when disabled,
//! every tool is free and the verifier is never consulted.
//!
//! # Request flow
//!
//! `POST /tools/call` → [`InvocationGateway::handle_call`]: registry lookup,
//! input-schema validation, payment verification, handler dispatch. Input
//! validation runs before the payment check, so a malformed request never
//! spends a valid payment.
//!
//! # Modules
//!
//! - [`config`] — server configuration: JSON file, env fallbacks, payment block.
//! - [`demo`] — the bundled demonstration tools served by the default binary.
//! - [`gateway`] — the per-request orchestrator.
//! - [`handlers`] — axum endpoints (`/tools/list`, `/tools/call`, `/healthz`).
//! - [`manifest`] — startup-time `manifest.yaml` publishing.
//! - [`registry`] — tool definitions and the ordered, name-keyed registry.
//! - [`settlement`] — the settlement collaborator boundary and its backends.
//! - [`sig_down`] — SIGTERM/SIGINT handling for graceful shutdown.
//! - [`telemetry`] — tracing initialization.
//! - [`types`] — money amounts, payment policy and proof, domain newtypes.
//! - [`verifier`] — payment verification and the anti-replay settlement index.

pub mod config;
pub mod demo;
pub mod gateway;
pub mod handlers;
pub mod manifest;
pub mod registry;
pub mod settlement;
pub mod sig_down;
pub mod telemetry;
pub mod types;
pub mod verifier;

pub use gateway::{GatewayError, InvocationGateway};
pub use registry::{RegistryError, ToolDefinition, ToolError, ToolHandler, ToolRegistry};
pub use types::{MoneyAmount, PaymentPolicy, PaymentProof};
pub use verifier::{PaymentError, PaymentVerifier};
