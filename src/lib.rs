//! # ragrelay
//!
//! A retrieval-augmented generation relay. A query comes in over HTTP, the
//! Ragie retrieval API supplies relevant passages, and an OpenAI chat model
//! answers using those passages. Document upload, document status and
//! connection sync are forwarded to Ragie unchanged.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   HTTP / CLI ──▶│   Composer   │──▶ Retriever ──▶ Ragie /retrievals
//!                 │              │──▶ Generator ──▶ OpenAI /chat/completions
//!                 └──────────────┘
//!   HTTP / CLI ──▶ DocumentStore ──▶ Ragie /documents, /connections
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment credentials |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Request and response types |
//! | [`traits`] | Collaborator traits used for injection |
//! | [`retrieval`] | Ragie retrieval client |
//! | [`generation`] | OpenAI chat client and prompt assembly |
//! | [`documents`] | Ragie document and connection client |
//! | [`compose`] | Retrieval-then-generation composition |
//! | [`server`] | HTTP server |
//! | [`upstream`] | Shared upstream request plumbing |

pub mod compose;
pub mod config;
pub mod documents;
pub mod error;
pub mod generation;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod traits;
pub mod upstream;
