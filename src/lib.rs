//! TutorLink - conversational tutoring over lecture material
//!
//! Learner utterances are classified by intent and routed to a grounded
//! answerer, a learning report generator, or the quiz site. Per-user
//! components are built lazily and shared through a refcounted pool.

pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod intent;
pub mod llm;
pub mod quiz;
pub mod report;
pub mod retrieval;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

pub use app::{App, AppParts, IndexSource};
pub use config::Config;
pub use error::{Result, TutorError};
pub use router::{RequestContext, RequestRouter, RouterReply, UtteranceKind};
