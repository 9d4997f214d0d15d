//! # topic-lens
//!
//! Topic modeling over uploaded document collections, with optional coherence
//! sweeps across a range of topic counts.
//!
//! - [`service::TopicService`] is the request boundary.
//! - [`topic`] selects one of four fitting methods: [`lda`], [`nmf`], [`lsa`]
//!   and [`cluster`].
//! - [`evaluate`] drives the coherence sweep using [`coherence`].
//! - [`projection`] and [`render`] turn results into charts.

pub mod cluster;
pub mod coherence;
pub mod embedding;
pub mod error;
pub mod evaluate;
pub mod lda;
pub mod loader;
pub mod logging;
pub mod lsa;
pub mod nmf;
pub mod preprocess;
pub mod projection;
pub mod render;
pub mod request;
pub mod service;
pub mod settings;
pub mod topic;
pub mod vectorize;

pub use error::{AnalyticsError, Result};
pub use request::{TopicRequest, TopicResponse};
pub use service::TopicService;
pub use settings::AppSettings;
