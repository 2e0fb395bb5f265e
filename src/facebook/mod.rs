pub mod ingest;
pub mod publisher;
pub mod signature;
pub mod types;

pub use ingest::WebhookIngestor;
pub use publisher::{GraphClient, PublishError, ReplyPublisher};
pub use signature::{SignaturePolicy, SignatureVerifier, Verdict, SIGNATURE_HEADER};
pub use types::{is_graph_id, WebhookPayload};
