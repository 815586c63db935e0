//! Canned replies: template catalog, keyword routing and paced delivery.

pub mod catalog;
pub mod dispatcher;
pub mod router;

pub use catalog::{ACCEPTED_INTENT, DEFAULT_INTENT, REJECTED_INTENT, TemplateCatalog};
pub use dispatcher::{Bindings, DispatchReport, ReplyDispatcher, ReplySink, render};
pub use router::IntentRouter;
