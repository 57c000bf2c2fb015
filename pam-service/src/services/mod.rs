pub mod backend;
pub mod domains;
pub mod freshness;
pub mod local_auth;
pub mod session;

pub use backend::{BackendLinks, FrontendIdentity};
pub use domains::{DomainInfo, DomainList, ProviderKind};
pub use session::{PamData, ResponderContext};
