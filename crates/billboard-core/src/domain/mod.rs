//! Domain model (ids, advertisements, counters, view records, selections, errors).

pub mod advertisement;
pub mod counters;
pub mod errors;
pub mod ids;
pub mod selection;
pub mod view_record;
pub mod visitor;

pub use advertisement::{AdDocument, AdStatus, Advertisement, AuthorDisplay, AuthorProfile};
pub use counters::{CounterKind, Counters};
pub use errors::{ConfigError, EngineError, EngineFault, ErrorKind, StoreError};
pub use ids::{AdvertisementId, AuthorId};
pub use selection::DisplaySelection;
pub use view_record::ViewRecord;
pub use visitor::VisitorIdentity;
