pub mod ids;
pub mod request;
pub mod record;
pub mod priority;
pub mod events;

pub use ids::{JobId, Requester};
pub use request::{GenerationParams, SubmitRequest, VideoStyle};
pub use record::{JobRecord, JobSnapshot, JobStatus, Transition};
pub use priority::PriorityTier;
pub use events::JobEvent;
