pub mod channel;
pub mod clock;
pub mod consent;
pub mod error;
pub mod record;
pub mod redaction;
pub mod types;

pub use channel::{CaseRef, ChannelName, check_segment};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consent::{ConsentDecision, ConsentKey, ConsentRecord, ConsentStatus, DecisionKind};
pub use error::RecordError;
pub use record::{BufferedRecord, MinimalRecord, RawRecord};
pub use redaction::RedactionPolicy;
pub use types::{CaseId, RelyingParty, SubjectId};
