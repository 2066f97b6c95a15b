mod context;

pub use context::{trust_subject_header, CallContext, CallerIdentity, SUBJECT_ID_HEADER};
