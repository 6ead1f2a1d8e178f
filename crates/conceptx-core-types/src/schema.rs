//! Canonical schema constants for structured logging
//!
//! Log consumers key on these names; keep them stable.

// Envelope
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

// Pipeline
pub const FIELD_REVISION: &str = "revision";
pub const FIELD_OPERATION_INDEX: &str = "operation_index";

// Errors
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_READ_DENIED: &str = "read_denied";
