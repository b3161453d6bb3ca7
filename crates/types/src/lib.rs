//! Shared wire types for the Trellis surface runtime.
//!
//! Everything in this crate is plain data: bound values that components use to
//! reference literals or data-model paths, the messages exchanged between a
//! rendered surface and its backend, and the events produced by a board
//! execution. The runtime itself lives in `trellis-engine`.

pub mod address;
pub mod bound_value;
pub mod execution;
pub mod message;
pub mod mode;

pub use address::{cache_key, element_address, split_element_address};
pub use bound_value::{BoundValue, BoundValueError, LiteralValue, PathBinding};
pub use execution::{
    COMPLETED_EVENT_TYPE, ExecutionEvent, ExecutionInput, ExecutionRequest, RUN_INITIATED_EVENT_TYPE, RunMetadata, RunPayload,
    UI_EVENT_TYPE,
};
pub use message::{
    Action, CHANGE_ACTION, ClearFileInput, ClearPageState, ClientMessage, CloseDialog, NavigateTo, OpenDialog, ServerMessage, SetGlobalState,
    SetPageState, SetQueryParam, WORKFLOW_EVENT_ACTION,
};
pub use mode::InteractionMode;
