use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    QuoteLifecycle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    ResponseSubmitted,
    RejectRequested,
    OrderPlaced,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    /// Set when the accepted response was written for a different request.
    pub foreign_response_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RecordResponse,
    NotifyCustomer,
    CreateOrder,
    NotifyBusiness,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: QuoteStatus,
    pub to: QuoteStatus,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
