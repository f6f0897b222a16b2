use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::quote::QuoteStatus;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowType, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> QuoteStatus;
    fn transition(
        &self,
        current: &QuoteStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// `pending -> quoted | rejected`, `quoted -> quoted | accepted`.
#[derive(Clone, Debug, Default)]
pub struct QuoteLifecycleFlow;

impl FlowDefinition for QuoteLifecycleFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::QuoteLifecycle
    }

    fn initial_state(&self) -> QuoteStatus {
        QuoteStatus::Pending
    }

    fn transition(
        &self,
        current: &QuoteStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_quote_lifecycle(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> QuoteStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &QuoteStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &QuoteStatus,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("from", current.as_str())
                    .with_metadata("event", format!("{event:?}"))
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<QuoteLifecycleFlow> {
    fn default() -> Self {
        Self::new(QuoteLifecycleFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("quote response `{response_id}` does not belong to this quote request")]
    ForeignResponse { response_id: String },
    #[error("invalid transition from {state} using event {event:?}")]
    InvalidTransition { state: QuoteStatus, event: FlowEvent },
}

fn transition_quote_lifecycle(
    current: &QuoteStatus,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{CreateOrder, NotifyBusiness, NotifyCustomer, RecordResponse};
    use FlowEvent::{OrderPlaced, RejectRequested, ResponseSubmitted};
    use QuoteStatus::{Accepted, Pending, Quoted, Rejected};

    let (to, actions) = match (current, event) {
        (Pending, ResponseSubmitted) | (Quoted, ResponseSubmitted) => {
            (Quoted, vec![RecordResponse, NotifyCustomer])
        }
        (Pending, RejectRequested) => (Rejected, vec![NotifyCustomer]),
        (Quoted, OrderPlaced) => {
            if let Some(response_id) = &context.foreign_response_id {
                return Err(FlowTransitionError::ForeignResponse {
                    response_id: response_id.clone(),
                });
            }
            (Accepted, vec![CreateOrder, NotifyBusiness])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
