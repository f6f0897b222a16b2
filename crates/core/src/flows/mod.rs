pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, QuoteLifecycleFlow};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowType, TransitionOutcome};
