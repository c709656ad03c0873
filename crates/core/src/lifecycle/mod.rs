pub mod engine;
pub mod transitions;

pub use engine::{DonationLifecycleEngine, NewRequest, TransitionReceipt};
pub use transitions::{
    check_submission, plan_transition, LifecycleAction, LifecyclePolicy, RequestEvent,
    TransitionOutcome,
};
