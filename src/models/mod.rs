pub mod grading;
pub mod provider;

pub use grading::{AnswerPayload, GradingResult, ScoringRequest};
pub use provider::{
    default_params, descriptor, is_known_model, known_models, provider_of_model, ModelParams,
    ProviderDescriptor, ProviderId, PROVIDERS,
};
