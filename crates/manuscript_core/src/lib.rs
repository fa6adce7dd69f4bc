pub mod credentials;
pub mod domain;
pub mod extract;
pub mod gateway;
pub mod ports;
pub mod prompts;
pub mod workflow;

pub use credentials::{AuthFailure, CredentialStore, PROTECTED_USERNAME};
pub use domain::{
    ConversionResult, ManuscriptInput, Page, ProofreadResult, Role, SourceType, UserRecord,
    WorkflowKind,
};
pub use extract::ExtractError;
pub use gateway::ConversionGateway;
pub use ports::{
    GenerationRequest, GenerationService, PortError, PortResult, TemplateName, TemplateStore,
    UserRepository,
};
pub use workflow::{
    Artifact, ConvertOutcome, ConvertRequest, Download, Identity, Phase, SessionContext, Upload,
    WorkflowError, WorkflowState,
};
