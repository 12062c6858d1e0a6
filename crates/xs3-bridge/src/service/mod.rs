//! Bridge services, leaves first: login, query, command, smartphone, reader, program.

pub mod command;
pub mod login;
pub mod program;
pub mod query;
pub mod reader;
pub mod smartphone;

pub use command::{CommandEngine, CommandKind};
pub use login::{LoginState, LoginStateMachine};
pub use program::{
    clamp_begin, ExtendAccessReport, ExtendAccessRequest, ProgramOrchestrator, ProgramReport,
    ProgramRequest,
};
pub use query::{QueryParams, QueryService};
pub use reader::{ReaderEventProcessor, ReaderOutcome};
pub use smartphone::{MobileCommandReport, SmartphoneService};
