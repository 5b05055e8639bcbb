pub mod config;
pub mod converter;
pub mod dispatcher;
pub mod metrics;
pub mod pipeline;
pub mod testing;
pub mod transport;
pub mod workspace;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use converter::{
    ConverterConfig, ConverterError, FfmpegConverter, MediaTransformer, NotePackager,
    TransformParams,
};
pub use dispatcher::{
    DispatchOutcome, Dispatcher, DispatcherConfig, DispatcherStatus, OverflowPolicy,
};
pub use pipeline::{Job, JobError, JobId, JobOutcome, JobPipeline, JobState, Messages};
pub use transport::{InboundEvent, MediaRef, MessageHandle, ReplyTarget, Transport, TransportError};
pub use workspace::{Workspace, WorkspaceConfig, WorkspaceError, WorkspaceManager};
