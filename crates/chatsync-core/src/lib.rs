//! Domain model for chatsync.
//!
//! Defines the conversation aggregate, usage events and aggregates, the LLM
//! service/model registry, and workspace-file associations. Everything here is
//! plain data plus pure operations; persistence lives in `chatsync-storage`
//! and `chatsync-persist`.

pub mod conversation;
pub mod error;
pub mod id;
pub mod llms;
pub mod time;
pub mod usage;
pub mod workspace;

// Re-export commonly used types
pub use conversation::{
    Conversation, Fragment, FragmentType, GenerationHandle, Message, MessageGenerator,
    MessageMetadata, Part, Role, UserFlag, DEFAULT_SYSTEM_PURPOSE,
};
pub use error::CoreError;
pub use id::{ConversationId, FragmentId, MessageId};
pub use llms::{DomainAssignment, LlmModel, LlmRegistry, LlmService, RegistryRemoval};
pub use time::{now_millis, Timestamp};
pub use usage::{UsageAggregate, UsageCategory, UsageEvent};
pub use workspace::WorkspaceAssociations;
