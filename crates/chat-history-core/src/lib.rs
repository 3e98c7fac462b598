//! Reconciliation of multi-version chat stores into one ordered export per account.

pub mod assets;
pub mod config;
pub mod content;
pub mod error;
pub mod link;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod tabular;

pub use assets::{AssetPaths, AssetResolver};
pub use config::{ExportConfig, ResolutionMode, TimestampZone};
pub use content::{decode_content, AttachmentInfo, ContentKind, DecodedContent};
pub use error::{ExportError, RecordDecodeError};
pub use link::{link_message, Association};
pub use model::{
    canonical_json, Chat, ChatMessage, Member, MemberId, RawRecord, StoreName, StoredVersion,
    UpdateMarker,
};
pub use pipeline::{
    build_aggregate, export_account, order_messages, ExportAggregate, ExportDiagnostics,
    RecordSource, ResolvedMessage, StoreSnapshot,
};
pub use resolve::{group_by_key, precedence, resolve_store, resolve_versions, SelectionPolicy};
pub use tabular::{escape_field, tabular_row, unescape_field, TABULAR_COLUMNS};
